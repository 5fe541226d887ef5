//! Typed result delivery for background tasks.

use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError, bounded};

use crate::progress::{TaskFn, TaskOutcome, TaskProgress};

/// A handle to a task that produces a value.
///
/// The value travels over a one-slot channel and is sent before the task's
/// progress is completed, so it is available as soon as a wait returns.
#[derive(Debug)]
pub struct TaskHandle<T> {
    progress: TaskProgress,
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// The progress object of the underlying task.
    pub fn progress(&self) -> &TaskProgress {
        &self.progress
    }

    /// Check if the task has finished.
    pub fn is_finished(&self) -> bool {
        self.progress.is_completed()
    }

    /// Try to get the result without blocking.
    ///
    /// Returns `Some(result)` once, after the task has completed.
    pub fn try_get(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the task finishes and return its result.
    ///
    /// Returns `None` if the task was cancelled or panicked.
    pub fn wait(self) -> Option<T> {
        match self.progress.wait_for_completion() {
            TaskOutcome::Completed => self.receiver.try_recv().ok(),
            TaskOutcome::Cancelled | TaskOutcome::Panicked => None,
        }
    }

    /// Wait for the result with a timeout.
    ///
    /// Returns `None` if the timeout elapsed or the task did not complete.
    pub fn wait_timeout(self, timeout: Duration) -> Option<T> {
        match self.progress.wait_for_completion_timeout(timeout) {
            Some(TaskOutcome::Completed) => self.receiver.try_recv().ok(),
            _ => None,
        }
    }

    /// Request cooperative cancellation of the task.
    pub fn cancel(&self) {
        self.progress.cancel();
    }
}

/// Wrap a value-producing closure into a task plus the receiving end of its result.
pub(crate) fn with_result<F, T>(body: F) -> (TaskFn, Receiver<T>)
where
    F: FnOnce(&TaskProgress) -> T + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = bounded(1);
    let task: TaskFn = Box::new(move |progress: &TaskProgress| {
        let _ = sender.send(body(progress));
    });
    (task, receiver)
}

pub(crate) fn task_handle<T>(progress: TaskProgress, receiver: Receiver<T>) -> TaskHandle<T> {
    TaskHandle { progress, receiver }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskQueue;

    fn submit<T: Send + 'static>(
        queue: &TaskQueue,
        task: impl FnOnce(&TaskProgress) -> T + Send + 'static,
    ) -> TaskHandle<T> {
        let progress = TaskProgress::new();
        let (task, receiver) = with_result(task);
        queue.push_boxed(task, progress.clone(), 0).unwrap();
        task_handle(progress, receiver)
    }

    #[test]
    fn test_result_delivered() {
        let queue = TaskQueue::new("test");
        let handle = submit(&queue, |_| 6 * 7);

        assert!(!handle.is_finished());
        assert!(handle.try_get().is_none());

        queue.do_task();
        assert!(handle.is_finished());
        assert_eq!(handle.wait(), Some(42));
    }

    #[test]
    fn test_cancelled_yields_none() {
        let queue = TaskQueue::new("test");
        let handle = submit(&queue, |_| "never");
        handle.cancel();

        queue.do_task();
        assert_eq!(handle.progress().outcome(), Some(TaskOutcome::Cancelled));
        assert_eq!(handle.wait(), None);
    }

    #[test]
    fn test_wait_timeout_pending() {
        let queue = TaskQueue::new("test");
        let handle = submit(&queue, |_| 1);
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
        queue.discard_pending();
    }
}

//! Completion and status tracking for submitted tasks.
//!
//! Every task pushed into a [`TaskQueue`](crate::queue::TaskQueue) carries a
//! [`TaskProgress`]. The submitting thread keeps a clone to poll or block on,
//! while the worker reports progress and finishes it exactly once after the
//! task body returns.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_tasks::{TaskOutcome, TaskProgress};
//!
//! let progress = TaskProgress::new();
//! let worker_side = progress.clone();
//!
//! std::thread::spawn(move || {
//!     worker_side.set_status("Importing mesh");
//!     worker_side.set_progress(0.5);
//!     worker_side.complete();
//! });
//!
//! assert_eq!(progress.wait_for_completion(), TaskOutcome::Completed);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::logging::targets::PROGRESS as TARGET;
use crate::sync::{Condition, Mutex};

/// How a task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// The task body ran and returned.
    Completed,
    /// The task was cancelled or discarded before it ran.
    Cancelled,
    /// The task body panicked.
    Panicked,
}

/// The boxed closure type executed by the scheduler.
///
/// User data is captured by the closure; the progress handle of the task is
/// passed in so the body can report progress and poll for cancellation.
pub type TaskFn = Box<dyn FnOnce(&TaskProgress) + Send + 'static>;

struct ProgressState {
    progress: f32,
    status: String,
    outcome: Option<TaskOutcome>,
}

struct ProgressInner {
    state: Mutex<ProgressState>,
    finished: Condition,
    cancelled: AtomicBool,
}

impl Drop for ProgressInner {
    fn drop(&mut self) {
        if self.state.get_mut().outcome.is_none() && !std::thread::panicking() {
            tracing::error!(target: TARGET, "task progress dropped before completion");
            debug_assert!(false, "task progress dropped before completion");
        }
    }
}

/// A one-shot, thread-safe completion handle for a single task.
///
/// Cloning is cheap and every clone refers to the same task. The progress
/// fraction and status text are guarded by a mutex; completion is signalled
/// through a [`Condition`] and checked under the same lock, so a waiter that
/// arrives after completion returns immediately.
///
/// A progress object must be finished before its last handle is dropped.
/// Violations trip a debug assertion.
#[derive(Clone)]
pub struct TaskProgress {
    inner: Arc<ProgressInner>,
}

impl TaskProgress {
    /// Create a new, unfinished progress object at 0.0 with an empty status.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                state: Mutex::new(ProgressState {
                    progress: 0.0,
                    status: String::new(),
                    outcome: None,
                }),
                finished: Condition::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Get the last reported progress fraction.
    pub fn progress(&self) -> f32 {
        self.inner.state.lock().progress
    }

    /// Report a progress fraction.
    ///
    /// The value is stored as given. Values outside `0.0..=1.0` are logged.
    pub fn set_progress(&self, progress: f32) {
        if !(0.0..=1.0).contains(&progress) {
            tracing::warn!(target: TARGET, progress, "progress reported outside of [0, 1]");
        }
        self.inner.state.lock().progress = progress;
    }

    /// Get the current status text.
    pub fn status(&self) -> String {
        self.inner.state.lock().status.clone()
    }

    /// Set the status text.
    pub fn set_status(&self, status: impl Into<String>) {
        self.inner.state.lock().status = status.into();
    }

    /// Update progress and status under a single lock acquisition.
    pub fn update(&self, progress: f32, status: impl Into<String>) {
        let status = status.into();
        let mut state = self.inner.state.lock();
        state.progress = progress;
        state.status = status;
    }

    /// Check whether the task has finished, whatever the outcome.
    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Get the outcome, or `None` while the task is still pending or running.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.state.lock().outcome
    }

    /// Block until the task finishes.
    ///
    /// Returns immediately if it already has.
    pub fn wait_for_completion(&self) -> TaskOutcome {
        let mut state = self.inner.state.lock();
        self.inner
            .finished
            .wait_while(&mut state, |state| state.outcome.is_none());
        state.outcome.unwrap_or(TaskOutcome::Cancelled)
    }

    /// Block until the task finishes or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_for_completion_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        let mut state = self.inner.state.lock();
        self.inner
            .finished
            .wait_while_for(&mut state, timeout, |state| state.outcome.is_none());
        state.outcome
    }

    /// Mark the task as completed and wake every waiter.
    ///
    /// Called by the scheduler after the task body returns. A task body that
    /// calls it itself trips the double-finish panic once it returns; if the
    /// body panics instead, the manual completion stands.
    ///
    /// # Panics
    ///
    /// Panics if the progress has already been finished.
    pub fn complete(&self) {
        self.finish(TaskOutcome::Completed);
    }

    /// Request cooperative cancellation.
    ///
    /// A task that has not started yet is skipped and finishes as
    /// [`TaskOutcome::Cancelled`]. A running task sees the request through
    /// [`is_cancelled`](Self::is_cancelled) and may return early.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn finish(&self, outcome: TaskOutcome) {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = state.outcome;
            if previous.is_none() {
                state.outcome = Some(outcome);
            }
            previous
        };

        if let Some(previous) = previous {
            panic!("task progress finished twice (was {previous:?}, now {outcome:?})");
        }

        self.inner.finished.trigger_all();
    }

    /// Run `task` against this progress and finish it.
    ///
    /// A cancellation requested before the call skips the body. If the body
    /// panics the progress is finished as [`TaskOutcome::Panicked`] and the
    /// panic keeps unwinding.
    pub(crate) fn run(&self, task: TaskFn) -> TaskOutcome {
        if self.is_cancelled() {
            tracing::trace!(target: TARGET, "skipping cancelled task");
            self.finish(TaskOutcome::Cancelled);
            return TaskOutcome::Cancelled;
        }

        let guard = PanicGuard { progress: self };
        task(self);
        std::mem::forget(guard);

        self.finish(TaskOutcome::Completed);
        TaskOutcome::Completed
    }
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskProgress")
            .field("progress", &state.progress)
            .field("status", &state.status)
            .field("outcome", &state.outcome)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

static_assertions::assert_impl_all!(TaskProgress: Send, Sync);

/// Finishes a progress as panicked when a task body unwinds.
struct PanicGuard<'a> {
    progress: &'a TaskProgress,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        tracing::error!(target: TARGET, "task panicked");
        // The body may have completed its own progress before panicking.
        // Finishing again here would panic while unwinding and abort.
        if !self.progress.is_completed() {
            self.progress.finish(TaskOutcome::Panicked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::AtomicI32;
    use std::thread;

    #[test]
    fn test_progress_and_status() {
        let progress = TaskProgress::new();
        assert_eq!(progress.progress(), 0.0);
        assert!(progress.status().is_empty());

        progress.set_progress(0.25);
        progress.set_status("Loading textures");
        assert_eq!(progress.progress(), 0.25);
        assert_eq!(progress.status(), "Loading textures");

        progress.update(0.75, "Uploading");
        assert_eq!(progress.progress(), 0.75);
        assert_eq!(progress.status(), "Uploading");

        progress.complete();
    }

    #[test]
    fn test_out_of_range_progress_is_stored() {
        let progress = TaskProgress::new();
        progress.set_progress(1.5);
        assert_eq!(progress.progress(), 1.5);
        progress.complete();
    }

    #[test]
    fn test_wait_then_complete() {
        let progress = TaskProgress::new();
        let worker_side = progress.clone();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker_side.complete();
        });

        assert_eq!(progress.wait_for_completion(), TaskOutcome::Completed);
        assert!(progress.is_completed());
        worker.join().unwrap();
    }

    #[test]
    fn test_complete_then_wait() {
        let progress = TaskProgress::new();
        progress.complete();

        assert_eq!(progress.wait_for_completion(), TaskOutcome::Completed);
        assert_eq!(
            progress.wait_for_completion_timeout(Duration::from_millis(1)),
            Some(TaskOutcome::Completed)
        );
    }

    #[test]
    fn test_wait_timeout_on_pending() {
        let progress = TaskProgress::new();
        assert_eq!(
            progress.wait_for_completion_timeout(Duration::from_millis(10)),
            None
        );
        progress.complete();
    }

    #[test]
    fn test_many_waiters_released() {
        let progress = TaskProgress::new();
        let woken = Arc::new(AtomicI32::new(0));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let progress = progress.clone();
                let woken = woken.clone();
                thread::spawn(move || {
                    progress.wait_for_completion();
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        progress.complete();

        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    }

    #[test]
    #[should_panic(expected = "finished twice")]
    fn test_complete_twice_panics() {
        let progress = TaskProgress::new();
        progress.complete();
        progress.complete();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "dropped before completion")]
    fn test_drop_incomplete_asserts() {
        let progress = TaskProgress::new();
        drop(progress);
    }

    #[test]
    fn test_run_completes() {
        let progress = TaskProgress::new();
        let outcome = progress.run(Box::new(|p| p.set_progress(1.0)));
        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(progress.outcome(), Some(TaskOutcome::Completed));
        assert_eq!(progress.progress(), 1.0);
    }

    #[test]
    fn test_run_skips_cancelled() {
        let progress = TaskProgress::new();
        let ran = Arc::new(AtomicBool::new(false));
        progress.cancel();

        let ran_clone = ran.clone();
        let outcome = progress.run(Box::new(move |_| ran_clone.store(true, Ordering::SeqCst)));

        assert_eq!(outcome, TaskOutcome::Cancelled);
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(progress.wait_for_completion(), TaskOutcome::Cancelled);
    }

    #[test]
    fn test_run_reports_panic() {
        let progress = TaskProgress::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            progress.run(Box::new(|_| panic!("import failed")));
        }));

        assert!(result.is_err());
        assert_eq!(progress.outcome(), Some(TaskOutcome::Panicked));
    }

    #[test]
    fn test_panic_after_manual_complete_keeps_outcome() {
        let progress = TaskProgress::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            progress.run(Box::new(|p| {
                p.complete();
                panic!("failed after completing");
            }));
        }));

        assert!(result.is_err());
        assert_eq!(progress.outcome(), Some(TaskOutcome::Completed));
        assert_eq!(progress.wait_for_completion(), TaskOutcome::Completed);
    }
}

//! Dedicated worker threads bound to a task queue.
//!
//! A [`TaskThread`] owns one OS thread running a "pop or sleep" loop over its
//! [`TaskQueue`]. Several task threads may share one queue, which is how the
//! background pool is built. The loop exits once the queue has been shut
//! down and drained.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_lattice_tasks::{TaskProgress, TaskQueue, TaskThread};
//!
//! let queue = Arc::new(TaskQueue::new("Io"));
//! let thread = TaskThread::spawn("Io", queue.clone()).unwrap();
//!
//! let progress = TaskProgress::new();
//! queue.push_task(|p| p.set_status("flushed"), progress.clone(), 0).unwrap();
//! progress.wait_for_completion();
//!
//! queue.shutdown();
//! assert!(thread.join());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::{Result, TaskError};
use crate::logging::targets::THREAD as TARGET;
use crate::queue::TaskQueue;
use crate::sync::Mutex;

/// A named OS thread that executes tasks from one queue.
pub struct TaskThread {
    name: String,
    queue: Arc<TaskQueue>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl TaskThread {
    /// Start a thread named `name` serving `queue`.
    pub fn spawn(name: impl Into<String>, queue: Arc<TaskQueue>) -> Result<Self> {
        Self::spawn_with_stack_size(name, queue, None)
    }

    /// Start a thread with an explicit stack size.
    pub fn spawn_with_stack_size(
        name: impl Into<String>,
        queue: Arc<TaskQueue>,
        stack_size: Option<usize>,
    ) -> Result<Self> {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_queue = queue.clone();
        let thread_running = running.clone();
        let handle = builder
            .spawn(move || {
                let _running = RunningGuard(thread_running);
                task_loop(&thread_queue);
            })
            .map_err(|e| TaskError::spawn_failed(name.as_str(), &e))?;

        let thread_id = handle.thread().id();
        tracing::debug!(target: TARGET, thread = %name, queue = %queue.name(), "task thread started");

        Ok(Self {
            name,
            queue,
            thread_id,
            handle: Mutex::new(Some(handle)),
            running,
        })
    }

    /// The thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The OS-level identity of the thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// The queue this thread serves (possibly shared with other threads).
    pub fn task_queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Check whether the loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the thread to exit.
    ///
    /// The thread only exits after its queue is shut down and drained, or if
    /// a task panics. Returns `true` if the thread was joined cleanly,
    /// `false` if it was already joined or a task panicked.
    pub fn join(&self) -> bool {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => {
                let clean = handle.join().is_ok();
                if !clean {
                    tracing::warn!(target: TARGET, thread = %self.name, "task thread terminated by a panic");
                }
                clean
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TaskThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskThread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("queue", &self.queue.name())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clears the running flag when the loop exits, including by unwinding.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn task_loop(queue: &TaskQueue) {
    let mut executed = 0usize;
    while queue.wait_for_tasks() {
        // Another thread sharing the queue may have taken the task first.
        if queue.do_task().is_some() {
            executed += 1;
        }
    }
    tracing::debug!(
        target: TARGET,
        thread = thread::current().name().unwrap_or("<unnamed>"),
        executed,
        "task thread stopped"
    );
}

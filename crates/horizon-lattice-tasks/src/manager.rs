//! The task manager: built-in queues, named workers and task routing.
//!
//! A [`TaskManager`] owns two built-in queues:
//!
//! - the **main queue**, which has no worker thread and is drained by the
//!   embedding application calling [`TaskManager::do_main_thread_tasks`]
//!   once per iteration of its own loop;
//! - the **background queue**, shared by a pool of worker threads.
//!
//! Additional workers may own a private queue and are addressed by name.
//! The thread that creates the manager is recorded as the main thread.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_tasks::TaskManager;
//!
//! let manager = TaskManager::new().unwrap();
//!
//! // Fire-and-forget background work, highest priority first.
//! let progress = manager.run_background_task(|p| p.set_status("warming caches"), 10, None);
//!
//! // Work pinned to the asset worker.
//! let asset = manager.run_background_task(|_| { /* decode */ }, 0, Some("Asset"));
//!
//! progress.wait_for_completion();
//! asset.wait_for_completion();
//!
//! // In the application loop:
//! manager.do_main_thread_tasks();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use crate::config::TaskManagerConfig;
use crate::error::{Result, TaskError};
use crate::handle::{TaskHandle, task_handle, with_result};
use crate::logging::targets::MANAGER as TARGET;
use crate::logging::{PerfSpan, QueueSnapshot, SchedulerSnapshot};
use crate::progress::TaskProgress;
use crate::queue::TaskQueue;
use crate::thread::TaskThread;
use crate::thread_check::{ThreadAffinity, contract_violation};

/// Name of the built-in queue drained on the main thread.
pub const MAIN_QUEUE: &str = "Main";

/// Name of the built-in queue shared by the background workers.
pub const BACKGROUND_QUEUE: &str = "Background";

/// Schedules tasks onto worker threads and the main thread.
///
/// `TaskManager` is `Send + Sync`; share it by reference or `Arc` with every
/// collaborator that submits work. Dropping it shuts the scheduler down.
pub struct TaskManager {
    main_thread: ThreadAffinity,
    main_queue: Arc<TaskQueue>,
    background_queue: Arc<TaskQueue>,
    threads: Vec<TaskThread>,
    thread_index: HashMap<String, usize>,
    shut_down: AtomicBool,
}

impl TaskManager {
    /// Create a manager with the default worker layout.
    ///
    /// Starts `Worker1`..`Worker4` on the background queue and `Asset` on
    /// its own queue.
    pub fn new() -> Result<Self> {
        Self::with_config(TaskManagerConfig::default())
    }

    /// Create a manager from a configuration.
    ///
    /// The calling thread becomes the main thread.
    pub fn with_config(config: TaskManagerConfig) -> Result<Self> {
        config.validate()?;

        let mut manager = Self {
            main_thread: ThreadAffinity::current(),
            main_queue: Arc::new(TaskQueue::new(MAIN_QUEUE)),
            background_queue: Arc::new(TaskQueue::with_policy(
                BACKGROUND_QUEUE,
                config.background_policy,
            )),
            threads: Vec::with_capacity(config.workers.len()),
            thread_index: HashMap::with_capacity(config.workers.len()),
            shut_down: AtomicBool::new(false),
        };

        // A failed spawn drops `manager`, which joins the threads started so far.
        for spec in &config.workers {
            let queue = match spec.queue {
                None => manager.background_queue.clone(),
                Some(policy) => Arc::new(TaskQueue::with_policy(spec.name.clone(), policy)),
            };
            let thread = TaskThread::spawn_with_stack_size(&spec.name, queue, config.stack_size)?;
            manager
                .thread_index
                .insert(spec.name.clone(), manager.threads.len());
            manager.threads.push(thread);
        }

        tracing::info!(
            target: TARGET,
            workers = manager.threads.len(),
            background_workers = config.background_worker_count(),
            "task manager started"
        );

        Ok(manager)
    }

    /// Run a task on the main thread.
    ///
    /// Called on the main thread, the task runs immediately and `None` is
    /// returned. From any other thread it is queued on the main queue; with
    /// `wait` the caller blocks until the main loop has run it and `None` is
    /// returned, otherwise the progress handle is returned.
    ///
    /// # Panics
    ///
    /// Panics if the main queue has been shut down.
    #[track_caller]
    pub fn run_main_thread_task<F>(&self, task: F, wait: bool) -> Option<TaskProgress>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        match self.try_run_main_thread_task(task, wait) {
            Ok(progress) => progress,
            Err(err) => contract_violation(err),
        }
    }

    /// Fallible version of [`run_main_thread_task`](Self::run_main_thread_task).
    #[tracing::instrument(
        skip(self, task),
        target = "horizon_lattice_tasks::manager",
        level = "trace"
    )]
    pub fn try_run_main_thread_task<F>(&self, task: F, wait: bool) -> Result<Option<TaskProgress>>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        let progress = TaskProgress::new();

        if self.main_thread.is_same_thread() {
            progress.run(Box::new(task));
            return Ok(None);
        }

        self.main_queue.push_boxed(Box::new(task), progress.clone(), 0)?;
        if wait {
            progress.wait_for_completion();
            return Ok(None);
        }
        Ok(Some(progress))
    }

    /// Queue a task for a background worker and return its progress handle.
    ///
    /// `thread` selects a named worker's queue; `None` (or an empty name)
    /// selects the shared background queue. Never blocks unless the target
    /// queue uses [`QueuePolicy::Block`](crate::QueuePolicy::Block).
    ///
    /// # Panics
    ///
    /// Panics if `thread` names a worker that was not registered, or if the
    /// push fails.
    #[track_caller]
    pub fn run_background_task<F>(
        &self,
        task: F,
        priority: u32,
        thread: Option<&str>,
    ) -> TaskProgress
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        match self.try_run_background_task(task, priority, thread) {
            Ok(progress) => progress,
            Err(err) => contract_violation(err),
        }
    }

    /// Fallible version of [`run_background_task`](Self::run_background_task).
    #[tracing::instrument(
        skip(self, task),
        target = "horizon_lattice_tasks::manager",
        level = "trace"
    )]
    pub fn try_run_background_task<F>(
        &self,
        task: F,
        priority: u32,
        thread: Option<&str>,
    ) -> Result<TaskProgress>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        let queue = self.queue_by_name(thread)?;
        let progress = TaskProgress::new();
        queue.push_boxed(Box::new(task), progress.clone(), priority)?;
        Ok(progress)
    }

    /// Queue a value-producing task on the background queue.
    ///
    /// # Panics
    ///
    /// Panics if the push fails.
    #[track_caller]
    pub fn spawn_background<F, T>(&self, task: F, priority: u32) -> TaskHandle<T>
    where
        F: FnOnce(&TaskProgress) -> T + Send + 'static,
        T: Send + 'static,
    {
        match self.try_spawn_background(task, priority) {
            Ok(handle) => handle,
            Err(err) => contract_violation(err),
        }
    }

    /// Fallible version of [`spawn_background`](Self::spawn_background).
    pub fn try_spawn_background<F, T>(&self, task: F, priority: u32) -> Result<TaskHandle<T>>
    where
        F: FnOnce(&TaskProgress) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, receiver) = with_result(task);
        let progress = TaskProgress::new();
        self.background_queue
            .push_boxed(task, progress.clone(), priority)?;
        Ok(task_handle(progress, receiver))
    }

    /// Queue a task on the queue bound to `thread_id`.
    ///
    /// The main thread's id selects the main queue; a worker's id selects
    /// that worker's queue. With `wait`, the caller blocks until the task has
    /// run and `None` is returned. Waiting on the calling thread's own queue
    /// runs the task inline instead.
    ///
    /// # Panics
    ///
    /// Panics if no queue is bound to `thread_id`, or if the push fails.
    #[track_caller]
    pub fn run_task<F>(&self, task: F, thread_id: ThreadId, wait: bool) -> Option<TaskProgress>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        match self.try_run_task(task, thread_id, wait) {
            Ok(progress) => progress,
            Err(err) => contract_violation(err),
        }
    }

    /// Fallible version of [`run_task`](Self::run_task).
    #[tracing::instrument(
        skip(self, task),
        target = "horizon_lattice_tasks::manager",
        level = "trace"
    )]
    pub fn try_run_task<F>(
        &self,
        task: F,
        thread_id: ThreadId,
        wait: bool,
    ) -> Result<Option<TaskProgress>>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        let queue = self.queue_by_thread(thread_id)?;
        let progress = TaskProgress::new();

        if wait && std::thread::current().id() == thread_id {
            progress.run(Box::new(task));
            return Ok(None);
        }

        queue.push_boxed(Box::new(task), progress.clone(), 0)?;
        if wait {
            progress.wait_for_completion();
            return Ok(None);
        }
        Ok(Some(progress))
    }

    /// Run every task queued on the main queue, on the calling thread.
    ///
    /// Call this once per iteration of the application's main loop. Tasks
    /// queued by the drained tasks themselves run in the same call. Returns
    /// the number of tasks taken off the queue.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if called from any thread other than the one
    /// that created the manager. That thread is the main thread: it is where
    /// [`run_main_thread_task`](Self::run_main_thread_task) runs tasks inline,
    /// so draining elsewhere would split main-thread work across two threads.
    pub fn do_main_thread_tasks(&self) -> usize {
        self.main_thread
            .debug_assert_same_thread("do_main_thread_tasks must run on the main thread");

        let _span = PerfSpan::new("do_main_thread_tasks");
        let mut executed = 0;
        while self.main_queue.has_tasks() {
            if self.main_queue.do_task().is_some() {
                executed += 1;
            }
        }

        if executed > 0 {
            tracing::trace!(target: TARGET, executed, "drained main queue");
        }
        executed
    }

    /// Number of tasks waiting on the shared background queue.
    pub fn total_background_tasks(&self) -> usize {
        self.background_queue.size()
    }

    /// The id of the thread that created this manager.
    pub fn main_thread_id(&self) -> ThreadId {
        self.main_thread.thread_id()
    }

    /// Check whether the calling thread is the main thread.
    pub fn is_main_thread(&self) -> bool {
        self.main_thread.is_same_thread()
    }

    /// The built-in main queue.
    pub fn main_queue(&self) -> &Arc<TaskQueue> {
        &self.main_queue
    }

    /// The built-in background queue.
    pub fn background_queue(&self) -> &Arc<TaskQueue> {
        &self.background_queue
    }

    /// Names of all worker threads, in start order.
    pub fn worker_names(&self) -> Vec<&str> {
        self.threads.iter().map(TaskThread::name).collect()
    }

    /// Look up a worker thread by name.
    pub fn worker(&self, name: &str) -> Option<&TaskThread> {
        self.thread_index.get(name).map(|&index| &self.threads[index])
    }

    /// The OS thread id of a named worker.
    pub fn worker_thread_id(&self, name: &str) -> Option<ThreadId> {
        self.worker(name).map(TaskThread::thread_id)
    }

    /// Check whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Capture queue depths and worker assignments.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let mut queues = vec![
            snapshot_of(&self.main_queue, Vec::new()),
            snapshot_of(&self.background_queue, Vec::new()),
        ];

        for thread in &self.threads {
            let queue = thread.task_queue();
            if Arc::ptr_eq(queue, &self.background_queue) {
                queues[1].workers.push(thread.name().to_owned());
            } else {
                queues.push(snapshot_of(queue, vec![thread.name().to_owned()]));
            }
        }

        SchedulerSnapshot { queues }
    }

    /// Stop the scheduler.
    ///
    /// Every queue stops accepting tasks and tasks left on the main queue
    /// are finished as cancelled. Workers then finish what is already queued
    /// and are joined. Calling it again does nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!(target: TARGET, "shutting down task manager");

        self.main_queue.shutdown();
        self.background_queue.shutdown();
        for thread in &self.threads {
            thread.task_queue().shutdown();
        }

        // Nobody drains the main queue from here on. Cancelling its leftovers
        // releases workers blocked on them, so the joins below can finish.
        let discarded = self.main_queue.discard_pending();

        let current = std::thread::current().id();
        for thread in &self.threads {
            // A task calling shutdown cannot join its own thread.
            if thread.thread_id() != current {
                thread.join();
            }
        }

        tracing::info!(target: TARGET, discarded, "task manager stopped");
    }

    fn queue_by_name(&self, name: Option<&str>) -> Result<&Arc<TaskQueue>> {
        match name {
            None | Some("") => Ok(&self.background_queue),
            Some(name) => self
                .worker(name)
                .map(TaskThread::task_queue)
                .ok_or_else(|| TaskError::UnknownQueue(name.to_owned())),
        }
    }

    fn queue_by_thread(&self, thread_id: ThreadId) -> Result<&Arc<TaskQueue>> {
        if thread_id == self.main_thread.thread_id() {
            return Ok(&self.main_queue);
        }

        self.threads
            .iter()
            .find(|thread| thread.thread_id() == thread_id)
            .map(TaskThread::task_queue)
            .ok_or(TaskError::UnknownThread(thread_id))
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("main_thread", &self.main_thread.thread_id())
            .field("workers", &self.worker_names())
            .field("background_tasks", &self.total_background_tasks())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

static_assertions::assert_impl_all!(TaskManager: Send, Sync);

fn snapshot_of(queue: &TaskQueue, workers: Vec<String>) -> QueueSnapshot {
    QueueSnapshot {
        name: queue.name().to_owned(),
        pending: queue.size(),
        policy: queue.policy(),
        shut_down: queue.is_shut_down(),
        workers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePolicy;
    use crate::progress::TaskOutcome;
    use crate::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn single_worker() -> TaskManager {
        TaskManager::with_config(
            TaskManagerConfig::builder()
                .worker("Bg")
                .private_worker("Io", QueuePolicy::Unbounded)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_layout() {
        let manager = TaskManager::new().unwrap();
        assert_eq!(
            manager.worker_names(),
            ["Worker1", "Worker2", "Worker3", "Worker4", "Asset"]
        );
        assert!(manager.is_main_thread());
        assert_eq!(manager.main_thread_id(), thread::current().id());

        let asset = manager.worker("Asset").unwrap();
        assert!(!Arc::ptr_eq(asset.task_queue(), manager.background_queue()));
        for name in ["Worker1", "Worker2", "Worker3", "Worker4"] {
            let worker = manager.worker(name).unwrap();
            assert!(Arc::ptr_eq(worker.task_queue(), manager.background_queue()));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TaskManagerConfig::builder().worker("A").worker("A").build();
        assert!(matches!(
            TaskManager::with_config(config),
            Err(TaskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_main_thread_task_runs_inline_on_main() {
        let manager = single_worker();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_clone = ran_on.clone();
        let progress = manager.run_main_thread_task(
            move |_| *ran_clone.lock() = Some(thread::current().id()),
            true,
        );

        assert!(progress.is_none());
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
        assert_eq!(manager.main_queue().size(), 0);
    }

    #[test]
    fn test_main_thread_task_from_worker_waits_for_drain() {
        let manager = Arc::new(single_worker());
        let ran_on = Arc::new(Mutex::new(None));

        let submitter = {
            let manager = manager.clone();
            let ran_on = ran_on.clone();
            thread::spawn(move || {
                manager.run_main_thread_task(
                    move |_| *ran_on.lock() = Some(thread::current().id()),
                    true,
                )
            })
        };

        while !submitter.is_finished() {
            manager.do_main_thread_tasks();
            thread::sleep(Duration::from_millis(1));
        }

        assert!(submitter.join().unwrap().is_none());
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_drain_off_main_thread_panics() {
        let manager = Arc::new(single_worker());
        let drainer = manager.clone();
        let result = thread::spawn(move || drainer.do_main_thread_tasks()).join();
        assert!(result.is_err());
        assert_eq!(manager.do_main_thread_tasks(), 0);
    }

    #[test]
    fn test_main_thread_task_without_wait_returns_progress() {
        let manager = Arc::new(single_worker());
        let progress = {
            let manager = manager.clone();
            thread::spawn(move || manager.run_main_thread_task(|p| p.set_progress(1.0), false))
                .join()
                .unwrap()
                .unwrap()
        };

        assert!(!progress.is_completed());
        assert_eq!(manager.do_main_thread_tasks(), 1);
        assert_eq!(progress.outcome(), Some(TaskOutcome::Completed));
        assert_eq!(progress.progress(), 1.0);
    }

    #[test]
    fn test_background_task_runs_on_worker() {
        let manager = single_worker();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_clone = ran_on.clone();
        let progress = manager.run_background_task(
            move |_| *ran_clone.lock() = thread::current().name().map(str::to_owned),
            0,
            None,
        );
        progress.wait_for_completion();
        assert_eq!(ran_on.lock().as_deref(), Some("Bg"));

        let ran_clone = ran_on.clone();
        let progress = manager.run_background_task(
            move |_| *ran_clone.lock() = thread::current().name().map(str::to_owned),
            0,
            Some("Io"),
        );
        progress.wait_for_completion();
        assert_eq!(ran_on.lock().as_deref(), Some("Io"));
    }

    #[test]
    fn test_empty_name_selects_background() {
        let manager = single_worker();
        let progress = manager.run_background_task(|_| {}, 0, Some(""));
        assert_eq!(progress.wait_for_completion(), TaskOutcome::Completed);
    }

    #[test]
    fn test_unknown_queue_is_an_error() {
        let manager = single_worker();
        let err = manager
            .try_run_background_task(|_| {}, 0, Some("Physics"))
            .unwrap_err();
        assert_eq!(err, TaskError::UnknownQueue("Physics".into()));
    }

    #[test]
    #[should_panic(expected = "Unknown task queue 'Physics'")]
    fn test_unknown_queue_is_fatal() {
        let manager = single_worker();
        manager.run_background_task(|_| {}, 0, Some("Physics"));
    }

    #[test]
    fn test_run_task_by_thread_id() {
        let manager = single_worker();
        let io = manager.worker_thread_id("Io").unwrap();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_clone = ran_on.clone();
        let progress = manager.run_task(
            move |_| *ran_clone.lock() = Some(thread::current().id()),
            io,
            true,
        );
        assert!(progress.is_none());
        assert_eq!(*ran_on.lock(), Some(io));
    }

    #[test]
    fn test_run_task_on_main_without_wait_is_queued() {
        let manager = single_worker();
        let progress = manager
            .run_task(|_| {}, manager.main_thread_id(), false)
            .unwrap();

        assert_eq!(manager.main_queue().size(), 1);
        assert_eq!(manager.do_main_thread_tasks(), 1);
        assert!(progress.is_completed());
    }

    #[test]
    fn test_run_task_waiting_on_own_thread_runs_inline() {
        let manager = single_worker();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        let result = manager.run_task(
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
            manager.main_thread_id(),
            true,
        );

        assert!(result.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_thread_is_an_error() {
        let manager = single_worker();
        let stranger = thread::spawn(|| thread::current().id()).join().unwrap();
        let err = manager.try_run_task(|_| {}, stranger, false).unwrap_err();
        assert_eq!(err, TaskError::UnknownThread(stranger));
    }

    #[test]
    fn test_spawn_background_result() {
        let manager = single_worker();
        let handle = manager.spawn_background(
            |p| {
                p.set_status("summing");
                (1..=10).sum::<u32>()
            },
            0,
        );
        assert_eq!(handle.wait(), Some(55));
    }

    #[test]
    fn test_snapshot_lists_queues_and_workers() {
        let manager = single_worker();
        let snapshot = manager.snapshot();

        let names: Vec<_> = snapshot.queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, [MAIN_QUEUE, BACKGROUND_QUEUE, "Io"]);
        assert_eq!(snapshot.queue(BACKGROUND_QUEUE).unwrap().workers, ["Bg"]);
        assert_eq!(snapshot.queue("Io").unwrap().workers, ["Io"]);
        assert!(snapshot.queue(MAIN_QUEUE).unwrap().workers.is_empty());
    }

    #[test]
    fn test_shutdown_joins_and_cancels_main_leftovers() {
        let manager = Arc::new(single_worker());
        let progress = {
            let manager = manager.clone();
            thread::spawn(move || manager.run_main_thread_task(|_| {}, false))
                .join()
                .unwrap()
                .unwrap()
        };

        manager.shutdown();
        assert!(manager.is_shut_down());
        assert_eq!(progress.outcome(), Some(TaskOutcome::Cancelled));
        for name in ["Bg", "Io"] {
            assert!(!manager.worker(name).unwrap().is_running());
        }

        let err = manager.try_run_background_task(|_| {}, 0, None).unwrap_err();
        assert_eq!(err, TaskError::ShutDown(BACKGROUND_QUEUE.into()));

        manager.shutdown();
    }
}

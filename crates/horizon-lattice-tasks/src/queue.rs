//! Thread-safe priority queue of pending tasks.
//!
//! A [`TaskQueue`] is shared between any number of producers and the worker
//! threads bound to it. Entries are ordered by priority (higher first) and by
//! submission order among equal priorities. The queue lock is released before
//! a task body runs, so long tasks never block producers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::config::QueuePolicy;
use crate::error::{Result, TaskError};
use crate::logging::targets::QUEUE as TARGET;
use crate::progress::{TaskFn, TaskOutcome, TaskProgress};
use crate::sync::{Condition, Mutex};

/// A task waiting in a queue.
struct QueuedTask {
    priority: u32,
    sequence: u64,
    task: TaskFn,
    progress: TaskProgress,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on priority; earlier submissions win ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState {
    tasks: BinaryHeap<QueuedTask>,
    next_sequence: u64,
    closed: bool,
}

/// A prioritized queue of tasks guarded by its own lock.
pub struct TaskQueue {
    name: String,
    policy: QueuePolicy,
    state: Mutex<QueueState>,
    /// Triggered on push and on shutdown.
    task_available: Condition,
    /// Triggered on pop and on shutdown. Only waited on by `Block` producers.
    space_available: Condition,
}

impl TaskQueue {
    /// Create an unbounded queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, QueuePolicy::Unbounded)
    }

    /// Create a queue with the given capacity policy.
    pub fn with_policy(name: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: Mutex::new(QueueState {
                tasks: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            task_available: Condition::new(),
            space_available: Condition::new(),
        }
    }

    /// The name used for this queue in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The capacity policy of this queue.
    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Push a task and wake one waiting consumer.
    ///
    /// Never blocks for an unbounded queue. A full `Block` queue waits for
    /// space; a full `Reject` queue fails with [`TaskError::QueueFull`]. When
    /// the push fails, `progress` is finished as [`TaskOutcome::Cancelled`].
    pub fn push_task<F>(&self, task: F, progress: TaskProgress, priority: u32) -> Result<()>
    where
        F: FnOnce(&TaskProgress) + Send + 'static,
    {
        self.push_boxed(Box::new(task), progress, priority)
    }

    pub(crate) fn push_boxed(
        &self,
        task: TaskFn,
        progress: TaskProgress,
        priority: u32,
    ) -> Result<()> {
        let mut state = self.state.lock();

        match self.policy {
            QueuePolicy::Unbounded => {}
            QueuePolicy::Reject { capacity } => {
                if !state.closed && state.tasks.len() >= capacity {
                    drop(state);
                    tracing::debug!(target: TARGET, queue = %self.name, capacity, "rejecting task, queue full");
                    progress.finish(TaskOutcome::Cancelled);
                    return Err(TaskError::QueueFull {
                        queue: self.name.clone(),
                        capacity,
                    });
                }
            }
            QueuePolicy::Block { capacity } => {
                self.space_available.wait_while(&mut state, |state| {
                    !state.closed && state.tasks.len() >= capacity
                });
            }
        }

        if state.closed {
            drop(state);
            progress.finish(TaskOutcome::Cancelled);
            return Err(TaskError::ShutDown(self.name.clone()));
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.tasks.push(QueuedTask {
            priority,
            sequence,
            task,
            progress,
        });
        let pending = state.tasks.len();
        drop(state);

        tracing::trace!(target: TARGET, queue = %self.name, priority, pending, "task pushed");
        self.task_available.trigger();
        Ok(())
    }

    /// Pop the highest-priority task and run it on the calling thread.
    ///
    /// Returns `None` without blocking if the queue is empty.
    pub fn do_task(&self) -> Option<TaskOutcome> {
        let entry = {
            let mut state = self.state.lock();
            state.tasks.pop()?
        };

        if !matches!(self.policy, QueuePolicy::Unbounded) {
            self.space_available.trigger();
        }

        tracing::trace!(target: TARGET, queue = %self.name, priority = entry.priority, "running task");
        Some(entry.progress.run(entry.task))
    }

    /// Block until the queue has a task or has been shut down.
    ///
    /// Returns `true` if a task is available, `false` once the queue is
    /// shut down and empty.
    pub fn wait_for_tasks(&self) -> bool {
        let mut state = self.state.lock();
        self.task_available
            .wait_while(&mut state, |state| state.tasks.is_empty() && !state.closed);
        !state.tasks.is_empty()
    }

    /// Like [`wait_for_tasks`](Self::wait_for_tasks) but gives up after `timeout`.
    pub fn wait_for_tasks_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        self.task_available.wait_while_for(&mut state, timeout, |state| {
            state.tasks.is_empty() && !state.closed
        });
        !state.tasks.is_empty()
    }

    /// Check whether any task is pending.
    pub fn has_tasks(&self) -> bool {
        !self.state.lock().tasks.is_empty()
    }

    /// Number of pending tasks.
    pub fn size(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Stop accepting tasks and wake every blocked consumer and producer.
    ///
    /// Tasks already queued stay queued; consumers keep draining them.
    pub fn shutdown(&self) {
        let was_closed = std::mem::replace(&mut self.state.lock().closed, true);
        if !was_closed {
            tracing::debug!(target: TARGET, queue = %self.name, "queue shut down");
        }
        self.task_available.trigger_all();
        self.space_available.trigger_all();
    }

    /// Check whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().closed
    }

    /// Remove every pending task without running it.
    ///
    /// Each discarded task is finished as [`TaskOutcome::Cancelled`].
    /// Returns the number of discarded tasks.
    pub fn discard_pending(&self) -> usize {
        let discarded: Vec<QueuedTask> = {
            let mut state = self.state.lock();
            state.tasks.drain().collect()
        };
        self.space_available.trigger_all();

        let count = discarded.len();
        for entry in discarded {
            entry.progress.finish(TaskOutcome::Cancelled);
        }
        if count > 0 {
            tracing::debug!(target: TARGET, queue = %self.name, count, "discarded pending tasks");
        }
        count
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        for entry in self.state.get_mut().tasks.drain() {
            entry.progress.finish(TaskOutcome::Cancelled);
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("pending", &state.tasks.len())
            .field("closed", &state.closed)
            .finish()
    }
}

static_assertions::assert_impl_all!(TaskQueue: Send, Sync);

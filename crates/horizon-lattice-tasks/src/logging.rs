//! Logging and debugging facilities for the task scheduler.
//!
//! The scheduler is instrumented with the `tracing` crate. To see its logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_lattice_tasks=debug")
//!     .init();
//! ```
//!
//! Use [`SchedulerSnapshot`] (from [`TaskManager::snapshot`](crate::TaskManager::snapshot))
//! to inspect queue depths and which workers serve which queue.

use std::fmt;

use crate::config::QueuePolicy;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Queue push/pop/shutdown.
    pub const QUEUE: &str = "horizon_lattice_tasks::queue";
    /// Worker thread lifecycle.
    pub const THREAD: &str = "horizon_lattice_tasks::thread";
    /// Routing, main-thread draining and teardown.
    pub const MANAGER: &str = "horizon_lattice_tasks::manager";
    /// Progress lifecycle problems.
    pub const PROGRESS: &str = "horizon_lattice_tasks::progress";
    /// Timing spans.
    pub const PERF: &str = "horizon_lattice_tasks::perf";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations, such as one
/// main-thread drain.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Point-in-time state of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Queue name.
    pub name: String,
    /// Tasks waiting to run.
    pub pending: usize,
    /// Capacity policy.
    pub policy: QueuePolicy,
    /// Whether the queue has been shut down.
    pub shut_down: bool,
    /// Worker threads serving this queue. Empty for the main queue.
    pub workers: Vec<String>,
}

/// Point-in-time state of every queue owned by a task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Queues in a stable order: main, background, then private queues.
    pub queues: Vec<QueueSnapshot>,
}

impl SchedulerSnapshot {
    /// Total number of pending tasks across all queues.
    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|q| q.pending).sum()
    }

    /// Look up a queue by name.
    pub fn queue(&self, name: &str) -> Option<&QueueSnapshot> {
        self.queues.iter().find(|q| q.name == name)
    }
}

impl fmt::Display for SchedulerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Task Scheduler ({} pending)", self.total_pending())?;

        for (i, queue) in self.queues.iter().enumerate() {
            let last_queue = i + 1 == self.queues.len();
            let (branch, indent) = if last_queue {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };

            write!(f, "{branch}{} [{} pending", queue.name, queue.pending)?;
            if let Some(capacity) = queue.policy.capacity() {
                write!(f, ", capacity {capacity}")?;
            }
            if queue.shut_down {
                write!(f, ", shut down")?;
            }
            writeln!(f, "]")?;

            for (j, worker) in queue.workers.iter().enumerate() {
                let worker_branch = if j + 1 == queue.workers.len() {
                    "└── "
                } else {
                    "├── "
                };
                writeln!(f, "{indent}{worker_branch}{worker}")?;
            }
        }
        Ok(())
    }
}

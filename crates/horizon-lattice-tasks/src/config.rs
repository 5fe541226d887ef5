//! Configuration for the task manager and its queues.
//!
//! The default configuration reproduces the standard layout: four
//! background workers (`Worker1`..`Worker4`) sharing one queue, plus an
//! `Asset` worker with a private queue.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_tasks::{QueuePolicy, TaskManagerConfig};
//!
//! let config = TaskManagerConfig::builder()
//!     .worker("Worker1")
//!     .worker("Worker2")
//!     .private_worker("Io", QueuePolicy::Reject { capacity: 64 })
//!     .background_policy(QueuePolicy::Block { capacity: 1024 })
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

/// Names of the default background workers.
pub const DEFAULT_BACKGROUND_WORKERS: [&str; 4] = ["Worker1", "Worker2", "Worker3", "Worker4"];

/// Name of the default worker with its own queue.
pub const DEFAULT_ASSET_WORKER: &str = "Asset";

/// What a queue does when a producer pushes into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum QueuePolicy {
    /// Accept every task; the queue may grow without limit.
    #[default]
    Unbounded,
    /// Block the producer while the queue holds `capacity` tasks.
    Block { capacity: usize },
    /// Fail the push while the queue holds `capacity` tasks.
    Reject { capacity: usize },
}

impl QueuePolicy {
    /// The capacity limit, if any.
    pub fn capacity(&self) -> Option<usize> {
        match *self {
            Self::Unbounded => None,
            Self::Block { capacity } | Self::Reject { capacity } => Some(capacity),
        }
    }
}

/// A named worker thread to start with the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkerSpec {
    /// Thread name, also the key used to route tasks to this worker.
    pub name: String,
    /// `None` binds the worker to the shared background queue; `Some`
    /// gives it a private queue with the given policy.
    #[cfg_attr(feature = "serde", serde(default))]
    pub queue: Option<QueuePolicy>,
}

impl WorkerSpec {
    /// A worker serving the shared background queue.
    pub fn background(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: None,
        }
    }

    /// A worker with its own queue.
    pub fn private(name: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            name: name.into(),
            queue: Some(policy),
        }
    }

    /// Check whether this worker has its own queue.
    pub fn has_private_queue(&self) -> bool {
        self.queue.is_some()
    }
}

/// Configuration for a [`TaskManager`](crate::TaskManager).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TaskManagerConfig {
    /// Worker threads to start, in order.
    pub workers: Vec<WorkerSpec>,
    /// Policy of the shared background queue.
    pub background_policy: QueuePolicy,
    /// Stack size for worker threads in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        let mut workers: Vec<WorkerSpec> = DEFAULT_BACKGROUND_WORKERS
            .iter()
            .map(|name| WorkerSpec::background(*name))
            .collect();
        workers.push(WorkerSpec::private(DEFAULT_ASSET_WORKER, QueuePolicy::Unbounded));

        Self {
            workers,
            background_policy: QueuePolicy::Unbounded,
            stack_size: None,
        }
    }
}

impl TaskManagerConfig {
    /// Start building a configuration with no workers.
    pub fn builder() -> TaskManagerConfigBuilder {
        TaskManagerConfigBuilder::new()
    }

    /// Parse a configuration from TOML and validate it.
    ///
    /// ```toml
    /// stack_size = 4194304
    /// background_policy = { kind = "block", capacity = 512 }
    ///
    /// [[workers]]
    /// name = "Worker1"
    ///
    /// [[workers]]
    /// name = "Asset"
    /// queue = { kind = "unbounded" }
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| TaskError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.name.is_empty() {
                return Err(TaskError::invalid_config("worker names must not be empty"));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(TaskError::invalid_config(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
            if let Some(policy) = worker.queue {
                check_policy(&worker.name, policy)?;
            }
        }

        if !self.workers.iter().any(|w| !w.has_private_queue()) {
            return Err(TaskError::invalid_config(
                "at least one worker must serve the background queue",
            ));
        }

        check_policy("background", self.background_policy)
    }

    /// Number of workers serving the shared background queue.
    pub fn background_worker_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.has_private_queue()).count()
    }
}

fn check_policy(queue: &str, policy: QueuePolicy) -> Result<()> {
    if policy.capacity() == Some(0) {
        return Err(TaskError::invalid_config(format!(
            "queue '{queue}' has zero capacity"
        )));
    }
    Ok(())
}

/// Builder for [`TaskManagerConfig`].
#[derive(Debug, Clone)]
pub struct TaskManagerConfigBuilder {
    config: TaskManagerConfig,
}

impl TaskManagerConfigBuilder {
    /// Create a builder with no workers and an unbounded background queue.
    pub fn new() -> Self {
        Self {
            config: TaskManagerConfig {
                workers: Vec::new(),
                background_policy: QueuePolicy::Unbounded,
                stack_size: None,
            },
        }
    }

    /// Add a worker serving the shared background queue.
    pub fn worker(mut self, name: impl Into<String>) -> Self {
        self.config.workers.push(WorkerSpec::background(name));
        self
    }

    /// Add a worker with its own queue.
    pub fn private_worker(mut self, name: impl Into<String>, policy: QueuePolicy) -> Self {
        self.config.workers.push(WorkerSpec::private(name, policy));
        self
    }

    /// Set the policy of the shared background queue.
    pub fn background_policy(mut self, policy: QueuePolicy) -> Self {
        self.config.background_policy = policy;
        self
    }

    /// Set the stack size for worker threads.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Finish building.
    pub fn build(self) -> TaskManagerConfig {
        self.config
    }
}

impl Default for TaskManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

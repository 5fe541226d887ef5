//! Error types for the task scheduler.

use std::thread::ThreadId;

/// A specialized Result type for task scheduler operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors reported by the fallible scheduler entry points.
///
/// The infallible variants (`run_background_task`, `run_task`, ...) treat
/// these as contract violations and panic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// No worker thread with this name was registered at startup.
    #[error("Unknown task queue '{0}'")]
    UnknownQueue(String),

    /// The thread id matches neither the main thread nor any worker.
    #[error("No task queue is bound to thread {0:?}")]
    UnknownThread(ThreadId),

    /// A bounded queue with the `Reject` policy is at capacity.
    #[error("Task queue '{queue}' is full (capacity {capacity})")]
    QueueFull { queue: String, capacity: usize },

    /// The queue or manager has been shut down and accepts no new tasks.
    #[error("Task queue '{0}' has been shut down")]
    ShutDown(String),

    /// The operating system refused to start a worker thread.
    #[error("Failed to spawn worker thread '{name}': {message}")]
    SpawnFailed { name: String, message: String },

    /// The manager configuration is inconsistent.
    #[error("Invalid task manager configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// Create a spawn error from an I/O error returned by the thread builder.
    pub fn spawn_failed(name: impl Into<String>, source: &std::io::Error) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            message: source.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns `true` if retrying the same call later could succeed.
    ///
    /// Only backpressure is transient; everything else is a programming error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}

//! Task scheduling for Horizon Lattice.
//!
//! This crate provides the worker-thread scheduler that asset loading,
//! importers and other long-running jobs submit their work to:
//!
//! - **Task Manager**: Owns the built-in queues and named workers, and routes
//!   submissions by worker name, by thread id, or to the background pool
//! - **Task Queue**: Thread-safe priority queue with optional backpressure
//! - **Task Thread**: Dedicated OS thread draining one (possibly shared) queue
//! - **Task Progress**: One-shot completion handle with progress and status
//! - **Main Queue**: Work handed back to the application's own loop
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_lattice_tasks::{TaskManager, TaskOutcome};
//!
//! let manager = Arc::new(TaskManager::new().unwrap());
//!
//! // A background job that hands its result back to the main thread.
//! let handoff = manager.clone();
//! let background = manager.run_background_task(
//!     move |progress| {
//!         progress.set_status("decoding texture");
//!         let pixels = vec![0u8; 64];
//!         progress.set_progress(1.0);
//!
//!         handoff.run_main_thread_task(
//!             move |_| println!("uploading {} bytes", pixels.len()),
//!             false,
//!         );
//!     },
//!     5,
//!     None,
//! );
//!
//! assert_eq!(background.wait_for_completion(), TaskOutcome::Completed);
//!
//! // Once per iteration of the application loop:
//! assert_eq!(manager.do_main_thread_tasks(), 1);
//! ```

mod config;
mod error;
mod handle;
pub mod logging;
mod manager;
mod progress;
mod queue;
pub mod sync;
mod thread;
pub mod thread_check;

pub use config::{
    DEFAULT_ASSET_WORKER, DEFAULT_BACKGROUND_WORKERS, QueuePolicy, TaskManagerConfig,
    TaskManagerConfigBuilder, WorkerSpec,
};
pub use error::{Result, TaskError};
pub use handle::TaskHandle;
pub use logging::{PerfSpan, QueueSnapshot, SchedulerSnapshot};
pub use manager::{BACKGROUND_QUEUE, MAIN_QUEUE, TaskManager};
pub use progress::{TaskFn, TaskOutcome, TaskProgress};
pub use queue::TaskQueue;
pub use thread::TaskThread;

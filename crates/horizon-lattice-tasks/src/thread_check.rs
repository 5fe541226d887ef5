//! Thread affinity and contract-violation reporting.
//!
//! The task manager records the thread that created it as the main thread.
//! [`ThreadAffinity`] captures that identity so later calls can tell whether
//! they run on it. Routing errors that indicate a programming mistake, such
//! as naming a worker that was never registered, are reported through
//! [`contract_violation`], which panics with a detailed message.

use std::thread::ThreadId;

use crate::error::TaskError;
use crate::logging::targets::MANAGER;

/// Records the thread an object is bound to.
///
/// # Example
///
/// ```
/// use horizon_lattice_tasks::thread_check::ThreadAffinity;
///
/// let affinity = ThreadAffinity::current();
/// assert!(affinity.is_same_thread());
///
/// std::thread::spawn(move || {
///     assert!(!affinity.is_same_thread());
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the calling thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Debug-only assertion that we are on the bound thread.
    #[inline]
    #[track_caller]
    pub fn debug_assert_same_thread(&self, msg: &str) {
        if cfg!(debug_assertions) && !self.is_same_thread() {
            self.panic_wrong_thread(msg);
        }
    }

    #[cold]
    #[inline(never)]
    #[track_caller]
    fn panic_wrong_thread(&self, msg: &str) -> ! {
        let current = std::thread::current();
        panic!(
            "{msg}: called from thread \"{}\" ({:?}), expected {:?}",
            current.name().unwrap_or("<unnamed>"),
            current.id(),
            self.thread_id
        );
    }
}

/// Abort the current operation because a caller broke the scheduler contract.
///
/// The panic location is the caller of the public API, not this function.
#[cold]
#[inline(never)]
#[track_caller]
#[doc(hidden)]
pub fn contract_violation(err: TaskError) -> ! {
    let current = std::thread::current();
    let current_name = current.name().unwrap_or("<unnamed>");
    let location = std::panic::Location::caller();

    tracing::error!(
        target: MANAGER,
        error = %err,
        %location,
        "task scheduler contract violation"
    );

    panic!(
        "\n\
        ══════════════════════════════════════════════════════════════════════\n\
        TASK SCHEDULER CONTRACT VIOLATION\n\
        ══════════════════════════════════════════════════════════════════════\n\
        \n\
        {err}\n\
        \n\
        Location: {location}\n\
        Current thread: \"{current_name}\" (ID: {:?})\n\
        \n\
        Tasks may only be routed to queues and threads registered when the\n\
        TaskManager was created. Use the try_* variants to handle this case\n\
        as an error instead.\n\
        ══════════════════════════════════════════════════════════════════════",
        current.id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_affinity_current() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        assert_eq!(affinity.thread_id(), thread::current().id());
        affinity.debug_assert_same_thread("same thread");
    }

    #[test]
    fn test_affinity_other_thread() {
        let affinity = ThreadAffinity::current();
        let same = thread::spawn(move || affinity.is_same_thread())
            .join()
            .unwrap();
        assert!(!same);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_debug_assert_wrong_thread() {
        let affinity = ThreadAffinity::current();
        let result = thread::spawn(move || affinity.debug_assert_same_thread("drain")).join();
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "Unknown task queue 'Physics'")]
    fn test_contract_violation_message() {
        contract_violation(TaskError::UnknownQueue("Physics".into()));
    }
}

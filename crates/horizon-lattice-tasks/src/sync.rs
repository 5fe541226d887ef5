//! Locking and wait/notify primitives used by the scheduler.
//!
//! Locks come straight from `parking_lot`: a [`Mutex`] is acquired with
//! `lock()` (blocking) or `try_lock()` (non-blocking) and released when its
//! guard goes out of scope, which covers early returns and unwinding. Use a
//! [`ReentrantMutex`] when the same thread must be able to re-acquire a lock
//! it already holds.
//!
//! [`Condition`] is the wait/trigger half. It is always used together with a
//! guarded predicate so that a trigger delivered before the waiter arrives is
//! never lost:
//!
//! ```
//! use horizon_lattice_tasks::sync::{Condition, Mutex};
//!
//! let ready = Mutex::new(false);
//! let condition = Condition::new();
//!
//! *ready.lock() = true;
//! condition.trigger_all();
//!
//! // Returns immediately, the predicate is already satisfied.
//! let mut guard = ready.lock();
//! condition.wait_while(&mut guard, |ready| !*ready);
//! ```

use std::time::{Duration, Instant};

use parking_lot::Condvar;
pub use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};

/// A wait/trigger primitive bound to a [`Mutex`]-protected state.
///
/// `trigger` wakes one waiter, `trigger_all` wakes every waiter. No ordering
/// among waiters is guaranteed. Waits may wake spuriously, so callers should
/// prefer the predicate-based [`wait_while`](Self::wait_while).
#[derive(Debug, Default)]
pub struct Condition {
    condvar: Condvar,
}

impl Condition {
    /// Create a new condition with no waiters.
    pub const fn new() -> Self {
        Self {
            condvar: Condvar::new(),
        }
    }

    /// Block until triggered, atomically releasing the guarded lock while asleep.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.condvar.wait(guard);
    }

    /// Block while `condition` holds for the guarded state.
    pub fn wait_while<T, F>(&self, guard: &mut MutexGuard<'_, T>, mut condition: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.condvar.wait(guard);
        }
    }

    /// Like [`wait_while`](Self::wait_while) but gives up after `timeout`.
    ///
    /// Returns `true` if the predicate was cleared, `false` on timeout.
    pub fn wait_while_for<T, F>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
        mut condition: F,
    ) -> bool
    where
        F: FnMut(&mut T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while condition(&mut **guard) {
            if self.condvar.wait_until(guard, deadline).timed_out() {
                return !condition(&mut **guard);
            }
        }
        true
    }

    /// Wake one blocked waiter, if any.
    pub fn trigger(&self) -> bool {
        self.condvar.notify_one()
    }

    /// Wake all blocked waiters. Returns how many were woken.
    pub fn trigger_all(&self) -> usize {
        self.condvar.notify_all()
    }
}

static_assertions::assert_impl_all!(Condition: Send, Sync);

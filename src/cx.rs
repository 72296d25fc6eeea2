//! The per-task context type.
//!
//! `Cx` is the token a task hands to every acquire operation. It carries:
//! - the task's identity (for logs)
//! - the cancellation signal
//! - the wakers of acquires currently parked on this task's behalf
//!
//! # Cancellation
//!
//! Cancellation is cooperative. [`Cx::cancel`] raises the flag and wakes every
//! pending acquire registered on the context; each of them then observes the
//! flag through [`Cx::checkpoint`] and resolves to a `Cancelled` error without
//! taking a permit.
//!
//! # Cloning
//!
//! `Cx` is cheaply clonable (it wraps an `Arc`). Clones share the same state,
//! so a clone moved to another thread can cancel waits made through any other clone.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Waker;

use crate::error::Cancelled;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the task a [`Cx`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug)]
struct CxInner {
    task: TaskId,
    cancel_requested: bool,
    mask_depth: u32,
    cancel_wakers: SmallVec<[(u64, Waker); 2]>,
    next_waker_key: u64,
}

/// The capability context for a task.
///
/// # Example
///
/// ```
/// use accessgate::Cx;
///
/// let cx = Cx::new();
/// assert!(cx.checkpoint().is_ok());
///
/// cx.cancel();
/// assert!(cx.checkpoint().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Cx {
    inner: Arc<Mutex<CxInner>>,
}

impl Cx {
    /// Creates a context for a fresh task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CxInner {
                task: TaskId::next(),
                cancel_requested: false,
                mask_depth: 0,
                cancel_wakers: SmallVec::new(),
                next_waker_key: 0,
            })),
        }
    }

    /// Creates a context for tests.
    ///
    /// Identical to [`Cx::new`]; the separate name keeps test call sites
    /// greppable.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new()
    }

    /// Returns the task this context belongs to.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.inner.lock().task
    }

    /// Returns true if cancellation has been requested.
    ///
    /// Unlike [`checkpoint`](Self::checkpoint) this ignores masking.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.lock().cancel_requested
    }

    /// Checks for cancellation and returns an error if cancelled.
    ///
    /// Returns `Ok(())` while masked, even when cancellation is pending.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if cancellation is pending and the context is
    /// not masked.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        let inner = self.inner.lock();
        if inner.cancel_requested && inner.mask_depth == 0 {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Executes a closure with cancellation masked.
    ///
    /// Masking nests; cancellation becomes observable again once the
    /// outermost mask is released. An acquire started inside the mask waits
    /// for its permit even if the task is cancelled meanwhile.
    pub fn masked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.inner.lock().mask_depth += 1;

        let result = f();

        let mut inner = self.inner.lock();
        inner.mask_depth = inner.mask_depth.saturating_sub(1);
        drop(inner);

        result
    }

    /// Requests cancellation and wakes every acquire parked on this context.
    pub fn cancel(&self) {
        self.set_cancel_requested(true);
    }

    /// Sets or clears the cancellation flag.
    ///
    /// Setting the flag wakes registered acquires so they can observe it.
    pub fn set_cancel_requested(&self, value: bool) {
        let wakers: SmallVec<[Waker; 2]> = {
            let mut inner = self.inner.lock();
            inner.cancel_requested = value;
            if value {
                inner.cancel_wakers.iter().map(|(_, w)| w.clone()).collect()
            } else {
                SmallVec::new()
            }
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Registers (or refreshes) the waker to fire on cancellation.
    ///
    /// `slot` holds the registration key between calls.
    pub(crate) fn register_cancel_waker(&self, slot: &mut Option<u64>, waker: &Waker) {
        let mut inner = self.inner.lock();
        if let Some(key) = *slot {
            if let Some((_, existing)) = inner.cancel_wakers.iter_mut().find(|(k, _)| *k == key) {
                if !existing.will_wake(waker) {
                    existing.clone_from(waker);
                }
                return;
            }
        }
        let key = inner.next_waker_key;
        inner.next_waker_key += 1;
        inner.cancel_wakers.push((key, waker.clone()));
        *slot = Some(key);
    }

    /// Drops a registration made by [`register_cancel_waker`](Self::register_cancel_waker).
    pub(crate) fn deregister_cancel_waker(&self, slot: &mut Option<u64>) {
        if let Some(key) = slot.take() {
            self.inner.lock().cancel_wakers.retain(|(k, _)| *k != key);
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_cancel_wakers(&self) -> usize {
        self.inner.lock().cancel_wakers.len()
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn checkpoint_without_cancel() {
        let cx = Cx::for_testing();
        assert!(cx.checkpoint().is_ok());
    }

    #[test]
    fn checkpoint_with_cancel() {
        let cx = Cx::for_testing();
        cx.cancel();
        assert!(cx.is_cancel_requested());
        assert_eq!(cx.checkpoint(), Err(Cancelled));
    }

    #[test]
    fn masked_defers_cancel() {
        let cx = Cx::for_testing();
        cx.set_cancel_requested(true);

        cx.masked(|| {
            assert!(
                cx.checkpoint().is_ok(),
                "checkpoint should succeed when masked"
            );
            cx.masked(|| assert!(cx.checkpoint().is_ok()));
            assert!(cx.checkpoint().is_ok(), "still masked by outer scope");
        });

        assert!(
            cx.checkpoint().is_err(),
            "checkpoint should fail after unmasking"
        );
    }

    #[test]
    fn clones_share_cancellation() {
        let cx = Cx::for_testing();
        let clone = cx.clone();
        assert_eq!(cx.task_id(), clone.task_id());

        clone.cancel();
        assert!(cx.is_cancel_requested());
    }

    #[test]
    fn distinct_contexts_get_distinct_task_ids() {
        let a = Cx::new();
        let b = Cx::new();
        assert_ne!(a.task_id(), b.task_id());
        assert!(a.task_id().to_string().starts_with("task-"));
    }

    #[test]
    fn cancel_wakes_registered_wakers_once_each() {
        let cx = Cx::for_testing();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));

        let mut slot = None;
        cx.register_cancel_waker(&mut slot, &waker);
        // Refreshing with the same waker must not add a second entry.
        cx.register_cancel_waker(&mut slot, &waker);
        assert_eq!(cx.registered_cancel_wakers(), 1);

        cx.cancel();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        cx.deregister_cancel_waker(&mut slot);
        assert!(slot.is_none());
        assert_eq!(cx.registered_cancel_wakers(), 0);
    }

    #[test]
    fn clearing_the_flag_does_not_wake() {
        let cx = Cx::for_testing();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));

        let mut slot = None;
        cx.register_cancel_waker(&mut slot, &waker);
        cx.set_cancel_requested(false);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        cx.deregister_cancel_waker(&mut slot);
    }
}

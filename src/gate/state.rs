//! Gate bookkeeping: holders, wait queues and the wake fan-out policy.
//!
//! Everything here runs under the gate's mutex. Functions that decide who to
//! wake return the wakers instead of invoking them, so callers can fire them
//! after the lock is dropped.

use smallvec::SmallVec;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::task::Waker;

use super::permit::{PermitId, PermitKind};
use crate::error::TryAcquireError;

/// Wakers collected under the lock, fired after it is released.
pub(super) type WakeBatch = SmallVec<[Waker; 4]>;

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

#[derive(Debug, Default)]
pub(super) struct GateState {
    readers: HashSet<PermitId>,
    writer: Option<PermitId>,
    reader_waiters: VecDeque<Waiter>,
    writer_waiters: VecDeque<Waiter>,
    next_permit_id: u64,
    next_waiter_id: u64,
}

impl GateState {
    pub(super) fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub(super) fn writer(&self) -> Option<PermitId> {
        self.writer
    }

    pub(super) fn holds(&self, kind: PermitKind, id: PermitId) -> bool {
        match kind {
            PermitKind::Read => self.readers.contains(&id),
            PermitKind::Write => self.writer == Some(id),
        }
    }

    fn is_idle(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    fn check(&self, kind: PermitKind, max_readers: usize) -> Result<(), TryAcquireError> {
        if self.writer.is_some() {
            return Err(TryAcquireError::WriterActive);
        }
        match kind {
            PermitKind::Read if self.readers.len() >= max_readers => {
                Err(TryAcquireError::ReadersAtCapacity)
            }
            PermitKind::Write if !self.readers.is_empty() => Err(TryAcquireError::ReadersActive),
            _ => Ok(()),
        }
    }

    /// Grants a permit of `kind` if the gate allows it right now.
    pub(super) fn try_admit(
        &mut self,
        kind: PermitKind,
        max_readers: usize,
    ) -> Result<PermitId, TryAcquireError> {
        self.check(kind, max_readers)?;

        let id = PermitId(self.next_permit_id);
        self.next_permit_id += 1;
        match kind {
            PermitKind::Read => {
                self.readers.insert(id);
            }
            PermitKind::Write => self.writer = Some(id),
        }
        self.debug_check_invariants(max_readers);
        Ok(id)
    }

    /// Removes a holder and collects the wakers the release policy calls for.
    ///
    /// A read release wakes one waiting reader, plus one waiting writer if it
    /// was the last reader. A write release wakes one waiting writer and every
    /// waiting reader. Returns `None` if `id` was not a holder.
    pub(super) fn release(&mut self, kind: PermitKind, id: PermitId) -> Option<WakeBatch> {
        let mut batch = WakeBatch::new();
        match kind {
            PermitKind::Read => {
                if !self.readers.remove(&id) {
                    return None;
                }
                batch.extend(self.reader_waiters.pop_front().map(|w| w.waker));
                if self.readers.is_empty() {
                    batch.extend(self.writer_waiters.pop_front().map(|w| w.waker));
                }
            }
            PermitKind::Write => {
                if self.writer != Some(id) {
                    return None;
                }
                self.writer = None;
                batch.extend(self.writer_waiters.pop_front().map(|w| w.waker));
                batch.extend(self.reader_waiters.drain(..).map(|w| w.waker));
            }
        }
        Some(batch)
    }

    /// Queues (or refreshes) a pending acquire.
    ///
    /// `slot` carries the waiter id between polls. A waiter that was woken
    /// (and so dequeued) but still cannot proceed goes back to the front.
    pub(super) fn park(&mut self, kind: PermitKind, slot: &mut Option<u64>, waker: &Waker) {
        let queue = match kind {
            PermitKind::Read => &mut self.reader_waiters,
            PermitKind::Write => &mut self.writer_waiters,
        };

        if let Some(id) = *slot {
            if let Some(existing) = queue.iter_mut().find(|w| w.id == id) {
                if !existing.waker.will_wake(waker) {
                    existing.waker.clone_from(waker);
                }
                return;
            }
        }

        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let waiter = Waiter {
            waker: waker.clone(),
            id,
        };
        if slot.is_some() {
            queue.push_front(waiter);
        } else {
            queue.push_back(waiter);
        }
        *slot = Some(id);
    }

    /// Removes a queued waiter. Returns false if it had already been dequeued
    /// by a wake.
    pub(super) fn withdraw(&mut self, kind: PermitKind, id: u64) -> bool {
        let queue = match kind {
            PermitKind::Read => &mut self.reader_waiters,
            PermitKind::Write => &mut self.writer_waiters,
        };
        queue
            .iter()
            .position(|w| w.id == id)
            .and_then(|pos| queue.remove(pos))
            .is_some()
    }

    /// Passes on a wake consumed by a waiter that gave up before using it.
    pub(super) fn forward_wake(&mut self, max_readers: usize) -> WakeBatch {
        let mut batch = WakeBatch::new();
        if self.check(PermitKind::Read, max_readers).is_ok() {
            batch.extend(self.reader_waiters.pop_front().map(|w| w.waker));
        }
        if self.is_idle() {
            batch.extend(self.writer_waiters.pop_front().map(|w| w.waker));
        }
        batch
    }

    pub(super) fn snapshot(&self, max_readers: usize) -> GateSnapshot {
        let phase = match (self.writer, self.readers.len()) {
            (Some(_), _) => GatePhase::Writing,
            (None, 0) => GatePhase::Idle,
            (None, n) => GatePhase::Reading(n),
        };
        GateSnapshot {
            phase,
            max_readers,
            readers: self.readers.len(),
            writer: self.writer,
            waiting_readers: self.reader_waiters.len(),
            waiting_writers: self.writer_waiters.len(),
        }
    }

    #[inline]
    fn debug_check_invariants(&self, max_readers: usize) {
        debug_assert!(
            self.readers.len() <= max_readers,
            "reader cap exceeded: {} > {max_readers}",
            self.readers.len()
        );
        debug_assert!(
            self.writer.is_none() || self.readers.is_empty(),
            "writer admitted alongside {} readers",
            self.readers.len()
        );
    }
}

/// Coarse state of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// No permits held.
    Idle,
    /// `n` read permits held, `1 <= n <= max_readers`.
    Reading(usize),
    /// The write permit is held.
    Writing,
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reading(n) => write!(f, "reading({n})"),
            Self::Writing => write!(f, "writing"),
        }
    }
}

/// A consistent copy of a gate's state at one instant.
///
/// Waiter counts cover queued requests only; a request that has been woken
/// but has not yet re-checked the gate is not counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Coarse state.
    pub phase: GatePhase,
    /// The gate's reader cap.
    pub max_readers: usize,
    /// Read permits currently held.
    pub readers: usize,
    /// The current writer, if any.
    pub writer: Option<PermitId>,
    /// Queued read acquires.
    pub waiting_readers: usize,
    /// Queued write acquires.
    pub waiting_writers: usize,
}

//! Futures returned by the waiting acquire operations.
//!
//! Both futures share [`PendingAcquire`], which owns the waiter's queue slot
//! and its cancellation registration. Whatever way a future ends (granted,
//! cancelled or dropped mid-wait) the slot and registration are cleaned up,
//! and a wake consumed without being used is passed on.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use super::permit::{PermitId, PermitKind, ReadPermit, WritePermit};
use super::{AccessGate, wake_all};
use crate::cx::Cx;
use crate::error::AcquireError;
use crate::tracing_compat::{debug, trace};

struct PendingAcquire<'g, 'c> {
    gate: &'g AccessGate,
    cx: &'c Cx,
    kind: PermitKind,
    waiter_id: Option<u64>,
    cancel_key: Option<u64>,
}

impl<'g, 'c> PendingAcquire<'g, 'c> {
    fn new(gate: &'g AccessGate, cx: &'c Cx, kind: PermitKind) -> Self {
        Self {
            gate,
            cx,
            kind,
            waiter_id: None,
            cancel_key: None,
        }
    }

    fn poll_acquire(&mut self, waker: &Waker) -> Poll<Result<PermitId, AcquireError>> {
        if let Err(cancelled) = self.cx.checkpoint() {
            self.abandon();
            return Poll::Ready(Err(cancelled.into()));
        }

        let mut state = self.gate.state.lock();
        if let Ok(id) = state.try_admit(self.kind, self.gate.max_readers) {
            if let Some(waiter_id) = self.waiter_id.take() {
                state.withdraw(self.kind, waiter_id);
            }
            let readers = state.reader_count();
            drop(state);

            self.cx.deregister_cancel_waker(&mut self.cancel_key);
            trace!(
                gate = %self.gate.id(),
                task = %self.cx.task_id(),
                permit = %id,
                kind = %self.kind,
                readers,
                "permit granted after wait"
            );
            return Poll::Ready(Ok(id));
        }

        let first_wait = self.waiter_id.is_none();
        state.park(self.kind, &mut self.waiter_id, waker);
        drop(state);

        self.cx.register_cancel_waker(&mut self.cancel_key, waker);
        // A cancel that landed before the registration above woke nobody.
        if let Err(cancelled) = self.cx.checkpoint() {
            self.abandon();
            return Poll::Ready(Err(cancelled.into()));
        }

        if first_wait {
            debug!(
                gate = %self.gate.id(),
                task = %self.cx.task_id(),
                kind = %self.kind,
                "waiting for permit"
            );
        }
        Poll::Pending
    }

    /// Leaves the wait queue without a permit.
    fn abandon(&mut self) {
        self.cx.deregister_cancel_waker(&mut self.cancel_key);
        let Some(waiter_id) = self.waiter_id.take() else {
            return;
        };

        let forwarded = {
            let mut state = self.gate.state.lock();
            if state.withdraw(self.kind, waiter_id) {
                None
            } else {
                // Already dequeued: we were woken and are walking away from it.
                Some(state.forward_wake(self.gate.max_readers))
            }
        };

        debug!(
            gate = %self.gate.id(),
            task = %self.cx.task_id(),
            kind = %self.kind,
            forwarded = forwarded.as_ref().map_or(0, |b| b.len()),
            "abandoned wait"
        );
        if let Some(batch) = forwarded {
            wake_all(batch);
        }
    }
}

impl Drop for PendingAcquire<'_, '_> {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Future returned by [`AccessGate::acquire_read`].
///
/// Resolves to a [`ReadPermit`] once the gate has no writer and a free read
/// slot, or to [`AcquireError::Cancelled`] if the task's [`Cx`] is cancelled
/// first. Dropping it mid-wait withdraws the request.
#[must_use = "futures do nothing unless polled"]
pub struct ReadAcquire<'g, 'c> {
    pending: PendingAcquire<'g, 'c>,
}

impl<'g, 'c> ReadAcquire<'g, 'c> {
    pub(super) fn new(gate: &'g AccessGate, cx: &'c Cx) -> Self {
        Self {
            pending: PendingAcquire::new(gate, cx, PermitKind::Read),
        }
    }
}

impl<'g> Future for ReadAcquire<'g, '_> {
    type Output = Result<ReadPermit<'g>, AcquireError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let gate = self.pending.gate;
        self.pending
            .poll_acquire(context.waker())
            .map_ok(|id| ReadPermit::new(gate, id))
    }
}

/// Future returned by [`AccessGate::acquire_write`].
///
/// Resolves to a [`WritePermit`] once the gate is idle, or to
/// [`AcquireError::Cancelled`] if the task's [`Cx`] is cancelled first.
/// Dropping it mid-wait withdraws the request.
#[must_use = "futures do nothing unless polled"]
pub struct WriteAcquire<'g, 'c> {
    pending: PendingAcquire<'g, 'c>,
}

impl<'g, 'c> WriteAcquire<'g, 'c> {
    pub(super) fn new(gate: &'g AccessGate, cx: &'c Cx) -> Self {
        Self {
            pending: PendingAcquire::new(gate, cx, PermitKind::Write),
        }
    }
}

impl<'g> Future for WriteAcquire<'g, '_> {
    type Output = Result<WritePermit<'g>, AcquireError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let gate = self.pending.gate;
        self.pending
            .poll_acquire(context.waker())
            .map_ok(|id| WritePermit::new(gate, id))
    }
}

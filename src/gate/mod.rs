//! Bounded-reader / exclusive-writer access gate.
//!
//! The gate hands out two kinds of permit:
//!
//! | Permit | Granted when | Held by |
//! |--------|--------------|---------|
//! | read   | no writer and fewer than `max_readers` readers | up to `max_readers` tasks |
//! | write  | no writer and no readers | one task |
//!
//! Each kind can be acquired without waiting (`try_acquire_*`), by awaiting a
//! future (`acquire_*`), or by blocking the calling thread
//! (`acquire_*_blocking`). Releases never wait.
//!
//! # Wake policy
//!
//! Pending acquires sit in one FIFO queue per kind. Releases wake:
//!
//! - read release: one waiting reader, and one waiting writer if no readers remain
//! - write release: one waiting writer and every waiting reader
//!
//! Woken requests race to re-check the gate; losers go back to the head of
//! their queue. There is no writer preference, so overlapping readers can
//! keep a writer waiting forever.
//!
//! # Cancellation
//!
//! A waiting acquire whose [`Cx`] is cancelled resolves to
//! [`AcquireError::Cancelled`] without taking a permit.

mod acquire;
mod blocking;
mod permit;
mod state;

pub use acquire::{ReadAcquire, WriteAcquire};
pub use permit::{GateId, PermitId, PermitKind, ReadPermit, WritePermit};
pub use state::{GatePhase, GateSnapshot};

use parking_lot::Mutex as ParkingMutex;

use self::state::{GateState, WakeBatch};
use crate::config::GateConfig;
use crate::cx::Cx;
use crate::error::{AcquireError, ProtocolViolation, TryAcquireError};
use crate::tracing_compat::{debug, trace, warn};

fn wake_all(batch: WakeBatch) {
    for waker in batch {
        waker.wake();
    }
}

/// Coordinates bounded shared access and exclusive access to one resource.
///
/// The gate never touches the resource; it only decides who may.
#[derive(Debug)]
pub struct AccessGate {
    id: GateId,
    name: Option<String>,
    max_readers: usize,
    state: ParkingMutex<GateState>,
}

impl AccessGate {
    /// Creates an idle gate admitting at most `max_readers` concurrent readers.
    ///
    /// A gate with `max_readers == 0` never grants read permits.
    #[must_use]
    pub fn new(max_readers: usize) -> Self {
        let gate = Self {
            id: GateId::next(),
            name: None,
            max_readers,
            state: ParkingMutex::new(GateState::default()),
        };
        debug!(gate = %gate.id, max_readers, "gate created");
        gate
    }

    /// Creates a gate from validated configuration.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        let gate = Self::new(config.max_readers);
        match &config.name {
            Some(name) => gate.named(name.clone()),
            None => gate,
        }
    }

    /// Attaches a human-readable name, shown in `Debug` output.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The gate's process-unique id.
    #[must_use]
    pub fn id(&self) -> GateId {
        self.id
    }

    /// The gate's name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The reader cap fixed at construction.
    #[must_use]
    pub fn max_readers(&self) -> usize {
        self.max_readers
    }

    /// Number of read permits currently held.
    #[must_use]
    pub fn active_readers(&self) -> usize {
        self.state.lock().reader_count()
    }

    /// Returns true while a write permit is held.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer().is_some()
    }

    /// Returns a consistent copy of the gate's current state.
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        self.state.lock().snapshot(self.max_readers)
    }

    /// Returns true if `permit` was issued by this gate and is still held.
    #[must_use]
    pub fn holds_read(&self, permit: &ReadPermit<'_>) -> bool {
        permit.issued_by(self) && self.state.lock().holds(PermitKind::Read, permit.id())
    }

    /// Returns true if `permit` was issued by this gate and is still held.
    #[must_use]
    pub fn holds_write(&self, permit: &WritePermit<'_>) -> bool {
        permit.issued_by(self) && self.state.lock().holds(PermitKind::Write, permit.id())
    }

    /// Takes a read permit if one is available right now.
    ///
    /// # Errors
    ///
    /// [`TryAcquireError::WriterActive`] or
    /// [`TryAcquireError::ReadersAtCapacity`]; the gate is left untouched.
    pub fn try_acquire_read(&self) -> Result<ReadPermit<'_>, TryAcquireError> {
        let id = self.try_admit(PermitKind::Read)?;
        Ok(ReadPermit::new(self, id))
    }

    /// Takes the write permit if the gate is idle right now.
    ///
    /// # Errors
    ///
    /// [`TryAcquireError::WriterActive`] or [`TryAcquireError::ReadersActive`];
    /// the gate is left untouched.
    pub fn try_acquire_write(&self) -> Result<WritePermit<'_>, TryAcquireError> {
        let id = self.try_admit(PermitKind::Write)?;
        Ok(WritePermit::new(self, id))
    }

    /// Waits for a read permit.
    pub fn acquire_read<'g, 'c>(&'g self, cx: &'c Cx) -> ReadAcquire<'g, 'c> {
        ReadAcquire::new(self, cx)
    }

    /// Waits for the write permit.
    pub fn acquire_write<'g, 'c>(&'g self, cx: &'c Cx) -> WriteAcquire<'g, 'c> {
        WriteAcquire::new(self, cx)
    }

    /// Blocks the calling thread until a read permit is granted.
    ///
    /// # Errors
    ///
    /// [`AcquireError::Cancelled`] if `cx` is cancelled before the permit is
    /// granted.
    pub fn acquire_read_blocking(&self, cx: &Cx) -> Result<ReadPermit<'_>, AcquireError> {
        blocking::block_on(self.acquire_read(cx))
    }

    /// Blocks the calling thread until the write permit is granted.
    ///
    /// # Errors
    ///
    /// [`AcquireError::Cancelled`] if `cx` is cancelled before the permit is
    /// granted.
    pub fn acquire_write_blocking(&self, cx: &Cx) -> Result<WritePermit<'_>, AcquireError> {
        blocking::block_on(self.acquire_write(cx))
    }

    /// Releases a read permit.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation`] if the permit was issued by a different gate.
    /// Nothing changes on this gate, and the permit is handed back inside the
    /// error.
    pub fn release_read<'p>(
        &self,
        permit: ReadPermit<'p>,
    ) -> Result<(), ProtocolViolation<ReadPermit<'p>>> {
        if !permit.issued_by(self) {
            warn!(
                gate = %self.id,
                permit = %permit.id(),
                issuer = %permit.gate_id(),
                "illegal read release attempt"
            );
            let issuer = permit.gate_id();
            return Err(ProtocolViolation::new(
                PermitKind::Read,
                self.id,
                issuer,
                permit,
            ));
        }
        drop(permit);
        Ok(())
    }

    /// Releases the write permit.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation`] if the permit is not this gate's current writer.
    /// Nothing changes on this gate, and the permit is handed back inside the
    /// error.
    pub fn release_write<'p>(
        &self,
        permit: WritePermit<'p>,
    ) -> Result<(), ProtocolViolation<WritePermit<'p>>> {
        if !permit.issued_by(self) {
            warn!(
                gate = %self.id,
                permit = %permit.id(),
                issuer = %permit.gate_id(),
                "illegal write release attempt"
            );
            let issuer = permit.gate_id();
            return Err(ProtocolViolation::new(
                PermitKind::Write,
                self.id,
                issuer,
                permit,
            ));
        }
        drop(permit);
        Ok(())
    }

    fn try_admit(&self, kind: PermitKind) -> Result<PermitId, TryAcquireError> {
        let mut state = self.state.lock();
        let id = state.try_admit(kind, self.max_readers)?;
        let readers = state.reader_count();
        drop(state);
        trace!(gate = %self.id, permit = %id, kind = %kind, readers, "permit granted");
        Ok(id)
    }

    /// Frees the slot held by a permit and wakes whoever the policy names.
    fn release_slot(&self, kind: PermitKind, id: PermitId) {
        let (batch, readers) = {
            let mut state = self.state.lock();
            let batch = state.release(kind, id);
            (batch, state.reader_count())
        };
        debug_assert!(batch.is_some(), "{kind} {id} released but not held");
        if let Some(batch) = batch {
            trace!(
                gate = %self.id,
                permit = %id,
                kind = %kind,
                readers,
                woken = batch.len(),
                "permit released"
            );
            wake_all(batch);
        }
    }
}

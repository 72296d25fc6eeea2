//! Permit tokens and the identifiers stamped into them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::AccessGate;

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`AccessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GateId(u64);

impl GateId {
    pub(super) fn next() -> Self {
        Self(NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gate-{}", self.0)
    }
}

/// Identity of one granted permit, unique within its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermitId(pub(super) u64);

impl PermitId {
    /// Returns the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permit-{}", self.0)
    }
}

/// The two kinds of permit a gate hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermitKind {
    /// Shared, bounded by the gate's reader cap.
    Read,
    /// Exclusive against readers and other writers.
    Write,
}

impl fmt::Display for PermitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A held read permit.
///
/// Hand it to [`AccessGate::release_read`] (or call
/// [`release`](Self::release)) when done. Dropping it also releases the slot.
#[must_use = "the read slot is held until the permit is released"]
pub struct ReadPermit<'g> {
    gate: &'g AccessGate,
    id: PermitId,
}

impl<'g> ReadPermit<'g> {
    pub(super) fn new(gate: &'g AccessGate, id: PermitId) -> Self {
        Self { gate, id }
    }

    /// The slot this permit occupies.
    #[must_use]
    pub fn id(&self) -> PermitId {
        self.id
    }

    /// The gate that issued this permit.
    #[must_use]
    pub fn gate_id(&self) -> GateId {
        self.gate.id()
    }

    pub(super) fn issued_by(&self, gate: &AccessGate) -> bool {
        std::ptr::eq(self.gate, gate)
    }

    /// Releases the permit on the gate that issued it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReadPermit<'_> {
    fn drop(&mut self) {
        self.gate.release_slot(PermitKind::Read, self.id);
    }
}

impl fmt::Debug for ReadPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPermit")
            .field("gate", &self.gate.id())
            .field("id", &self.id)
            .finish()
    }
}

/// A held write permit.
///
/// Hand it to [`AccessGate::release_write`] (or call
/// [`release`](Self::release)) when done. Dropping it also releases the gate.
#[must_use = "the gate stays write-locked until the permit is released"]
pub struct WritePermit<'g> {
    gate: &'g AccessGate,
    id: PermitId,
}

impl<'g> WritePermit<'g> {
    pub(super) fn new(gate: &'g AccessGate, id: PermitId) -> Self {
        Self { gate, id }
    }

    /// The slot this permit occupies.
    #[must_use]
    pub fn id(&self) -> PermitId {
        self.id
    }

    /// The gate that issued this permit.
    #[must_use]
    pub fn gate_id(&self) -> GateId {
        self.gate.id()
    }

    pub(super) fn issued_by(&self, gate: &AccessGate) -> bool {
        std::ptr::eq(self.gate, gate)
    }

    /// Releases the permit on the gate that issued it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        self.gate.release_slot(PermitKind::Write, self.id);
    }
}

impl fmt::Debug for WritePermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritePermit")
            .field("gate", &self.gate.id())
            .field("id", &self.id)
            .finish()
    }
}

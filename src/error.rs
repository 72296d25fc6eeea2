//! Error types for gate operations.
//!
//! The gate itself has three failure modes, each with its own small type:
//!
//! - [`TryAcquireError`]: a non-blocking acquire found the gate busy
//! - [`AcquireError`]: a blocking or async acquire was cancelled
//! - [`ProtocolViolation`]: a release was handed a permit the gate does not hold
//!
//! [`StoreError`] composes these for [`GuardedStore`](crate::GuardedStore).
//! None of these errors leave the gate in a partially mutated state.

use core::fmt;

use crate::gate::{GateId, PermitKind};

/// Cancellation was observed at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Error returned when a waiting acquire fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Cancelled while waiting. No permit was taken.
    Cancelled,
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "gate acquire cancelled"),
        }
    }
}

impl std::error::Error for AcquireError {}

impl From<Cancelled> for AcquireError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Error returned when a non-blocking acquire cannot proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAcquireError {
    /// A writer holds the gate.
    WriterActive,
    /// Every read slot is taken.
    ReadersAtCapacity,
    /// Readers hold the gate, so a write cannot start.
    ReadersActive,
}

impl fmt::Display for TryAcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriterActive => write!(f, "gate is write-locked"),
            Self::ReadersAtCapacity => write!(f, "gate has no free read slots"),
            Self::ReadersActive => write!(f, "gate is held by readers"),
        }
    }
}

impl std::error::Error for TryAcquireError {}

/// A release was attempted with a permit this gate does not hold.
///
/// The rejected permit travels back inside the error so it can still be
/// released on the gate that issued it; dropping the error releases it there.
pub struct ProtocolViolation<P> {
    kind: PermitKind,
    expected: GateId,
    actual: GateId,
    permit: P,
}

impl<P> ProtocolViolation<P> {
    pub(crate) fn new(kind: PermitKind, expected: GateId, actual: GateId, permit: P) -> Self {
        Self {
            kind,
            expected,
            actual,
            permit,
        }
    }

    /// The kind of permit that was rejected.
    #[must_use]
    pub fn kind(&self) -> PermitKind {
        self.kind
    }

    /// The gate the release was attempted on.
    #[must_use]
    pub fn expected_gate(&self) -> GateId {
        self.expected
    }

    /// The gate that actually issued the permit.
    #[must_use]
    pub fn actual_gate(&self) -> GateId {
        self.actual
    }

    /// Returns the rejected permit.
    #[must_use]
    pub fn into_permit(self) -> P {
        self.permit
    }
}

impl<P> fmt::Debug for ProtocolViolation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolViolation")
            .field("kind", &self.kind)
            .field("expected", &self.expected)
            .field("actual", &self.actual)
            .finish_non_exhaustive()
    }
}

impl<P> fmt::Display for ProtocolViolation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal {} release on {}: permit was issued by {}",
            self.kind, self.expected, self.actual
        )
    }
}

impl<P> std::error::Error for ProtocolViolation<P> {}

/// Errors from [`GuardedStore`](crate::GuardedStore) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Cancelled while waiting for a permit.
    #[error("store access cancelled")]
    Cancelled,

    /// The permit was issued by a gate other than the store's own.
    #[error("{kind} permit from {actual} cannot access store guarded by {expected}")]
    ForeignPermit {
        /// The kind of permit presented.
        kind: PermitKind,
        /// The store's gate.
        expected: GateId,
        /// The gate that issued the permit.
        actual: GateId,
    },
}

impl From<AcquireError> for StoreError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Cancelled => Self::Cancelled,
        }
    }
}

impl<P> From<ProtocolViolation<P>> for StoreError {
    fn from(err: ProtocolViolation<P>) -> Self {
        Self::ForeignPermit {
            kind: err.kind,
            expected: err.expected,
            actual: err.actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AccessGate;

    #[test]
    fn acquire_error_debug_clone_copy_eq_display() {
        let e = AcquireError::Cancelled;
        let copied = e;
        assert_eq!(e, copied);
        assert!(format!("{e:?}").contains("Cancelled"));
        assert_eq!(e.to_string(), "gate acquire cancelled");
        assert_eq!(AcquireError::from(Cancelled), AcquireError::Cancelled);
    }

    #[test]
    fn try_acquire_error_display() {
        assert_eq!(
            TryAcquireError::WriterActive.to_string(),
            "gate is write-locked"
        );
        assert_eq!(
            TryAcquireError::ReadersAtCapacity.to_string(),
            "gate has no free read slots"
        );
        assert_eq!(
            TryAcquireError::ReadersActive.to_string(),
            "gate is held by readers"
        );
    }

    #[test]
    fn protocol_violation_reports_both_gates() {
        let home = AccessGate::new(1);
        let other = AccessGate::new(1);
        let permit = other.try_acquire_write().expect("other gate idle");

        let err = home.release_write(permit).expect_err("foreign permit");
        assert_eq!(err.kind(), PermitKind::Write);
        assert_eq!(err.expected_gate(), home.id());
        assert_eq!(err.actual_gate(), other.id());

        let msg = err.to_string();
        assert!(msg.contains("write"), "{msg}");
        assert!(msg.contains(&home.id().to_string()), "{msg}");
        assert!(format!("{err:?}").starts_with("ProtocolViolation"));

        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::ForeignPermit { .. }));
        // The permit went down with the error and released itself on `other`.
        assert!(!other.is_write_locked());
    }

    #[test]
    fn store_error_from_acquire_error() {
        assert_eq!(
            StoreError::from(AcquireError::Cancelled),
            StoreError::Cancelled
        );
        assert_eq!(StoreError::Cancelled.to_string(), "store access cancelled");
    }
}

//! Bounded-reader / exclusive-writer access gate.
//!
//! An [`AccessGate`] arbitrates access to shared state that is not safe to
//! touch concurrently on its own. Up to `max_readers` tasks may hold a
//! [`ReadPermit`] at the same time; a [`WritePermit`] is exclusive against
//! every reader and every other writer.
//!
//! Permits are explicit tokens. Acquiring returns one, releasing consumes it,
//! and a release handed a token from a different gate is rejected as a
//! [`ProtocolViolation`] without touching gate state.
//!
//! # Example
//!
//! ```
//! use accessgate::{AccessGate, Cx};
//!
//! let gate = AccessGate::new(2);
//! let cx = Cx::for_testing();
//!
//! let a = gate.acquire_read_blocking(&cx).unwrap();
//! let b = gate.try_acquire_read().unwrap();
//! assert!(gate.try_acquire_read().is_err());
//!
//! gate.release_read(a).unwrap();
//! gate.release_read(b).unwrap();
//!
//! let w = gate.try_acquire_write().unwrap();
//! gate.release_write(w).unwrap();
//! ```
//!
//! # Fairness
//!
//! There is no FIFO ordering and no writer preference. A steady stream of
//! overlapping readers can keep a waiting writer out indefinitely.

#![warn(missing_docs)]

pub mod config;
pub mod cx;
pub mod error;
pub mod gate;
pub mod store;
pub mod test_logging;
mod tracing_compat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ConfigError, ConfigLoader, GateConfig};
pub use cx::{Cx, TaskId};
pub use error::{AcquireError, Cancelled, ProtocolViolation, StoreError, TryAcquireError};
pub use gate::{
    AccessGate, GateId, GatePhase, GateSnapshot, PermitId, PermitKind, ReadAcquire, ReadPermit,
    WriteAcquire, WritePermit,
};
pub use store::{GuardedStore, MemoryStore, ProtectedStore};

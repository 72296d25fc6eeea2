//! Logging shim.
//!
//! With `tracing-integration` enabled this re-exports the `tracing` macros.
//! Without it the macros expand to nothing, so call sites stay unconditional.

#[cfg(feature = "tracing-integration")]
pub(crate) use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{debug, trace, warn};

//! MeshExchangeError: Unified error type for mesh-exchange public APIs
//!
//! Every fallible operation in this crate reports through this enum. Transport
//! failures are propagated verbatim and never retried; retry policy belongs to
//! the caller.

use thiserror::Error;

/// Unified error type for mesh-exchange operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshExchangeError {
    /// The underlying transport reported a failure talking to `peer`.
    #[error("transport failure with rank {peer}: {reason}")]
    TransportFailure { peer: usize, reason: String },
    /// No message-passing backend is available in this build.
    #[error("{op} only available with a message-passing backend")]
    TransportUnavailable { op: &'static str },
    /// The decoded element count was negative.
    #[error("corrupted count prefix: {0} (codec mismatch or damaged message)")]
    CorruptedCount(i32),
    /// A buffer is shorter than the bytes an encode or decode needs from the cursor.
    #[error("buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
    /// A collection has more elements than the 4-byte count prefix can carry.
    #[error("collection of {0} elements does not fit the count prefix")]
    CountOverflow(usize),
    /// No handler factory is registered for this type tag.
    #[error("no handler registered for type tag {0}")]
    UnknownTypeTag(i32),
    /// A handler factory is already registered for this type tag.
    #[error("type tag {0} is already registered")]
    DuplicateTypeTag(i32),
    /// A handler's internal bookkeeping disagrees with its data.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

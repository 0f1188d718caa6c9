//! Transport plumbing: communicators and wire primitives.

pub mod communicator;
pub mod wire;

pub use communicator::{CommTag, Communicator, Envelope, LocalComm, NoComm};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use wire::{Position, Primitive, PrimitiveKind};

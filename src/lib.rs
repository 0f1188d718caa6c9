#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-exchange
//!
//! mesh-exchange moves typed, fixed-width collections of values between the
//! processes of a parallel mesh code. Mesh topology, ghost layers and
//! per-element application data are its clients; the message-passing
//! substrate (MPI, or threads standing in for ranks) is what it consumes.
//!
//! ## Features
//! - [`ElementCodec`] strategies for scalars, fixed-size arrays and
//!   plain-old-data records, each identified by a [`TypeTag`]
//! - [`DataHandler`]: count-prefixed encode/decode with exact buffer sizing,
//!   plus blocking `send`/`receive` over any [`Communicator`]
//! - [`AbstractDataHandler`] and [`HandlerRegistry`] for heterogeneous
//!   dispatch over an open set of element types
//! - Pluggable communication backends ([`NoComm`], [`LocalComm`], and
//!   `MpiComm` behind the `mpi-support` feature)
//!
//! ## Wire format
//!
//! ```text
//! [ count: i32 LE ][ element_0 ] ... [ element_{count-1} ]
//! ```
//!
//! A negative count is rejected as corruption. The receiver sizes its buffer
//! from the probed message length, never from the prefix.
//!
//! ## Usage
//!
//! ```rust
//! use mesh_exchange::prelude::*;
//!
//! let comms = LocalComm::world(2);
//! let tag = CommTag::new(0x42);
//!
//! DataHandler::<i32>::from_vec(vec![42]).send(1, tag, &comms[0])?;
//!
//! let mut inbox = DataHandler::<i32>::new();
//! let got = inbox.receive(0, tag, &comms[1])?;
//! assert_eq!(got.count, 1);
//! assert_eq!(inbox.data(), Some(&[42][..]));
//! # Ok::<(), MeshExchangeError>(())
//! ```
//!
//! Without a transport ([`NoComm`]), `send` and `receive` fail fast with
//! [`MeshExchangeError::TransportUnavailable`] after logging once.
//!
//! [`ElementCodec`]: data::codec::ElementCodec
//! [`TypeTag`]: data::codec::TypeTag
//! [`DataHandler`]: data::handler::DataHandler
//! [`AbstractDataHandler`]: data::dyn_handler::AbstractDataHandler
//! [`HandlerRegistry`]: data::dyn_handler::HandlerRegistry
//! [`Communicator`]: algs::communicator::Communicator
//! [`NoComm`]: algs::communicator::NoComm
//! [`LocalComm`]: algs::communicator::LocalComm
//! [`MeshExchangeError::TransportUnavailable`]: mesh_error::MeshExchangeError::TransportUnavailable

pub mod algs;
pub mod data;
pub mod mesh_error;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, Envelope, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::wire::{Position, Primitive, PrimitiveKind};
    pub use crate::data::codec::{ArrayCodec, ElementCodec, PodCodec, ScalarCodec, TypeTag};
    pub use crate::data::dyn_handler::{AbstractDataHandler, HandlerRegistry};
    pub use crate::data::handler::{DataHandler, Ownership, Received};
    pub use crate::mesh_error::MeshExchangeError;
}

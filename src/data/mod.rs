//! Data module: element codecs and typed exchange handlers

pub mod codec;
pub mod dyn_handler;
pub mod handler;

pub use codec::{ArrayCodec, ElementCodec, PodCodec, ScalarCodec, TypeTag};
pub use dyn_handler::{AbstractDataHandler, HandlerRegistry};
pub use handler::{Collection, DataHandler, Ownership, Received};

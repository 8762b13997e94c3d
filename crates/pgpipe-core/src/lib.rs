//! Core types for pgpipe.
//!
//! `pgpipe-core` holds everything about the PostgreSQL wire protocol that does
//! not touch a socket:
//!
//! - The frontend and backend message model
//! - Frame encoding and decoding, including a streaming decoder
//! - The shared `Error` type
//! - `Outcome` and `Cx` re-exports from asupersync for cancel-correct operations
//!
//! The `pgpipe` crate builds the pipelined client on top of this.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod error;
pub mod protocol;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, DecodeError, DecodeFailure, Error,
    ProtocolError, Result, ServerError, ServerErrorKind,
};
pub use protocol::{BackendMessage, FrontendMessage, MessageReader, MessageWriter};

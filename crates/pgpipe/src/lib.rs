//! Pipelined PostgreSQL client.
//!
//! `pgpipe` is a client-side implementation of the PostgreSQL frontend/backend
//! protocol built around an asymmetric request/response queue. A single
//! submission routinely provokes a variable number of responses; the
//! [`Correlator`] attributes them to exchanges in strict submission order
//! while demand counters bound how much is written ahead and read behind.
//!
//! This crate provides:
//!
//! - The [`Correlator`] and its per-exchange result slots
//! - A streaming [`MessageEncoder`] with a high-water mark
//! - The [`Transport`] seam and a TCP implementation on asupersync
//! - [`PgClient`] with `send`, `authenticate`, batching and SSL negotiation
//! - [`ClientConfig`], loadable from JSON
//!
//! Message types and the frame codec live in `pgpipe-core` and are
//! re-exported here.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgpipe::{ClientConfig, Exchange, FrontendMessage, Outcome, PgClient};
//!
//! let config = ClientConfig::new("127.0.0.1", "alice").database("app");
//! let Outcome::Ok(mut client) = PgClient::connect(&cx, &config).await else {
//!     return;
//! };
//!
//! // Both queries are written before either answer is read.
//! let mut first = client.submit(Exchange::until_ready(vec![FrontendMessage::Query(
//!     "SELECT 1".into(),
//! )]));
//! let mut second = client.submit(Exchange::until_ready(vec![FrontendMessage::Query(
//!     "SELECT 2".into(),
//! )]));
//! let second_rows = client.wait(&cx, &mut second).await;
//! let first_rows = client.wait(&cx, &mut first).await;
//! ```

pub mod client;
pub mod config;
pub mod correlator;
pub mod encoder;
pub mod transport;

pub use client::{CancelToken, ConnectionState, PgClient};
pub use config::{ClientConfig, SslMode};
pub use correlator::{Correlator, Exchange, ExchangeHandle, ExchangeResult, OutputSink};
pub use encoder::MessageEncoder;
pub use transport::{TcpTransport, Transport};

pub use pgpipe_core::error::{
    ConfigError, ConnectionError, ConnectionErrorKind, DecodeError, DecodeFailure, Error,
    ProtocolError, ServerError, ServerErrorKind,
};
pub use pgpipe_core::protocol::{
    self, BackendMessage, ErrorFields, FrontendMessage, MessageReader, MessageWriter,
    SslResponse, TransactionStatus,
};
pub use pgpipe_core::{Cx, Outcome};

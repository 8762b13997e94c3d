//! PostgreSQL frontend/backend protocol, version 3.0.
//!
//! This module provides:
//! - The message model for both directions of the protocol
//! - Frame encoding ([`MessageWriter`])
//! - Frame decoding, one-shot or streaming ([`MessageReader`])
//!
//! # Example
//!
//! ```rust,ignore
//! use pgpipe_core::protocol::{BackendMessage, MessageReader, MessageWriter};
//!
//! let mut writer = MessageWriter::new();
//! let bytes = writer.write_backend(&BackendMessage::ParseComplete).to_vec();
//!
//! let mut reader = MessageReader::new();
//! reader.feed(&bytes)?;
//! assert_eq!(reader.next_message()?, Some(BackendMessage::ParseComplete));
//! ```

pub mod messages;
pub mod reader;
pub mod writer;

pub use messages::{
    BackendMessage, CANCEL_REQUEST_CODE, CopyFormat, DescribeKind, ErrorFields, FieldDescription,
    FrontendMessage, PROTOCOL_VERSION, SSL_REQUEST_CODE, SslResponse, TransactionStatus,
    auth_code, backend_type, error_field, frontend_type, protocol_version,
};
pub use reader::{
    DEFAULT_MAX_MESSAGE_SIZE, MessageReader, Messages, decode_backend, decode_frontend,
    decode_ssl_response, decode_startup,
};
pub use writer::MessageWriter;

//! Error types for pgpipe operations.

use std::fmt;

use crate::protocol::{BackendMessage, ErrorFields};

/// The primary error type for all pgpipe operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect, authentication, SSL)
    Connection(ConnectionError),
    /// An ErrorResponse sent by the server
    Server(ServerError),
    /// The server sent something the client did not expect
    Protocol(ProtocolError),
    /// The byte stream could not be framed or parsed
    Decode(DecodeFailure),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Responses the failed exchange had collected before the connection went away.
    pub responses: Vec<BackendMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection refused
    Refused,
    /// Authentication failed or is not supported
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// The transport timed out waiting for the server
    Timeout,
    /// SSL negotiation failed
    Ssl,
}

/// An ErrorResponse, together with everything the exchange had received
/// before it.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub kind: ServerErrorKind,
    pub fields: ErrorFields,
    /// Responses collected by the failed exchange, ending with the error itself.
    pub responses: Vec<BackendMessage>,
}

/// Coarse classification of the SQLSTATE class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// Class 08
    Connection,
    /// Class 28
    Authentication,
    /// Class 42
    Syntax,
    /// Class 23
    Constraint,
    /// 40001
    Serialization,
    /// Other class 40
    Deadlock,
    /// 57014
    Cancelled,
    /// Other class 57
    AdminShutdown,
    /// Anything else
    Database,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    /// Responses collected by the exchange that raised this error, if any.
    pub responses: Vec<BackendMessage>,
}

/// Framing and payload errors. Fatal to the stream they occur on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Type byte not defined by the protocol
    UnknownTag(u8),
    /// Declared length smaller than the length field itself
    InvalidLength { tag: Option<u8>, length: i32 },
    /// Declared length above the reader's limit
    MessageTooLarge { length: usize, max: usize },
    /// Payload does not match the variant's field layout
    Malformed {
        message: &'static str,
        reason: String,
    },
    /// Tagless packet carrying an unknown request code or protocol version
    UnknownRequestCode(i32),
    /// SSL reply byte other than 'S' or 'N'
    InvalidSslResponse(u8),
}

/// A [`DecodeError`] that ended the stream, with the responses the failed
/// exchange had collected before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub error: DecodeError,
    pub responses: Vec<BackendMessage>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServerError {
    /// Classify an ErrorResponse by its SQLSTATE.
    pub fn from_fields(fields: ErrorFields) -> Self {
        let kind = match fields.code.get(..2) {
            Some("08") => ServerErrorKind::Connection,
            Some("28") => ServerErrorKind::Authentication,
            Some("42") => ServerErrorKind::Syntax,
            Some("23") => ServerErrorKind::Constraint,
            Some("40") => {
                if fields.code == "40001" {
                    ServerErrorKind::Serialization
                } else {
                    ServerErrorKind::Deadlock
                }
            }
            Some("57") => {
                if fields.code == "57014" {
                    ServerErrorKind::Cancelled
                } else {
                    ServerErrorKind::AdminShutdown
                }
            }
            _ => ServerErrorKind::Database,
        };

        Self {
            kind,
            fields,
            responses: Vec::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.fields.code
    }

    pub fn is_fatal(&self) -> bool {
        self.fields.is_fatal()
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.fields.code == "23505"
    }
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            responses: Vec::new(),
        }
    }
}

impl DecodeError {
    pub fn malformed(message: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            message,
            reason: reason.into(),
        }
    }
}

impl Error {
    /// Shorthand for a `Protocol` error without collected responses.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError::new(message))
    }

    /// Shorthand for a `Connection` error without a source.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError {
            kind,
            message: message.into(),
            source: None,
            responses: Vec::new(),
        })
    }

    /// The framing error, if this is one.
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self {
            Error::Decode(e) => Some(&e.error),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(e) => Some(e.code()),
            _ => None,
        }
    }

    /// The server error, if this is one.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }

    /// Responses an exchange had collected when it failed.
    pub fn responses(&self) -> &[BackendMessage] {
        match self {
            Error::Server(e) => &e.responses,
            Error::Protocol(e) => &e.responses,
            Error::Connection(e) => &e.responses,
            Error::Decode(e) => &e.responses,
            Error::Config(_) | Error::Io(_) => &[],
        }
    }

    /// Attach the responses collected by a failed exchange.
    ///
    /// `Config` and `Io` errors never come out of an exchange and are
    /// returned unchanged.
    pub fn with_responses(mut self, responses: Vec<BackendMessage>) -> Self {
        match &mut self {
            Error::Server(e) => e.responses = responses,
            Error::Protocol(e) => e.responses = responses,
            Error::Connection(e) => e.responses = responses,
            Error::Decode(e) => e.responses = responses,
            Error::Config(_) | Error::Io(_) => {}
        }
        self
    }

    /// Does this error leave the connection unusable?
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Server(e) => e.is_fatal(),
            Error::Connection(_) | Error::Decode(_) | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Decode(_) | Error::Io(_) => true,
            Error::Server(e) => matches!(
                e.kind,
                ServerErrorKind::Connection | ServerErrorKind::AdminShutdown
            ),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Server(e) => write!(f, "Server error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Decode(e) => write!(f, "Decode error: {}", e.error),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Decode(e) => Some(&e.error),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (SQLSTATE {})",
            self.fields.severity, self.fields.message, self.fields.code
        )?;
        if let Some(detail) = &self.fields.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.fields.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownTag(tag) => write!(f, "unknown message type: 0x{:02x}", tag),
            DecodeError::InvalidLength {
                tag: Some(tag),
                length,
            } => write!(
                f,
                "invalid length {} for message type 0x{:02x}",
                length, tag
            ),
            DecodeError::InvalidLength { tag: None, length } => {
                write!(f, "invalid startup packet length {}", length)
            }
            DecodeError::MessageTooLarge { length, max } => {
                write!(f, "message length {} exceeds limit of {} bytes", length, max)
            }
            DecodeError::Malformed { message, reason } => {
                write!(f, "malformed {}: {}", message, reason)
            }
            DecodeError::UnknownRequestCode(code) => {
                write!(f, "unknown startup request code {}", code)
            }
            DecodeError::InvalidSslResponse(byte) => {
                write!(f, "unexpected SSL response: 0x{:02x}", byte)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(DecodeFailure {
            error: err,
            responses: Vec::new(),
        })
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for pgpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransactionStatus;

    #[test]
    fn test_error_classification() {
        let err = ServerError::from_fields(ErrorFields::new("ERROR", "23505", "unique violation"));
        assert_eq!(err.kind, ServerErrorKind::Constraint);
        assert!(err.is_unique_violation());

        let err = ServerError::from_fields(ErrorFields::new(
            "FATAL",
            "28P01",
            "password authentication failed",
        ));
        assert_eq!(err.kind, ServerErrorKind::Authentication);
        assert!(err.is_fatal());

        let err = ServerError::from_fields(ErrorFields::new("ERROR", "40001", "could not serialize"));
        assert_eq!(err.kind, ServerErrorKind::Serialization);

        let err = ServerError::from_fields(ErrorFields::new("ERROR", "40P01", "deadlock detected"));
        assert_eq!(err.kind, ServerErrorKind::Deadlock);

        let err = ServerError::from_fields(ErrorFields::new("ERROR", "57014", "canceling statement"));
        assert_eq!(err.kind, ServerErrorKind::Cancelled);

        let err = ServerError::from_fields(ErrorFields::new("ERROR", "XX000", "internal error"));
        assert_eq!(err.kind, ServerErrorKind::Database);
    }

    #[test]
    fn test_sqlstate_and_responses() {
        let fields = ErrorFields::new("FATAL", "28000", "role \"alice\" does not exist");
        let responses = vec![BackendMessage::ErrorResponse(fields.clone())];
        let err = Error::Server(ServerError::from_fields(fields)).with_responses(responses);

        assert_eq!(err.sqlstate(), Some("28000"));
        assert_eq!(err.responses().len(), 1);
        assert!(err.is_fatal());
        assert!(err.server_error().is_some());
    }

    #[test]
    fn test_with_responses_on_stream_failures() {
        let partial = vec![BackendMessage::DataRow(vec![Some(b"1".to_vec())])];

        let err = Error::connection(ConnectionErrorKind::Disconnected, "lost connection")
            .with_responses(partial.clone());
        assert_eq!(err.responses(), partial.as_slice());

        let err = Error::from(DecodeError::UnknownTag(b'!')).with_responses(partial.clone());
        assert_eq!(err.responses(), partial.as_slice());
        assert_eq!(err.decode_error(), Some(&DecodeError::UnknownTag(b'!')));
    }

    #[test]
    fn test_with_responses_ignores_io_errors() {
        let err = Error::from(std::io::Error::other("boom"))
            .with_responses(vec![BackendMessage::ReadyForQuery(TransactionStatus::Idle)]);
        assert!(err.responses().is_empty());
        assert_eq!(err.sqlstate(), None);
    }

    #[test]
    fn test_display() {
        let mut fields = ErrorFields::new("ERROR", "42601", "syntax error at or near \"SELEC\"");
        fields.hint = Some("check the statement".to_string());
        let err = Error::Server(ServerError::from_fields(fields));
        let text = err.to_string();
        assert!(text.contains("42601"));
        assert!(text.contains("HINT: check the statement"));

        let err = Error::from(DecodeError::UnknownTag(b'!'));
        assert_eq!(err.to_string(), "Decode error: unknown message type: 0x21");

        let err = Error::from(DecodeError::malformed("DataRow", "truncated column value"));
        assert_eq!(
            err.to_string(),
            "Decode error: malformed DataRow: truncated column value"
        );
    }

    #[test]
    fn test_connection_flags() {
        let err = Error::connection(ConnectionErrorKind::Disconnected, "lost connection");
        assert!(err.is_connection_error());
        assert!(err.is_fatal());

        let err = Error::protocol("unexpected message");
        assert!(!err.is_connection_error());
        assert!(!err.is_fatal());
    }
}

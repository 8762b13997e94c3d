//! PostgreSQL protocol message model.
//!
//! Two closed enums cover the v3 protocol: [`FrontendMessage`] for what the
//! client sends and [`BackendMessage`] for what the server sends. The SSL
//! negotiation reply is not a framed message at all and lives in its own
//! type, [`SslResponse`].

/// Protocol version 3.0, as sent in the startup packet.
pub const PROTOCOL_VERSION: i32 = protocol_version(3, 0);

/// Request code carried by an `SSLRequest` packet (1234 << 16 | 5679).
pub const SSL_REQUEST_CODE: i32 = (1234 << 16) | 5679;

/// Request code carried by a `CancelRequest` packet (1234 << 16 | 5678).
pub const CANCEL_REQUEST_CODE: i32 = (1234 << 16) | 5678;

/// Pack a major/minor pair the way the startup packet expects it.
pub const fn protocol_version(major: u16, minor: u16) -> i32 {
    ((major as i32) << 16) | minor as i32
}

/// Type bytes of typed frontend frames.
pub mod frontend_type {
    pub const QUERY: u8 = b'Q';
    pub const PARSE: u8 = b'P';
    pub const BIND: u8 = b'B';
    pub const DESCRIBE: u8 = b'D';
    pub const EXECUTE: u8 = b'E';
    pub const CLOSE: u8 = b'C';
    pub const SYNC: u8 = b'S';
    pub const FLUSH: u8 = b'H';
    pub const COPY_DATA: u8 = b'd';
    pub const COPY_DONE: u8 = b'c';
    pub const COPY_FAIL: u8 = b'f';
    pub const TERMINATE: u8 = b'X';
}

/// Type bytes of backend frames.
pub mod backend_type {
    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    pub const PARSE_COMPLETE: u8 = b'1';
    pub const BIND_COMPLETE: u8 = b'2';
    pub const CLOSE_COMPLETE: u8 = b'3';
    pub const NO_DATA: u8 = b'n';
    pub const PORTAL_SUSPENDED: u8 = b's';
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    pub const COPY_IN_RESPONSE: u8 = b'G';
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    pub const COPY_BOTH_RESPONSE: u8 = b'W';
    pub const COPY_DATA: u8 = b'd';
    pub const COPY_DONE: u8 = b'c';
    pub const FUNCTION_CALL_RESPONSE: u8 = b'V';
    pub const NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';
}

/// Subcodes of the `'R'` authentication request.
pub mod auth_code {
    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Startup packet (no type byte).
    Startup {
        version: i32,
        params: Vec<(String, String)>,
    },
    /// SSL negotiation request (no type byte, fixed 8 bytes).
    SslRequest,
    /// Cancel request sent on a separate connection (no type byte, fixed 16 bytes).
    CancelRequest { process_id: i32, secret_key: i32 },
    /// Simple query.
    Query(String),
    /// Prepare a statement.
    Parse {
        name: String,
        query: String,
        param_types: Vec<u32>,
    },
    /// Bind parameters to a prepared statement, creating a portal.
    Bind {
        portal: String,
        statement: String,
        param_formats: Vec<i16>,
        params: Vec<Option<Vec<u8>>>,
        result_formats: Vec<i16>,
    },
    /// Describe a statement or portal.
    Describe { kind: DescribeKind, name: String },
    /// Execute a portal.
    Execute { portal: String, max_rows: i32 },
    /// Close a statement or portal.
    Close { kind: DescribeKind, name: String },
    Sync,
    Flush,
    CopyData(Vec<u8>),
    CopyDone,
    CopyFail(String),
    Terminate,
}

impl FrontendMessage {
    /// Type byte of the frame, or `None` for the tagless startup-style packets.
    pub fn type_byte(&self) -> Option<u8> {
        match self {
            FrontendMessage::Startup { .. }
            | FrontendMessage::SslRequest
            | FrontendMessage::CancelRequest { .. } => None,
            FrontendMessage::Query(_) => Some(frontend_type::QUERY),
            FrontendMessage::Parse { .. } => Some(frontend_type::PARSE),
            FrontendMessage::Bind { .. } => Some(frontend_type::BIND),
            FrontendMessage::Describe { .. } => Some(frontend_type::DESCRIBE),
            FrontendMessage::Execute { .. } => Some(frontend_type::EXECUTE),
            FrontendMessage::Close { .. } => Some(frontend_type::CLOSE),
            FrontendMessage::Sync => Some(frontend_type::SYNC),
            FrontendMessage::Flush => Some(frontend_type::FLUSH),
            FrontendMessage::CopyData(_) => Some(frontend_type::COPY_DATA),
            FrontendMessage::CopyDone => Some(frontend_type::COPY_DONE),
            FrontendMessage::CopyFail(_) => Some(frontend_type::COPY_FAIL),
            FrontendMessage::Terminate => Some(frontend_type::TERMINATE),
        }
    }

    /// Short variant name, used in logs and decode errors.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Startup { .. } => "StartupMessage",
            FrontendMessage::SslRequest => "SSLRequest",
            FrontendMessage::CancelRequest { .. } => "CancelRequest",
            FrontendMessage::Query(_) => "Query",
            FrontendMessage::Parse { .. } => "Parse",
            FrontendMessage::Bind { .. } => "Bind",
            FrontendMessage::Describe { .. } => "Describe",
            FrontendMessage::Execute { .. } => "Execute",
            FrontendMessage::Close { .. } => "Close",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::CopyData(_) => "CopyData",
            FrontendMessage::CopyDone => "CopyDone",
            FrontendMessage::CopyFail(_) => "CopyFail",
            FrontendMessage::Terminate => "Terminate",
        }
    }
}

/// Target of a Describe or Close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeKind {
    Statement,
    Portal,
}

impl DescribeKind {
    pub const fn as_byte(self) -> u8 {
        match self {
            DescribeKind::Statement => b'S',
            DescribeKind::Portal => b'P',
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(DescribeKind::Statement),
            b'P' => Some(DescribeKind::Portal),
            _ => None,
        }
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMd5Password([u8; 4]),
    /// SASL mechanisms offered by the server.
    AuthenticationSasl(Vec<String>),
    AuthenticationSaslContinue(Vec<u8>),
    AuthenticationSaslFinal(Vec<u8>),
    /// Key material for cancel requests.
    BackendKeyData { process_id: i32, secret_key: i32 },
    ParameterStatus { name: String, value: String },
    ReadyForQuery(TransactionStatus),
    RowDescription(Vec<FieldDescription>),
    /// One row; `None` marks SQL NULL. Values are left undecoded.
    DataRow(Vec<Option<Vec<u8>>>),
    /// Command tag, e.g. `INSERT 0 1`.
    CommandComplete(String),
    EmptyQueryResponse,
    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    NotificationResponse {
        process_id: i32,
        channel: String,
        payload: String,
    },
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,
    ParameterDescription(Vec<u32>),
    CopyInResponse(CopyFormat),
    CopyOutResponse(CopyFormat),
    CopyBothResponse(CopyFormat),
    CopyData(Vec<u8>),
    CopyDone,
    FunctionCallResponse(Option<Vec<u8>>),
    NegotiateProtocolVersion {
        newest_minor: i32,
        unrecognized: Vec<String>,
    },
}

impl BackendMessage {
    pub fn type_byte(&self) -> u8 {
        match self {
            BackendMessage::AuthenticationOk
            | BackendMessage::AuthenticationCleartextPassword
            | BackendMessage::AuthenticationMd5Password(_)
            | BackendMessage::AuthenticationSasl(_)
            | BackendMessage::AuthenticationSaslContinue(_)
            | BackendMessage::AuthenticationSaslFinal(_) => backend_type::AUTHENTICATION,
            BackendMessage::BackendKeyData { .. } => backend_type::BACKEND_KEY_DATA,
            BackendMessage::ParameterStatus { .. } => backend_type::PARAMETER_STATUS,
            BackendMessage::ReadyForQuery(_) => backend_type::READY_FOR_QUERY,
            BackendMessage::RowDescription(_) => backend_type::ROW_DESCRIPTION,
            BackendMessage::DataRow(_) => backend_type::DATA_ROW,
            BackendMessage::CommandComplete(_) => backend_type::COMMAND_COMPLETE,
            BackendMessage::EmptyQueryResponse => backend_type::EMPTY_QUERY_RESPONSE,
            BackendMessage::ErrorResponse(_) => backend_type::ERROR_RESPONSE,
            BackendMessage::NoticeResponse(_) => backend_type::NOTICE_RESPONSE,
            BackendMessage::NotificationResponse { .. } => backend_type::NOTIFICATION_RESPONSE,
            BackendMessage::ParseComplete => backend_type::PARSE_COMPLETE,
            BackendMessage::BindComplete => backend_type::BIND_COMPLETE,
            BackendMessage::CloseComplete => backend_type::CLOSE_COMPLETE,
            BackendMessage::NoData => backend_type::NO_DATA,
            BackendMessage::PortalSuspended => backend_type::PORTAL_SUSPENDED,
            BackendMessage::ParameterDescription(_) => backend_type::PARAMETER_DESCRIPTION,
            BackendMessage::CopyInResponse(_) => backend_type::COPY_IN_RESPONSE,
            BackendMessage::CopyOutResponse(_) => backend_type::COPY_OUT_RESPONSE,
            BackendMessage::CopyBothResponse(_) => backend_type::COPY_BOTH_RESPONSE,
            BackendMessage::CopyData(_) => backend_type::COPY_DATA,
            BackendMessage::CopyDone => backend_type::COPY_DONE,
            BackendMessage::FunctionCallResponse(_) => backend_type::FUNCTION_CALL_RESPONSE,
            BackendMessage::NegotiateProtocolVersion { .. } => {
                backend_type::NEGOTIATE_PROTOCOL_VERSION
            }
        }
    }

    /// Short variant name, used in logs and decode errors.
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::AuthenticationOk => "AuthenticationOk",
            BackendMessage::AuthenticationCleartextPassword => "AuthenticationCleartextPassword",
            BackendMessage::AuthenticationMd5Password(_) => "AuthenticationMD5Password",
            BackendMessage::AuthenticationSasl(_) => "AuthenticationSASL",
            BackendMessage::AuthenticationSaslContinue(_) => "AuthenticationSASLContinue",
            BackendMessage::AuthenticationSaslFinal(_) => "AuthenticationSASLFinal",
            BackendMessage::BackendKeyData { .. } => "BackendKeyData",
            BackendMessage::ParameterStatus { .. } => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::NotificationResponse { .. } => "NotificationResponse",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::NoData => "NoData",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::ParameterDescription(_) => "ParameterDescription",
            BackendMessage::CopyInResponse(_) => "CopyInResponse",
            BackendMessage::CopyOutResponse(_) => "CopyOutResponse",
            BackendMessage::CopyBothResponse(_) => "CopyBothResponse",
            BackendMessage::CopyData(_) => "CopyData",
            BackendMessage::CopyDone => "CopyDone",
            BackendMessage::FunctionCallResponse(_) => "FunctionCallResponse",
            BackendMessage::NegotiateProtocolVersion { .. } => "NegotiateProtocolVersion",
        }
    }

    /// Messages the server may send at any time, outside of any exchange.
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            BackendMessage::NoticeResponse(_)
                | BackendMessage::NotificationResponse { .. }
                | BackendMessage::ParameterStatus { .. }
        )
    }
}

/// Transaction status reported by ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Not in a transaction block ('I')
    #[default]
    Idle,
    /// In a transaction block ('T')
    InTransaction,
    /// In a failed transaction block ('E')
    Failed,
}

impl TransactionStatus {
    pub const fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Failed => b'E',
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Column metadata from RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_id: i16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
    /// 0 = text, 1 = binary
    pub format: i16,
}

/// Layout shared by CopyIn/CopyOut/CopyBoth responses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopyFormat {
    /// 0 = textual, 1 = binary
    pub overall: i8,
    pub column_formats: Vec<i16>,
}

/// Reply to an SSLRequest: a single unframed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslResponse {
    /// 'S'
    Supported,
    /// 'N'
    NotSupported,
}

impl SslResponse {
    pub const fn as_byte(self) -> u8 {
        match self {
            SslResponse::Supported => b'S',
            SslResponse::NotSupported => b'N',
        }
    }
}

/// Field codes of ErrorResponse / NoticeResponse.
pub mod error_field {
    pub const SEVERITY: u8 = b'S';
    /// Non-localized severity (protocol 3.0, PostgreSQL 9.6+)
    pub const SEVERITY_NONLOCALIZED: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Structured fields of an ErrorResponse or NoticeResponse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorFields {
    /// Localized severity: ERROR, FATAL, PANIC, WARNING, NOTICE, ...
    pub severity: String,
    pub severity_nonlocalized: Option<String>,
    /// SQLSTATE code
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character offset into the query string
    pub position: Option<i32>,
    pub internal_position: Option<i32>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub data_type: Option<String>,
    pub constraint: Option<String>,
    pub file: Option<String>,
    pub line: Option<String>,
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Build the minimal field set a server always sends.
    pub fn new(
        severity: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: severity.into(),
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// FATAL and PANIC errors end the session.
    pub fn is_fatal(&self) -> bool {
        let severity = self
            .severity_nonlocalized
            .as_deref()
            .unwrap_or(&self.severity);
        matches!(severity, "FATAL" | "PANIC")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes() {
        assert_eq!(PROTOCOL_VERSION, 196_608);
        assert_eq!(SSL_REQUEST_CODE, 80_877_103);
        assert_eq!(CANCEL_REQUEST_CODE, 80_877_102);
    }

    #[test]
    fn test_transaction_status_bytes() {
        for status in [
            TransactionStatus::Idle,
            TransactionStatus::InTransaction,
            TransactionStatus::Failed,
        ] {
            assert_eq!(TransactionStatus::from_byte(status.as_byte()), Some(status));
        }
        assert_eq!(TransactionStatus::from_byte(b'X'), None);
    }

    #[test]
    fn test_fatal_severity() {
        let mut fields = ErrorFields::new("FATAL", "28000", "role does not exist");
        assert!(fields.is_fatal());

        fields.severity = "ERROR".to_string();
        assert!(!fields.is_fatal());

        // The non-localized severity wins over a translated one.
        fields.severity = "SCHWERWIEGEND".to_string();
        fields.severity_nonlocalized = Some("FATAL".to_string());
        assert!(fields.is_fatal());
    }

    #[test]
    fn test_async_messages() {
        assert!(
            BackendMessage::ParameterStatus {
                name: "TimeZone".to_string(),
                value: "UTC".to_string(),
            }
            .is_async()
        );
        assert!(!BackendMessage::ReadyForQuery(TransactionStatus::Idle).is_async());
    }
}

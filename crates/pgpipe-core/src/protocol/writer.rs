//! PostgreSQL message encoder.
//!
//! Encodes frontend messages for the client and backend messages for test
//! servers and round-trip checks. Every frame is written as
//! `[tag] length payload`, where `length` counts itself and the payload but
//! not the tag.

#![allow(clippy::cast_possible_truncation)]

use super::messages::{
    BackendMessage, CANCEL_REQUEST_CODE, CopyFormat, ErrorFields, FrontendMessage,
    SSL_REQUEST_CODE, auth_code, error_field,
};

/// Buffer for writing PostgreSQL protocol messages.
///
/// All multi-byte integers are written in big-endian (network) byte order.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    /// Internal buffer for message data
    buf: Vec<u8>,
}

impl Default for MessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageWriter {
    /// Create a new message writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new message writer with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Clear the internal buffer.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Get the current buffer contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take ownership of the buffer, leaving an empty one in its place.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Encode a frontend message, replacing the buffer contents.
    pub fn write(&mut self, msg: &FrontendMessage) -> &[u8] {
        self.buf.clear();

        match msg {
            FrontendMessage::Startup { version, params } => {
                let start = self.begin_untagged();
                self.put_i32(*version);
                for (key, value) in params {
                    self.put_cstr(key);
                    self.put_cstr(value);
                }
                self.buf.push(0);
                self.finish(start);
            }
            FrontendMessage::SslRequest => {
                let start = self.begin_untagged();
                self.put_i32(SSL_REQUEST_CODE);
                self.finish(start);
            }
            FrontendMessage::CancelRequest {
                process_id,
                secret_key,
            } => {
                let start = self.begin_untagged();
                self.put_i32(CANCEL_REQUEST_CODE);
                self.put_i32(*process_id);
                self.put_i32(*secret_key);
                self.finish(start);
            }
            FrontendMessage::Query(query) | FrontendMessage::CopyFail(query) => {
                self.string_frame(msg, query);
            }
            FrontendMessage::Parse {
                name,
                query,
                param_types,
            } => {
                let start = self.begin(msg);
                self.put_cstr(name);
                self.put_cstr(query);
                self.put_i16(param_types.len() as i16);
                for &oid in param_types {
                    self.put_u32(oid);
                }
                self.finish(start);
            }
            FrontendMessage::Bind {
                portal,
                statement,
                param_formats,
                params,
                result_formats,
            } => {
                let start = self.begin(msg);
                self.put_cstr(portal);
                self.put_cstr(statement);
                self.put_i16_array(param_formats);
                self.put_i16(params.len() as i16);
                for param in params {
                    self.put_nullable(param.as_deref());
                }
                self.put_i16_array(result_formats);
                self.finish(start);
            }
            FrontendMessage::Describe { kind, name } | FrontendMessage::Close { kind, name } => {
                let start = self.begin(msg);
                self.buf.push(kind.as_byte());
                self.put_cstr(name);
                self.finish(start);
            }
            FrontendMessage::Execute { portal, max_rows } => {
                let start = self.begin(msg);
                self.put_cstr(portal);
                self.put_i32(*max_rows);
                self.finish(start);
            }
            FrontendMessage::CopyData(data) => {
                let start = self.begin(msg);
                self.buf.extend_from_slice(data);
                self.finish(start);
            }
            FrontendMessage::Sync
            | FrontendMessage::Flush
            | FrontendMessage::CopyDone
            | FrontendMessage::Terminate => {
                let start = self.begin(msg);
                self.finish(start);
            }
        }

        &self.buf
    }

    /// Encode a backend message, replacing the buffer contents.
    pub fn write_backend(&mut self, msg: &BackendMessage) -> &[u8] {
        self.buf.clear();
        let start = self.begin_tagged(msg.type_byte());

        match msg {
            BackendMessage::AuthenticationOk => self.put_i32(auth_code::OK),
            BackendMessage::AuthenticationCleartextPassword => {
                self.put_i32(auth_code::CLEARTEXT_PASSWORD);
            }
            BackendMessage::AuthenticationMd5Password(salt) => {
                self.put_i32(auth_code::MD5_PASSWORD);
                self.buf.extend_from_slice(salt);
            }
            BackendMessage::AuthenticationSasl(mechanisms) => {
                self.put_i32(auth_code::SASL);
                for mechanism in mechanisms {
                    self.put_cstr(mechanism);
                }
                self.buf.push(0);
            }
            BackendMessage::AuthenticationSaslContinue(data) => {
                self.put_i32(auth_code::SASL_CONTINUE);
                self.buf.extend_from_slice(data);
            }
            BackendMessage::AuthenticationSaslFinal(data) => {
                self.put_i32(auth_code::SASL_FINAL);
                self.buf.extend_from_slice(data);
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                self.put_i32(*process_id);
                self.put_i32(*secret_key);
            }
            BackendMessage::ParameterStatus { name, value } => {
                self.put_cstr(name);
                self.put_cstr(value);
            }
            BackendMessage::ReadyForQuery(status) => self.buf.push(status.as_byte()),
            BackendMessage::RowDescription(fields) => {
                self.put_i16(fields.len() as i16);
                for field in fields {
                    self.put_cstr(&field.name);
                    self.put_u32(field.table_oid);
                    self.put_i16(field.column_id);
                    self.put_u32(field.type_oid);
                    self.put_i16(field.type_size);
                    self.put_i32(field.type_modifier);
                    self.put_i16(field.format);
                }
            }
            BackendMessage::DataRow(values) => {
                self.put_i16(values.len() as i16);
                for value in values {
                    self.put_nullable(value.as_deref());
                }
            }
            BackendMessage::CommandComplete(tag) => self.put_cstr(tag),
            BackendMessage::ErrorResponse(fields) | BackendMessage::NoticeResponse(fields) => {
                self.put_error_fields(fields);
            }
            BackendMessage::NotificationResponse {
                process_id,
                channel,
                payload,
            } => {
                self.put_i32(*process_id);
                self.put_cstr(channel);
                self.put_cstr(payload);
            }
            BackendMessage::ParameterDescription(oids) => {
                self.put_i16(oids.len() as i16);
                for &oid in oids {
                    self.put_u32(oid);
                }
            }
            BackendMessage::CopyInResponse(format)
            | BackendMessage::CopyOutResponse(format)
            | BackendMessage::CopyBothResponse(format) => self.put_copy_format(format),
            BackendMessage::CopyData(data) => self.buf.extend_from_slice(data),
            BackendMessage::FunctionCallResponse(value) => self.put_nullable(value.as_deref()),
            BackendMessage::NegotiateProtocolVersion {
                newest_minor,
                unrecognized,
            } => {
                self.put_i32(*newest_minor);
                self.put_i32(unrecognized.len() as i32);
                for option in unrecognized {
                    self.put_cstr(option);
                }
            }
            BackendMessage::EmptyQueryResponse
            | BackendMessage::ParseComplete
            | BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData
            | BackendMessage::PortalSuspended
            | BackendMessage::CopyDone => {}
        }

        self.finish(start);
        &self.buf
    }

    // ==================== Framing ====================

    /// Start a typed frontend frame. Returns the offset of the length field.
    fn begin(&mut self, msg: &FrontendMessage) -> usize {
        match msg.type_byte() {
            Some(tag) => self.begin_tagged(tag),
            None => self.begin_untagged(),
        }
    }

    fn begin_tagged(&mut self, tag: u8) -> usize {
        self.buf.push(tag);
        self.begin_untagged()
    }

    fn begin_untagged(&mut self) -> usize {
        let start = self.buf.len();
        self.buf.extend_from_slice(&[0; 4]);
        start
    }

    /// Patch the length field at `start` to cover everything written since.
    fn finish(&mut self, start: usize) {
        let len = (self.buf.len() - start) as i32;
        self.buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }

    /// Write a frame whose payload is a single null-terminated string.
    fn string_frame(&mut self, msg: &FrontendMessage, s: &str) {
        let start = self.begin(msg);
        self.put_cstr(s);
        self.finish(start);
    }

    // ==================== Fields ====================

    fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    fn put_i16_array(&mut self, values: &[i16]) {
        self.put_i16(values.len() as i16);
        for &v in values {
            self.put_i16(v);
        }
    }

    /// Length-prefixed value; -1 marks NULL.
    fn put_nullable(&mut self, value: Option<&[u8]>) {
        match value {
            Some(data) => {
                self.put_i32(data.len() as i32);
                self.buf.extend_from_slice(data);
            }
            None => self.put_i32(-1),
        }
    }

    fn put_copy_format(&mut self, format: &CopyFormat) {
        self.buf.push(format.overall as u8);
        self.put_i16_array(&format.column_formats);
    }

    fn put_error_fields(&mut self, fields: &ErrorFields) {
        let position = fields.position.map(|p| p.to_string());
        let internal_position = fields.internal_position.map(|p| p.to_string());

        let entries = [
            (error_field::SEVERITY, Some(fields.severity.as_str())),
            (
                error_field::SEVERITY_NONLOCALIZED,
                fields.severity_nonlocalized.as_deref(),
            ),
            (error_field::CODE, Some(fields.code.as_str())),
            (error_field::MESSAGE, Some(fields.message.as_str())),
            (error_field::DETAIL, fields.detail.as_deref()),
            (error_field::HINT, fields.hint.as_deref()),
            (error_field::POSITION, position.as_deref()),
            (error_field::INTERNAL_POSITION, internal_position.as_deref()),
            (error_field::INTERNAL_QUERY, fields.internal_query.as_deref()),
            (error_field::WHERE, fields.where_.as_deref()),
            (error_field::SCHEMA, fields.schema.as_deref()),
            (error_field::TABLE, fields.table.as_deref()),
            (error_field::COLUMN, fields.column.as_deref()),
            (error_field::DATA_TYPE, fields.data_type.as_deref()),
            (error_field::CONSTRAINT, fields.constraint.as_deref()),
            (error_field::FILE, fields.file.as_deref()),
            (error_field::LINE, fields.line.as_deref()),
            (error_field::ROUTINE, fields.routine.as_deref()),
        ];

        for (code, value) in entries {
            if let Some(value) = value {
                self.buf.push(code);
                self.put_cstr(value);
            }
        }
        self.buf.push(0);
    }
}

//! PostgreSQL message decoder.
//!
//! The free functions decode one frame from the front of a byte slice and
//! report how many bytes it used. `Ok(None)` means the frame is not complete
//! yet; nothing is consumed and the same prefix can be offered again once
//! more bytes arrive.
//!
//! [`MessageReader`] is the streaming form used on a live connection: it
//! buffers deliveries and hands out backend messages one at a time.

#![allow(clippy::cast_possible_truncation)]

use crate::error::DecodeError;

use super::messages::{
    BackendMessage, CANCEL_REQUEST_CODE, CopyFormat, DescribeKind, ErrorFields, FieldDescription,
    FrontendMessage, SSL_REQUEST_CODE, SslResponse, TransactionStatus, auth_code, backend_type,
    error_field, frontend_type,
};

/// Largest frame accepted by default. Matches the server's own 1 GB cap.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 30;

/// Decode one backend frame.
pub fn decode_backend(data: &[u8]) -> Result<Option<(BackendMessage, usize)>, DecodeError> {
    decode_backend_with_limit(data, DEFAULT_MAX_MESSAGE_SIZE)
}

/// Decode one typed frontend frame (everything after the startup packet).
pub fn decode_frontend(data: &[u8]) -> Result<Option<(FrontendMessage, usize)>, DecodeError> {
    let Some((tag, payload, consumed)) = split_tagged(data, DEFAULT_MAX_MESSAGE_SIZE, is_frontend_tag)? else {
        return Ok(None);
    };
    let msg = parse_frontend(tag, payload)?;
    Ok(Some((msg, consumed)))
}

/// Decode one tagless packet: a startup message, SSL request or cancel
/// request, told apart by the code that follows the length.
pub fn decode_startup(data: &[u8]) -> Result<Option<(FrontendMessage, usize)>, DecodeError> {
    if data.len() < 4 {
        return Ok(None);
    }
    let length = read_length(data);
    if length < 8 {
        return Err(DecodeError::InvalidLength { tag: None, length });
    }
    let length = length as usize;
    if length > DEFAULT_MAX_MESSAGE_SIZE {
        return Err(DecodeError::MessageTooLarge {
            length,
            max: DEFAULT_MAX_MESSAGE_SIZE,
        });
    }
    if data.len() < length {
        return Ok(None);
    }

    let code = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let mut payload = Payload::new(&data[8..length], "StartupMessage");

    let msg = match code {
        SSL_REQUEST_CODE => {
            payload.message = "SSLRequest";
            payload.finish()?;
            FrontendMessage::SslRequest
        }
        CANCEL_REQUEST_CODE => {
            payload.message = "CancelRequest";
            let process_id = payload.i32()?;
            let secret_key = payload.i32()?;
            payload.finish()?;
            FrontendMessage::CancelRequest {
                process_id,
                secret_key,
            }
        }
        version if version >> 16 == 3 => {
            let mut params = Vec::new();
            loop {
                let key = payload.cstr()?;
                if key.is_empty() {
                    break;
                }
                let value = payload.cstr()?;
                params.push((key, value));
            }
            payload.finish()?;
            FrontendMessage::Startup { version, params }
        }
        other => return Err(DecodeError::UnknownRequestCode(other)),
    };

    Ok(Some((msg, length)))
}

/// Decode the single-byte reply to an SSLRequest.
///
/// Only valid as the first byte read after sending the request; it has no
/// type byte or length and must not go through the framed decoders.
pub fn decode_ssl_response(byte: u8) -> Result<SslResponse, DecodeError> {
    match byte {
        b'S' => Ok(SslResponse::Supported),
        b'N' => Ok(SslResponse::NotSupported),
        other => Err(DecodeError::InvalidSslResponse(other)),
    }
}

fn decode_backend_with_limit(
    data: &[u8],
    max: usize,
) -> Result<Option<(BackendMessage, usize)>, DecodeError> {
    let Some((tag, payload, consumed)) = split_tagged(data, max, is_backend_tag)? else {
        return Ok(None);
    };
    let msg = parse_backend(tag, payload)?;
    Ok(Some((msg, consumed)))
}

fn read_length(data: &[u8]) -> i32 {
    i32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Split a complete typed frame off the front of `data`.
///
/// The header is validated as soon as it is buffered, so a bad tag or length
/// fails before any of the body is waited for.
fn split_tagged(
    data: &[u8],
    max: usize,
    known: fn(u8) -> bool,
) -> Result<Option<(u8, &[u8], usize)>, DecodeError> {
    if data.len() < 5 {
        return Ok(None);
    }
    let tag = data[0];
    if !known(tag) {
        return Err(DecodeError::UnknownTag(tag));
    }
    let length = read_length(&data[1..]);
    if length < 4 {
        return Err(DecodeError::InvalidLength {
            tag: Some(tag),
            length,
        });
    }
    let length = length as usize;
    if length > max {
        return Err(DecodeError::MessageTooLarge { length, max });
    }
    let total = length + 1;
    if data.len() < total {
        return Ok(None);
    }
    Ok(Some((tag, &data[5..total], total)))
}

fn is_frontend_tag(tag: u8) -> bool {
    matches!(
        tag,
        frontend_type::QUERY
            | frontend_type::PARSE
            | frontend_type::BIND
            | frontend_type::DESCRIBE
            | frontend_type::EXECUTE
            | frontend_type::CLOSE
            | frontend_type::SYNC
            | frontend_type::FLUSH
            | frontend_type::COPY_DATA
            | frontend_type::COPY_DONE
            | frontend_type::COPY_FAIL
            | frontend_type::TERMINATE
    )
}

fn is_backend_tag(tag: u8) -> bool {
    matches!(
        tag,
        backend_type::AUTHENTICATION
            | backend_type::BACKEND_KEY_DATA
            | backend_type::PARAMETER_STATUS
            | backend_type::READY_FOR_QUERY
            | backend_type::ROW_DESCRIPTION
            | backend_type::DATA_ROW
            | backend_type::COMMAND_COMPLETE
            | backend_type::EMPTY_QUERY_RESPONSE
            | backend_type::ERROR_RESPONSE
            | backend_type::NOTICE_RESPONSE
            | backend_type::NOTIFICATION_RESPONSE
            | backend_type::PARSE_COMPLETE
            | backend_type::BIND_COMPLETE
            | backend_type::CLOSE_COMPLETE
            | backend_type::NO_DATA
            | backend_type::PORTAL_SUSPENDED
            | backend_type::PARAMETER_DESCRIPTION
            | backend_type::COPY_IN_RESPONSE
            | backend_type::COPY_OUT_RESPONSE
            | backend_type::COPY_BOTH_RESPONSE
            | backend_type::COPY_DATA
            | backend_type::COPY_DONE
            | backend_type::FUNCTION_CALL_RESPONSE
            | backend_type::NEGOTIATE_PROTOCOL_VERSION
    )
}

fn parse_frontend(tag: u8, data: &[u8]) -> Result<FrontendMessage, DecodeError> {
    let msg = match tag {
        frontend_type::QUERY => {
            let mut p = Payload::new(data, "Query");
            let query = p.cstr()?;
            p.finish()?;
            FrontendMessage::Query(query)
        }
        frontend_type::PARSE => {
            let mut p = Payload::new(data, "Parse");
            let name = p.cstr()?;
            let query = p.cstr()?;
            let count = p.count()?;
            let param_types = (0..count).map(|_| p.u32()).collect::<Result<_, _>>()?;
            p.finish()?;
            FrontendMessage::Parse {
                name,
                query,
                param_types,
            }
        }
        frontend_type::BIND => {
            let mut p = Payload::new(data, "Bind");
            let portal = p.cstr()?;
            let statement = p.cstr()?;
            let param_formats = p.i16_array()?;
            let count = p.count()?;
            let params = (0..count).map(|_| p.nullable()).collect::<Result<_, _>>()?;
            let result_formats = p.i16_array()?;
            p.finish()?;
            FrontendMessage::Bind {
                portal,
                statement,
                param_formats,
                params,
                result_formats,
            }
        }
        frontend_type::DESCRIBE | frontend_type::CLOSE => {
            let message = if tag == frontend_type::DESCRIBE {
                "Describe"
            } else {
                "Close"
            };
            let mut p = Payload::new(data, message);
            let kind = p.u8()?;
            let kind = DescribeKind::from_byte(kind)
                .ok_or_else(|| p.error(format!("invalid target byte 0x{kind:02x}")))?;
            let name = p.cstr()?;
            p.finish()?;
            if tag == frontend_type::DESCRIBE {
                FrontendMessage::Describe { kind, name }
            } else {
                FrontendMessage::Close { kind, name }
            }
        }
        frontend_type::EXECUTE => {
            let mut p = Payload::new(data, "Execute");
            let portal = p.cstr()?;
            let max_rows = p.i32()?;
            p.finish()?;
            FrontendMessage::Execute { portal, max_rows }
        }
        frontend_type::SYNC => empty(data, "Sync", FrontendMessage::Sync)?,
        frontend_type::FLUSH => empty(data, "Flush", FrontendMessage::Flush)?,
        frontend_type::COPY_DATA => FrontendMessage::CopyData(data.to_vec()),
        frontend_type::COPY_DONE => empty(data, "CopyDone", FrontendMessage::CopyDone)?,
        frontend_type::COPY_FAIL => {
            let mut p = Payload::new(data, "CopyFail");
            let message = p.cstr()?;
            p.finish()?;
            FrontendMessage::CopyFail(message)
        }
        frontend_type::TERMINATE => empty(data, "Terminate", FrontendMessage::Terminate)?,
        other => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(msg)
}

fn parse_backend(tag: u8, data: &[u8]) -> Result<BackendMessage, DecodeError> {
    let msg = match tag {
        backend_type::AUTHENTICATION => parse_authentication(data)?,
        backend_type::BACKEND_KEY_DATA => {
            let mut p = Payload::new(data, "BackendKeyData");
            let process_id = p.i32()?;
            let secret_key = p.i32()?;
            p.finish()?;
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            }
        }
        backend_type::PARAMETER_STATUS => {
            let mut p = Payload::new(data, "ParameterStatus");
            let name = p.cstr()?;
            let value = p.cstr()?;
            p.finish()?;
            BackendMessage::ParameterStatus { name, value }
        }
        backend_type::READY_FOR_QUERY => {
            let mut p = Payload::new(data, "ReadyForQuery");
            let byte = p.u8()?;
            let status = TransactionStatus::from_byte(byte)
                .ok_or_else(|| p.error(format!("invalid transaction status 0x{byte:02x}")))?;
            p.finish()?;
            BackendMessage::ReadyForQuery(status)
        }
        backend_type::ROW_DESCRIPTION => {
            let mut p = Payload::new(data, "RowDescription");
            let count = p.count()?;
            let mut fields = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                fields.push(FieldDescription {
                    name: p.cstr()?,
                    table_oid: p.u32()?,
                    column_id: p.i16()?,
                    type_oid: p.u32()?,
                    type_size: p.i16()?,
                    type_modifier: p.i32()?,
                    format: p.i16()?,
                });
            }
            p.finish()?;
            BackendMessage::RowDescription(fields)
        }
        backend_type::DATA_ROW => {
            let mut p = Payload::new(data, "DataRow");
            let count = p.count()?;
            let values = (0..count).map(|_| p.nullable()).collect::<Result<_, _>>()?;
            p.finish()?;
            BackendMessage::DataRow(values)
        }
        backend_type::COMMAND_COMPLETE => {
            let mut p = Payload::new(data, "CommandComplete");
            let tag = p.cstr()?;
            p.finish()?;
            BackendMessage::CommandComplete(tag)
        }
        backend_type::EMPTY_QUERY_RESPONSE => empty(
            data,
            "EmptyQueryResponse",
            BackendMessage::EmptyQueryResponse,
        )?,
        backend_type::ERROR_RESPONSE => {
            BackendMessage::ErrorResponse(parse_error_fields(data, "ErrorResponse")?)
        }
        backend_type::NOTICE_RESPONSE => {
            BackendMessage::NoticeResponse(parse_error_fields(data, "NoticeResponse")?)
        }
        backend_type::NOTIFICATION_RESPONSE => {
            let mut p = Payload::new(data, "NotificationResponse");
            let process_id = p.i32()?;
            let channel = p.cstr()?;
            let payload = p.cstr()?;
            p.finish()?;
            BackendMessage::NotificationResponse {
                process_id,
                channel,
                payload,
            }
        }
        backend_type::PARSE_COMPLETE => {
            empty(data, "ParseComplete", BackendMessage::ParseComplete)?
        }
        backend_type::BIND_COMPLETE => empty(data, "BindComplete", BackendMessage::BindComplete)?,
        backend_type::CLOSE_COMPLETE => {
            empty(data, "CloseComplete", BackendMessage::CloseComplete)?
        }
        backend_type::NO_DATA => empty(data, "NoData", BackendMessage::NoData)?,
        backend_type::PORTAL_SUSPENDED => {
            empty(data, "PortalSuspended", BackendMessage::PortalSuspended)?
        }
        backend_type::PARAMETER_DESCRIPTION => {
            let mut p = Payload::new(data, "ParameterDescription");
            let count = p.count()?;
            let oids = (0..count).map(|_| p.u32()).collect::<Result<_, _>>()?;
            p.finish()?;
            BackendMessage::ParameterDescription(oids)
        }
        backend_type::COPY_IN_RESPONSE => {
            BackendMessage::CopyInResponse(parse_copy_format(data, "CopyInResponse")?)
        }
        backend_type::COPY_OUT_RESPONSE => {
            BackendMessage::CopyOutResponse(parse_copy_format(data, "CopyOutResponse")?)
        }
        backend_type::COPY_BOTH_RESPONSE => {
            BackendMessage::CopyBothResponse(parse_copy_format(data, "CopyBothResponse")?)
        }
        backend_type::COPY_DATA => BackendMessage::CopyData(data.to_vec()),
        backend_type::COPY_DONE => empty(data, "CopyDone", BackendMessage::CopyDone)?,
        backend_type::FUNCTION_CALL_RESPONSE => {
            let mut p = Payload::new(data, "FunctionCallResponse");
            let value = p.nullable()?;
            p.finish()?;
            BackendMessage::FunctionCallResponse(value)
        }
        backend_type::NEGOTIATE_PROTOCOL_VERSION => {
            let mut p = Payload::new(data, "NegotiateProtocolVersion");
            let newest_minor = p.i32()?;
            let count = p.i32()?;
            if count < 0 {
                return Err(p.error(format!("negative option count {count}")));
            }
            let unrecognized = (0..count).map(|_| p.cstr()).collect::<Result<_, _>>()?;
            p.finish()?;
            BackendMessage::NegotiateProtocolVersion {
                newest_minor,
                unrecognized,
            }
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(msg)
}

fn parse_authentication(data: &[u8]) -> Result<BackendMessage, DecodeError> {
    let mut p = Payload::new(data, "Authentication");
    let code = p.i32()?;
    let msg = match code {
        auth_code::OK => {
            p.message = "AuthenticationOk";
            p.finish()?;
            BackendMessage::AuthenticationOk
        }
        auth_code::CLEARTEXT_PASSWORD => {
            p.message = "AuthenticationCleartextPassword";
            p.finish()?;
            BackendMessage::AuthenticationCleartextPassword
        }
        auth_code::MD5_PASSWORD => {
            p.message = "AuthenticationMD5Password";
            let salt = p.bytes(4)?;
            p.finish()?;
            BackendMessage::AuthenticationMd5Password([salt[0], salt[1], salt[2], salt[3]])
        }
        auth_code::SASL => {
            p.message = "AuthenticationSASL";
            let mut mechanisms = Vec::new();
            loop {
                let mechanism = p.cstr()?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            p.finish()?;
            BackendMessage::AuthenticationSasl(mechanisms)
        }
        auth_code::SASL_CONTINUE => BackendMessage::AuthenticationSaslContinue(p.rest().to_vec()),
        auth_code::SASL_FINAL => BackendMessage::AuthenticationSaslFinal(p.rest().to_vec()),
        other => return Err(p.error(format!("unsupported authentication code {other}"))),
    };
    Ok(msg)
}

fn parse_copy_format(data: &[u8], message: &'static str) -> Result<CopyFormat, DecodeError> {
    let mut p = Payload::new(data, message);
    let overall = p.u8()? as i8;
    let column_formats = p.i16_array()?;
    p.finish()?;
    Ok(CopyFormat {
        overall,
        column_formats,
    })
}

fn parse_error_fields(data: &[u8], message: &'static str) -> Result<ErrorFields, DecodeError> {
    let mut p = Payload::new(data, message);
    let mut fields = ErrorFields::default();
    let (mut severity, mut code, mut text) = (None, None, None);

    loop {
        let field = p.u8()?;
        if field == 0 {
            break;
        }
        let value = p.cstr()?;
        match field {
            error_field::SEVERITY => severity = Some(value),
            error_field::SEVERITY_NONLOCALIZED => fields.severity_nonlocalized = Some(value),
            error_field::CODE => code = Some(value),
            error_field::MESSAGE => text = Some(value),
            error_field::DETAIL => fields.detail = Some(value),
            error_field::HINT => fields.hint = Some(value),
            error_field::POSITION => fields.position = Some(p.parse_position(&value)?),
            error_field::INTERNAL_POSITION => {
                fields.internal_position = Some(p.parse_position(&value)?);
            }
            error_field::INTERNAL_QUERY => fields.internal_query = Some(value),
            error_field::WHERE => fields.where_ = Some(value),
            error_field::SCHEMA => fields.schema = Some(value),
            error_field::TABLE => fields.table = Some(value),
            error_field::COLUMN => fields.column = Some(value),
            error_field::DATA_TYPE => fields.data_type = Some(value),
            error_field::CONSTRAINT => fields.constraint = Some(value),
            error_field::FILE => fields.file = Some(value),
            error_field::LINE => fields.line = Some(value),
            error_field::ROUTINE => fields.routine = Some(value),
            // Frontends must ignore field types they do not recognize.
            _ => {}
        }
    }
    p.finish()?;

    fields.severity = severity.ok_or_else(|| p.error("missing severity field"))?;
    fields.code = code.ok_or_else(|| p.error("missing SQLSTATE field"))?;
    fields.message = text.ok_or_else(|| p.error("missing message field"))?;
    Ok(fields)
}

fn empty<T>(data: &[u8], message: &'static str, msg: T) -> Result<T, DecodeError> {
    Payload::new(data, message).finish()?;
    Ok(msg)
}

/// Positional reader over one frame's payload. Errors name the variant
/// being parsed.
struct Payload<'a> {
    data: &'a [u8],
    pos: usize,
    message: &'static str,
}

impl<'a> Payload<'a> {
    fn new(data: &'a [u8], message: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            message,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::malformed(self.message, reason)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.data.len() - self.pos;
        if remaining < len {
            return Err(self.error(format!(
                "needed {len} bytes at offset {}, only {remaining} left",
                self.pos
            )));
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        let b = self.bytes(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Int16 element count; negative counts are malformed.
    fn count(&mut self) -> Result<usize, DecodeError> {
        let count = self.i16()?;
        if count < 0 {
            return Err(self.error(format!("negative count {count}")));
        }
        Ok(count as usize)
    }

    fn i16_array(&mut self) -> Result<Vec<i16>, DecodeError> {
        let count = self.count()?;
        (0..count).map(|_| self.i16()).collect()
    }

    /// Int32 length followed by that many bytes; -1 is NULL.
    fn nullable(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        match self.i32()? {
            -1 => Ok(None),
            len if len < 0 => Err(self.error(format!("invalid value length {len}"))),
            len => Ok(Some(self.bytes(len as usize)?.to_vec())),
        }
    }

    /// Null-terminated UTF-8 string; the terminator must lie inside the frame.
    fn cstr(&mut self) -> Result<String, DecodeError> {
        let data = self.data;
        let rest = &data[self.pos..];
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(self.error(format!("unterminated string at offset {}", self.pos)));
        };
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| self.error(format!("invalid UTF-8: {e}")))?
            .to_string();
        self.pos += end + 1;
        Ok(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        let data = self.data;
        let rest = &data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    fn parse_position(&self, value: &str) -> Result<i32, DecodeError> {
        value
            .parse()
            .map_err(|_| self.error(format!("invalid position {value:?}")))
    }

    /// The declared length must match the fields exactly.
    fn finish(&self) -> Result<(), DecodeError> {
        let trailing = self.data.len() - self.pos;
        if trailing == 0 {
            Ok(())
        } else {
            Err(self.error(format!("{trailing} trailing bytes")))
        }
    }
}

/// Streaming decoder for backend messages.
///
/// Bytes are appended with [`feed`](Self::feed); complete frames are decoded
/// lazily by [`next_message`](Self::next_message). After a decode error the
/// reader is poisoned: byte offsets can no longer be trusted, so every later
/// call reports the same error.
#[derive(Debug)]
pub struct MessageReader {
    buf: Vec<u8>,
    /// Start of undecoded data within `buf`
    pos: usize,
    max_message_size: usize,
    poisoned: Option<DecodeError>,
}

impl Default for MessageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReader {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(8192),
            pos: 0,
            max_message_size,
            poisoned: None,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        // Reclaim consumed space before growing.
        if self.pos > 0 && self.pos >= self.buf.len() / 2 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Decode the next complete message, if one is fully buffered.
    pub fn next_message(&mut self) -> Result<Option<BackendMessage>, DecodeError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        match decode_backend_with_limit(&self.buf[self.pos..], self.max_message_size) {
            Ok(Some((msg, consumed))) => {
                self.pos += consumed;
                if self.pos == self.buf.len() {
                    self.buf.clear();
                    self.pos = 0;
                }
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                tracing::warn!(error = %err, "Backend stream is no longer decodable");
                self.poisoned = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Lazy iterator over the messages currently buffered.
    ///
    /// Ends when the next frame is incomplete; yields at most one error.
    pub fn messages(&mut self) -> Messages<'_> {
        Messages {
            reader: self,
            done: false,
        }
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}

/// Iterator returned by [`MessageReader::messages`].
#[derive(Debug)]
pub struct Messages<'a> {
    reader: &'a mut MessageReader,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<BackendMessage, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_message() {
            Ok(Some(msg)) => Some(Ok(msg)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for Messages<'_> {}

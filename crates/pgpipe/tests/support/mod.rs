//! In-process PostgreSQL server for driving `PgClient` without a socket.
//!
//! The server decodes every frame the client writes, asks a handler for the
//! replies and queues them as bytes for the client to read back, optionally
//! in small chunks.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;

use asupersync::Outcome;

use pgpipe::protocol::{decode_frontend, decode_startup};
use pgpipe::{
    BackendMessage, Error, ErrorFields, FrontendMessage, MessageWriter, TransactionStatus,
    Transport,
};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Ok(_) => panic!("expected an error"),
        Outcome::Err(e) => e,
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// What the server does in answer to one frontend message.
#[derive(Debug, Clone)]
pub enum Reply {
    Message(BackendMessage),
    /// Bytes sent verbatim, for unframed or malformed output
    Raw(Vec<u8>),
    /// Close the connection once everything queued has been read
    Close,
}

type Handler = Box<dyn FnMut(&FrontendMessage) -> Vec<Reply> + Send>;

pub struct ScriptedServer {
    handler: Handler,
    started: bool,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    closing: bool,
    chunk: usize,
    writer: MessageWriter,
    pub received: Vec<FrontendMessage>,
    pub reads: usize,
    pub flushes: usize,
}

impl ScriptedServer {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&FrontendMessage) -> Vec<Reply> + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
            started: false,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            closing: false,
            chunk: usize::MAX,
            writer: MessageWriter::new(),
            received: Vec::new(),
            reads: 0,
            flushes: 0,
        }
    }

    /// Hand the client at most `chunk` bytes per read.
    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn queries(&self) -> Vec<&str> {
        self.received
            .iter()
            .filter_map(|msg| match msg {
                FrontendMessage::Query(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    fn receive(&mut self, data: &[u8]) -> io::Result<()> {
        self.inbound.extend_from_slice(data);
        loop {
            let decoded = if self.started {
                decode_frontend(&self.inbound)
            } else {
                decode_startup(&self.inbound)
            };
            let (msg, used) = match decoded {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            };
            self.inbound.drain(..used);
            if matches!(msg, FrontendMessage::Startup { .. }) {
                self.started = true;
            }

            for reply in (self.handler)(&msg) {
                match reply {
                    Reply::Message(m) => self.outbound.extend(self.writer.write_backend(&m)),
                    Reply::Raw(bytes) => self.outbound.extend(bytes),
                    Reply::Close => self.closing = true,
                }
            }
            self.received.push(msg);
        }
    }
}

impl Transport for ScriptedServer {
    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.outbound.is_empty() {
            if self.closing {
                return Ok(0);
            }
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted server has nothing to send",
            ));
        }
        let n = buf.len().min(self.chunk).min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.receive(buf)
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

// ==================== Replies ====================

pub fn msg(m: BackendMessage) -> Reply {
    Reply::Message(m)
}

pub fn ready() -> BackendMessage {
    BackendMessage::ReadyForQuery(TransactionStatus::Idle)
}

pub fn status(name: &str, value: &str) -> BackendMessage {
    BackendMessage::ParameterStatus {
        name: name.to_string(),
        value: value.to_string(),
    }
}

pub fn complete(tag: &str) -> BackendMessage {
    BackendMessage::CommandComplete(tag.to_string())
}

pub fn row(value: &str) -> BackendMessage {
    BackendMessage::DataRow(vec![Some(value.as_bytes().to_vec())])
}

pub fn error(severity: &str, code: &str, message: &str) -> BackendMessage {
    BackendMessage::ErrorResponse(ErrorFields::new(severity, code, message))
}

/// Server with trust authentication and a tiny query language:
/// `SELECT <n>` returns one row, `FAIL <code>` raises an error, anything
/// else completes with no rows.
pub fn trust_server() -> ScriptedServer {
    ScriptedServer::new(|m| match m {
        FrontendMessage::SslRequest => vec![Reply::Raw(vec![b'N'])],
        FrontendMessage::Startup { .. } => vec![
            msg_ok(),
            msg(status("server_version", "16.2")),
            msg(status("client_encoding", "UTF8")),
            msg(BackendMessage::BackendKeyData {
                process_id: 4242,
                secret_key: 9001,
            }),
            msg(ready()),
        ],
        FrontendMessage::Query(sql) => answer(sql),
        FrontendMessage::Terminate => vec![Reply::Close],
        _ => Vec::new(),
    })
}

fn msg_ok() -> Reply {
    msg(BackendMessage::AuthenticationOk)
}

fn answer(sql: &str) -> Vec<Reply> {
    if let Some(n) = sql.strip_prefix("SELECT ") {
        vec![
            msg(row(n)),
            msg(complete("SELECT 1")),
            msg(ready()),
        ]
    } else if let Some(code) = sql.strip_prefix("FAIL ") {
        vec![msg(error("ERROR", code, "requested failure")), msg(ready())]
    } else {
        vec![msg(complete(sql)), msg(ready())]
    }
}

//! Pipelined PostgreSQL client.
//!
//! [`PgClient`] wires a [`Transport`] through the streaming decoder into the
//! [`Correlator`], and the correlator's output through the
//! [`MessageEncoder`] back to the transport. Callers submit exchanges and
//! await them; any number of exchanges may be in flight at once, and each
//! one receives exactly the responses the server sent for it.
//!
//! All I/O happens inside [`PgClient::wait`]. Enqueueing is synchronous and
//! never touches the socket.

// The Error type is intentionally large to carry full context
#![allow(clippy::result_large_err)]

use std::collections::HashMap;

use pgpipe_core::error::{ConnectionError, ConnectionErrorKind, Error, ServerError};
use pgpipe_core::protocol::{
    BackendMessage, FrontendMessage, MessageReader, MessageWriter, PROTOCOL_VERSION, SslResponse,
    TransactionStatus, decode_ssl_response,
};
use pgpipe_core::{Cx, Outcome};

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Exchange, ExchangeHandle};
use crate::encoder::MessageEncoder;
use crate::transport::{TcpTransport, Transport};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, nothing sent yet
    Connecting,
    /// Startup packet sent, waiting for the first ReadyForQuery
    Authenticating,
    /// Ready for queries, with the last reported transaction status
    Ready(TransactionStatus),
    /// The pipeline failed; every later exchange fails immediately
    Error,
    /// Closed by the client
    Closed,
}

/// Pipelined PostgreSQL client over a transport `T`.
pub struct PgClient<T: Transport> {
    transport: T,
    reader: MessageReader,
    correlator: Correlator<MessageEncoder>,
    read_buf: Vec<u8>,
    config: ClientConfig,
    state: ConnectionState,
    process_id: i32,
    secret_key: i32,
    has_key_data: bool,
    parameters: HashMap<String, String>,
    transaction_status: TransactionStatus,
}

impl<T: Transport> std::fmt::Debug for PgClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgClient")
            .field("state", &self.state)
            .field("process_id", &self.process_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

impl PgClient<TcpTransport> {
    /// Connect over TCP, apply the SSL policy and run startup.
    #[tracing::instrument(level = "debug", skip(cx, config), fields(host = %config.host, port = config.port))]
    pub async fn connect(cx: &Cx, config: &ClientConfig) -> Outcome<Self, Error> {
        if let Err(e) = config.validate() {
            return Outcome::Err(Error::Config(e));
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let transport = match TcpTransport::connect(config).await {
            Ok(t) => t,
            Err(e) => return Outcome::Err(e),
        };
        let mut client = PgClient::with_config(transport, config.clone());

        if config.ssl_mode.should_try_ssl() {
            let response = match client.negotiate_ssl(cx).await {
                Outcome::Ok(r) => r,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match response {
                SslResponse::Supported => {
                    if let Err(e) = client.transport.upgrade_tls(&config.host).await {
                        client.state = ConnectionState::Error;
                        return Outcome::Err(e);
                    }
                }
                SslResponse::NotSupported if config.ssl_mode.is_required() => {
                    return Outcome::Err(Error::connection(
                        ConnectionErrorKind::Ssl,
                        "Server does not support SSL",
                    ));
                }
                SslResponse::NotSupported => {
                    tracing::debug!("Server declined SSL; continuing in plaintext");
                }
            }
        }

        match client.startup(cx, config.startup_params()).await {
            Outcome::Ok(_) => Outcome::Ok(client),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<T: Transport> PgClient<T> {
    /// Wrap an already-open transport. Nothing is sent until the first
    /// exchange is awaited.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Wrap an open transport, remembering the configuration it was opened
    /// with (used for SSL host names and cancel requests).
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            reader: MessageReader::new(),
            correlator: Correlator::new(MessageEncoder::new()),
            read_buf: vec![0u8; 8192],
            config,
            state: ConnectionState::Connecting,
            process_id: 0,
            secret_key: 0,
            has_key_data: false,
            parameters: HashMap::new(),
            transaction_status: TransactionStatus::Idle,
        }
    }

    // ==================== Exchanges ====================

    /// Send one message and collect every response up to `ReadyForQuery`.
    ///
    /// An `ErrorResponse` fails the call with a [`ServerError`] carrying the
    /// responses collected so far; the `ReadyForQuery` that follows it is
    /// consumed and not seen by the next exchange.
    #[tracing::instrument(level = "debug", skip(self, cx, msg), fields(message = msg.name()))]
    pub async fn send(
        &mut self,
        cx: &Cx,
        msg: FrontendMessage,
    ) -> Outcome<Vec<BackendMessage>, Error> {
        let mut handle = self.submit(Exchange::until_ready(vec![msg]));
        self.wait(cx, &mut handle).await
    }

    /// Run a simple query.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn simple_query(
        &mut self,
        cx: &Cx,
        sql: &str,
    ) -> Outcome<Vec<BackendMessage>, Error> {
        self.send(cx, FrontendMessage::Query(sql.to_string())).await
    }

    /// Start a session as `username`, accepting only trust authentication.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn authenticate(&mut self, cx: &Cx, username: &str) -> Outcome<(), Error> {
        let params = vec![("user".to_string(), username.to_string())];
        match self.startup(cx, params).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Send a protocol 3.0 startup packet with `params` and collect the
    /// responses up to the first `ReadyForQuery`.
    ///
    /// Any authentication request other than `AuthenticationOk` fails with a
    /// `Connection/Authentication` error and closes the pipeline, since the
    /// server would wait for a password that never comes.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn startup(
        &mut self,
        cx: &Cx,
        params: Vec<(String, String)>,
    ) -> Outcome<Vec<BackendMessage>, Error> {
        self.state = ConnectionState::Authenticating;
        let startup = FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params,
        };
        let exchange = Exchange::new(vec![startup], startup_response)
            .settle_on(|msg| matches!(msg, BackendMessage::ReadyForQuery(_)));
        let mut handle = self.submit(exchange);

        match self.wait(cx, &mut handle).await {
            Outcome::Ok(responses) => {
                tracing::debug!(
                    process_id = self.process_id,
                    parameters = self.parameters.len(),
                    "Startup complete"
                );
                Outcome::Ok(responses)
            }
            Outcome::Err(e) => {
                if e.is_connection_error() {
                    let message = e.to_string();
                    self.fail_pipeline(|| {
                        Error::connection(ConnectionErrorKind::Disconnected, message.clone())
                    });
                }
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Queue `messages` as one exchange completed by `on_input`.
    ///
    /// Nothing is written until [`wait`](Self::wait) runs.
    pub fn enqueue<F>(&mut self, messages: Vec<FrontendMessage>, on_input: F) -> ExchangeHandle
    where
        F: FnMut(&BackendMessage) -> Result<bool, Error> + Send + 'static,
    {
        self.correlator.enqueue(messages, on_input)
    }

    /// Queue a prepared [`Exchange`].
    pub fn submit(&mut self, exchange: Exchange) -> ExchangeHandle {
        self.correlator.submit(exchange)
    }

    /// Drive the pipeline until `handle` resolves.
    ///
    /// Earlier exchanges are resolved along the way. If `cx` is cancelled the
    /// exchange stays registered: its responses are still consumed by later
    /// waits so they cannot be attributed to another exchange, and its result
    /// lands in `handle` for a later `wait` or [`ExchangeHandle::try_take`].
    pub async fn wait(
        &mut self,
        cx: &Cx,
        handle: &mut ExchangeHandle,
    ) -> Outcome<Vec<BackendMessage>, Error> {
        loop {
            if let Some(result) = handle.try_take() {
                return match result {
                    Ok(responses) => Outcome::Ok(responses),
                    Err(e) => Outcome::Err(e),
                };
            }

            if let Some(reason) = cx.cancel_reason() {
                tracing::debug!(
                    exchange = handle.id(),
                    "Wait cancelled; exchange stays registered"
                );
                return Outcome::Cancelled(reason);
            }

            // Everything queued is written before blocking on a read: the
            // server may hold its answer until it sees a later Sync.
            if let Err(e) = self.flush_output().await {
                let message = format!("Failed to write to server: {}", e);
                self.fail_pipeline(|| {
                    Error::connection(ConnectionErrorKind::Disconnected, message.clone())
                });
                continue;
            }

            if !self.correlator.wants_input() {
                return Outcome::Err(Error::protocol(format!(
                    "exchange {} cannot complete: no responses are expected",
                    handle.id()
                )));
            }

            self.pump_input().await;
        }
    }

    /// Check whether the server accepts SSL.
    ///
    /// Must be the first thing sent on the connection. The reply is a single
    /// unframed byte and is decoded outside the message reader.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn negotiate_ssl(&mut self, cx: &Cx) -> Outcome<SslResponse, Error> {
        if self.state != ConnectionState::Connecting
            || self.correlator.pending_exchanges() > 0
            || self.correlator.queued_output() > 0
            || self.correlator.sink().buffered() > 0
            || self.reader.buffered_len() > 0
        {
            return Outcome::Err(Error::protocol(
                "SSL negotiation must precede every other message",
            ));
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        self.correlator.sink_mut().encode(&FrontendMessage::SslRequest);
        if let Err(e) = self.flush_output().await {
            self.state = ConnectionState::Error;
            return Outcome::Err(ssl_error(format!("Failed to send SSL request: {}", e), e));
        }

        let n = match self.transport.read_some(&mut self.read_buf).await {
            Ok(0) => {
                self.state = ConnectionState::Error;
                return Outcome::Err(Error::connection(
                    ConnectionErrorKind::Ssl,
                    "Connection closed during SSL negotiation",
                ));
            }
            Ok(n) => n,
            Err(e) => {
                self.state = ConnectionState::Error;
                return Outcome::Err(ssl_error(format!("Failed to read SSL response: {}", e), e));
            }
        };

        let response = match decode_ssl_response(self.read_buf[0]) {
            Ok(r) => r,
            Err(e) => {
                self.state = ConnectionState::Error;
                return Outcome::Err(Error::from(e));
            }
        };

        let extra = &self.read_buf[1..n];
        if !extra.is_empty() {
            if response == SslResponse::Supported {
                self.state = ConnectionState::Error;
                return Outcome::Err(Error::connection(
                    ConnectionErrorKind::Ssl,
                    "Server sent unencrypted data after accepting SSL",
                ));
            }
            if let Err(e) = self.reader.feed(extra) {
                return Outcome::Err(Error::from(e));
            }
        }

        tracing::debug!(?response, "SSL negotiation answered");
        Outcome::Ok(response)
    }

    /// Send `Terminate` and close the pipeline.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn close(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        if self.state == ConnectionState::Closed {
            return Outcome::Ok(());
        }

        let flushed = if self.correlator.is_closed() {
            Ok(())
        } else {
            self.correlator.sink_mut().encode(&FrontendMessage::Terminate);
            self.flush_output().await
        };

        self.correlator.fail_all(|| {
            Error::connection(ConnectionErrorKind::Disconnected, "connection closed by client")
        });
        self.state = ConnectionState::Closed;

        match flushed {
            Ok(()) => Outcome::Ok(()),
            Err(e) => Outcome::Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: format!("Failed to send Terminate: {}", e),
                source: Some(Box::new(e)),
                responses: Vec::new(),
            })),
        }
    }

    /// A token for cancelling the running query from another connection.
    ///
    /// Available once the server has sent `BackendKeyData`.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.has_key_data.then(|| CancelToken {
            config: self.config.clone(),
            process_id: self.process_id,
            secret_key: self.secret_key,
        })
    }

    // ==================== Session ====================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Exchanges submitted but not yet resolved.
    pub fn pending_exchanges(&self) -> usize {
        self.correlator.pending_exchanges()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ==================== I/O ====================

    /// Release queued output under the encoder's high-water mark and write
    /// it out, until nothing is queued.
    async fn flush_output(&mut self) -> std::io::Result<()> {
        let mut wrote = false;
        loop {
            while self.correlator.sink().has_capacity() && self.correlator.queued_output() > 0 {
                self.correlator.request(1);
            }
            let bytes = self.correlator.sink_mut().take();
            if bytes.is_empty() {
                break;
            }
            self.transport.write_all(&bytes).await?;
            tracing::trace!(bytes = bytes.len(), "Wrote frontend bytes");
            wrote = true;
        }
        if wrote {
            self.transport.flush().await?;
        }
        Ok(())
    }

    /// Hand exactly one backend message to the correlator, reading from the
    /// transport only if no complete frame is buffered. Failures close the
    /// pipeline.
    async fn pump_input(&mut self) {
        loop {
            match self.reader.next_message() {
                Ok(Some(msg)) => {
                    self.deliver(msg);
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    self.fail_pipeline(|| Error::from(e.clone()));
                    return;
                }
            }

            match self.transport.read_some(&mut self.read_buf).await {
                Ok(0) => {
                    self.fail_pipeline(|| {
                        Error::connection(
                            ConnectionErrorKind::Disconnected,
                            "Connection closed by server",
                        )
                    });
                    return;
                }
                Ok(n) => {
                    if let Err(e) = self.reader.feed(&self.read_buf[..n]) {
                        self.fail_pipeline(|| Error::from(e.clone()));
                        return;
                    }
                }
                Err(e) => {
                    let kind = match e.kind() {
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                            ConnectionErrorKind::Timeout
                        }
                        _ => ConnectionErrorKind::Disconnected,
                    };
                    let message = format!("Failed to read from server: {}", e);
                    self.fail_pipeline(|| Error::connection(kind, message.clone()));
                    return;
                }
            }
        }
    }

    fn deliver(&mut self, msg: BackendMessage) {
        self.observe(&msg);
        if let Err(e) = self.correlator.on_input(msg) {
            self.state = ConnectionState::Error;
            tracing::warn!(error = %e, "Backend message could not be routed");
        }
    }

    /// Session bookkeeping, applied to every message in arrival order.
    fn observe(&mut self, msg: &BackendMessage) {
        match msg {
            BackendMessage::ParameterStatus { name, value } => {
                tracing::trace!(name = %name, value = %value, "Parameter status");
                self.parameters.insert(name.clone(), value.clone());
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                self.process_id = *process_id;
                self.secret_key = *secret_key;
                self.has_key_data = true;
            }
            BackendMessage::ReadyForQuery(status) => {
                self.transaction_status = *status;
                if self.state != ConnectionState::Error {
                    self.state = ConnectionState::Ready(*status);
                }
            }
            BackendMessage::ErrorResponse(fields) if fields.is_fatal() => {
                tracing::warn!(
                    code = %fields.code,
                    message = %fields.message,
                    "Server reported a fatal error"
                );
                self.state = ConnectionState::Error;
            }
            BackendMessage::NoticeResponse(fields) => {
                tracing::debug!(code = %fields.code, message = %fields.message, "Server notice");
            }
            _ => {}
        }
    }

    fn fail_pipeline(&mut self, make_error: impl FnMut() -> Error) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Error;
        }
        self.correlator.fail_all(make_error);
    }
}

/// Completion predicate for the startup exchange.
fn startup_response(msg: &BackendMessage) -> Result<bool, Error> {
    match msg {
        BackendMessage::ReadyForQuery(_) => Ok(true),
        BackendMessage::ErrorResponse(fields) => {
            Err(Error::Server(ServerError::from_fields(fields.clone())))
        }
        BackendMessage::AuthenticationCleartextPassword
        | BackendMessage::AuthenticationMd5Password(_)
        | BackendMessage::AuthenticationSasl(_)
        | BackendMessage::AuthenticationSaslContinue(_)
        | BackendMessage::AuthenticationSaslFinal(_) => Err(Error::connection(
            ConnectionErrorKind::Authentication,
            format!("unsupported authentication method: {}", msg.name()),
        )),
        _ => Ok(false),
    }
}

fn ssl_error(message: String, source: std::io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Ssl,
        message,
        source: Some(Box::new(source)),
        responses: Vec::new(),
    })
}

/// Everything needed to cancel a running query on the session it came from.
#[derive(Debug, Clone)]
pub struct CancelToken {
    config: ClientConfig,
    process_id: i32,
    secret_key: i32,
}

impl CancelToken {
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    /// Open a side connection and ask the server to cancel the session's
    /// current query. The server does not reply; success means the request
    /// was delivered, not that anything was cancelled.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(process_id = self.process_id))]
    pub async fn cancel(&self, cx: &Cx) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let mut transport = match TcpTransport::connect(&self.config).await {
            Ok(t) => t,
            Err(e) => return Outcome::Err(e),
        };
        match self.send_on(&mut transport).await {
            Ok(()) => Outcome::Ok(()),
            Err(e) => Outcome::Err(e),
        }
    }

    /// Write the CancelRequest packet on an already-open transport.
    pub async fn send_on<T: Transport>(&self, transport: &mut T) -> Result<(), Error> {
        let mut writer = MessageWriter::new();
        let packet = writer.write(&FrontendMessage::CancelRequest {
            process_id: self.process_id,
            secret_key: self.secret_key,
        });
        transport.write_all(packet).await?;
        transport.flush().await?;
        tracing::debug!(process_id = self.process_id, "Cancel request sent");
        Ok(())
    }
}

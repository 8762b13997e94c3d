//! Byte transport under the pipeline.
//!
//! The client never touches sockets directly. It reads and writes through a
//! [`Transport`], which owns the connection's lifecycle and any timeouts.
//! [`TcpTransport`] is the production implementation on asupersync's TCP
//! stream; tests substitute an in-process server.

// Allow `impl Future` return types in trait methods - intentional for async trait compat
#![allow(clippy::manual_async_fn)]
// The Error type is intentionally large to carry full context
#![allow(clippy::result_large_err)]

use std::future::Future;
use std::io;

use asupersync::io::{AsyncRead, AsyncWrite, ReadBuf};
use asupersync::net::TcpStream;

use pgpipe_core::error::{ConnectionError, ConnectionErrorKind, Error};

use crate::config::ClientConfig;

/// A byte-oriented duplex stream.
pub trait Transport: Send {
    /// Read whatever is available into `buf`. `Ok(0)` means end of stream.
    fn read_some(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Switch the stream to TLS after the server accepted an SSLRequest.
    fn upgrade_tls(&mut self, host: &str) -> impl Future<Output = Result<(), Error>> + Send {
        let message = format!("server at {host} accepted SSL but this transport cannot upgrade");
        async move { Err(Error::connection(ConnectionErrorKind::Ssl, message)) }
    }
}

/// Plain TCP transport on asupersync's [`TcpStream`].
pub struct TcpTransport {
    stream: TcpStream,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport").finish_non_exhaustive()
    }
}

impl TcpTransport {
    /// Open a TCP connection to the configured host, honouring
    /// `connect_timeout`.
    ///
    /// Host names are resolved and every resolved address is tried in turn.
    pub async fn connect(config: &ClientConfig) -> Result<Self, Error> {
        let addr = config.socket_addr();
        let target = (config.host.clone(), config.port);

        let stream = TcpStream::connect_timeout(target, config.connect_timeout)
            .await
            .map_err(|e| {
                let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                Error::Connection(ConnectionError {
                    kind,
                    message: format!("Failed to connect to {}: {}", addr, e),
                    source: Some(Box::new(e)),
                    responses: Vec::new(),
                })
            })?;

        stream.set_nodelay(true).ok();
        tracing::debug!(addr = %addr, "TCP connection established");
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for TcpTransport {
    fn read_some(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        read_some_async(&mut self.stream, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        write_all_async(&mut self.stream, buf)
    }

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        flush_async(&mut self.stream)
    }
}

async fn read_some_async(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut read_buf = ReadBuf::new(buf);
    std::future::poll_fn(|cx| std::pin::Pin::new(&mut *stream).poll_read(cx, &mut read_buf))
        .await?;
    Ok(read_buf.filled().len())
}

async fn write_all_async(stream: &mut TcpStream, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let n = std::future::poll_fn(|cx| {
            std::pin::Pin::new(&mut *stream).poll_write(cx, &buf[written..])
        })
        .await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed"));
        }
        written += n;
    }
    Ok(())
}

async fn flush_async(stream: &mut TcpStream) -> io::Result<()> {
    std::future::poll_fn(|cx| std::pin::Pin::new(&mut *stream).poll_flush(cx)).await
}

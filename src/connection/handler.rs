//! Connection Handler Implementation
//!
//! This module contains the per-client loop:
//!
//! ```text
//! 1. Read bytes into the buffer
//!        │
//!        ▼
//! 2. Decode as many complete requests as the buffer holds
//!        │
//!        ▼
//! 3. For each one, in order: execute, write the reply, flush
//!        │
//!        ▼
//! 4. Back to 1 until EOF, a framing error, or an I/O error
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol, so one read may carry half a request or
//! several. Bytes accumulate in a `BytesMut` and are split off only once a
//! full request has been decoded from them.
//!
//! ## Ordering
//!
//! Replies are written and flushed before the next request in the buffer is
//! touched, so replies always come back in request order.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Connections closed because of a framing error
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request framing was broken
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The stream closed in the middle of a request
    #[error("unexpected end of stream ({buffered} bytes of a partial request)")]
    UnexpectedEof { buffered: usize },
}

/// Handles a single client connection.
///
/// Owns the stream; it is closed when the handler is dropped, on every
/// exit path.
pub struct ConnectionHandler<S> {
    /// The client stream, buffered on the write side
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    command_handler: CommandHandler,

    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Uses `parser` instead of the default one (e.g. a smaller size limit).
    pub fn with_parser(mut self, parser: RespParser) -> Self {
        self.parser = parser;
        self
    }

    /// Runs the connection until the client disconnects or an error occurs.
    ///
    /// A clean close between requests returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Protocol(e)) => {
                self.stats.protocol_error();
                warn!(client = %self.addr, error = %e, "Closing connection on protocol error");
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(args) = self.try_parse_command()? {
                let response = self.command_handler.execute(args);
                self.stats.command_processed();
                self.send_response(&response).await?;
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Attempts to decode a request from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((args, consumed)) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(args))
            }
            None => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    ///
    /// Returns `false` on a clean EOF.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Ok(false);
            }
            return Err(ConnectionError::UnexpectedEof {
                buffered: self.buffer.len(),
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes one reply and flushes it.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Serves one client connection to completion.
///
/// This is the single entry point the accept loop calls. Errors are logged
/// and swallowed here: nothing that happens on one connection reaches the
/// listener or any other connection.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
    info!(client = %addr, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_command;
    use crate::storage::StorageEngine;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn create_handler() -> (CommandHandler, Arc<ConnectionStats>) {
        let storage = Arc::new(StorageEngine::new());
        (CommandHandler::new(storage), Arc::new(ConnectionStats::new()))
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$5\r\nhel")
            .read(b"lo\r\n")
            .write(b"$5\r\nhello\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pipelined_replies_in_order() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .write(b"+OK\r\n$2\r\nv1\r\n$-1\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"*1\r\n$5\r\nHELLO\r\n")
            .write(b"-ERR unknown command 'HELLO'\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_length_mismatch_closes_connection() {
        let (handler, stats) = create_handler();
        // The PING after the broken request is never answered
        let mock = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$10\r\nname\r\n*1\r\n$4\r\nPING\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;

        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(ParseError::LengthMismatch {
                expected: 10,
                actual: 4
            }))
        ));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_replies_before_protocol_error_are_sent() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .read(b"PING\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(ParseError::MalformedArrayHeader(_)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_request() {
        let (handler, stats) = create_handler();
        let mock = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ConnectionError::UnexpectedEof { buffered: 13 })
        ));
    }

    #[tokio::test]
    async fn test_request_over_limit() {
        let (handler, stats) = create_handler();
        let mock = Builder::new().read(b"*1\r\n$64\r\n").build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, stats)
            .with_parser(RespParser::with_max_request_size(16))
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(ParseError::RequestTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_read_error_ends_connection() {
        let (handler, stats) = create_handler();
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), handler, Arc::clone(&stats))
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::IoError(_))));
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_handle_connection_swallows_errors() {
        let (handler, stats) = create_handler();
        let mock = Builder::new().read(b"garbage\r\n").build();

        handle_connection(mock, test_addr(), handler, Arc::clone(&stats)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_large_value_over_small_reads() {
        let (handler, stats) = create_handler();
        let (client, server) = tokio::io::duplex(4096);
        let server_task = tokio::spawn(handle_connection(server, test_addr(), handler, stats));

        let value = vec![b'x'; 4 * 1024 * 1024];
        let request = encode_command(&[&b"ECHO"[..], &value[..]]);
        let expected = RespValue::bulk_string(value).serialize();

        let (mut reader, mut writer) = tokio::io::split(client);
        let writer_task = tokio::spawn(async move {
            writer.write_all(&request).await.unwrap();
        });

        let mut reply = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(30), reader.read_exact(&mut reply))
            .await
            .expect("reply took too long")
            .unwrap();
        assert!(reply == expected);

        writer_task.await.unwrap();
        drop(reader);
        server_task.await.unwrap();
    }
}

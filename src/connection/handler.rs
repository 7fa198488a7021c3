//! Connection Loop
//!
//! Each accepted client is serviced by its own [`ConnectionLoop`], running
//! as an independent Tokio task. A connection carries exactly one message:
//! once the delimiter shows up the message is handed to the
//! [`MessageHandler`], the response is written, and the connection is
//! closed.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!    ┌──────────────────────────────┐
//!    │          Receiving           │
//!    │                              │
//!    │  read into scratch buffer ◄──┼──┐
//!    │  decode + append             │  │ no delimiter yet
//!    │  scan for delimiter ─────────┼──┘
//!    └──────┬──────────────┬────────┘
//!           │ found        │ EOF before delimiter
//!           ▼              │ (message dropped, logged)
//!    ┌──────────────┐      │
//!    │ Dispatching  │      │
//!    │ handler call │      │
//!    └──────┬───────┘      │
//!           ▼              │
//!    ┌──────────────┐      │
//!    │ Responding   │      │
//!    │ write + shut │      │
//!    └──────┬───────┘      │
//!           ▼              ▼
//!    ┌──────────────────────────────┐
//!    │            Closed            │
//!    └──────────────────────────────┘
//! ```
//!
//! Errors at any stage end this connection only; they are logged here and
//! never reach the accept loop.

use crate::connection::buffer::ConnectionBuffer;
use crate::message::MessageHandler;
use crate::protocol::{charset, Delimiter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Messages passed to the handler and answered
    pub messages_handled: AtomicU64,
    /// Connections closed by the peer before a delimiter arrived
    pub messages_dropped: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// Woken whenever the active connection count drops to zero
    idle: Notify,
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
        if self.active_connections.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Waits until no connection is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a close in between is not missed
            notified.as_mut().enable();

            if self.active_connections.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn message_handled(&self) {
        self.messages_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Keeps a connection counted as active until it is dropped, whether the
/// loop ran to completion or its task was cancelled part way.
#[derive(Debug)]
struct ActiveConnection(Arc<ConnectionStats>);

impl ActiveConnection {
    fn open(stats: Arc<ConnectionStats>) -> Self {
        stats.connection_opened();
        Self(stats)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

/// Where a connection is in its one-message lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Receiving,
    Dispatching,
    Responding,
    Closed,
}

/// How a connection that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The handler ran and its response (of `bytes` bytes) was written
    Responded { bytes: usize },

    /// The peer closed the connection before sending the delimiter.
    /// `buffered` bytes were received and discarded.
    Dropped { buffered: usize },
}

/// Errors that can occur while servicing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No bytes arrived within the configured read timeout
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// The handler panicked or its task was cancelled
    #[error("message handler failed: {0}")]
    HandlerFailed(String),
}

/// Services a single accepted connection.
///
/// Owns the stream and the [`ConnectionBuffer`] exclusively; nothing here is
/// shared with other connections except the atomic [`ConnectionStats`].
pub struct ConnectionLoop<S, H: ?Sized> {
    /// The client stream
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Received data
    buffer: ConnectionBuffer,

    /// End-of-message marker
    delimiter: Delimiter,

    /// Application handler (shared across connections)
    handler: Arc<H>,

    /// Per-read timeout; `None` waits forever
    read_timeout: Option<Duration>,

    /// Current lifecycle state
    state: ConnectionState,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Active-connection count held for this loop's lifetime
    _active: ActiveConnection,
}

impl<S, H> ConnectionLoop<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: MessageHandler + ?Sized,
{
    /// Creates a connection loop and counts the connection as open.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        handler: Arc<H>,
        delimiter: Delimiter,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream,
            addr,
            buffer: ConnectionBuffer::new(),
            delimiter,
            handler,
            read_timeout: None,
            state: ConnectionState::Receiving,
            _active: ActiveConnection::open(Arc::clone(&stats)),
            stats,
        }
    }

    /// Gives up on the connection if a single read waits longer than `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Runs the connection to completion and closes it.
    ///
    /// The result is informational: it has already been logged by the time
    /// this returns. The connection stops counting as active when the loop
    /// is dropped, which happens on return or if the task is cancelled.
    pub async fn run(mut self) -> Result<ConnectionOutcome, ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.serve().await;
        self.transition(ConnectionState::Closed);

        match &result {
            Ok(ConnectionOutcome::Responded { bytes }) => {
                debug!(client = %self.addr, bytes = *bytes, "Response sent, connection closed")
            }
            Ok(ConnectionOutcome::Dropped { buffered }) => {
                debug!(
                    client = %self.addr,
                    buffered = *buffered,
                    delimiter = %self.delimiter,
                    "Client disconnected before delimiter, message dropped"
                )
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    async fn serve(&mut self) -> Result<ConnectionOutcome, ConnectionError> {
        if !self.receive().await? {
            self.stats.message_dropped();
            return Ok(ConnectionOutcome::Dropped {
                buffered: self.buffer.len(),
            });
        }

        let message = self.buffer.take_message();

        self.transition(ConnectionState::Dispatching);
        let response = self.dispatch(message).await?;

        self.transition(ConnectionState::Responding);
        let bytes = self.respond(&response).await?;

        Ok(ConnectionOutcome::Responded { bytes })
    }

    /// Reads until the accumulated text contains the delimiter.
    ///
    /// Returns `false` if the peer closed the connection first.
    async fn receive(&mut self) -> Result<bool, ConnectionError> {
        loop {
            let n = self.read_chunk().await?;
            if n == 0 {
                return Ok(false);
            }

            self.buffer.commit(n);
            self.stats.bytes_read(n);
            trace!(
                client = %self.addr,
                bytes = n,
                buffered = self.buffer.len(),
                "Read data"
            );

            if self.buffer.contains_delimiter(&self.delimiter) {
                return Ok(true);
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<usize, ConnectionError> {
        let read = self.stream.read(self.buffer.scratch_mut());

        let n = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read)
                .await
                .map_err(|_| ConnectionError::ReadTimeout(timeout))??,
            None => read.await?,
        };

        Ok(n)
    }

    /// Calls the handler off the async worker threads.
    async fn dispatch(&mut self, message: String) -> Result<String, ConnectionError> {
        trace!(client = %self.addr, len = message.len(), "Dispatching message");

        let handler = Arc::clone(&self.handler);
        let response = tokio::task::spawn_blocking(move || handler.handle(&message))
            .await
            .map_err(|e| ConnectionError::HandlerFailed(e.to_string()))?;

        self.stats.message_handled();
        Ok(response)
    }

    /// Writes the response and shuts the stream down.
    async fn respond(&mut self, response: &str) -> Result<usize, ConnectionError> {
        let bytes = charset::encode(response);

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");

        self.stream.shutdown().await?;
        Ok(bytes.len())
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(client = %self.addr, from = ?self.state, to = ?next, "State change");
        self.state = next;
    }
}

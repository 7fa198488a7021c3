//! TCP Listener and Accept Loop
//!
//! The [`Listener`] owns the bound socket and the accept loop. Every accepted
//! connection is handed to a fresh [`ConnectionLoop`] on its own Tokio task
//! and then forgotten: the accept loop never waits on connection I/O.
//!
//! ```text
//!   start() ──> resolve host ──> bind ──> listen(backlog)
//!                                              │
//!              ┌───────────────────────────────┘
//!              ▼
//!        ┌───────────┐  accepted   ┌──────────────────────────┐
//!        │  accept   │────────────>│ tokio::spawn(            │
//!        │  (await)  │             │   ConnectionLoop::run()) │
//!        └─────┬─────┘<────────────└──────────────────────────┘
//!              │ stop()
//!              ▼
//!          loop exits, socket closed
//! ```
//!
//! Stopping only prevents new acceptances. Connections already accepted run
//! to completion on their own tasks.

use crate::connection::{ConnectionLoop, ConnectionStats};
use crate::message::MessageHandler;
use crate::protocol::{ConfigError, Delimiter};
use crate::server::config::ListenerConfig;
use std::io;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Errors that prevent the listener from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Host name lookup failed
    #[error("failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The host resolved, but not to any IPv4 address
    #[error("host {0} has no IPv4 address")]
    NoIpv4Address(String),

    /// The socket could not be created
    #[error("failed to create socket: {0}")]
    Socket(#[source] std::io::Error),

    /// Binding failed (address in use, permission denied, ...)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Switching the socket to listening mode failed
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Accepts connections and dispatches each one to a [`ConnectionLoop`].
///
/// # Example
///
/// ```ignore
/// use delimsrv::{EchoHandler, Listener};
/// use std::sync::Arc;
///
/// let mut listener = Listener::new(EchoHandler::new());
/// listener.configure(11000, "\n")?;
///
/// let listener = Arc::new(listener);
/// let server = Arc::clone(&listener);
/// tokio::spawn(async move { server.start().await });
///
/// // Later...
/// listener.stop();
/// ```
pub struct Listener<H> {
    /// Bind address, framing and timeouts
    config: ListenerConfig,

    /// Application handler shared by every connection
    handler: Arc<H>,

    /// True while the accept loop is running
    running: AtomicBool,

    /// Stop signal; `true` once `stop()` has been called
    stop_tx: watch::Sender<bool>,

    /// Connection statistics (shared with every connection)
    stats: Arc<ConnectionStats>,
}

impl<H: MessageHandler> Listener<H> {
    /// Creates a listener with the default configuration.
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, ListenerConfig::default())
    }

    /// Creates a listener with an explicit configuration.
    pub fn with_config(handler: H, config: ListenerConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            config,
            handler: Arc::new(handler),
            running: AtomicBool::new(false),
            stop_tx,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Sets the listening port and the message delimiter.
    ///
    /// Takes `&mut self`, so it cannot race with a running accept loop,
    /// which only ever borrows the listener shared.
    pub fn configure(&mut self, port: u16, delimiter: &str) -> Result<(), ConfigError> {
        self.config.delimiter = Delimiter::new(delimiter)?;
        self.config.port = port;
        Ok(())
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Returns the shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Returns true while the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the socket and accepts connections until [`stop`](Self::stop)
    /// is called.
    ///
    /// Returns an error if the socket cannot be set up; once listening, this
    /// only returns after a stop request.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Requests the accept loop to exit. Idempotent.
    ///
    /// Connections that have already been accepted are not interrupted.
    pub fn stop(&self) {
        let already_stopped = self.stop_tx.send_replace(true);
        if !already_stopped {
            info!("Stop requested, no new connections will be accepted");
        }
    }

    /// Resolves the configured host and binds a listening IPv4 socket.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.resolve().await?;

        let socket = TcpSocket::new_v4().map_err(ServerError::Socket)?;
        socket.set_reuseaddr(true).map_err(ServerError::Socket)?;
        socket
            .bind(addr)
            .map_err(|source| ServerError::Bind { addr, source })?;

        socket
            .listen(self.config.backlog)
            .map_err(|source| ServerError::Listen { addr, source })
    }

    /// Runs the accept loop on an already bound socket.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut stop_rx = self.stop_tx.subscribe();
        self.running.store(true, Ordering::SeqCst);

        match listener.local_addr() {
            Ok(addr) => info!(
                address = %addr,
                delimiter = %self.config.delimiter,
                backlog = self.config.backlog,
                "Listening"
            ),
            Err(e) => debug!(error = %e, "Listening (local address unavailable)"),
        }

        while !self.stop_requested() {
            tokio::select! {
                biased;

                _ = stop_rx.changed() => {}

                result = listener.accept() => {
                    if self.on_accept(result).is_break() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Listener stopped");
        Ok(())
    }

    /// Handles one accept result.
    ///
    /// Accept failures (e.g. out of file descriptors) are logged and the
    /// loop keeps going; they never end the listener. A connection that
    /// lands after a stop request is closed unserviced.
    fn on_accept(&self, result: io::Result<(TcpStream, SocketAddr)>) -> ControlFlow<()> {
        match result {
            Ok((stream, addr)) => {
                if self.stop_requested() {
                    debug!(client = %addr, "Stopping, connection refused");
                    return ControlFlow::Break(());
                }
                self.spawn_connection(stream, addr);
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
        ControlFlow::Continue(())
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn resolve(&self) -> Result<SocketAddr, ServerError> {
        let host = self.config.host_name();

        let mut addrs = tokio::net::lookup_host((host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Resolve {
                host: host.clone(),
                source,
            })?;

        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or(ServerError::NoIpv4Address(host.clone()))
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let connection = ConnectionLoop::new(
            stream,
            addr,
            Arc::clone(&self.handler),
            self.config.delimiter.clone(),
            Arc::clone(&self.stats),
        )
        .with_read_timeout(self.config.read_timeout);

        tokio::spawn(async move {
            // run() logs its own outcome
            let _ = connection.run().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;

    type EchoFn = Box<dyn Fn(&str) -> String + Send + Sync>;

    struct Counting {
        calls: Arc<AtomicUsize>,
        inner: EchoFn,
    }

    impl MessageHandler for Counting {
        fn handle(&self, message: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.inner)(message)
        }
    }

    fn echo() -> (Counting, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Counting {
            calls: Arc::clone(&calls),
            inner: Box::new(|m: &str| m.to_string()),
        };
        (handler, calls)
    }

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            host: Some("127.0.0.1".to_string()),
            port: 0,
            ..Default::default()
        }
    }

    async fn start_test_server<H: MessageHandler>(
        listener: Listener<H>,
    ) -> (
        Arc<Listener<H>>,
        SocketAddr,
        JoinHandle<Result<(), ServerError>>,
    ) {
        let listener = Arc::new(listener);
        let socket = listener.bind().await.unwrap();
        let addr = socket.local_addr().unwrap();

        let server = Arc::clone(&listener);
        let task = tokio::spawn(async move { server.serve(socket).await });

        (listener, addr, task)
    }

    async fn request(addr: SocketAddr, parts: &[&[u8]]) -> Vec<u8> {
        let mut client = TcpStream::connect(addr).await.unwrap();
        for part in parts {
            client.write_all(part).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (handler, calls) = echo();
        let (_listener, addr, _task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        let response = request(addr, &[b"hello;"]).await;

        assert_eq!(response, b"hello;");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_message_in_two_writes() {
        let (handler, calls) = echo();
        let (_listener, addr, _task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        let response = request(addr, &[b"he", b"llo;"]).await;

        assert_eq!(response, b"hello;");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configured_newline_delimiter() {
        let (handler, _) = echo();
        let mut listener = Listener::with_config(handler, test_config());
        listener.configure(0, "\n").unwrap();
        let (_listener, addr, _task) = start_test_server(listener).await;

        let response = request(addr, &[b"ping\n"]).await;

        assert_eq!(response, b"ping\n");
    }

    #[tokio::test]
    async fn test_partial_message_then_disconnect() {
        let (handler, calls) = echo();
        let (listener, addr, _task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"partial").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(response.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(listener.stats().messages_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_empty_response_closes_connection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Counting {
            calls: Arc::clone(&calls),
            inner: Box::new(|_: &str| String::new()),
        };
        let (_listener, addr, _task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        let response = request(addr, &[b"anything;"]).await;

        assert!(response.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let (handler, calls) = echo();
        let (_listener, addr, _task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        let mut clients = Vec::new();
        for i in 0..20 {
            clients.push(tokio::spawn(async move {
                let first = format!("client-{}-", i);
                let second = format!("{};", i * 7);
                let response = request(addr, &[first.as_bytes(), second.as_bytes()]).await;
                (format!("{}{}", first, second), response)
            }));
        }

        for client in clients {
            let (sent, response) = client.await.unwrap();
            assert_eq!(String::from_utf8(response).unwrap(), sent);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_connection_finish() {
        let (handler, calls) = echo();
        let (listener, addr, task) =
            start_test_server(Listener::with_config(handler, test_config())).await;

        // Accepted before the stop request, message not yet complete
        let mut in_flight = TcpStream::connect(addr).await.unwrap();
        in_flight.write_all(b"in-fl").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(listener.is_running());

        listener.stop();
        task.await.unwrap().unwrap();
        assert!(!listener.is_running());

        // No new connections once the accept loop is gone
        assert!(TcpStream::connect(addr).await.is_err());

        in_flight.write_all(b"ight;").await.unwrap();
        let mut response = Vec::new();
        in_flight.read_to_end(&mut response).await.unwrap();

        assert_eq!(response, b"in-flight;");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            listener.stats().connections_accepted.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handler, _) = echo();
        let listener = Listener::with_config(handler, test_config());

        listener.stop();
        listener.stop();

        // A stop issued before start makes start return once bound
        listener.start().await.unwrap();
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let (handler, _) = echo();
        let mut listener = Listener::with_config(handler, test_config());
        listener.configure(port, ";").unwrap();

        let result = listener.start().await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn test_ipv6_only_host_is_rejected() {
        let (handler, _) = echo();
        let config = ListenerConfig {
            host: Some("::1".to_string()),
            port: 0,
            ..Default::default()
        };
        let listener = Listener::with_config(handler, config);

        let result = listener.bind().await;
        assert!(matches!(result, Err(ServerError::NoIpv4Address(_))));
    }

    #[tokio::test]
    async fn test_accept_error_keeps_loop_running() {
        let (handler, _) = echo();
        let listener = Listener::with_config(handler, test_config());

        let result = Err(io::Error::from_raw_os_error(24)); // EMFILE
        assert_eq!(listener.on_accept(result), ControlFlow::Continue(()));
        assert_eq!(
            listener.stats().connections_accepted.load(Ordering::Relaxed),
            0
        );
    }

    #[tokio::test]
    async fn test_accept_after_stop_is_not_serviced() {
        let (handler, calls) = echo();
        let listener = Listener::with_config(handler, test_config());

        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(socket.local_addr().unwrap())
            .await
            .unwrap();
        let accepted = socket.accept().await;

        listener.stop();
        assert_eq!(listener.on_accept(accepted), ControlFlow::Break(()));

        // The server side is already closed, so either call may see a reset
        let _ = client.write_all(b"late;").await;
        let mut response = Vec::new();
        let _ = client.read_to_end(&mut response).await;

        assert!(response.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            listener.stats().connections_accepted.load(Ordering::Relaxed),
            0
        );
    }

    #[test]
    fn test_configure_rejects_unrepresentable_delimiter() {
        let (handler, _) = echo();
        let mut listener = Listener::new(handler);

        assert_eq!(
            listener.configure(11000, "\u{20ac}"),
            Err(ConfigError::Unrepresentable('\u{20ac}'))
        );
        assert_eq!(listener.config().delimiter.as_str(), ";");
    }

    #[test]
    fn test_configure_rejects_empty_delimiter() {
        let (handler, _) = echo();
        let mut listener = Listener::new(handler);

        assert_eq!(listener.configure(12000, ""), Err(ConfigError::EmptyDelimiter));
        // Nothing changed
        assert_eq!(listener.config().port, 11000);
        assert_eq!(listener.config().delimiter.as_str(), ";");

        listener.configure(12000, "END").unwrap();
        assert_eq!(listener.config().port, 12000);
        assert_eq!(listener.config().delimiter.as_str(), "END");
    }
}

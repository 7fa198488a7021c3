//! Listener Configuration

use crate::protocol::Delimiter;
use std::time::Duration;

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 11000;

/// Maximum number of pending, not yet accepted connections
pub const DEFAULT_BACKLOG: u32 = 100;

/// Settings for a [`Listener`](crate::server::Listener).
///
/// Fixed once the listener starts: changing any of these requires a new
/// listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Host name or address to bind; the first IPv4 address it resolves to
    /// is used. `None` means this machine's own host name.
    pub host: Option<String>,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// End-of-message marker
    pub delimiter: Delimiter,

    /// Listen backlog
    pub backlog: u32,

    /// Per-read timeout for client connections; `None` waits forever
    pub read_timeout: Option<Duration>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            delimiter: Delimiter::default(),
            backlog: DEFAULT_BACKLOG,
            read_timeout: None,
        }
    }
}

impl ListenerConfig {
    /// The host name that will be resolved at start.
    pub fn host_name(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => local_host_name(),
        }
    }

    /// Returns the `host:port` pair, for display
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host_name(), self.port)
    }
}

/// This machine's host name.
pub fn local_host_name() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

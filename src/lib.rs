//! # delimsrv - A Delimiter-Framed Request/Response TCP Server
//!
//! delimsrv accepts TCP connections, reads text until a configurable
//! delimiter appears, passes the message to an application-supplied
//! handler, writes the handler's response back, and closes the connection.
//! One request, one response, one connection.
//!
//! ## Features
//!
//! - **Pluggable Handler**: Any `Fn(&str) -> String` can answer messages
//! - **Arbitrary Delimiter**: Any non-empty string ends a message (default `;`)
//! - **Async I/O**: Built on Tokio, one lightweight task per connection
//! - **Graceful Stop**: Stopping refuses new clients but lets in-flight ones finish
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              delimsrv                               │
//! │                                                                     │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌──────────────────┐    │
//! │  │  Listener   │───>│  ConnectionLoop  │───>│  MessageHandler  │    │
//! │  │ (accept)    │    │  (one per client)│    │  (application)   │    │
//! │  └─────────────┘    └────────┬─────────┘    └──────────────────┘    │
//! │                              │                                      │
//! │                              ▼                                      │
//! │                     ┌──────────────────┐                            │
//! │                     │ ConnectionBuffer │                            │
//! │                     │ scratch + text   │                            │
//! │                     └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use delimsrv::Listener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut listener = Listener::new(|message: &str| message.to_uppercase());
//!     listener.configure(11000, "\n")?;
//!     listener.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Format
//!
//! Bytes are read as ISO-8859-1 text. The message is everything received up
//! to the end of the read in which the delimiter first shows up, including
//! any bytes after the delimiter in that same read. The response is written
//! in the same charset, then the connection is shut down.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Delimiter and single-byte charset
//! - [`connection`]: Per-connection buffer and state machine
//! - [`message`]: The handler capability
//! - [`server`]: Listener configuration and accept loop

pub mod connection;
pub mod message;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use connection::{ConnectionBuffer, ConnectionError, ConnectionLoop, ConnectionStats};
pub use message::{EchoHandler, MessageHandler};
pub use protocol::{ConfigError, Delimiter, DEFAULT_DELIMITER};
pub use server::{Listener, ListenerConfig, ServerError, DEFAULT_BACKLOG, DEFAULT_PORT};

/// Version of delimsrv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

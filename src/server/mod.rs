//! Server Module
//!
//! The listening side of the server: configuration and the accept loop.
//!
//! - `config`: [`ListenerConfig`], the default port and backlog, and the
//!   local host name lookup
//! - `listener`: [`Listener`], which binds, accepts and spawns one
//!   connection task per client

pub mod config;
pub mod listener;

pub use config::{local_host_name, ListenerConfig, DEFAULT_BACKLOG, DEFAULT_PORT};
pub use listener::{Listener, ServerError};

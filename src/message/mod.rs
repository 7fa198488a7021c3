//! Message Handling
//!
//! The pluggable application logic that turns a request message into a
//! response. See [`MessageHandler`].

pub mod handler;

pub use handler::{EchoHandler, MessageHandler};

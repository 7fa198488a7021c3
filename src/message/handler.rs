//! Message Handler Capability
//!
//! The server core never interprets message content. It hands each complete
//! message to a [`MessageHandler`] supplied by the embedding application and
//! writes back whatever text the handler returns.

use tracing::info;

/// Converts one decoded message into the response text.
///
/// Called exactly once for every connection that delivers a complete
/// message. The call runs on Tokio's blocking thread pool, so a slow
/// handler holds up only the connection that invoked it.
///
/// Any `Fn(&str) -> String` closure that is `Send + Sync` is a handler:
///
/// ```
/// use delimsrv::MessageHandler;
///
/// let upper = |input: &str| input.to_uppercase();
/// assert_eq!(upper.handle("ping;"), "PING;");
/// ```
pub trait MessageHandler: Send + Sync + 'static {
    /// Produces the response for `message`.
    fn handle(&self, message: &str) -> String;
}

impl<F> MessageHandler for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn handle(&self, message: &str) -> String {
        self(message)
    }
}

/// Logs each message and returns it unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MessageHandler for EchoHandler {
    fn handle(&self, message: &str) -> String {
        info!(message = %message.escape_debug(), "Received message");
        message.to_string()
    }
}

//! Wire Framing
//!
//! The protocol is deliberately tiny: a client sends text, the first
//! occurrence of the configured delimiter ends the message, the server sends
//! one response and closes the connection.
//!
//! ## Modules
//!
//! - `charset`: single-byte (ISO-8859-1) text codec for the wire
//! - `delimiter`: the validated end-of-message marker
//!
//! ## Example
//!
//! ```
//! use delimsrv::protocol::{charset, Delimiter};
//!
//! let delim = Delimiter::default();
//! let text = charset::decode(b"hello;");
//! assert_eq!(delim.find_in(&text), Some(5));
//!
//! let bytes = charset::encode(&text);
//! assert_eq!(&bytes[..], b"hello;");
//! ```

pub mod charset;
pub mod delimiter;

pub use delimiter::{ConfigError, Delimiter, DEFAULT_DELIMITER};

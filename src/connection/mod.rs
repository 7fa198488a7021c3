//! Connection Handling Module
//!
//! This module services individual client connections. Each accepted
//! connection is handled by its own async task, so a slow client or a slow
//! handler never holds up the accept loop or other clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Listener                             │
//! │                     (server module)                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionLoop                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Find delim  │───>│ Call handler│     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                   ┌──────────────────┐      │
//! │                                   │ Send resp, close │      │
//! │                                   └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: Fixed scratch array plus a growing text buffer
//! - **One Shot**: One message and one response per connection
//! - **Statistics**: Tracks connection and message metrics

pub mod buffer;
pub mod handler;

// Re-export commonly used types
pub use buffer::{ConnectionBuffer, RECEIVE_BUFFER_SIZE};
pub use handler::{ConnectionError, ConnectionLoop, ConnectionOutcome, ConnectionStats};

//! Chrome DevTools Protocol backend for the capture stage.
//!
//! [`CdpHost`] implements [`RenderHost`](crate::pipeline::capture::RenderHost)
//! on top of a single browser-level WebSocket: each surface is a fresh
//! target, each debugging session a flattened target session.

pub mod connection;
pub mod host;

pub use connection::{CdpConnection, EventSubscription};
pub use host::{BrowserSource, CdpHost, CdpSession, CdpSurface};

use thiserror::Error;

/// A failure talking to the browser.
#[derive(Debug, Clone, Error)]
pub enum CdpError {
    #[error("cannot connect to DevTools endpoint {0}")]
    Connect(String),

    #[error("DevTools endpoint discovery failed: {0}")]
    Discovery(String),

    /// The browser rejected a command.
    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("DevTools socket error: {0}")]
    Transport(String),

    #[error("DevTools connection closed")]
    Closed,

    /// A response lacked a field the caller needs.
    #[error("unexpected DevTools response: {0}")]
    Unexpected(String),
}

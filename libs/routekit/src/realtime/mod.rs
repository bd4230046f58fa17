//! Realtime transports: WebSocket and Server-Sent Events, mirrored into
//! an `AsyncAPI` 2.6 document.

pub mod asyncapi;
pub mod manager;
pub mod sse;
pub mod ws;

pub use asyncapi::{AsyncApiRegistryImpl, build_asyncapi};
pub use manager::ConnectionManager;
pub use sse::{SseConnection, SseMessage};
pub use ws::{WsConnection, WsSink, WsStream};

/// Failure surfaced by an embedding transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("transport failure: {0}")]
    Io(String),
}

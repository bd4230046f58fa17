//! Process-wide index of live realtime connections.
//!
//! Two maps (WebSocket, SSE), each behind its own reader/writer lock.
//! Broadcasts snapshot under the read lock and send outside it, so
//! registration and removal stay consistent with in-flight broadcasts. A
//! failed send evicts the connection: it is closed, unregistered, and
//! logged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::realtime::sse::{SseConnection, SseMessage};
use crate::realtime::ws::WsConnection;

#[derive(Default)]
pub struct ConnectionManager {
    ws: RwLock<HashMap<String, Arc<WsConnection>>>,
    sse: RwLock<HashMap<String, Arc<SseConnection>>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ws(&self, conn: Arc<WsConnection>) {
        self.ws.write().insert(conn.id().to_owned(), conn);
    }

    pub fn remove_ws(&self, id: &str) {
        self.ws.write().remove(id);
    }

    pub fn add_sse(&self, conn: Arc<SseConnection>) {
        self.sse.write().insert(conn.id().to_owned(), conn);
    }

    pub fn remove_sse(&self, id: &str) {
        self.sse.write().remove(id);
    }

    /// Snapshot of the live WebSocket connections.
    #[must_use]
    pub fn ws_connections(&self) -> Vec<Arc<WsConnection>> {
        self.ws.read().values().cloned().collect()
    }

    /// Snapshot of the live SSE connections.
    #[must_use]
    pub fn sse_connections(&self) -> Vec<Arc<SseConnection>> {
        self.sse.read().values().cloned().collect()
    }

    #[must_use]
    pub fn ws_count(&self) -> usize {
        self.ws.read().len()
    }

    #[must_use]
    pub fn sse_count(&self) -> usize {
        self.sse.read().len()
    }

    /// Send `value` to every WebSocket connection, best-effort; returns
    /// the number of successful deliveries. Failed connections are
    /// evicted.
    pub async fn broadcast_ws<T: Serialize>(&self, value: &T) -> usize {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "broadcast payload failed to serialize");
                return 0;
            }
        };

        let snapshot = self.ws_connections();
        let mut delivered = 0;
        for conn in snapshot {
            match conn.send_raw(&text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(connection = %conn.id(), error = %e, "broadcast send failed; evicting");
                    conn.close().await;
                    self.remove_ws(conn.id());
                }
            }
        }
        delivered
    }

    /// Send one record to every SSE connection, best-effort; failed
    /// connections are evicted.
    pub async fn broadcast_sse(&self, message: &SseMessage) -> usize {
        let snapshot = self.sse_connections();
        let mut delivered = 0;
        for conn in snapshot {
            match conn.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(connection = %conn.id(), error = %e, "broadcast send failed; evicting");
                    conn.close();
                    self.remove_sse(conn.id());
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("ws", &self.ws_count())
            .field("sse", &self.sse_count())
            .finish()
    }
}

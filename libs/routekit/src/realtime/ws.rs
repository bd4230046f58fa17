//! WebSocket connections and the typed per-frame pipeline.
//!
//! The core never performs the HTTP upgrade; the embedding server accepts
//! the socket and hands the core a sink/stream pair via
//! [`crate::Router::drive_websocket`]. Each received text frame decodes
//! into the handler's message type; a non-`None` response is written back
//! as JSON, and failures become structured error frames.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::BoxFuture;
use crate::params::ParamVector;
use crate::realtime::TransportError;
use crate::realtime::manager::ConnectionManager;

/// Write half of an accepted WebSocket.
#[async_trait]
pub trait WsSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Read half of an accepted WebSocket. `None` means the peer closed.
#[async_trait]
pub trait WsStream: Send {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}

/// Error frame written to the peer when decoding or the handler fails.
#[derive(Debug, Clone, Serialize)]
pub struct WsErrorFrame {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One live WebSocket connection.
///
/// Owned by the read-loop task; the [`ConnectionManager`] indexes it for
/// broadcast. Writes are serialized by an internal async mutex.
pub struct WsConnection {
    id: String,
    pattern: String,
    params: ParamVector,
    sink: Arc<dyn WsSink>,
    write_lock: tokio::sync::Mutex<()>,
    metadata: parking_lot::Mutex<HashMap<String, Value>>,
    closed: AtomicBool,
}

impl WsConnection {
    pub(crate) fn new(pattern: String, params: ParamVector, sink: Arc<dyn WsSink>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pattern,
            params,
            sink,
            write_lock: tokio::sync::Mutex::new(()),
            metadata: parking_lot::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Route pattern the connection was accepted on.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Path parameter captured at upgrade time (detached copy).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.lock().insert(key.into(), value);
    }

    /// Send a JSON-serialized value as one text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), TransportError> {
        let text = serde_json::to_string(value).map_err(|e| TransportError::Io(e.to_string()))?;
        self.send_raw(&text).await
    }

    /// Send pre-serialized text (broadcasts serialize once).
    pub(crate) async fn send_raw(&self, text: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let _write = self.write_lock.lock().await;
        self.sink.send_text(text).await
    }

    /// Send a structured error frame; best-effort.
    pub async fn send_error(&self, code: &str, message: &str, details: Option<Value>) {
        let frame = WsErrorFrame {
            code: code.to_owned(),
            message: message.to_owned(),
            details,
        };
        if let Err(e) = self.send_json(&frame).await {
            tracing::debug!(connection = %self.id, error = %e, "failed to write error frame");
        }
    }

    /// Close the underlying socket once; subsequent sends fail fast.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _write = self.write_lock.lock().await;
            if let Err(e) = self.sink.close().await {
                tracing::debug!(connection = %self.id, error = %e, "close failed");
            }
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Erased per-frame handler stored in the WebSocket route trie.
pub(crate) type WsFrameHandler =
    Arc<dyn Fn(Arc<WsConnection>, String) -> BoxFuture<()> + Send + Sync>;

/// Terminal payload of the WebSocket trie.
pub(crate) struct WsEntry {
    pub pattern: String,
    pub handler: WsFrameHandler,
}

/// Erase a typed `(connection, message) -> response` handler into the
/// per-frame pipeline: decode, invoke, reply or error-frame.
pub(crate) fn erase_ws_handler<M, R, F, Fut>(handler: F) -> WsFrameHandler
where
    M: DeserializeOwned + Send + 'static,
    R: Serialize + Send + Sync + 'static,
    F: Fn(Arc<WsConnection>, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<R>, ApiError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |conn: Arc<WsConnection>, text: String| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let message: M = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    conn.send_error(
                        crate::error::codes::BAD_REQUEST,
                        "invalid message payload",
                        Some(Value::String(e.to_string())),
                    )
                    .await;
                    return;
                }
            };
            match handler(Arc::clone(&conn), message).await {
                Ok(Some(response)) => {
                    if let Err(e) = conn.send_json(&response).await {
                        tracing::debug!(connection = %conn.id(), error = %e, "reply write failed");
                    }
                }
                Ok(None) => {}
                Err(api) => {
                    conn.send_error(&api.code, &api.message, api.detail.clone()).await;
                }
            }
        })
    })
}

/// Read loop for one accepted connection. Serializes reads by
/// construction; returns when the peer closes or the transport fails.
pub(crate) async fn run_read_loop(
    entry: Arc<WsEntry>,
    conn: Arc<WsConnection>,
    mut stream: Box<dyn WsStream>,
    manager: Arc<ConnectionManager>,
) {
    tracing::debug!(connection = %conn.id(), pattern = %entry.pattern, "websocket connected");
    while let Some(frame) = stream.next_text().await {
        match frame {
            Ok(text) => (entry.handler)(Arc::clone(&conn), text).await,
            Err(e) => {
                tracing::debug!(connection = %conn.id(), error = %e, "websocket read failed");
                break;
            }
        }
    }
    conn.close().await;
    manager.remove_ws(conn.id());
    tracing::debug!(connection = %conn.id(), "websocket disconnected");
}

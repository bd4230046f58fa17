//! Server-Sent Events: record encoding, connections, and the GET route
//! wrapper that turns a handler into a streaming response.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::http::{Handler, Request, Response};
use crate::params::ParamVector;
use crate::realtime::TransportError;
use crate::realtime::manager::ConnectionManager;

/// One SSE record. Encodes as `id:`/`event:`/`retry:`/`data:` lines with
/// a blank-line terminator; multi-line data splits across `data:` lines.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SseMessage {
    pub id: Option<String>,
    pub event: Option<String>,
    pub retry: Option<u64>,
    pub data: String,
}

impl SseMessage {
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// JSON-serialize `value` as the data of a named event.
    pub fn json<T: Serialize>(
        event: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: Some(event.into()),
            data: serde_json::to_string(value)?,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, millis: u64) -> Self {
        self.retry = Some(millis);
        self
    }

    /// Wire encoding of the record.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(retry) = self.retry {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// One live SSE connection; messages queue into the response stream.
pub struct SseConnection {
    id: String,
    pattern: String,
    params: ParamVector,
    sender: parking_lot::Mutex<Option<mpsc::Sender<SseMessage>>>,
    metadata: parking_lot::Mutex<HashMap<String, Value>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl SseConnection {
    fn new(
        pattern: String,
        params: ParamVector,
        sender: mpsc::Sender<SseMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pattern,
            params,
            sender: parking_lot::Mutex::new(Some(sender)),
            metadata: parking_lot::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            cancel,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fires when the client disconnects or the request is cancelled;
    /// long-running handlers should select on this.
    #[must_use]
    pub fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.lock().insert(key.into(), value);
    }

    /// Queue one record for the client; flushed by the response stream.
    pub async fn send(&self, message: SseMessage) -> Result<(), TransportError> {
        let sender = self.sender.lock().clone();
        match sender {
            Some(tx) => tx.send(message).await.map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// Convenience: send `value` as a JSON event record.
    pub async fn send_json<T: Serialize>(
        &self,
        event: &str,
        value: &T,
    ) -> Result<(), TransportError> {
        let message =
            SseMessage::json(event, value).map_err(|e| TransportError::Io(e.to_string()))?;
        self.send(message).await
    }

    /// Stop the stream: drop the sender so the response body terminates
    /// after draining queued records.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.sender.lock().take();
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseConnection")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Bind the handler's params value from path captures and query pairs
/// (both as strings; SSE params carry no coercion table).
fn bind_sse_params(req: &Request) -> Result<Value, ApiError> {
    let mut map = Map::new();
    if let Some(query) = req.query() {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| ApiError::bad_request(format!("malformed query string: {e}")))?;
        for (key, value) in pairs {
            map.insert(key, Value::String(value));
        }
    }
    for (name, value) in req.params.iter() {
        map.insert(name.to_owned(), Value::String(value.to_owned()));
    }
    Ok(Value::Object(map))
}

/// Build the GET route handler for an SSE endpoint: register the
/// connection, spawn the user handler, stream records until it returns or
/// the request is cancelled.
pub(crate) fn sse_route<P, F, Fut>(
    pattern: String,
    manager: Arc<ConnectionManager>,
    handler: F,
) -> Handler
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(Arc<SseConnection>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Handler::new(move |req: Request| {
        let handler = Arc::clone(&handler);
        let manager = Arc::clone(&manager);
        let pattern = pattern.clone();
        async move {
            let request_id = req.request_id().map(ToOwned::to_owned);
            let params: P = match bind_sse_params(&req)
                .and_then(|v| {
                    serde_json::from_value(v).map_err(|e| {
                        ApiError::bad_request(format!("invalid parameters: {e}"))
                    })
                }) {
                Ok(p) => p,
                Err(e) => {
                    return Response::json(
                        e.status,
                        &e.to_response_body(request_id.as_deref(), Some(req.path())),
                    );
                }
            };

            let (tx, rx) = mpsc::channel::<SseMessage>(32);
            let conn = Arc::new(SseConnection::new(
                pattern,
                req.params.detach(),
                tx,
                req.cancel.clone(),
            ));
            manager.add_sse(Arc::clone(&conn));
            tracing::debug!(connection = %conn.id(), pattern = %conn.pattern(), "sse connected");

            let task_conn = Arc::clone(&conn);
            let task_manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(e) = handler(Arc::clone(&task_conn), params).await {
                    tracing::warn!(connection = %task_conn.id(), error = %e, "sse handler failed");
                }
                task_conn.close();
                task_manager.remove_sse(task_conn.id());
                tracing::debug!(connection = %task_conn.id(), "sse disconnected");
            });

            let stream = ReceiverStream::new(rx)
                .map(|message| Bytes::from(message.encode()))
                .boxed();
            Response::event_stream(stream)
        }
    })
}

//! Realtime transports: WebSocket read loop, connection management,
//! broadcast eviction, and SSE streaming.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use utoipa::ToSchema;

use routekit::realtime::TransportError;
use routekit::{
    ApiError, Request, Router, RouterConfig, SseConnection, SseMessage, WsConnection, WsSink,
    WsStream,
};

fn bare_config() -> RouterConfig {
    RouterConfig {
        enable_docs: false,
        ..RouterConfig::default()
    }
}

// --- channel-backed test transport ---------------------------------------

struct TestSink {
    out: mpsc::UnboundedSender<String>,
    fail: AtomicBool,
}

impl TestSink {
    fn pair() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (out, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                out,
                fail: AtomicBool::new(false),
            }),
            rx,
        )
    }
}

#[async_trait]
impl WsSink for TestSink {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io("simulated failure".to_owned()));
        }
        self.out
            .send(text.to_owned())
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct TestStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl WsStream for TestStream {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

fn test_stream() -> (mpsc::UnboundedSender<String>, Box<TestStream>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Box::new(TestStream { rx }))
}

// --- typed channel payloads ----------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
struct ChatMessage {
    text: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct ChatReply {
    room: String,
    echo: String,
}

async fn chat_handler(
    conn: Arc<WsConnection>,
    message: ChatMessage,
) -> Result<Option<ChatReply>, ApiError> {
    if message.text == "boom" {
        return Err(ApiError::bad_request("that word is not allowed"));
    }
    if message.text == "silent" {
        return Ok(None);
    }
    Ok(Some(ChatReply {
        room: conn.param("room").unwrap_or("?").to_owned(),
        echo: message.text,
    }))
}

fn chat_router() -> Router {
    let mut router = Router::new(bare_config());
    router
        .websocket("/ws/chat/:room", chat_handler)
        .unwrap();
    router
}

#[tokio::test]
async fn websocket_round_trip_with_params() {
    let router = Arc::new(chat_router());
    let (sink, mut outbound) = TestSink::pair();
    let (inbound, stream) = test_stream();

    let drive = {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            router
                .drive_websocket("/ws/chat/lobby", sink, stream)
                .await
        })
    };

    inbound.send(r#"{"text": "hello"}"#.to_owned()).unwrap();
    let frame = outbound.recv().await.unwrap();
    let reply: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(reply["room"], "lobby");
    assert_eq!(reply["echo"], "hello");

    // Unknown fields and handler errors become error frames.
    inbound.send("{not json".to_owned()).unwrap();
    let frame: Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
    assert_eq!(frame["code"], "BAD_REQUEST");
    assert_eq!(frame["message"], "invalid message payload");

    inbound.send(r#"{"text": "boom"}"#.to_owned()).unwrap();
    let frame: Value = serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
    assert_eq!(frame["code"], "BAD_REQUEST");
    assert_eq!(frame["message"], "that word is not allowed");

    // Close: the read loop ends and the manager unregisters.
    drop(inbound);
    drive.await.unwrap().unwrap();
    assert_eq!(router.connections().ws_count(), 0);
}

#[tokio::test]
async fn websocket_unknown_path_is_not_found() {
    let router = chat_router();
    let (sink, _outbound) = TestSink::pair();
    let (_inbound, stream) = test_stream();
    let err = router
        .drive_websocket("/ws/nope", sink, stream)
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

async fn wait_for_ws_count(router: &Router, count: usize) {
    for _ in 0..100 {
        if router.connections().ws_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("never reached {count} registered connections");
}

#[tokio::test]
async fn broadcast_delivers_and_evicts_failed_connections() {
    let router = Arc::new(chat_router());

    let (sink_a, mut out_a) = TestSink::pair();
    let (keep_a, stream_a) = test_stream();
    let (sink_b, _out_b) = TestSink::pair();
    let (keep_b, stream_b) = test_stream();

    let r1 = Arc::clone(&router);
    let sink_a2 = Arc::clone(&sink_a);
    tokio::spawn(async move { r1.drive_websocket("/ws/chat/a", sink_a2, stream_a).await });
    let r2 = Arc::clone(&router);
    let sink_b2 = Arc::clone(&sink_b);
    tokio::spawn(async move { r2.drive_websocket("/ws/chat/b", sink_b2, stream_b).await });

    wait_for_ws_count(&router, 2).await;

    // First broadcast reaches both.
    let delivered = router
        .connections()
        .broadcast_ws(&json!({"notice": "hello"}))
        .await;
    assert_eq!(delivered, 2);
    let frame: Value = serde_json::from_str(&out_a.recv().await.unwrap()).unwrap();
    assert_eq!(frame["notice"], "hello");

    // Break one connection: the next broadcast evicts it.
    sink_b.fail.store(true, Ordering::SeqCst);
    let delivered = router
        .connections()
        .broadcast_ws(&json!({"notice": "again"}))
        .await;
    assert_eq!(delivered, 1);
    assert_eq!(router.connections().ws_count(), 1);

    drop(keep_a);
    drop(keep_b);
}

// --- SSE ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickerParams {
    symbol: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct Tick {
    symbol: String,
    seq: u64,
}

async fn ticker(conn: Arc<SseConnection>, params: TickerParams) -> Result<(), ApiError> {
    for seq in 0..3 {
        conn.send_json(
            "tick",
            &Tick {
                symbol: params.symbol.clone(),
                seq,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    }
    Ok(())
}

#[tokio::test]
async fn sse_route_streams_records_until_handler_returns() {
    let mut router = Router::new(bare_config());
    router.sse::<TickerParams, Tick, _, _>("/events/:symbol", ticker).unwrap();

    let rsp = router
        .dispatch(Request::new(Method::GET, "/events/ACME".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    assert_eq!(
        rsp.headers.get(http::header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(rsp.headers.get(http::header::CACHE_CONTROL).unwrap(), "no-cache");

    let mut collected = String::new();
    match rsp.body {
        routekit::Body::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                collected.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
        _ => panic!("expected streaming body"),
    }

    let records: Vec<&str> = collected.split("\n\n").filter(|r| !r.is_empty()).collect();
    assert_eq!(records.len(), 3);
    assert!(records[0].contains("event: tick"));
    assert!(records[0].contains(r#"data: {"symbol":"ACME","seq":0}"#));
    assert!(records[2].contains(r#""seq":2"#));

    // The handler returned, so the connection unregistered itself.
    for _ in 0..100 {
        if router.connections().sse_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(router.connections().sse_count(), 0);
}

#[tokio::test]
async fn sse_broadcast_reaches_long_lived_connections() {
    let mut router = Router::new(bare_config());
    // Handler that stays alive until cancelled.
    router
        .sse::<TickerParams, Tick, _, _>("/events/:symbol", |conn: Arc<SseConnection>, _p| async move {
            conn.cancelled().cancelled().await;
            Ok(())
        })
        .unwrap();

    let req = Request::new(Method::GET, "/events/ACME".parse().unwrap());
    let cancel = req.cancel.clone();
    let rsp = router.dispatch(req).await;
    let mut stream = match rsp.body {
        routekit::Body::Stream(stream) => stream,
        _ => panic!("expected streaming body"),
    };

    for _ in 0..100 {
        if router.connections().sse_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let delivered = router
        .connections()
        .broadcast_sse(&SseMessage::data("ping").with_id("1"))
        .await;
    assert_eq!(delivered, 1);

    let chunk = stream.next().await.unwrap();
    assert_eq!(
        std::str::from_utf8(&chunk).unwrap(),
        "id: 1\ndata: ping\n\n"
    );

    // Cancelling the request ends the handler and the stream.
    cancel.cancel();
    for _ in 0..100 {
        if router.connections().sse_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(router.connections().sse_count(), 0);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn asyncapi_document_mirrors_channels() {
    let mut router = Router::new(RouterConfig::default());
    router.websocket("/ws/chat/:room", chat_handler).unwrap();
    router.sse::<TickerParams, Tick, _, _>("/events/:symbol", ticker).unwrap();

    let rsp = router
        .dispatch(Request::new(Method::GET, "/asyncapi".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    let doc: Value = serde_json::from_slice(rsp.body_bytes().unwrap()).unwrap();

    assert_eq!(doc["asyncapi"], "2.6.0");
    let chat = &doc["channels"]["/ws/chat/{room}"];
    assert_eq!(
        chat["publish"]["message"]["payload"]["$ref"],
        "#/components/schemas/ChatMessage"
    );
    assert_eq!(
        chat["subscribe"]["message"]["payload"]["$ref"],
        "#/components/schemas/ChatReply"
    );
    assert_eq!(chat["parameters"]["room"]["schema"]["type"], "string");

    let events = &doc["channels"]["/events/{symbol}"];
    assert!(events.get("publish").is_none());
    assert_eq!(
        events["subscribe"]["message"]["payload"]["$ref"],
        "#/components/schemas/Tick"
    );
    assert!(doc["components"]["schemas"]["Tick"].is_object());
}

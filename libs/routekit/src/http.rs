//! Framework-agnostic request/response vocabulary.
//!
//! The core never listens on a socket; an embedding server feeds it
//! [`Request`] values and writes out the [`Response`] it gets back.
//! Bodies are fully buffered [`Bytes`] on the way in and either buffered
//! or streamed (SSE) on the way out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::params::PathParams;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Request header carrying the client-correlated id mirrored into error
/// bodies and responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One incoming HTTP request as the core sees it.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub extensions: Extensions,
    /// Cancelled by the embedding server when the client goes away.
    pub cancel: CancellationToken,
    /// Path captures; attached by dispatch, pooled for the request's
    /// lifetime.
    pub params: PathParams,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
            cancel: CancellationToken::new(),
            params: PathParams::default(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Header value as UTF-8, `None` when absent or non-textual.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path parameter captured by the matcher.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    /// Content type with parameters stripped
    /// (`application/json; charset=utf-8` -> `application/json`).
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct == "application/json" || ct.ends_with("+json"))
    }
}

/// Response body: empty, fully buffered, or a byte stream the server
/// flushes chunk by chunk (SSE).
pub enum Body {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, Bytes>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

/// One outgoing HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// JSON response; a serialization failure degrades to a plain 500.
    #[must_use]
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                let mut rsp = Self::empty(status);
                rsp.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                rsp.body = Body::Full(Bytes::from(bytes));
                rsp
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    #[must_use]
    pub fn html(status: StatusCode, markup: impl Into<String>) -> Self {
        let mut rsp = Self::empty(status);
        rsp.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        rsp.body = Body::Full(Bytes::from(markup.into()));
        rsp
    }

    /// Redirect to `location`; the caller picks 301/308 per method.
    #[must_use]
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        let mut rsp = Self::empty(status);
        match HeaderValue::from_str(location) {
            Ok(v) => {
                rsp.headers.insert(LOCATION, v);
            }
            Err(e) => {
                tracing::warn!(location, error = %e, "redirect target is not a valid header value");
                return Self::empty(StatusCode::NOT_FOUND);
            }
        }
        rsp
    }

    /// Server-sent event stream with the mandated headers.
    #[must_use]
    pub fn event_stream(stream: BoxStream<'static, Bytes>) -> Self {
        let mut rsp = Self::empty(StatusCode::OK);
        rsp.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        rsp.headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        rsp.body = Body::Stream(stream);
        rsp
    }

    #[must_use]
    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Buffered body bytes, `None` for empty or streaming bodies.
    #[must_use]
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            Body::Full(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Type-erased request handler: the unit raw middleware wraps and the
/// trie stores.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req| Box::pin(f(req))))
    }

    #[must_use]
    pub fn call(&self, req: Request) -> BoxFuture<Response> {
        (self.0)(req)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

//! Opinionated middleware: ordered before/after hooks around typed
//! handlers.
//!
//! Hooks share an [`OpCtx`] — an immutable view of the request plus a
//! mutable state cell holding the bound input, the response envelope, and
//! a free-form value map. A `before` hook that returns an error
//! short-circuits the chain; `after` hooks of already-executed `before`s
//! still run, in reverse order (LIFO unwinding).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::operation::Enhancements;
use crate::error::{ApiError, RouterError};
use crate::params::PathParams;

/// A component of the opinionated middleware chain.
#[async_trait]
pub trait OperationMiddleware: Send + Sync {
    /// Unique name; referenced by other components' dependencies.
    fn name(&self) -> &str;

    /// Names of middlewares that must have run before this one.
    /// Validated at registration; dependencies form a DAG by construction
    /// since each must appear earlier in the chain.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Pre-invocation hook. Returning an error terminates the chain and
    /// becomes the response.
    async fn before(&self, _ctx: &OpCtx) -> Result<(), ApiError> {
        Ok(())
    }

    /// Post-invocation hook; runs during unwinding even when a later
    /// `before` or the handler failed.
    async fn after(&self, _ctx: &OpCtx) -> Result<(), ApiError> {
        Ok(())
    }

    /// `OpenAPI` fragments folded into every operation this middleware
    /// wraps, at registration time.
    fn enhancements(&self) -> Enhancements {
        Enhancements::default()
    }

    /// Whether wrapped operations demand authentication.
    fn requires_auth(&self) -> bool {
        false
    }

    /// Whether responses produced under this middleware may be cached.
    /// When any component in an operation's chain reports `false`, the
    /// response is stamped `Cache-Control: no-store` unless a hook
    /// already set a cache policy.
    fn caching_safe(&self) -> bool {
        true
    }
}

/// Validate that every declared dependency precedes its dependent and
/// names are unique.
pub(crate) fn validate_chain(
    chain: &[Arc<dyn OperationMiddleware>],
) -> Result<(), RouterError> {
    let mut seen: Vec<&str> = Vec::with_capacity(chain.len());
    for middleware in chain {
        let name = middleware.name();
        if seen.contains(&name) {
            return Err(RouterError::DuplicateMiddleware(name.to_owned()));
        }
        for dependency in middleware.dependencies() {
            if !seen.contains(&dependency.as_str()) {
                return Err(RouterError::MiddlewareDependency {
                    name: name.to_owned(),
                    dependency,
                });
            }
        }
        seen.push(name);
    }
    Ok(())
}

/// Mutable per-request state shared by hooks and the pipeline.
#[derive(Debug, Default)]
pub(crate) struct OpState {
    pub values: HashMap<String, Value>,
    /// Bound input JSON, present until handler invocation consumes it.
    pub input: Option<Value>,
    /// Serialized output JSON (the response body unless `processed`).
    pub output: Option<Value>,
    /// Status computed from the handler's reply.
    pub status: StatusCode,
    /// Middleware-set override, wins over `status`.
    pub status_override: Option<StatusCode>,
    /// Response headers flushed just before the body write.
    pub headers: HeaderMap,
    /// A middleware already produced the response body.
    pub processed: bool,
}

/// Shared context of one opinionated dispatch.
pub struct OpCtx {
    method: Method,
    path: String,
    pattern: String,
    headers: HeaderMap,
    request_id: Option<String>,
    cancel: CancellationToken,
    /// Pooled capture; released to the pool when the context drops.
    params: PathParams,
    pub(crate) state: Mutex<OpState>,
}

impl OpCtx {
    pub(crate) fn new(
        method: Method,
        path: String,
        pattern: String,
        headers: HeaderMap,
        request_id: Option<String>,
        cancel: CancellationToken,
        params: PathParams,
    ) -> Self {
        Self {
            method,
            path,
            pattern,
            headers,
            request_id,
            cancel,
            params,
            // `StatusCode::default()` is 200 OK, the envelope's baseline.
            state: Mutex::new(OpState::default()),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Matched route pattern (`/users/:id`).
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Read a value from the shared map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().values.get(key).cloned()
    }

    /// Store a value in the shared map for later hooks or the handler.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.state.lock().values.insert(key.into(), value);
    }

    /// Bound input JSON (available to `before` hooks).
    #[must_use]
    pub fn input_json(&self) -> Option<Value> {
        self.state.lock().input.clone()
    }

    /// Replace the bound input before the handler runs.
    pub fn set_input_json(&self, value: Value) {
        self.state.lock().input = Some(value);
    }

    /// Serialized output JSON (available to `after` hooks).
    #[must_use]
    pub fn output_json(&self) -> Option<Value> {
        self.state.lock().output.clone()
    }

    /// Replace the serialized output after the handler ran.
    pub fn set_output_json(&self, value: Value) {
        self.state.lock().output = Some(value);
    }

    /// Override the response status.
    pub fn set_status(&self, status: StatusCode) {
        self.state.lock().status_override = Some(status);
    }

    /// Append a response header, flushed just before the body write.
    pub fn append_response_header(&self, name: &str, value: &str) {
        let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) else {
            tracing::warn!(header = name, "ignoring invalid response header");
            return;
        };
        self.state.lock().headers.append(name, value);
    }

    /// Mark the response as already produced; the pipeline will not write
    /// the handler output over it.
    pub fn mark_processed(&self) {
        self.state.lock().processed = true;
    }

    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.state.lock().processed
    }
}

impl std::fmt::Debug for OpCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpCtx")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

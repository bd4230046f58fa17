//! Type-safe operation builder.
//!
//! A type-state builder ensures at compile time that `register()` is only
//! reachable once a handler is set and at least one response is declared.
//! The typed handler is erased at `handler()` into a factory; `register`
//! later supplies the runtime pieces (bind plan, middleware chain) and the
//! factory yields the [`Handler`] installed into the trie.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use http::header::{CACHE_CONTROL, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::binder::BindPlan;
use crate::api::middleware::{OpCtx, OperationMiddleware};
use crate::api::operation::{
    OperationSpec, ParamLocation, ParamSpec, ParamType, RequestBodySpec, ResponseSpec,
};
use crate::api::registry::{OpenApiRegistry, ensure_schema};
use crate::error::{ApiError, RouterError};
use crate::http::{Handler, REQUEST_ID_HEADER, Request, Response};
use crate::path::{ensure_leading_slash, normalize_pattern};

/// Type-state markers for compile-time enforcement.
pub mod state {
    /// Marker for missing required components.
    #[derive(Debug, Clone, Copy)]
    pub struct Missing;

    /// Marker for present required components.
    #[derive(Debug, Clone, Copy)]
    pub struct Present;
}

pub use state::{Missing, Present};

mod sealed {
    pub trait Sealed {}
}

impl sealed::Sealed for Missing {}
impl sealed::Sealed for Present {}

/// Maps the handler type-state to the concrete slot type: nothing while
/// missing, the erased factory once present.
pub trait HandlerSlot: sealed::Sealed {
    type Slot: Send;
}

impl HandlerSlot for Missing {
    type Slot = ();
}
impl HandlerSlot for Present {
    type Slot = HandlerFactory;
}

/// Runtime pieces an operation pipeline needs, supplied at registration.
#[derive(Clone)]
pub(crate) struct OperationRuntime {
    pub spec: Arc<OperationSpec>,
    pub plan: Arc<BindPlan>,
    pub chain: Arc<[Arc<dyn OperationMiddleware>]>,
    /// Every chain component reported `caching_safe`; when false the
    /// response carries `Cache-Control: no-store` unless a hook set one.
    pub cache_safe: bool,
}

#[doc(hidden)]
pub struct HandlerFactory(
    pub(crate) Box<dyn FnOnce(OperationRuntime) -> Handler + Send>,
);

/// Typed handler outcome.
///
/// `Json`/`Created` serialize the body with a fixed status, `NoContent`
/// writes 204, and `Custom` is emitted exactly as given (status + body +
/// extra headers).
#[derive(Debug)]
pub enum Reply<O> {
    Json(O),
    Created(O),
    NoContent,
    Custom {
        status: StatusCode,
        headers: HeaderMap,
        body: O,
    },
}

impl<O> Reply<O> {
    #[must_use]
    pub fn json(body: O) -> Self {
        Reply::Json(body)
    }

    #[must_use]
    pub fn created(body: O) -> Self {
        Reply::Created(body)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Reply::NoContent
    }

    #[must_use]
    pub fn custom(status: StatusCode, body: O) -> Self {
        Reply::Custom {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Attach a header to a `Custom` reply (no-op on other variants).
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Reply::Custom { headers, .. } = &mut self {
            headers.insert(name, value);
        }
        self
    }
}

/// A fully built operation, ready for a router or group to accept.
pub struct PreparedOperation {
    pub(crate) spec: OperationSpec,
    pub(crate) factory: HandlerFactory,
    /// Raw middleware contributed by the groups the operation was
    /// registered through, ordered parent-first.
    pub(crate) group_raw: Vec<crate::middleware::Middleware>,
    /// Opinionated middleware contributed by those groups.
    pub(crate) group_ops: Vec<Arc<dyn OperationMiddleware>>,
}

/// Anything an operation can be registered on: a [`crate::Router`] or a
/// [`crate::RouteGroup`].
pub trait OperationTarget {
    #[doc(hidden)]
    fn register_prepared(&mut self, op: PreparedOperation) -> Result<(), RouterError>;
}

/// Type-safe operation builder.
///
/// Generic parameters:
/// - `H`: handler state (`Missing` | `Present`)
/// - `R`: response state (`Missing` | `Present`)
#[must_use]
pub struct OperationBuilder<H = Missing, R = Missing>
where
    H: HandlerSlot,
{
    spec: OperationSpec,
    handler: H::Slot,
    _response: PhantomData<R>,
}

// -------------------------------------------------------------------------
// Constructors — handler and response both missing
// -------------------------------------------------------------------------
impl OperationBuilder<Missing, Missing> {
    /// Create a builder for `method` at `path` (`:name` or `{name}`
    /// parameter form, normalized on entry).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let pattern = normalize_pattern(&ensure_leading_slash(&path.into()));
        Self {
            spec: OperationSpec::new(method, pattern),
            handler: (),
            _response: PhantomData,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }
}

// -------------------------------------------------------------------------
// Descriptive methods — available at any stage
// -------------------------------------------------------------------------
impl<H, R> OperationBuilder<H, R>
where
    H: HandlerSlot,
{
    /// Inspect the spec (primarily for tests).
    pub fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.spec.operation_id = Some(id.into());
        self
    }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.spec.summary = Some(text.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.spec.description = Some(text.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.spec.tags.push(tag.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.spec.deprecated = true;
        self
    }

    /// Require a security scheme (e.g. `bearerAuth`) for this operation.
    /// Overrides the global requirement; middleware may append more.
    pub fn security(mut self, scheme: impl Into<String>) -> Self {
        self.spec.security.push(scheme.into());
        self
    }

    /// Add a fully specified parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.spec.params.push(param);
        self
    }

    /// Add a path parameter bound and coerced as `param_type`.
    pub fn path_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.spec.params.push(
            ParamSpec::new(name, ParamLocation::Path, param_type).description(description),
        );
        self
    }

    /// Add a query parameter bound and coerced as `param_type`.
    pub fn query_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.spec.params.push(
            ParamSpec::new(name, ParamLocation::Query, param_type)
                .required(required)
                .description(description),
        );
        self
    }

    /// Add a header parameter (headers always bind as strings).
    pub fn header_param(
        mut self,
        name: impl Into<String>,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.spec.params.push(
            ParamSpec::new(name, ParamLocation::Header, ParamType::String)
                .required(required)
                .description(description),
        );
        self
    }

    /// Attach a required JSON request body decoded into the whole input
    /// value; registers `B`'s schema.
    pub fn json_request<B>(
        mut self,
        registry: &dyn OpenApiRegistry,
        description: impl Into<String>,
    ) -> Self
    where
        B: utoipa::ToSchema + utoipa::PartialSchema + 'static,
    {
        let name = ensure_schema::<B>(registry);
        self.spec.request_body = Some(RequestBodySpec {
            content_type: "application/json",
            description: Some(description.into()),
            schema_name: name,
            required: true,
            field: None,
        });
        self
    }

    /// Attach a required JSON request body decoded into the named input
    /// field, leaving the remaining fields to path/query/header binding.
    pub fn json_request_field<B>(
        mut self,
        registry: &dyn OpenApiRegistry,
        field: impl Into<String>,
        description: impl Into<String>,
    ) -> Self
    where
        B: utoipa::ToSchema + utoipa::PartialSchema + 'static,
    {
        let name = ensure_schema::<B>(registry);
        self.spec.request_body = Some(RequestBodySpec {
            content_type: "application/json",
            description: Some(description.into()),
            schema_name: name,
            required: true,
            field: Some(field.into()),
        });
        self
    }

    /// Make the previously attached request body optional (if any).
    pub fn request_optional(mut self) -> Self {
        if let Some(rb) = &mut self.spec.request_body {
            rb.required = false;
        }
        self
    }
}

// -------------------------------------------------------------------------
// Handler setting — transitions Missing -> Present for the handler
// -------------------------------------------------------------------------
impl<R> OperationBuilder<Missing, R> {
    /// Set the typed handler for this operation.
    ///
    /// The input `I` is assembled by the binder from the declared
    /// parameters and body; the output `O` is serialized according to the
    /// returned [`Reply`].
    pub fn handler<I, O, F, Fut>(self, handler: F) -> OperationBuilder<Present, R>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(Arc<OpCtx>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, ApiError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let factory = HandlerFactory(Box::new(move |runtime: OperationRuntime| {
            Handler::new(move |req: Request| {
                dispatch_operation(runtime.clone(), Arc::clone(&handler), req)
            })
        }));
        OperationBuilder {
            spec: self.spec,
            handler: factory,
            _response: self._response,
        }
    }
}

// -------------------------------------------------------------------------
// Response setting — transitions Missing -> Present (first response)
// -------------------------------------------------------------------------
impl<H> OperationBuilder<H, Missing>
where
    H: HandlerSlot,
{
    /// Add a JSON response (transitions from Missing to Present).
    pub fn json_response(
        mut self,
        status: StatusCode,
        description: impl Into<String>,
    ) -> OperationBuilder<H, Present> {
        self.spec.responses.push(ResponseSpec {
            status: status.as_u16(),
            content_type: "application/json",
            description: description.into(),
            schema_name: None,
        });
        OperationBuilder {
            spec: self.spec,
            handler: self.handler,
            _response: PhantomData,
        }
    }

    /// Add a JSON response with a registered schema (transitions from
    /// Missing to Present).
    pub fn json_response_with_schema<T>(
        mut self,
        registry: &dyn OpenApiRegistry,
        status: StatusCode,
        description: impl Into<String>,
    ) -> OperationBuilder<H, Present>
    where
        T: utoipa::ToSchema + utoipa::PartialSchema + 'static,
    {
        let name = ensure_schema::<T>(registry);
        self.spec.responses.push(ResponseSpec {
            status: status.as_u16(),
            content_type: "application/json",
            description: description.into(),
            schema_name: Some(name),
        });
        OperationBuilder {
            spec: self.spec,
            handler: self.handler,
            _response: PhantomData,
        }
    }
}

// -------------------------------------------------------------------------
// Additional responses — once the first one is declared
// -------------------------------------------------------------------------
impl<H> OperationBuilder<H, Present>
where
    H: HandlerSlot,
{
    /// Add a JSON response (additional).
    pub fn json_response(mut self, status: StatusCode, description: impl Into<String>) -> Self {
        self.spec.responses.push(ResponseSpec {
            status: status.as_u16(),
            content_type: "application/json",
            description: description.into(),
            schema_name: None,
        });
        self
    }

    /// Add a JSON response with a registered schema (additional).
    pub fn json_response_with_schema<T>(
        mut self,
        registry: &dyn OpenApiRegistry,
        status: StatusCode,
        description: impl Into<String>,
    ) -> Self
    where
        T: utoipa::ToSchema + utoipa::PartialSchema + 'static,
    {
        let name = ensure_schema::<T>(registry);
        self.spec.responses.push(ResponseSpec {
            status: status.as_u16(),
            content_type: "application/json",
            description: description.into(),
            schema_name: Some(name),
        });
        self
    }
}

// -------------------------------------------------------------------------
// Registration — only when handler AND response are both set
// -------------------------------------------------------------------------
impl OperationBuilder<Present, Present> {
    /// Register the operation: store its spec, emit the `OpenAPI`
    /// operation, and install the bound pipeline into the route trie.
    pub fn register(self, target: &mut impl OperationTarget) -> Result<(), RouterError> {
        target.register_prepared(PreparedOperation {
            spec: self.spec,
            factory: self.handler,
            group_raw: Vec::new(),
            group_ops: Vec::new(),
        })
    }
}

// -------------------------------------------------------------------------
// The erased pipeline
// -------------------------------------------------------------------------

async fn dispatch_operation<I, O, F, Fut>(
    runtime: OperationRuntime,
    handler: Arc<F>,
    mut req: Request,
) -> Response
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(Arc<OpCtx>, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply<O>, ApiError>> + Send + 'static,
{
    let request_id = req.request_id().map(ToOwned::to_owned);
    let raw_path = req.path().to_owned();

    // Bind while the request is still whole, then move its pieces into
    // the shared context (the pooled params ride along and release when
    // the context drops).
    let bound = runtime.plan.bind(&req);

    let params = std::mem::take(&mut req.params);
    let ctx = Arc::new(OpCtx::new(
        req.method.clone(),
        raw_path.clone(),
        runtime.spec.path.clone(),
        std::mem::take(&mut req.headers),
        request_id.clone(),
        req.cancel.clone(),
        params,
    ));

    let mut failure: Option<ApiError> = None;
    match bound {
        Ok(value) => ctx.set_input_json(value),
        Err(e) => failure = Some(e),
    }

    // Before hooks in registration order; the first error short-circuits.
    // A failing before still ran, so its middleware joins the unwind set.
    let mut executed = 0usize;
    if failure.is_none() {
        for middleware in runtime.chain.iter() {
            let result = middleware.before(&ctx).await;
            executed += 1;
            if let Err(e) = result {
                failure = Some(e);
                break;
            }
        }
    }

    if failure.is_none() {
        let input_value = ctx.state.lock().input.take().unwrap_or(Value::Null);
        match serde_json::from_value::<I>(input_value) {
            Err(e) => {
                failure = Some(ApiError::bad_request(format!("invalid request shape: {e}")));
            }
            Ok(input) => match handler(Arc::clone(&ctx), input).await {
                Ok(reply) => {
                    if let Err(e) = apply_reply(&ctx, reply) {
                        failure = Some(e);
                    }
                }
                Err(e) => failure = Some(e),
            },
        }
    }

    // Unwind: after hooks of executed befores, in reverse.
    for middleware in runtime.chain[..executed].iter().rev() {
        if let Err(e) = middleware.after(&ctx).await {
            if failure.is_none() {
                failure = Some(e);
            } else {
                tracing::warn!(
                    middleware = middleware.name(),
                    error = %e,
                    "after hook failed during unwinding"
                );
            }
        }
    }

    write_envelope(
        &ctx,
        failure,
        &raw_path,
        request_id.as_deref(),
        runtime.cache_safe,
    )
}

fn apply_reply<O: Serialize>(ctx: &OpCtx, reply: Reply<O>) -> Result<(), ApiError> {
    let mut state = ctx.state.lock();
    if state.processed {
        // A middleware owns the response body; drop the handler output.
        return Ok(());
    }
    match reply {
        Reply::Json(body) => {
            state.status = StatusCode::OK;
            state.output = Some(serde_json::to_value(body).map_err(ApiError::internal_from)?);
        }
        Reply::Created(body) => {
            state.status = StatusCode::CREATED;
            state.output = Some(serde_json::to_value(body).map_err(ApiError::internal_from)?);
        }
        Reply::NoContent => {
            state.status = StatusCode::NO_CONTENT;
            state.output = None;
        }
        Reply::Custom {
            status,
            headers,
            body,
        } => {
            state.status = status;
            for (name, value) in &headers {
                state.headers.append(name.clone(), value.clone());
            }
            state.output = Some(serde_json::to_value(body).map_err(ApiError::internal_from)?);
        }
    }
    Ok(())
}

fn write_envelope(
    ctx: &OpCtx,
    failure: Option<ApiError>,
    path: &str,
    request_id: Option<&str>,
    cache_safe: bool,
) -> Response {
    let mut state = ctx.state.lock();
    let mut rsp = match failure {
        Some(err) => Response::json(err.status, &err.to_response_body(request_id, Some(path))),
        None => {
            let status = state.status_override.unwrap_or(state.status);
            match state.output.take() {
                Some(body) if status != StatusCode::NO_CONTENT => Response::json(status, &body),
                _ => Response::empty(status),
            }
        }
    };

    // Flush middleware-appended headers, then mirror the request id.
    for (name, value) in &state.headers {
        rsp.headers.append(name.clone(), value.clone());
    }
    if !cache_safe && !rsp.headers.contains_key(CACHE_CONTROL) {
        rsp.headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    if let Some(id) = request_id
        && let Ok(value) = HeaderValue::from_str(id)
    {
        rsp.headers
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    rsp
}

/// Compile a prepared operation into an installable pipeline. The bind
/// plan derives from `bind_source` — the spec as the handler declared it,
/// before middleware enhancements were folded in — so documented-only
/// headers never become binding requirements.
pub(crate) fn build_runtime(
    spec: Arc<OperationSpec>,
    bind_source: &OperationSpec,
    chain: Vec<Arc<dyn OperationMiddleware>>,
) -> OperationRuntime {
    let plan = Arc::new(BindPlan::from_spec(bind_source));
    let cache_safe = chain.iter().all(|m| m.caching_safe());
    OperationRuntime {
        spec,
        plan,
        chain: chain.into(),
        cache_safe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalizes_brace_patterns() {
        let op = OperationBuilder::get("/users/{id}");
        assert_eq!(op.spec().path, "/users/:id");
        assert_eq!(op.spec().method, Method::GET);
    }

    #[test]
    fn reply_with_header_only_touches_custom() {
        let reply = Reply::custom(StatusCode::ACCEPTED, serde_json::json!({"queued": true}))
            .with_header(
                HeaderName::from_static("x-job"),
                HeaderValue::from_static("42"),
            );
        match reply {
            Reply::Custom {
                status, headers, ..
            } => {
                assert_eq!(status, StatusCode::ACCEPTED);
                assert_eq!(headers.get("x-job").unwrap(), "42");
            }
            _ => panic!("expected custom reply"),
        }
    }
}

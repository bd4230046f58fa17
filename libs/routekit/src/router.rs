//! Router core: registration and the dispatch state machine.
//!
//! One trie per method. A request either matches (and runs its composed
//! handler) or walks the miss ladder: trailing-slash redirect, fixed-path
//! redirect, synthesized `OPTIONS`, `405` with `Allow`, then `404`.
//!
//! Registration is a build-phase activity (`&mut self`); once the server
//! starts dispatching, the trees are read-only and the hot path takes no
//! locks beyond param-pool acquisition.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use http::header::{ALLOW, HeaderName};
use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::registry::OpenApiRegistry;

use crate::api::builder::{OperationTarget, PreparedOperation, build_runtime};
use crate::api::docs;
use crate::api::middleware::{OperationMiddleware, validate_chain};
use crate::api::openapi::BEARER_SCHEME;
use crate::api::operation::{ParamLocation, ParamSpec, ParamType, ResponseSpec};
use crate::api::registry::{OpenApiRegistryImpl, ensure_schema};
use crate::config::RouterConfig;
use crate::error::{
    ApiError, ErrorDetail, ErrorResponse, FieldError, RouterError, ValidationErrorResponse,
};
use crate::http::{Handler, REQUEST_ID_HEADER, Request, Response};
use crate::middleware::{Middleware, compose};
use crate::params::ParamPool;
use crate::path::{
    documentation_path, ensure_leading_slash, normalize_path, normalize_pattern,
    pattern_param_names, toggle_trailing_slash,
};
use crate::realtime::asyncapi::{
    AsyncApiRegistryImpl, ChannelKind, ChannelSpec, ensure_async_schema,
};
use crate::realtime::manager::ConnectionManager;
use crate::realtime::sse::{SseConnection, sse_route};
use crate::realtime::ws::{
    WsConnection, WsEntry, WsSink, WsStream, erase_ws_handler, run_read_loop,
};
use crate::trie::Node;

/// Terminal payload of the HTTP trie: the route's pattern plus its fully
/// composed handler.
pub(crate) struct RouteEntry {
    pub pattern: String,
    pub handler: Handler,
}

/// Optional documentation metadata for a realtime channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelDocs {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// The router: matcher, middleware stacks, documentation registries, and
/// realtime connection index. No hidden globals; everything hangs off
/// this value.
pub struct Router {
    config: RouterConfig,
    trees: HashMap<Method, Node<RouteEntry>>,
    ws_routes: Node<WsEntry>,
    pool: Arc<ParamPool>,
    raw_middleware: Vec<Middleware>,
    op_middleware: Vec<Arc<dyn OperationMiddleware>>,
    openapi: Arc<OpenApiRegistryImpl>,
    asyncapi: Arc<AsyncApiRegistryImpl>,
    manager: Arc<ConnectionManager>,
    registered_routes: DashMap<(Method, String), ()>,
    registered_operations: DashMap<String, ()>,
}

impl Router {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        let mut router = Self {
            config,
            trees: HashMap::new(),
            ws_routes: Node::default(),
            pool: Arc::new(ParamPool::new()),
            raw_middleware: Vec::new(),
            op_middleware: Vec::new(),
            openapi: Arc::new(OpenApiRegistryImpl::new()),
            asyncapi: Arc::new(AsyncApiRegistryImpl::new()),
            manager: Arc::new(ConnectionManager::new()),
            registered_routes: DashMap::new(),
            registered_operations: DashMap::new(),
        };

        // Canonical error component schemas are always present.
        ensure_schema::<ErrorResponse>(router.openapi.as_ref());
        ensure_schema::<ErrorDetail>(router.openapi.as_ref());
        ensure_schema::<ValidationErrorResponse>(router.openapi.as_ref());
        ensure_schema::<FieldError>(router.openapi.as_ref());

        if router.config.enable_docs {
            router.install_docs();
        }
        router
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The `OpenAPI` registry, for schema registration on builders.
    #[must_use]
    pub fn openapi_registry(&self) -> Arc<OpenApiRegistryImpl> {
        Arc::clone(&self.openapi)
    }

    #[must_use]
    pub fn asyncapi_registry(&self) -> Arc<AsyncApiRegistryImpl> {
        Arc::clone(&self.asyncapi)
    }

    /// Live realtime connections, for broadcasts.
    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    /// Append a raw middleware. Applies to routes registered afterwards;
    /// chains are composed at registration time.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.raw_middleware.push(middleware);
    }

    /// Append an opinionated middleware. Dependencies must already be in
    /// the chain.
    pub fn use_operation_middleware(
        &mut self,
        middleware: Arc<dyn OperationMiddleware>,
    ) -> Result<(), RouterError> {
        let mut chain = self.op_middleware.clone();
        chain.push(middleware);
        validate_chain(&chain)?;
        self.op_middleware = chain;
        Ok(())
    }

    /// Register a raw handler for `method` at `pattern` (`:name`,
    /// `{name}`, and a trailing `*` are accepted).
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RouterError> {
        self.handle_with_extra(method, &normalize_pattern(&ensure_leading_slash(pattern)), handler, &[])
    }

    pub fn get<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(Method::GET, pattern, Handler::new(f))
    }

    pub fn post<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(Method::POST, pattern, Handler::new(f))
    }

    pub fn put<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(Method::PUT, pattern, Handler::new(f))
    }

    pub fn delete<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(Method::DELETE, pattern, Handler::new(f))
    }

    pub fn patch<F, Fut>(&mut self, pattern: &str, f: F) -> Result<(), RouterError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(Method::PATCH, pattern, Handler::new(f))
    }

    /// Open a route group under `prefix`.
    pub fn group(&mut self, prefix: &str) -> crate::group::RouteGroup<'_> {
        crate::group::RouteGroup::new(self, prefix)
    }

    /// Delegate all methods under `prefix/*` to `inner`, stripping the
    /// prefix before delegation.
    pub fn mount(&mut self, prefix: &str, inner: Handler) -> Result<(), RouterError> {
        self.mount_with_extra(prefix, inner, &[])
    }

    /// Register a WebSocket channel (no documentation metadata).
    pub fn websocket<M, R, F, Fut>(&mut self, pattern: &str, handler: F) -> Result<(), RouterError>
    where
        M: DeserializeOwned + utoipa::ToSchema + utoipa::PartialSchema + Send + 'static,
        R: Serialize + utoipa::ToSchema + utoipa::PartialSchema + Send + Sync + 'static,
        F: Fn(Arc<WsConnection>, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, ApiError>> + Send + 'static,
    {
        self.websocket_documented(pattern, ChannelDocs::default(), handler)
    }

    /// Register a WebSocket channel: frames decode into `M`, non-`None`
    /// handler results serialize back as `R`, and the channel documents
    /// publish (`M`) plus subscribe (`R`) in the `AsyncAPI` document.
    pub fn websocket_documented<M, R, F, Fut>(
        &mut self,
        pattern: &str,
        docs: ChannelDocs,
        handler: F,
    ) -> Result<(), RouterError>
    where
        M: DeserializeOwned + utoipa::ToSchema + utoipa::PartialSchema + Send + 'static,
        R: Serialize + utoipa::ToSchema + utoipa::PartialSchema + Send + Sync + 'static,
        F: Fn(Arc<WsConnection>, M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, ApiError>> + Send + 'static,
    {
        let pattern = normalize_pattern(&ensure_leading_slash(pattern));
        let message = ensure_async_schema::<M>(&self.asyncapi);
        let response = ensure_async_schema::<R>(&self.asyncapi);
        self.asyncapi.register_channel(ChannelSpec {
            path: documentation_path(&pattern),
            kind: ChannelKind::WebSocket { message, response },
            summary: docs.summary,
            description: docs.description,
            tags: docs.tags,
            params: pattern_param_names(&pattern),
        });

        let entry = Arc::new(WsEntry {
            pattern: pattern.clone(),
            handler: erase_ws_handler(handler),
        });
        if self.ws_routes.insert(&pattern, entry)?.is_some() {
            tracing::warn!(pattern = %pattern, "duplicate websocket route; last registration wins");
        }
        tracing::debug!(pattern = %pattern, "registered websocket route");
        Ok(())
    }

    /// Drive an accepted WebSocket: match the path, register the
    /// connection, and run the read loop until the peer closes.
    pub async fn drive_websocket(
        &self,
        path: &str,
        sink: Arc<dyn WsSink>,
        stream: Box<dyn WsStream>,
    ) -> Result<(), ApiError> {
        let path = ensure_leading_slash(path);
        let (entry, conn) = {
            let mut params = self.pool.acquire();
            let Some(entry) = self.ws_routes.lookup(&path, &mut params) else {
                return Err(ApiError::not_found(format!(
                    "no websocket route matches {path}"
                )));
            };
            // The pooled vector must not survive dispatch; the
            // connection keeps a detached copy.
            let conn = Arc::new(WsConnection::new(
                entry.pattern.clone(),
                params.detach(),
                sink,
            ));
            (entry, conn)
        };
        self.manager.add_ws(Arc::clone(&conn));
        run_read_loop(entry, conn, stream, Arc::clone(&self.manager)).await;
        Ok(())
    }

    /// Register an SSE endpoint (no documentation metadata).
    pub fn sse<P, E, F, Fut>(&mut self, pattern: &str, handler: F) -> Result<(), RouterError>
    where
        P: DeserializeOwned + Send + 'static,
        E: Serialize + utoipa::ToSchema + utoipa::PartialSchema + 'static,
        F: Fn(Arc<SseConnection>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        self.sse_documented::<P, E, F, Fut>(pattern, ChannelDocs::default(), handler)
    }

    /// Register an SSE endpoint as a GET route streaming
    /// `text/event-stream`. `P` binds from path and query (as strings);
    /// `E` is the emitted-data type documented on the subscribe side of
    /// the channel.
    pub fn sse_documented<P, E, F, Fut>(
        &mut self,
        pattern: &str,
        docs: ChannelDocs,
        handler: F,
    ) -> Result<(), RouterError>
    where
        P: DeserializeOwned + Send + 'static,
        E: Serialize + utoipa::ToSchema + utoipa::PartialSchema + 'static,
        F: Fn(Arc<SseConnection>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let pattern = normalize_pattern(&ensure_leading_slash(pattern));
        let payload = ensure_async_schema::<E>(&self.asyncapi);
        self.asyncapi.register_channel(ChannelSpec {
            path: documentation_path(&pattern),
            kind: ChannelKind::ServerSentEvents { payload },
            summary: docs.summary,
            description: docs.description,
            tags: docs.tags,
            params: pattern_param_names(&pattern),
        });

        let handler = sse_route(pattern.clone(), Arc::clone(&self.manager), handler);
        self.handle_with_extra(Method::GET, &pattern, handler, &[])
    }

    /// Dispatch one request.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let path = ensure_leading_slash(req.uri.path());

        if let Some(tree) = self.trees.get(&req.method) {
            let mut params = self.pool.acquire();
            if let Some(entry) = tree.lookup(&path, &mut params) {
                tracing::trace!(method = %req.method, path = %path, pattern = %entry.pattern, "route matched");
                req.params = params;
                return entry.handler.call(req).await;
            }
            // The guard drops here and the vector returns to the pool
            // before the miss ladder runs.
        }

        self.handle_miss(req, &path).await
    }

    async fn handle_miss(&self, req: Request, path: &str) -> Response {
        if self.config.redirect_trailing_slash
            && let Some(alternate) = toggle_trailing_slash(path)
            && self.method_matches(&req.method, &alternate)
        {
            return redirect_response(&req.method, &alternate, req.uri.query());
        }

        if self.config.redirect_fixed_path {
            let cleaned = normalize_path(path);
            let lowered = cleaned.to_ascii_lowercase();
            let mut candidates = vec![cleaned.clone(), lowered.clone()];
            if self.config.redirect_trailing_slash {
                candidates.extend(toggle_trailing_slash(&cleaned));
                candidates.extend(toggle_trailing_slash(&lowered));
            }
            for candidate in candidates {
                if candidate != path && self.method_matches(&req.method, &candidate) {
                    return redirect_response(&req.method, &candidate, req.uri.query());
                }
            }
        }

        if req.method == Method::OPTIONS && self.config.handle_options {
            let mut allow = self.allowed_methods(path, None);
            if !allow.is_empty() {
                if !allow.iter().any(|m| m == "OPTIONS") {
                    allow.push("OPTIONS".to_owned());
                    allow.sort();
                }
                let mut rsp = Response::empty(StatusCode::NO_CONTENT);
                if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
                    rsp.headers.insert(ALLOW, value);
                }
                return rsp;
            }
        }

        if self.config.handle_method_not_allowed {
            let allow = self.allowed_methods(path, Some(&req.method));
            if !allow.is_empty() {
                let err = ApiError::method_not_allowed(format!(
                    "{} is not allowed for {path}",
                    req.method
                ));
                let mut rsp = self.error_response(&err, &req, path);
                if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
                    rsp.headers.insert(ALLOW, value);
                }
                return rsp;
            }
        }

        let err = ApiError::not_found("route not found");
        self.error_response(&err, &req, path)
    }

    fn method_matches(&self, method: &Method, path: &str) -> bool {
        self.trees.get(method).is_some_and(|tree| tree.matches(path))
    }

    /// Methods whose tree matches `path`, sorted, optionally excluding
    /// the request's own.
    fn allowed_methods(&self, path: &str, exclude: Option<&Method>) -> Vec<String> {
        let mut allow: Vec<String> = self
            .trees
            .iter()
            .filter(|&(method, tree)| exclude != Some(method) && tree.matches(path))
            .map(|(method, _)| method.as_str().to_owned())
            .collect();
        allow.sort();
        allow
    }

    fn error_response(&self, err: &ApiError, req: &Request, path: &str) -> Response {
        let request_id = req.request_id();
        let mut rsp = Response::json(err.status, &err.to_response_body(request_id, Some(path)));
        if let Some(id) = request_id
            && let Ok(value) = HeaderValue::from_str(id)
        {
            rsp.headers
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        rsp
    }

    /// Insert a route whose handler is composed from the global raw chain
    /// plus `extra` (group-contributed) middleware.
    pub(crate) fn handle_with_extra(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        extra: &[Middleware],
    ) -> Result<(), RouterError> {
        let mut chain = self.raw_middleware.clone();
        chain.extend_from_slice(extra);
        let composed = compose(&chain, handler);
        self.insert_entry(method, pattern, composed)
    }

    fn insert_entry(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RouterError> {
        if self
            .registered_routes
            .insert((method.clone(), pattern.to_owned()), ())
            .is_some()
        {
            tracing::warn!(method = %method, pattern = %pattern, "duplicate route; last registration wins");
        }

        let entry = Arc::new(RouteEntry {
            pattern: pattern.to_owned(),
            handler,
        });
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(pattern, entry)?;
        tracing::debug!(method = %method, pattern = %pattern, "registered route");
        Ok(())
    }

    pub(crate) fn mount_with_extra(
        &mut self,
        prefix: &str,
        inner: Handler,
        extra: &[Middleware],
    ) -> Result<(), RouterError> {
        let prefix = ensure_leading_slash(prefix)
            .trim_end_matches('/')
            .to_owned();
        let strip = prefix.clone();
        let wrapper = Handler::new(move |mut req: Request| {
            let rewritten = req
                .uri
                .path()
                .strip_prefix(strip.as_str())
                .map(ensure_leading_slash);
            if let Some(new_path) = rewritten {
                let path_and_query = match req.uri.query() {
                    Some(q) => format!("{new_path}?{q}"),
                    None => new_path,
                };
                if let Ok(uri) = path_and_query.parse::<http::Uri>() {
                    req.uri = uri;
                }
            }
            inner.call(req)
        });

        let exact = if prefix.is_empty() { "/" } else { prefix.as_str() };
        let wild = format!("{prefix}/*");
        for method in [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::HEAD,
            Method::OPTIONS,
        ] {
            self.handle_with_extra(method.clone(), exact, wrapper.clone(), extra)?;
            self.handle_with_extra(method, &wild, wrapper.clone(), extra)?;
        }
        Ok(())
    }

    fn install_docs(&mut self) {
        let title = self.config.openapi.title.clone();
        let async_title = self.config.asyncapi.title.clone();

        let routes: Vec<(&str, Handler)> = vec![
            (
                "/openapi.json",
                docs::openapi_json_handler(Arc::clone(&self.openapi), self.config.openapi.clone()),
            ),
            (
                "/openapi/swagger",
                docs::html_handler(docs::swagger_shell(&title)),
            ),
            (
                "/openapi/redoc",
                docs::html_handler(docs::redoc_shell(&title)),
            ),
            (
                "/openapi/scalar",
                docs::html_handler(docs::scalar_shell(&title)),
            ),
            (
                "/openapi/spotlight",
                docs::html_handler(docs::spotlight_shell(&title)),
            ),
            (
                "/openapi/docs",
                docs::html_handler(docs::docs_index_shell(&title)),
            ),
            (
                "/asyncapi",
                docs::asyncapi_json_handler(
                    Arc::clone(&self.asyncapi),
                    self.config.asyncapi.clone(),
                ),
            ),
            (
                "/asyncapi/docs",
                docs::html_handler(docs::asyncapi_shell(&async_title)),
            ),
        ];

        for (pattern, handler) in routes {
            if let Err(e) = self.insert_entry(Method::GET, pattern, handler) {
                tracing::error!(pattern, error = %e, "failed to install documentation route");
            }
        }
    }

    fn fold_standard_errors(spec: &mut crate::api::operation::OperationSpec) {
        let mut standard: Vec<(u16, &str, &str)> = vec![
            (400, "Bad Request", "ErrorResponse"),
            (401, "Unauthorized", "ErrorResponse"),
            (403, "Forbidden", "ErrorResponse"),
        ];
        if spec.accesses_entity() {
            standard.push((404, "Not Found", "ErrorResponse"));
        }
        if spec.mutates() {
            standard.push((409, "Conflict", "ErrorResponse"));
        }
        standard.extend([
            (422, "Validation Failed", "ValidationErrorResponse"),
            (429, "Rate Limited", "ErrorResponse"),
            (500, "Internal Server Error", "ErrorResponse"),
            (503, "Service Unavailable", "ErrorResponse"),
        ]);

        for (status, description, schema) in standard {
            if !spec.responses.iter().any(|r| r.status == status) {
                spec.responses.push(ResponseSpec {
                    status,
                    content_type: "application/json",
                    description: description.to_owned(),
                    schema_name: Some(schema.to_owned()),
                });
            }
        }
    }
}

impl OperationTarget for Router {
    fn register_prepared(&mut self, op: PreparedOperation) -> Result<(), RouterError> {
        let PreparedOperation {
            mut spec,
            factory,
            group_raw,
            group_ops,
        } = op;
        spec.path = ensure_leading_slash(&spec.path);

        let operation_id = spec
            .operation_id
            .clone()
            .unwrap_or_else(|| spec.handler_id.clone());
        if self
            .registered_operations
            .insert(operation_id.clone(), ())
            .is_some()
        {
            return Err(RouterError::DuplicateOperationId(operation_id));
        }

        // Effective chain: router-global middleware, then the groups'.
        let mut chain: Vec<Arc<dyn OperationMiddleware>> = self.op_middleware.clone();
        chain.extend(group_ops);
        validate_chain(&chain)?;

        // The bind plan reflects only the handler's declared inputs;
        // middleware enhancements are documentation.
        let bind_source = spec.clone();

        for middleware in &chain {
            let enhancements = middleware.enhancements();
            for header in enhancements.headers {
                let exists = spec.params.iter().any(|p| {
                    p.location == ParamLocation::Header && p.name.eq_ignore_ascii_case(&header.name)
                });
                if !exists {
                    let mut param =
                        ParamSpec::new(header.name, ParamLocation::Header, ParamType::String)
                            .required(header.required);
                    if let Some(description) = header.description {
                        param = param.description(description);
                    }
                    spec.params.push(param);
                }
            }
            for response in enhancements.responses {
                if !spec.responses.iter().any(|r| r.status == response.status) {
                    spec.responses.push(response);
                }
            }
            for scheme in enhancements.security {
                if !spec.security.contains(&scheme) {
                    spec.security.push(scheme);
                }
            }
            for tag in enhancements.tags {
                if !spec.tags.contains(&tag) {
                    spec.tags.push(tag);
                }
            }
            if middleware.requires_auth() && spec.security.is_empty() {
                spec.security.push(BEARER_SCHEME.to_owned());
            }
        }

        Self::fold_standard_errors(&mut spec);

        self.openapi.register_operation(&spec);

        let method = spec.method.clone();
        let path = spec.path.clone();
        let runtime = build_runtime(Arc::new(spec), &bind_source, chain);
        let handler = (factory.0)(runtime);
        self.handle_with_extra(method, &path, handler, &group_raw)
    }
}

/// 301 for GET, 308 for everything else; query preserved verbatim.
fn redirect_response(method: &Method, target: &str, query: Option<&str>) -> Response {
    let status = if *method == Method::GET {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::PERMANENT_REDIRECT
    };
    let location = match query {
        Some(q) => format!("{target}?{q}"),
        None => target.to_owned(),
    };
    Response::redirect(status, &location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> RouterConfig {
        RouterConfig {
            enable_docs: false,
            ..RouterConfig::default()
        }
    }

    #[tokio::test]
    async fn param_vector_returns_to_pool_after_dispatch() {
        let mut router = Router::new(bare_config());
        router
            .get("/users/:id", |req: Request| async move {
                Response::json(
                    StatusCode::OK,
                    &serde_json::json!({"id": req.param("id")}),
                )
            })
            .unwrap();

        let rsp = router
            .dispatch(Request::new(Method::GET, "/users/42".parse().unwrap()))
            .await;
        assert_eq!(rsp.status, StatusCode::OK);
        assert_eq!(router.pool.idle(), 1);

        // A miss releases the vector too.
        let rsp = router
            .dispatch(Request::new(Method::GET, "/missing".parse().unwrap()))
            .await;
        assert_eq!(rsp.status, StatusCode::NOT_FOUND);
        assert_eq!(router.pool.idle(), 1);
    }

    #[tokio::test]
    async fn mount_strips_prefix_before_delegation() {
        let mut router = Router::new(bare_config());
        let sub = Handler::new(|req: Request| async move {
            Response::json(
                StatusCode::OK,
                &serde_json::json!({"path": req.uri.path()}),
            )
        });
        router.mount("/admin", sub).unwrap();

        let rsp = router
            .dispatch(Request::new(Method::GET, "/admin/panel/logs".parse().unwrap()))
            .await;
        let body: serde_json::Value = serde_json::from_slice(rsp.body_bytes().unwrap()).unwrap();
        assert_eq!(body["path"], "/panel/logs");

        let rsp = router
            .dispatch(Request::new(Method::POST, "/admin".parse().unwrap()))
            .await;
        let body: serde_json::Value = serde_json::from_slice(rsp.body_bytes().unwrap()).unwrap();
        assert_eq!(body["path"], "/");
    }
}

//! Route groups: a shared path prefix plus raw and opinionated
//! middleware stacks.
//!
//! Nested groups compose by accumulation: a child clones its parent's
//! prefix and stacks, so parent middleware always wraps outside child
//! middleware (parent-before, child-before, handler, child-after,
//! parent-after).

use std::future::Future;
use std::sync::Arc;

use http::Method;

use crate::api::builder::{OperationTarget, PreparedOperation};
use crate::api::middleware::OperationMiddleware;
use crate::api::registry::OpenApiRegistryImpl;
use crate::error::RouterError;
use crate::http::{Handler, Request, Response};
use crate::middleware::{Middleware, compose};
use crate::path::{ensure_leading_slash, normalize_pattern};
use crate::router::Router;

/// A registration scope under a path prefix.
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    raw: Vec<Middleware>,
    ops: Vec<Arc<dyn OperationMiddleware>>,
}

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path == "/" {
        if prefix.is_empty() {
            "/".to_owned()
        } else {
            prefix.to_owned()
        }
    } else {
        format!("{prefix}{path}")
    }
}

impl<'r> RouteGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: ensure_leading_slash(prefix)
                .trim_end_matches('/')
                .to_owned(),
            raw: Vec::new(),
            ops: Vec::new(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The `OpenAPI` registry, for schema registration on builders.
    #[must_use]
    pub fn openapi_registry(&self) -> Arc<OpenApiRegistryImpl> {
        self.router.openapi_registry()
    }

    /// Append a raw middleware to this group's stack.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.raw.push(middleware);
    }

    /// Append an opinionated middleware to this group's stack.
    pub fn use_operation_middleware(&mut self, middleware: Arc<dyn OperationMiddleware>) {
        self.ops.push(middleware);
    }

    /// Open a nested group; it inherits this group's prefix and stacks.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let child_prefix = join_paths(&self.prefix, &ensure_leading_slash(prefix));
        RouteGroup {
            router: &mut *self.router,
            prefix: child_prefix.trim_end_matches('/').to_owned(),
            raw: self.raw.clone(),
            ops: self.ops.clone(),
        }
    }

    /// Register a raw handler under the group's prefix, wrapped by the
    /// group's raw middleware (inside the router's global chain).
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RouterError> {
        let full = join_paths(
            &self.prefix,
            &normalize_pattern(&ensure_leading_slash(pattern)),
        );
        let wrapped = compose(&self.raw, handler);
        self.router.handle_with_extra(method, &full, wrapped, &[])
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

    /// Mount a sub-handler under the group's prefix; see
    /// [`Router::mount`].
    pub fn mount(&mut self, prefix: &str, inner: Handler) -> Result<(), RouterError> {
        let full = join_paths(&self.prefix, &ensure_leading_slash(prefix));
        let wrapped = compose(&self.raw, inner);
        self.router.mount_with_extra(&full, wrapped, &[])
    }
}

impl OperationTarget for RouteGroup<'_> {
    fn register_prepared(&mut self, mut op: PreparedOperation) -> Result<(), RouterError> {
        op.spec.path = join_paths(&self.prefix, &ensure_leading_slash(&op.spec.path));

        // Prepend this group's stacks: parents accumulate before
        // children, and the router's globals go outside both.
        let mut raw = self.raw.clone();
        raw.append(&mut op.group_raw);
        op.group_raw = raw;

        let mut ops = self.ops.clone();
        ops.append(&mut op.group_ops);
        op.group_ops = ops;

        self.router.register_prepared(op)
    }
}

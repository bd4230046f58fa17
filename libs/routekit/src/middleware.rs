//! Raw (wrap-style) HTTP middleware.
//!
//! A raw middleware maps an inner [`Handler`] to an outer one. Chains are
//! folded from the innermost user handler outward, so the first-registered
//! middleware runs first on the request path and last on the response
//! path. There is no error channel; a middleware signals failure by
//! writing a response and not calling the inner handler.

use std::future::Future;
use std::sync::Arc;

use crate::http::{Handler, Request, Response};

/// Wrap-style middleware: `inner -> outer`.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Build a [`Middleware`] from a wrapping closure.
pub fn wrap<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a [`Middleware`] from an async `(request, next)` function, the
/// common short-circuit-or-delegate shape.
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Handler) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |next: Handler| {
        let f = f.clone();
        Handler::new(move |req| f(req, next.clone()))
    })
}

/// Fold `chain` around `inner` so execution order matches registration
/// order.
pub(crate) fn compose(chain: &[Middleware], inner: Handler) -> Handler {
    let mut handler = inner;
    for middleware in chain.iter().rev() {
        handler = middleware(handler);
    }
    handler
}

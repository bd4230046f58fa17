//! Trie-based HTTP router with self-describing typed operations and
//! realtime channels.
//!
//! The crate is a router *core*: it matches, binds, invokes, and
//! documents, while an embedding server owns the listener and feeds it
//! [`Request`] values. Three layers build on each other:
//!
//! - **Routing** — per-method segment tries with parameter capture,
//!   wildcards, trailing-slash/fixed-path redirection, synthesized
//!   `OPTIONS`/`405`, and pooled parameter vectors on the hot path.
//! - **Operations** — typed handlers registered through a type-state
//!   [`OperationBuilder`]; declared parameter and body shapes drive both
//!   runtime binding and the `OpenAPI` 3.1 document served at
//!   `/openapi.json`. Two middleware models wrap them: raw wrap-style
//!   middleware and opinionated before/after components with
//!   registration-time `OpenAPI` enhancements.
//! - **Realtime** — WebSocket channels (typed message/response pairs)
//!   and SSE endpoints, indexed for broadcast and mirrored into an
//!   `AsyncAPI` 2.6 document served at `/asyncapi`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//! use utoipa::ToSchema;
//! use routekit::{OpCtx, OperationBuilder, ParamType, Reply, Router, RouterConfig};
//!
//! #[derive(Deserialize)]
//! struct GetUser {
//!     id: i64,
//! }
//!
//! #[derive(Serialize, ToSchema)]
//! struct UserDto {
//!     id: i64,
//!     name: String,
//! }
//!
//! async fn get_user(_ctx: Arc<OpCtx>, input: GetUser) -> Result<Reply<UserDto>, routekit::ApiError> {
//!     Ok(Reply::json(UserDto { id: input.id, name: "Ada".into() }))
//! }
//!
//! # fn main() -> Result<(), routekit::RouterError> {
//! let mut router = Router::new(RouterConfig::default());
//! let api = router.openapi_registry();
//! OperationBuilder::get("/users/{id}")
//!     .operation_id("users.get")
//!     .summary("Get user by id")
//!     .tag("users")
//!     .path_param("id", ParamType::Integer, "User id")
//!     .handler(get_user)
//!     .json_response_with_schema::<UserDto>(api.as_ref(), StatusCode::OK, "User found")
//!     .register(&mut router)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod group;
pub mod http;
pub mod middleware;
pub mod params;
pub mod path;
pub mod realtime;
pub mod router;
mod trie;

pub use api::{
    Enhancements, HeaderSpec, OpCtx, OperationBuilder, OperationMiddleware, OperationTarget,
    ParamLocation, ParamSpec, ParamType, Reply, ResponseSpec,
};
pub use config::{AsyncApiConfig, OpenApiConfig, RouterConfig};
pub use error::{ApiError, ErrorResponse, FieldError, RouterError, ValidationErrorResponse};
pub use group::RouteGroup;
pub use http::{Body, Handler, Request, Response};
pub use params::{ParamPool, ParamVector, PathParams};
pub use realtime::{
    ConnectionManager, SseConnection, SseMessage, TransportError, WsConnection, WsSink, WsStream,
};
pub use router::{ChannelDocs, Router};

//! Opinionated operation layer: typed handlers whose declared shapes
//! drive both runtime binding and the `OpenAPI` document.

pub mod binder;
pub mod builder;
pub(crate) mod docs;
pub mod middleware;
pub mod openapi;
pub mod operation;
pub mod registry;

pub use builder::{OperationBuilder, OperationTarget, PreparedOperation, Reply};
pub use middleware::{OpCtx, OperationMiddleware};
pub use openapi::BEARER_SCHEME;
pub use operation::{
    Enhancements, HeaderSpec, OperationSpec, ParamLocation, ParamSpec, ParamType,
    RequestBodySpec, ResponseSpec,
};
pub use registry::{OpenApiRegistry, OpenApiRegistryImpl, ensure_schema};

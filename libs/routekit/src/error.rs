//! Structured error taxonomy and its wire representation.
//!
//! Runtime failures surface as [`ApiError`] and serialize to the
//! `{"error": {...}}` envelope; registration failures are the separate
//! [`RouterError`] enum and never reach the wire.

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Canonical machine-readable error codes.
pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

/// A structured API error: HTTP status, stable code, human message, and
/// optional machine detail. Validation failures additionally carry
/// per-field errors that render as the `detail` array.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub detail: Option<Value>,
    pub fields: Vec<FieldError>,
}

impl ApiError {
    /// Arbitrary status + caller-supplied business code.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            detail: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message)
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, codes::FORBIDDEN, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    #[must_use]
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            codes::METHOD_NOT_ALLOWED,
            message,
        )
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, codes::CONFLICT, message)
    }

    #[must_use]
    pub fn validation(fields: Vec<FieldError>) -> Self {
        let mut err = Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::VALIDATION_FAILED,
            "request validation failed",
        );
        err.fields = fields;
        err
    }

    /// Single-field validation failure, the common binder case.
    #[must_use]
    pub fn validation_field(
        field: impl Into<String>,
        message: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        Self::validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
            value,
            code: Some("type_mismatch".to_owned()),
        }])
    }

    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, codes::RATE_LIMITED, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            message,
        )
    }

    /// Wrap an opaque failure as `INTERNAL_ERROR`, keeping the original
    /// message in `detail` rather than the public message.
    #[must_use]
    pub fn internal_from(source: impl std::fmt::Display) -> Self {
        Self::internal("internal server error").with_detail(Value::String(source.to_string()))
    }

    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::SERVICE_UNAVAILABLE,
            message,
        )
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Build the wire envelope. Field errors take precedence over an
    /// explicit detail value, per the validation-error response shape.
    #[must_use]
    pub fn to_response_body(
        &self,
        request_id: Option<&str>,
        path: Option<&str>,
    ) -> ErrorResponse {
        let detail = if self.fields.is_empty() {
            self.detail.clone()
        } else {
            serde_json::to_value(&self.fields).ok()
        };
        ErrorResponse {
            error: ErrorDetail {
                status: self.status.as_u16(),
                code: self.code.clone(),
                message: self.message.clone(),
                detail,
                timestamp: Utc::now(),
                request_id: request_id.map(ToOwned::to_owned),
                path: path.map(ToOwned::to_owned),
            },
        }
    }
}

/// One offending input field inside a validation error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Payload of the error envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub detail: Option<Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The `{"error": {...}}` envelope every error response uses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Variant of [`ErrorDetail`] whose `detail` is the field-error list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorDetail {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub detail: Vec<FieldError>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Envelope documented for 422 responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorResponse {
    pub error: ValidationErrorDetail,
}

/// Registration-time failures. These are programming errors in route
/// setup and are reported to the caller, never to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("wildcard must be the last segment in pattern `{pattern}`")]
    WildcardNotLast { pattern: String },

    #[error(
        "pattern `{pattern}` declares parameter `{conflicting}` where sibling routes use `{existing}`"
    )]
    ParamNameConflict {
        pattern: String,
        existing: String,
        conflicting: String,
    },

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate operation id `{0}`")]
    DuplicateOperationId(String),

    #[error("middleware `{name}` depends on `{dependency}`, which must be registered before it")]
    MiddlewareDependency { name: String, dependency: String },

    #[error("duplicate middleware `{0}` in chain")]
    DuplicateMiddleware(String),
}

//! Operation metadata: what the registry stores (C6) and the `OpenAPI`
//! generator consumes (C9).

use http::Method;
use serde_json::Value;

/// Where a declared input field is bound from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

/// Scalar type a path/query parameter coerces to. Header parameters are
/// always strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    #[must_use]
    pub fn json_type(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

/// Parameter specification for API operations. The constraint fields
/// (`default`, `minimum`, …) are surfaced verbatim into the documented
/// parameter schema.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub param_type: ParamType,
    pub required: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    pub example: Option<Value>,
}

impl ParamSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, location: ParamLocation, param_type: ParamType) -> Self {
        let required = location == ParamLocation::Path;
        Self {
            name: name.into(),
            location,
            param_type,
            required,
            description: None,
            default: None,
            minimum: None,
            maximum: None,
            pattern: None,
            format: None,
            example: None,
        }
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    #[must_use]
    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }
}

/// Request body specification for API operations.
#[derive(Clone, Debug)]
pub struct RequestBodySpec {
    pub content_type: &'static str,
    pub description: Option<String>,
    /// Component schema the body documents as.
    pub schema_name: String,
    /// Whether the body is required (`OpenAPI` default is `false`).
    pub required: bool,
    /// Input field the decoded body binds into; `None` means the whole
    /// input value is the body.
    pub field: Option<String>,
}

/// Response specification for API operations.
#[derive(Clone, Debug)]
pub struct ResponseSpec {
    pub status: u16,
    pub content_type: &'static str,
    pub description: String,
    /// Name of a registered component schema (if any).
    pub schema_name: Option<String>,
}

/// A request header an operation middleware documents on every operation
/// it wraps.
#[derive(Clone, Debug)]
pub struct HeaderSpec {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
}

/// `OpenAPI` fragments an operation middleware contributes at
/// registration time.
#[derive(Clone, Debug, Default)]
pub struct Enhancements {
    pub headers: Vec<HeaderSpec>,
    pub responses: Vec<ResponseSpec>,
    /// Security scheme names (e.g. `bearerAuth`).
    pub security: Vec<String>,
    pub tags: Vec<String>,
}

impl Enhancements {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.responses.is_empty()
            && self.security.is_empty()
            && self.tags.is_empty()
    }
}

/// Immutable record of one registered opinionated operation.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub method: Method,
    /// Route pattern in trie form (`/users/:id`).
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub request_body: Option<RequestBodySpec>,
    pub responses: Vec<ResponseSpec>,
    /// Security scheme names required by this operation; overrides the
    /// global requirement when non-empty.
    pub security: Vec<String>,
    pub deprecated: bool,
    /// Internal handler identity used as the `operationId` fallback.
    pub handler_id: String,
}

impl OperationSpec {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let handler_id = format!(
            "{}:{}",
            method.as_str().to_lowercase(),
            path.replace(['/', ':', '*'], "_")
        );
        Self {
            method,
            path,
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            params: Vec::new(),
            request_body: None,
            responses: Vec::new(),
            security: Vec::new(),
            deprecated: false,
            handler_id,
        }
    }

    /// Pattern in documentation form (`/users/{id}`).
    #[must_use]
    pub fn documentation_path(&self) -> String {
        crate::path::documentation_path(&self.path)
    }

    /// Whether this method reads or mutates a specific entity, which
    /// decides the standard 404 response.
    #[must_use]
    pub fn accesses_entity(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    /// Whether this method mutates state, which decides the standard 409
    /// response.
    #[must_use]
    pub fn mutates(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

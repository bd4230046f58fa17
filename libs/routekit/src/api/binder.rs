//! Binding of path/query/header/body data into a typed input value.
//!
//! The declared parameter specs compile into a [`BindPlan`] at
//! registration. At dispatch the plan assembles a JSON object — body
//! first, then declared fields overwriting by name — which the operation
//! pipeline deserializes into the handler's input type in one step.
//!
//! Error split: malformed JSON (body or final shape) is a
//! `400 BAD_REQUEST`; a failed scalar coercion on a path/query parameter
//! is a `422 VALIDATION_FAILED` naming the offending field.

use http::Method;
use serde_json::{Map, Value};

use crate::api::operation::{OperationSpec, ParamLocation, ParamSpec, ParamType};
use crate::error::ApiError;
use crate::http::Request;

/// Compiled binding recipe for one operation.
#[derive(Debug, Clone)]
pub(crate) struct BindPlan {
    params: Vec<PlannedParam>,
    body: Option<PlannedBody>,
}

#[derive(Debug, Clone)]
struct PlannedParam {
    name: String,
    location: ParamLocation,
    param_type: ParamType,
    required: bool,
    default: Option<Value>,
}

#[derive(Debug, Clone)]
struct PlannedBody {
    field: Option<String>,
    required: bool,
}

impl BindPlan {
    pub fn from_spec(spec: &OperationSpec) -> Self {
        Self {
            params: spec.params.iter().map(PlannedParam::from_spec).collect(),
            body: spec.request_body.as_ref().map(|rb| PlannedBody {
                field: rb.field.clone(),
                required: rb.required,
            }),
        }
    }

    /// Assemble the input JSON value for this request.
    pub fn bind(&self, req: &Request) -> Result<Value, ApiError> {
        let mut base = self.bind_body(req)?;

        // Declared fields populate after the body decode and overwrite on
        // name collisions.
        if !self.params.is_empty() {
            if base.is_null() {
                base = Value::Object(Map::new());
            }
            let map = match &mut base {
                Value::Object(map) => map,
                _ => {
                    return Err(ApiError::bad_request(
                        "request body must be a JSON object when bound fields are declared",
                    ));
                }
            };

            let query_pairs = parse_query(req)?;
            for param in &self.params {
                if let Some(value) = param.resolve(req, &query_pairs)? {
                    map.insert(param.name.clone(), value);
                }
            }
        }

        Ok(base)
    }

    fn bind_body(&self, req: &Request) -> Result<Value, ApiError> {
        match &self.body {
            Some(body) => {
                if req.body.is_empty() {
                    if body.required {
                        return Err(ApiError::bad_request("request body is required"));
                    }
                    return Ok(Value::Null);
                }
                let decoded: Value = serde_json::from_slice(&req.body)
                    .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))?;
                match &body.field {
                    Some(field) => {
                        let mut map = Map::new();
                        map.insert(field.clone(), decoded);
                        Ok(Value::Object(map))
                    }
                    None => Ok(decoded),
                }
            }
            None => {
                // No declared body: a JSON body on a bodied (or GET, kept
                // for parity with permissive clients) request decodes into
                // the whole input value.
                let bodied = matches!(
                    req.method,
                    Method::POST | Method::PUT | Method::PATCH | Method::GET
                );
                if bodied && req.is_json() && !req.body.is_empty() {
                    serde_json::from_slice(&req.body)
                        .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }
}

impl PlannedParam {
    fn from_spec(spec: &ParamSpec) -> Self {
        Self {
            name: spec.name.clone(),
            location: spec.location.clone(),
            param_type: spec.param_type,
            required: spec.required,
            default: spec.default.clone(),
        }
    }

    fn resolve(
        &self,
        req: &Request,
        query: &[(String, String)],
    ) -> Result<Option<Value>, ApiError> {
        let raw = match self.location {
            ParamLocation::Path => req.param(&self.name).map(ToOwned::to_owned),
            ParamLocation::Query => query
                .iter()
                .find(|(k, _)| k == &self.name)
                .map(|(_, v)| v.clone()),
            ParamLocation::Header => req.header(&self.name).map(ToOwned::to_owned),
        };

        match raw {
            // An empty query value leaves the field untouched.
            Some(raw) if raw.is_empty() && self.location == ParamLocation::Query => {
                Ok(self.default.clone())
            }
            Some(raw) => {
                if self.location == ParamLocation::Header {
                    return Ok(Some(Value::String(raw)));
                }
                coerce(&raw, self.param_type).map(Some).map_err(|()| {
                    ApiError::validation_field(
                        self.name.clone(),
                        format!("expected {}", self.param_type.json_type()),
                        Some(Value::String(raw)),
                    )
                })
            }
            None if self.required && self.location != ParamLocation::Path => {
                Err(ApiError::validation(vec![crate::error::FieldError {
                    field: self.name.clone(),
                    message: format!("required {} parameter is missing", location_name(&self.location)),
                    value: None,
                    code: Some("required".to_owned()),
                }]))
            }
            None => Ok(self.default.clone()),
        }
    }
}

fn location_name(location: &ParamLocation) -> &'static str {
    match location {
        ParamLocation::Path => "path",
        ParamLocation::Query => "query",
        ParamLocation::Header => "header",
    }
}

fn parse_query(req: &Request) -> Result<Vec<(String, String)>, ApiError> {
    match req.query() {
        Some(q) if !q.is_empty() => serde_urlencoded::from_str::<Vec<(String, String)>>(q)
            .map_err(|e| ApiError::bad_request(format!("malformed query string: {e}"))),
        _ => Ok(Vec::new()),
    }
}

/// Strict scalar coercion per the declared parameter type.
fn coerce(raw: &str, param_type: ParamType) -> Result<Value, ()> {
    match param_type {
        ParamType::String => Ok(Value::String(raw.to_owned())),
        ParamType::Integer => {
            if let Ok(v) = raw.parse::<i64>() {
                Ok(Value::from(v))
            } else if let Ok(v) = raw.parse::<u64>() {
                Ok(Value::from(v))
            } else {
                Err(())
            }
        }
        ParamType::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or(()),
        ParamType::Boolean => raw.parse::<bool>().map(Value::Bool).map_err(|_| ()),
    }
}

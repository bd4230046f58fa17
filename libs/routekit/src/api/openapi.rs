//! `OpenAPI` 3.1 document assembly from registered operation specs.

use std::collections::BTreeMap;

use http::Method;
use serde_json::Value;
use utoipa::openapi::{
    OpenApi, OpenApiBuilder, Ref, RefOr, Required,
    content::ContentBuilder,
    info::InfoBuilder,
    path::{
        HttpMethod, OperationBuilder as UOperationBuilder, ParameterBuilder, ParameterIn,
        PathItemBuilder, PathsBuilder,
    },
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ComponentsBuilder, ObjectBuilder, Schema, SchemaType},
    security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme},
};

use crate::api::operation::{OperationSpec, ParamLocation, ParamSpec};
use crate::api::registry::OpenApiRegistryImpl;
use crate::config::OpenApiConfig;

/// Name of the pre-registered bearer security scheme.
pub const BEARER_SCHEME: &str = "bearerAuth";

/// Build the `OpenAPI` document from registered operations and components.
#[must_use]
pub fn build_openapi(registry: &OpenApiRegistryImpl, info: &OpenApiConfig) -> OpenApi {
    let mut specs = registry.operations();
    specs.sort_by(|a, b| (a.path.as_str(), a.method.as_str()).cmp(&(b.path.as_str(), b.method.as_str())));

    tracing::info!(
        operations = specs.len(),
        "building OpenAPI document snapshot"
    );

    // Group by documented path so multiple methods share one path item.
    let mut by_path: BTreeMap<String, Vec<&OperationSpec>> = BTreeMap::new();
    for spec in &specs {
        by_path.entry(spec.documentation_path()).or_default().push(spec);
    }

    let mut paths = PathsBuilder::new();
    for (doc_path, entries) in by_path {
        let mut item = PathItemBuilder::new();
        for spec in entries {
            item = item.operation(http_method(&spec.method), build_operation(spec));
        }
        paths = paths.path(doc_path, item.build());
    }

    let mut components = ComponentsBuilder::new();
    for (name, schema) in registry.components().iter() {
        components = components.schema(name.clone(), schema.clone());
    }
    components = components.security_scheme(
        BEARER_SCHEME,
        SecurityScheme::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
    );

    let openapi_info = InfoBuilder::new()
        .title(&info.title)
        .version(&info.version)
        .description(info.description.clone())
        .build();

    OpenApiBuilder::new()
        .info(openapi_info)
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

fn build_operation(spec: &OperationSpec) -> utoipa::openapi::path::Operation {
    let mut op = UOperationBuilder::new()
        .operation_id(spec.operation_id.clone().or(Some(spec.handler_id.clone())))
        .summary(spec.summary.clone())
        .description(spec.description.clone());

    for tag in &spec.tags {
        op = op.tag(tag.clone());
    }

    if spec.deprecated {
        op = op.deprecated(Some(utoipa::openapi::Deprecated::True));
    }

    for p in &spec.params {
        let location = match p.location {
            ParamLocation::Path => ParameterIn::Path,
            ParamLocation::Query => ParameterIn::Query,
            ParamLocation::Header => ParameterIn::Header,
        };
        let required = if matches!(p.location, ParamLocation::Path) || p.required {
            Required::True
        } else {
            Required::False
        };

        let param = ParameterBuilder::new()
            .name(&p.name)
            .parameter_in(location)
            .required(required)
            .description(p.description.clone())
            .schema(Some(param_schema(p)))
            .build();
        op = op.parameter(param);
    }

    if let Some(rb) = &spec.request_body {
        let content = ContentBuilder::new()
            .schema(Some(RefOr::Ref(Ref::from_schema_name(
                rb.schema_name.clone(),
            ))))
            .build();
        let mut body = RequestBodyBuilder::new()
            .description(rb.description.clone())
            .content(rb.content_type.to_owned(), content);
        if rb.required {
            body = body.required(Some(Required::True));
        }
        op = op.request_body(Some(body.build()));
    }

    let mut responses = ResponsesBuilder::new();
    for r in &spec.responses {
        let response = if let Some(name) = &r.schema_name {
            let content = ContentBuilder::new()
                .schema(Some(RefOr::Ref(Ref::new(format!(
                    "#/components/schemas/{name}"
                )))))
                .build();
            ResponseBuilder::new()
                .description(&r.description)
                .content(r.content_type, content)
                .build()
        } else if r.status == 204 {
            ResponseBuilder::new().description(&r.description).build()
        } else {
            let content = ContentBuilder::new()
                .schema(Some(Schema::Object(ObjectBuilder::new().build())))
                .build();
            ResponseBuilder::new()
                .description(&r.description)
                .content(r.content_type, content)
                .build()
        };
        responses = responses.response(r.status.to_string(), response);
    }
    op = op.responses(responses.build());

    for scheme in &spec.security {
        op = op.security(SecurityRequirement::new(
            scheme.clone(),
            Vec::<String>::new(),
        ));
    }

    op.build()
}

/// Parameter schema carrying the declared constraints verbatim. Built as
/// JSON and deserialized so optional keywords stay optional; a shape the
/// `utoipa` model rejects degrades to a bare typed schema.
fn param_schema(p: &ParamSpec) -> RefOr<Schema> {
    let mut obj = serde_json::Map::new();
    obj.insert("type".to_owned(), Value::from(p.param_type.json_type()));
    if let Some(format) = &p.format {
        obj.insert("format".to_owned(), Value::from(format.clone()));
    }
    if let Some(default) = &p.default {
        obj.insert("default".to_owned(), default.clone());
    }
    if let Some(min) = p.minimum {
        obj.insert("minimum".to_owned(), Value::from(min));
    }
    if let Some(max) = p.maximum {
        obj.insert("maximum".to_owned(), Value::from(max));
    }
    if let Some(pattern) = &p.pattern {
        obj.insert("pattern".to_owned(), Value::from(pattern.clone()));
    }
    if let Some(example) = &p.example {
        obj.insert("examples".to_owned(), Value::Array(vec![example.clone()]));
    }

    match serde_json::from_value::<Schema>(Value::Object(obj)) {
        Ok(schema) => RefOr::T(schema),
        Err(e) => {
            tracing::warn!(param = %p.name, error = %e, "parameter constraints not representable; using bare schema");
            let fallback = match p.param_type {
                crate::api::operation::ParamType::String => utoipa::openapi::schema::Type::String,
                crate::api::operation::ParamType::Integer => utoipa::openapi::schema::Type::Integer,
                crate::api::operation::ParamType::Number => utoipa::openapi::schema::Type::Number,
                crate::api::operation::ParamType::Boolean => utoipa::openapi::schema::Type::Boolean,
            };
            RefOr::T(Schema::Object(
                ObjectBuilder::new()
                    .schema_type(SchemaType::Type(fallback))
                    .build(),
            ))
        }
    }
}

fn http_method(method: &Method) -> HttpMethod {
    match *method {
        Method::POST => HttpMethod::Post,
        Method::PUT => HttpMethod::Put,
        Method::DELETE => HttpMethod::Delete,
        Method::PATCH => HttpMethod::Patch,
        Method::HEAD => HttpMethod::Head,
        Method::OPTIONS => HttpMethod::Options,
        Method::TRACE => HttpMethod::Trace,
        _ => HttpMethod::Get,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::operation::{ParamType, ResponseSpec};
    use crate::api::registry::OpenApiRegistry;

    fn sample_spec() -> OperationSpec {
        let mut spec = OperationSpec::new(Method::GET, "/users/:id");
        spec.operation_id = Some("users.get".to_owned());
        spec.summary = Some("Get user by id".to_owned());
        spec.params.push(
            ParamSpec::new("id", ParamLocation::Path, ParamType::Integer)
                .description("User id")
                .minimum(1.0),
        );
        spec.responses.push(ResponseSpec {
            status: 200,
            content_type: "application/json",
            description: "User found".to_owned(),
            schema_name: None,
        });
        spec
    }

    #[test]
    fn paths_use_brace_form_and_carry_operations() {
        let registry = OpenApiRegistryImpl::new();
        registry.register_operation(&sample_spec());

        let doc = build_openapi(&registry, &OpenApiConfig::default());
        let json = serde_json::to_value(&doc).unwrap();

        let op = &json["paths"]["/users/{id}"]["get"];
        assert_eq!(op["operationId"], "users.get");
        assert_eq!(op["summary"], "Get user by id");
        let param = &op["parameters"][0];
        assert_eq!(param["name"], "id");
        assert_eq!(param["in"], "path");
        assert_eq!(param["required"], true);
        assert_eq!(param["schema"]["type"], "integer");
        assert_eq!(param["schema"]["minimum"], 1.0);
    }

    #[test]
    fn multiple_methods_share_one_path_item() {
        let registry = OpenApiRegistryImpl::new();
        let mut get = sample_spec();
        get.responses.push(ResponseSpec {
            status: 404,
            content_type: "application/json",
            description: "Not Found".to_owned(),
            schema_name: Some("ErrorResponse".to_owned()),
        });
        registry.register_operation(&get);
        let mut delete = OperationSpec::new(Method::DELETE, "/users/:id");
        delete.params.push(ParamSpec::new(
            "id",
            ParamLocation::Path,
            ParamType::Integer,
        ));
        delete.responses.push(ResponseSpec {
            status: 204,
            content_type: "application/json",
            description: "Deleted".to_owned(),
            schema_name: None,
        });
        registry.register_operation(&delete);

        let doc = build_openapi(&registry, &OpenApiConfig::default());
        let json = serde_json::to_value(&doc).unwrap();
        let item = &json["paths"]["/users/{id}"];
        assert!(item.get("get").is_some());
        assert!(item.get("delete").is_some());
        assert_eq!(
            json["paths"]["/users/{id}"]["get"]["responses"]["404"]["content"]
                ["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorResponse"
        );
    }

    #[test]
    fn bearer_scheme_is_always_present() {
        let registry = OpenApiRegistryImpl::new();
        let doc = build_openapi(&registry, &OpenApiConfig::default());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json["components"]["securitySchemes"]["bearerAuth"]["scheme"],
            "bearer"
        );
    }
}

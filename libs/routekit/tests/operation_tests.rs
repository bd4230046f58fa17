//! Opinionated pipeline: binding, invocation, reply shapes, and the
//! before/after middleware model.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use routekit::{
    ApiError, OpCtx, OperationBuilder, OperationMiddleware, ParamType, Reply, Request, Response,
    Router, RouterConfig,
};

fn bare_config() -> RouterConfig {
    RouterConfig {
        enable_docs: false,
        ..RouterConfig::default()
    }
}

fn body_json(rsp: &Response) -> Value {
    serde_json::from_slice(rsp.body_bytes().expect("buffered body")).unwrap()
}

fn json_request(method: Method, path: &str, body: &str) -> Request {
    Request::new(method, path.parse().unwrap())
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(body.to_owned())
}

#[derive(Debug, Deserialize)]
struct UpdateUser {
    id: i64,
    name: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct UserDto {
    id: i64,
    name: String,
}

async fn update_user(_ctx: Arc<OpCtx>, input: UpdateUser) -> Result<Reply<UserDto>, ApiError> {
    Ok(Reply::json(UserDto {
        id: input.id,
        name: input.name,
    }))
}

fn register_update(router: &mut Router) {
    let api = router.openapi_registry();
    OperationBuilder::post("/users/{id}")
        .operation_id("users.update")
        .summary("Update user")
        .tag("users")
        .path_param("id", ParamType::Integer, "User id")
        .handler(update_user)
        .json_response_with_schema::<UserDto>(api.as_ref(), StatusCode::OK, "Updated user")
        .register(router)
        .unwrap();
}

#[tokio::test]
async fn binds_path_and_body_into_typed_input() {
    let mut router = Router::new(bare_config());
    register_update(&mut router);

    let rsp = router
        .dispatch(json_request(Method::POST, "/users/7", r#"{"name": "ada"}"#))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    let body = body_json(&rsp);
    assert_eq!(body["id"], 7);
    assert_eq!(body["name"], "ada");
}

#[tokio::test]
async fn path_coercion_failure_is_422_naming_the_field() {
    let mut router = Router::new(bare_config());
    register_update(&mut router);

    let rsp = router
        .dispatch(json_request(Method::POST, "/users/abc", r#"{"name": "x"}"#))
        .await;
    assert_eq!(rsp.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(&rsp);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["detail"][0]["field"], "id");
    assert_eq!(body["error"]["detail"][0]["value"], "abc");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let mut router = Router::new(bare_config());
    register_update(&mut router);

    let rsp = router
        .dispatch(json_request(Method::POST, "/users/7", "{broken"))
        .await;
    assert_eq!(rsp.status, StatusCode::BAD_REQUEST);
    assert_eq!(body_json(&rsp)["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn reply_variants_control_status_and_body() {
    let mut router = Router::new(bare_config());
    let api = router.openapi_registry();

    OperationBuilder::post("/widgets")
        .operation_id("widgets.create")
        .handler(|_ctx: Arc<OpCtx>, input: Value| async move {
            Ok(Reply::created(json!({"made": input["kind"]})))
        })
        .json_response(StatusCode::CREATED, "Created")
        .register(&mut router)
        .unwrap();

    OperationBuilder::delete("/widgets/{id}")
        .operation_id("widgets.delete")
        .path_param("id", ParamType::Integer, "Widget id")
        .handler(|_ctx: Arc<OpCtx>, _input: Value| async move {
            Ok(Reply::<Value>::no_content())
        })
        .json_response(StatusCode::NO_CONTENT, "Deleted")
        .register(&mut router)
        .unwrap();

    OperationBuilder::get("/widgets/{id}/export")
        .operation_id("widgets.export")
        .path_param("id", ParamType::Integer, "Widget id")
        .handler(|_ctx: Arc<OpCtx>, _input: Value| async move {
            Ok(
                Reply::custom(StatusCode::ACCEPTED, json!({"queued": true})).with_header(
                    http::HeaderName::from_static("x-job"),
                    HeaderValue::from_static("17"),
                ),
            )
        })
        .json_response_with_schema::<UserDto>(api.as_ref(), StatusCode::ACCEPTED, "Queued")
        .register(&mut router)
        .unwrap();

    let rsp = router
        .dispatch(json_request(Method::POST, "/widgets", r#"{"kind": "gear"}"#))
        .await;
    assert_eq!(rsp.status, StatusCode::CREATED);
    assert_eq!(body_json(&rsp)["made"], "gear");

    let rsp = router
        .dispatch(Request::new(Method::DELETE, "/widgets/3".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::NO_CONTENT);
    assert!(rsp.body_bytes().is_none());

    let rsp = router
        .dispatch(Request::new(
            Method::GET,
            "/widgets/3/export".parse().unwrap(),
        ))
        .await;
    assert_eq!(rsp.status, StatusCode::ACCEPTED);
    assert_eq!(rsp.headers.get("x-job").unwrap(), "17");
    assert_eq!(body_json(&rsp)["queued"], true);
}

#[tokio::test]
async fn handler_api_error_surfaces_as_is() {
    let mut router = Router::new(bare_config());
    OperationBuilder::get("/teapot")
        .operation_id("teapot")
        .handler(|_ctx: Arc<OpCtx>, _input: ()| async move {
            Err::<Reply<Value>, _>(ApiError::new(
                StatusCode::IM_A_TEAPOT,
                "TEAPOT",
                "short and stout",
            ))
        })
        .json_response(StatusCode::OK, "Never")
        .register(&mut router)
        .unwrap();

    let rsp = router
        .dispatch(Request::new(Method::GET, "/teapot".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body_json(&rsp)["error"]["code"], "TEAPOT");
}

// --- middleware model ----------------------------------------------------

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail_before: bool,
}

#[async_trait]
impl OperationMiddleware for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn before(&self, _ctx: &OpCtx) -> Result<(), ApiError> {
        self.log.lock().push(format!("{}:before", self.name));
        if self.fail_before {
            return Err(ApiError::unauthorized("missing credentials"));
        }
        Ok(())
    }

    async fn after(&self, _ctx: &OpCtx) -> Result<(), ApiError> {
        self.log.lock().push(format!("{}:after", self.name));
        Ok(())
    }
}

fn recorder(
    name: &'static str,
    log: &Arc<Mutex<Vec<String>>>,
    fail_before: bool,
) -> Arc<dyn OperationMiddleware> {
    Arc::new(Recorder {
        name,
        log: Arc::clone(log),
        fail_before,
    })
}

fn register_probe(router: &mut Router, invoked: Arc<AtomicBool>) {
    OperationBuilder::get("/probe")
        .operation_id("probe")
        .handler(move |_ctx: Arc<OpCtx>, _input: ()| {
            let invoked = Arc::clone(&invoked);
            async move {
                invoked.store(true, Ordering::SeqCst);
                Ok(Reply::json(json!({"ok": true})))
            }
        })
        .json_response(StatusCode::OK, "OK")
        .register(router)
        .unwrap();
}

#[tokio::test]
async fn after_hooks_unwind_in_reverse_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(recorder("m1", &log, false))
        .unwrap();
    router
        .use_operation_middleware(recorder("m2", &log, false))
        .unwrap();
    router
        .use_operation_middleware(recorder("m3", &log, false))
        .unwrap();
    let invoked = Arc::new(AtomicBool::new(false));
    register_probe(&mut router, Arc::clone(&invoked));

    let rsp = router
        .dispatch(Request::new(Method::GET, "/probe".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    assert!(invoked.load(Ordering::SeqCst));
    assert_eq!(
        *log.lock(),
        vec![
            "m1:before", "m2:before", "m3:before",
            "m3:after", "m2:after", "m1:after",
        ]
    );
}

#[tokio::test]
async fn failing_before_short_circuits_but_unwinds_executed_hooks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(recorder("m1", &log, false))
        .unwrap();
    router
        .use_operation_middleware(recorder("m2", &log, true))
        .unwrap();
    router
        .use_operation_middleware(recorder("m3", &log, false))
        .unwrap();
    let invoked = Arc::new(AtomicBool::new(false));
    register_probe(&mut router, Arc::clone(&invoked));

    let rsp = router
        .dispatch(Request::new(Method::GET, "/probe".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(&rsp)["error"]["code"], "UNAUTHORIZED");
    assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
    // m2's before failed, so only m1's before completed successfully and
    // unwinding runs the afters of m1 and m2 (whose before executed),
    // never m3's.
    assert_eq!(
        *log.lock(),
        vec!["m1:before", "m2:before", "m2:after", "m1:after"]
    );
}

struct RequireAuthHeader;

#[async_trait]
impl OperationMiddleware for RequireAuthHeader {
    fn name(&self) -> &str {
        "require-auth"
    }

    async fn before(&self, ctx: &OpCtx) -> Result<(), ApiError> {
        if ctx.header("authorization").is_none() {
            return Err(ApiError::unauthorized("Authorization header required"));
        }
        Ok(())
    }

    fn requires_auth(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn auth_middleware_rejects_before_handler_runs() {
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(Arc::new(RequireAuthHeader))
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let api = router.openapi_registry();

    #[derive(Deserialize)]
    struct CreateUser {
        #[allow(dead_code)]
        name: String,
        #[allow(dead_code)]
        email: String,
    }

    #[derive(Serialize, ToSchema)]
    struct Created {
        ok: bool,
    }

    OperationBuilder::post("/users")
        .operation_id("users.create")
        .handler(move |_ctx: Arc<OpCtx>, _input: CreateUser| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(Reply::created(Created { ok: true }))
            }
        })
        .json_response_with_schema::<Created>(api.as_ref(), StatusCode::CREATED, "Created")
        .register(&mut router)
        .unwrap();

    let rsp = router
        .dispatch(json_request(
            Method::POST,
            "/users",
            r#"{"name": "a", "email": "a@b.c"}"#,
        ))
        .await;
    assert_eq!(rsp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(&rsp)["error"]["code"], "UNAUTHORIZED");
    assert!(!invoked.load(Ordering::SeqCst), "handler must not run");

    let rsp = router
        .dispatch(
            json_request(Method::POST, "/users", r#"{"name": "a", "email": "a@b.c"}"#)
                .with_header(
                    http::header::AUTHORIZATION,
                    HeaderValue::from_static("Bearer ok"),
                ),
        )
        .await;
    assert_eq!(rsp.status, StatusCode::CREATED);
    assert!(invoked.load(Ordering::SeqCst));
}

struct MutatingMiddleware;

#[async_trait]
impl OperationMiddleware for MutatingMiddleware {
    fn name(&self) -> &str {
        "mutator"
    }

    async fn before(&self, ctx: &OpCtx) -> Result<(), ApiError> {
        // Rewrite the bound input before the handler sees it.
        if let Some(mut input) = ctx.input_json()
            && let Some(obj) = input.as_object_mut()
        {
            obj.insert("name".to_owned(), Value::from("overridden"));
            ctx.set_input_json(input);
        }
        Ok(())
    }

    async fn after(&self, ctx: &OpCtx) -> Result<(), ApiError> {
        if let Some(mut output) = ctx.output_json()
            && let Some(obj) = output.as_object_mut()
        {
            obj.insert("stamped".to_owned(), Value::from(true));
            ctx.set_output_json(output);
        }
        ctx.set_status(StatusCode::ACCEPTED);
        ctx.append_response_header("x-mutated", "yes");
        Ok(())
    }
}

#[tokio::test]
async fn middleware_mutates_input_output_status_and_headers() {
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(Arc::new(MutatingMiddleware))
        .unwrap();
    register_update(&mut router);

    let rsp = router
        .dispatch(json_request(Method::POST, "/users/5", r#"{"name": "ada"}"#))
        .await;
    assert_eq!(rsp.status, StatusCode::ACCEPTED);
    assert_eq!(rsp.headers.get("x-mutated").unwrap(), "yes");
    let body = body_json(&rsp);
    assert_eq!(body["name"], "overridden");
    assert_eq!(body["stamped"], true);
}

struct ProcessedMiddleware;

#[async_trait]
impl OperationMiddleware for ProcessedMiddleware {
    fn name(&self) -> &str {
        "processed"
    }

    async fn before(&self, ctx: &OpCtx) -> Result<(), ApiError> {
        ctx.set_output_json(json!({"served_by": "middleware"}));
        ctx.mark_processed();
        Ok(())
    }
}

#[tokio::test]
async fn processed_flag_keeps_middleware_body() {
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(Arc::new(ProcessedMiddleware))
        .unwrap();
    let invoked = Arc::new(AtomicBool::new(false));
    register_probe(&mut router, Arc::clone(&invoked));

    let rsp = router
        .dispatch(Request::new(Method::GET, "/probe".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    // The handler ran but its output did not overwrite the middleware's.
    assert!(invoked.load(Ordering::SeqCst));
    assert_eq!(body_json(&rsp)["served_by"], "middleware");
}

struct PerUserData;

#[async_trait]
impl OperationMiddleware for PerUserData {
    fn name(&self) -> &str {
        "per-user-data"
    }

    fn caching_safe(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn cache_unsafe_middleware_stamps_no_store() {
    let mut router = Router::new(bare_config());
    router
        .use_operation_middleware(Arc::new(PerUserData))
        .unwrap();
    let invoked = Arc::new(AtomicBool::new(false));
    register_probe(&mut router, Arc::clone(&invoked));

    let rsp = router
        .dispatch(Request::new(Method::GET, "/probe".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    assert_eq!(
        rsp.headers.get(http::header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}

#[tokio::test]
async fn cache_safe_chain_leaves_headers_alone() {
    let mut router = Router::new(bare_config());
    let invoked = Arc::new(AtomicBool::new(false));
    register_probe(&mut router, Arc::clone(&invoked));

    let rsp = router
        .dispatch(Request::new(Method::GET, "/probe".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    assert!(rsp.headers.get(http::header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn request_id_is_mirrored_into_response_and_errors() {
    let mut router = Router::new(bare_config());
    register_update(&mut router);

    let rsp = router
        .dispatch(
            json_request(Method::POST, "/users/oops", r#"{"name": "x"}"#).with_header(
                http::HeaderName::from_static("x-request-id"),
                HeaderValue::from_static("trace-1"),
            ),
        )
        .await;
    assert_eq!(rsp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(rsp.headers.get("x-request-id").unwrap(), "trace-1");
    assert_eq!(body_json(&rsp)["error"]["request_id"], "trace-1");
}

#[tokio::test]
async fn group_registration_prefixes_opinionated_routes() {
    let mut router = Router::new(bare_config());
    {
        let mut api_group = router.group("/api/v1");
        OperationBuilder::get("/users/{id}")
            .operation_id("api.users.get")
            .path_param("id", ParamType::Integer, "User id")
            .handler(|_ctx: Arc<OpCtx>, input: Value| async move {
                Ok(Reply::json(json!({"id": input["id"]})))
            })
            .json_response(StatusCode::OK, "OK")
            .register(&mut api_group)
            .unwrap();
    }

    let rsp = router
        .dispatch(Request::new(Method::GET, "/api/v1/users/11".parse().unwrap()))
        .await;
    assert_eq!(rsp.status, StatusCode::OK);
    assert_eq!(body_json(&rsp)["id"], 11);
}

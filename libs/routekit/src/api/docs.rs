//! Documentation endpoints: the JSON documents and the HTML shells that
//! load them.
//!
//! Both documents are registration-time artifacts, so responses come from
//! an `ArcSwap` snapshot keyed by the registry revision; after startup the
//! read path never rebuilds.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use http::StatusCode;

use crate::api::openapi::build_openapi;
use crate::api::registry::OpenApiRegistryImpl;
use crate::config::{AsyncApiConfig, OpenApiConfig};
use crate::http::{Handler, Response};
use crate::realtime::asyncapi::{AsyncApiRegistryImpl, build_asyncapi};

struct CachedDoc {
    revision: u64,
    body: Bytes,
}

/// Revision-checked cache of one rendered JSON document.
#[derive(Default)]
pub(crate) struct DocCache {
    slot: ArcSwapOption<CachedDoc>,
}

impl DocCache {
    fn get_or_render(
        &self,
        revision: u64,
        render: impl FnOnce() -> Result<Vec<u8>, serde_json::Error>,
    ) -> Option<Bytes> {
        if let Some(cached) = self.slot.load_full()
            && cached.revision == revision
        {
            return Some(cached.body.clone());
        }
        match render() {
            Ok(bytes) => {
                let body = Bytes::from(bytes);
                self.slot.store(Some(Arc::new(CachedDoc {
                    revision,
                    body: body.clone(),
                })));
                Some(body)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to render documentation snapshot");
                None
            }
        }
    }
}

fn json_doc_response(body: Option<Bytes>) -> Response {
    match body {
        Some(bytes) => {
            let mut rsp = Response::empty(StatusCode::OK);
            rsp.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            rsp.body = crate::http::Body::Full(bytes);
            rsp
        }
        None => Response::empty(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for `/openapi.json`.
pub(crate) fn openapi_json_handler(
    registry: Arc<OpenApiRegistryImpl>,
    config: OpenApiConfig,
) -> Handler {
    let cache = Arc::new(DocCache::default());
    Handler::new(move |_req| {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        let cache = Arc::clone(&cache);
        async move {
            let body = cache.get_or_render(registry.revision(), || {
                serde_json::to_vec(&build_openapi(&registry, &config))
            });
            json_doc_response(body)
        }
    })
}

/// Handler for `/asyncapi`.
pub(crate) fn asyncapi_json_handler(
    registry: Arc<AsyncApiRegistryImpl>,
    config: AsyncApiConfig,
) -> Handler {
    let cache = Arc::new(DocCache::default());
    Handler::new(move |_req| {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        let cache = Arc::clone(&cache);
        async move {
            let body = cache.get_or_render(registry.revision(), || {
                serde_json::to_vec(&build_asyncapi(&registry, &config))
            });
            json_doc_response(body)
        }
    })
}

/// Handler serving a fixed HTML page.
pub(crate) fn html_handler(markup: String) -> Handler {
    let markup = Arc::new(markup);
    Handler::new(move |_req| {
        let markup = Arc::clone(&markup);
        async move { Response::html(StatusCode::OK, markup.as_str()) }
    })
}

pub(crate) fn swagger_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - Swagger UI</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css"/>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({{ url: '/openapi.json', dom_id: '#swagger-ui' }});
  </script>
</body>
</html>"#
    )
}

pub(crate) fn redoc_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - ReDoc</title>
</head>
<body>
  <redoc spec-url="/openapi.json"></redoc>
  <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
</body>
</html>"#
    )
}

pub(crate) fn scalar_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - Scalar</title>
</head>
<body>
  <script id="api-reference" data-url="/openapi.json"></script>
  <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
</body>
</html>"#
    )
}

pub(crate) fn spotlight_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - Stoplight Elements</title>
  <script src="https://unpkg.com/@stoplight/elements/web-components.min.js"></script>
  <link rel="stylesheet" href="https://unpkg.com/@stoplight/elements/styles.min.css"/>
</head>
<body>
  <elements-api apiDescriptionUrl="/openapi.json" router="hash" layout="sidebar"></elements-api>
</body>
</html>"#
    )
}

pub(crate) fn docs_index_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - API Documentation</title>
</head>
<body>
  <h1>{title}</h1>
  <ul>
    <li><a href="/openapi/swagger">Swagger UI</a></li>
    <li><a href="/openapi/redoc">ReDoc</a></li>
    <li><a href="/openapi/scalar">Scalar</a></li>
    <li><a href="/openapi/spotlight">Stoplight Elements</a></li>
  </ul>
  <p><a href="/openapi.json">OpenAPI document</a> &middot; <a href="/asyncapi">AsyncAPI document</a></p>
</body>
</html>"#
    )
}

pub(crate) fn asyncapi_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>{title} - AsyncAPI</title>
  <link rel="stylesheet" href="https://unpkg.com/@asyncapi/react-component@1/styles/default.min.css"/>
</head>
<body>
  <div id="asyncapi"></div>
  <script src="https://unpkg.com/@asyncapi/react-component@1/browser/standalone/index.js"></script>
  <script>
    AsyncApiStandalone.render({{ schema: {{ url: '/asyncapi' }} }}, document.getElementById('asyncapi'));
  </script>
</body>
</html>"#
    )
}

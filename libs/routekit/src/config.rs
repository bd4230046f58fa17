//! Router configuration.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Behavior toggles and document metadata for a [`crate::Router`].
///
/// All fields default so the config can be deserialized from a partial
/// document; the library itself performs no file loading.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RouterConfig {
    /// On a lookup miss, retry the alternate trailing-slash form and
    /// redirect when it matches.
    pub redirect_trailing_slash: bool,
    /// Also retry the cleaned and lowercased path.
    pub redirect_fixed_path: bool,
    /// Synthesize `405 Method Not Allowed` with an `Allow` header.
    pub handle_method_not_allowed: bool,
    /// Synthesize `204` responses for `OPTIONS` on known paths.
    pub handle_options: bool,
    /// Install the documentation endpoints (`/openapi.json`, the HTML
    /// shells, `/asyncapi`).
    pub enable_docs: bool,

    /// `OpenAPI` document metadata.
    pub openapi: OpenApiConfig,
    /// `AsyncAPI` document metadata.
    pub asyncapi: AsyncApiConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_method_not_allowed: true,
            handle_options: true,
            enable_docs: true,
            openapi: OpenApiConfig::default(),
            asyncapi: AsyncApiConfig::default(),
        }
    }
}

/// `OpenAPI` document metadata configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct OpenApiConfig {
    /// API title shown in the documentation shells.
    pub title: String,
    /// API version.
    pub version: String,
    /// API description (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            title: "API Documentation".to_owned(),
            version: "0.1.0".to_owned(),
            description: None,
        }
    }
}

/// `AsyncAPI` document metadata configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AsyncApiConfig {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for AsyncApiConfig {
    fn default() -> Self {
        Self {
            title: "Realtime API".to_owned(),
            version: "0.1.0".to_owned(),
            description: None,
        }
    }
}

//! `AsyncAPI` 2.6 document model and registry.
//!
//! The registry mirrors the `OpenAPI` one: channel specs collect in a
//! `DashMap` during registration, payload schemas (the same `utoipa`
//! schemas, serialized to JSON) merge copy-on-write into an `ArcSwap`
//! snapshot. WebSocket channels document both directions (`publish` for
//! the client-sent message, `subscribe` for the server reply); SSE
//! channels document `subscribe` only.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::config::AsyncApiConfig;

/// One registered realtime channel.
#[derive(Clone, Debug)]
pub struct ChannelSpec {
    /// Channel address in documentation form (`/ws/chat/{room}`).
    pub path: String,
    pub kind: ChannelKind,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Path parameter names, documented as string channel parameters.
    pub params: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum ChannelKind {
    /// Bidirectional: client publishes `message`, server replies with
    /// `response`.
    WebSocket { message: String, response: String },
    /// Server push only; `payload` is the emitted-data schema.
    ServerSentEvents { payload: String },
}

/// Registry of realtime channels and their payload schemas.
pub struct AsyncApiRegistryImpl {
    channels: DashMap<String, ChannelSpec>,
    schemas: ArcSwap<HashMap<String, Value>>,
    revision: AtomicU64,
}

impl AsyncApiRegistryImpl {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            schemas: ArcSwap::from_pointee(HashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn register_channel(&self, spec: ChannelSpec) {
        tracing::debug!(path = %spec.path, "registered realtime channel");
        self.channels.insert(spec.path.clone(), spec);
        self.bump();
    }

    #[must_use]
    pub fn channels(&self) -> Vec<ChannelSpec> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn schemas(&self) -> Arc<HashMap<String, Value>> {
        self.schemas.load_full()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Merge serialized schemas under components; identical entries are
    /// no-ops, conflicting ones warn and override.
    pub fn ensure_schema_values(&self, root_name: &str, schemas: Vec<(String, Value)>) -> String {
        let current = self.schemas.load();
        let mut merged = (**current).clone();
        let mut changed = false;
        for (name, schema) in schemas {
            if let Some(existing) = merged.get(&name) {
                if *existing == schema {
                    continue;
                }
                tracing::warn!(%name, "schema content conflict; overriding with latest");
            }
            merged.insert(name, schema);
            changed = true;
        }
        if changed {
            self.schemas.store(Arc::new(merged));
            self.bump();
        }
        root_name.to_owned()
    }
}

impl Default for AsyncApiRegistryImpl {
    fn default() -> Self {
        Self::new()
    }
}

/// Ensure `T`'s schema (dependencies included) is present in the
/// `AsyncAPI` components; returns the component name.
pub fn ensure_async_schema<T: utoipa::ToSchema + utoipa::PartialSchema + 'static>(
    registry: &AsyncApiRegistryImpl,
) -> String {
    use utoipa::PartialSchema;

    let root_name = T::name().to_string();
    let mut collected = vec![(root_name.clone(), <T as PartialSchema>::schema())];
    T::schemas(&mut collected);

    let values = collected
        .into_iter()
        .filter_map(|(name, schema)| serde_json::to_value(&schema).ok().map(|v| (name, v)))
        .collect();
    registry.ensure_schema_values(&root_name, values)
}

// --- Document model -------------------------------------------------------

#[derive(Serialize)]
struct AsyncApiDoc {
    asyncapi: &'static str,
    info: Info,
    channels: BTreeMap<String, Channel>,
    components: Components,
}

#[derive(Serialize)]
struct Info {
    title: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize, Default)]
struct Channel {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    publish: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscribe: Option<Operation>,
}

#[derive(Serialize)]
struct Parameter {
    schema: Value,
}

#[derive(Serialize)]
struct Operation {
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<Tag>,
    message: Message,
}

#[derive(Serialize, Clone)]
struct Tag {
    name: String,
}

#[derive(Serialize)]
struct Message {
    name: String,
    payload: Value,
}

#[derive(Serialize)]
struct Components {
    schemas: BTreeMap<String, Value>,
}

fn schema_ref(name: &str) -> Value {
    serde_json::json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn operation_id(path: &str, verb: &str) -> String {
    format!("{verb}:{}", path.replace(['/', '{', '}'], "_"))
}

/// Build the `AsyncAPI` 2.6 document from registered channels.
#[must_use]
pub fn build_asyncapi(registry: &AsyncApiRegistryImpl, info: &AsyncApiConfig) -> Value {
    let mut channels = BTreeMap::new();
    let mut specs = registry.channels();
    specs.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(channels = specs.len(), "building AsyncAPI document snapshot");

    for spec in specs {
        let mut channel = Channel {
            description: spec.description.clone(),
            ..Channel::default()
        };
        for param in &spec.params {
            channel.parameters.insert(
                param.clone(),
                Parameter {
                    schema: serde_json::json!({"type": "string"}),
                },
            );
        }
        let tags: Vec<Tag> = spec.tags.iter().map(|t| Tag { name: t.clone() }).collect();

        match &spec.kind {
            ChannelKind::WebSocket { message, response } => {
                channel.publish = Some(Operation {
                    operation_id: Some(operation_id(&spec.path, "send")),
                    summary: spec.summary.clone(),
                    tags: tags.clone(),
                    message: Message {
                        name: message.clone(),
                        payload: schema_ref(message),
                    },
                });
                channel.subscribe = Some(Operation {
                    operation_id: Some(operation_id(&spec.path, "receive")),
                    summary: spec.summary.clone(),
                    tags,
                    message: Message {
                        name: response.clone(),
                        payload: schema_ref(response),
                    },
                });
            }
            ChannelKind::ServerSentEvents { payload } => {
                channel.subscribe = Some(Operation {
                    operation_id: Some(operation_id(&spec.path, "receive")),
                    summary: spec.summary.clone(),
                    tags,
                    message: Message {
                        name: payload.clone(),
                        payload: schema_ref(payload),
                    },
                });
            }
        }
        channels.insert(spec.path.clone(), channel);
    }

    let mut schemas = BTreeMap::new();
    for (name, schema) in registry.schemas().iter() {
        schemas.insert(name.clone(), schema.clone());
    }

    let doc = AsyncApiDoc {
        asyncapi: "2.6.0",
        info: Info {
            title: info.title.clone(),
            version: info.version.clone(),
            description: info.description.clone(),
        },
        channels,
        components: Components { schemas },
    };

    serde_json::to_value(&doc).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize AsyncAPI document");
        Value::Null
    })
}

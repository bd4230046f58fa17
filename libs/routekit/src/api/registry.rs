//! `OpenAPI` registry for schema and operation management.
//!
//! Collects operation specs and component schemas during registration and
//! hands the generator a consistent view. Reads are lock-free: operations
//! live in a `DashMap`, components behind an `ArcSwap` snapshot that is
//! copy-on-write merged on every `ensure_schema` call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use utoipa::openapi::schema::Schema;
use utoipa::openapi::RefOr;

use crate::api::operation::OperationSpec;

/// Type alias for schema collections used in API operations.
pub type SchemaCollection = Vec<(String, RefOr<Schema>)>;

/// `OpenAPI` registry trait for operation and schema registration.
pub trait OpenApiRegistry: Send + Sync {
    /// Register an API operation specification.
    fn register_operation(&self, spec: &OperationSpec);

    /// Ensure a schema (and its transitive dependencies) is registered
    /// under components; returns the canonical component name for `$ref`.
    /// Type-erased for dyn compatibility.
    fn ensure_schema_raw(&self, name: &str, schemas: SchemaCollection) -> String;
}

/// Ensure the schema for `T` is registered, dependencies included.
pub fn ensure_schema<T: utoipa::ToSchema + utoipa::PartialSchema + 'static>(
    registry: &dyn OpenApiRegistry,
) -> String {
    use utoipa::PartialSchema;

    let root_name = T::name().to_string();

    // Insert T's own schema first (the actual object, not a ref) so a
    // self-referential type never resolves to itself.
    let mut collected: SchemaCollection = vec![(root_name.clone(), <T as PartialSchema>::schema())];
    T::schemas(&mut collected);

    registry.ensure_schema_raw(&root_name, collected)
}

/// Registry implementation backed by lock-free data structures.
pub struct OpenApiRegistryImpl {
    /// Operation specs keyed by `METHOD:path`.
    operations: DashMap<String, OperationSpec>,
    /// Component schemas; snapshot-swapped on writes.
    components: ArcSwap<HashMap<String, RefOr<Schema>>>,
    /// Bumped on every mutation; document caches compare against it.
    revision: AtomicU64,
}

impl OpenApiRegistryImpl {
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
            components: ArcSwap::from_pointee(HashMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    /// Snapshot of all registered operation specs.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationSpec> {
        self.operations.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of the component schemas.
    #[must_use]
    pub fn components(&self) -> Arc<HashMap<String, RefOr<Schema>>> {
        self.components.load_full()
    }

    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Monotonic change counter for snapshot invalidation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for OpenApiRegistryImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenApiRegistry for OpenApiRegistryImpl {
    fn register_operation(&self, spec: &OperationSpec) {
        let key = format!("{}:{}", spec.method.as_str(), spec.path);
        self.operations.insert(key.clone(), spec.clone());
        self.bump();

        tracing::debug!(
            handler_id = %spec.handler_id,
            method = %spec.method.as_str(),
            path = %spec.path,
            operation_key = %key,
            "registered API operation"
        );
    }

    fn ensure_schema_raw(&self, root_name: &str, schemas: SchemaCollection) -> String {
        // Snapshot & copy-on-write.
        let current = self.components.load();
        let mut merged = (**current).clone();
        let mut changed = false;

        for (name, schema) in schemas {
            // Conflict policy: identical schema is a no-op; a different
            // one warns and overrides with the latest.
            if let Some(existing) = merged.get(&name) {
                let a = serde_json::to_value(existing).ok();
                let b = serde_json::to_value(&schema).ok();
                if a == b {
                    continue;
                }
                tracing::warn!(%name, "schema content conflict; overriding with latest");
            }
            merged.insert(name, schema);
            changed = true;
        }

        if changed {
            self.components.store(Arc::new(merged));
            self.bump();
        }
        root_name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde::Serialize;
    use utoipa::ToSchema;

    #[derive(Serialize, ToSchema)]
    struct Widget {
        name: String,
        price: Option<f64>,
        parts: Vec<WidgetPart>,
    }

    #[derive(Serialize, ToSchema)]
    struct WidgetPart {
        sku: String,
    }

    #[test]
    fn ensure_schema_registers_dependencies() {
        let registry = OpenApiRegistryImpl::new();
        let name = ensure_schema::<Widget>(&registry);
        assert_eq!(name, "Widget");
        let components = registry.components();
        assert!(components.contains_key("Widget"));
        assert!(components.contains_key("WidgetPart"));
    }

    #[test]
    fn identical_schema_reregistration_is_noop() {
        let registry = OpenApiRegistryImpl::new();
        ensure_schema::<Widget>(&registry);
        let before = registry.revision();
        ensure_schema::<Widget>(&registry);
        assert_eq!(registry.revision(), before);
        assert_eq!(
            registry
                .components()
                .keys()
                .filter(|k| k.as_str() == "Widget")
                .count(),
            1
        );
    }

    #[test]
    fn operations_key_by_method_and_path() {
        let registry = OpenApiRegistryImpl::new();
        registry.register_operation(&OperationSpec::new(Method::GET, "/widgets/:id"));
        registry.register_operation(&OperationSpec::new(Method::DELETE, "/widgets/:id"));
        assert_eq!(registry.operation_count(), 2);
    }
}

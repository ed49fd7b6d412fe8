//! Bulk materialization of search hits.
//!
//! Given the keys an index search returned, multi-gets the full resources.
//! Missing keys are skipped silently: the store may have deleted a row
//! between the index hit and the fetch.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SearchResult;
use crate::service::CollectionRouting;
use medbase_storage::{DocumentStore, Keyspace};

/// Bulk KV fetch service.
pub struct KvFetchService {
    store: Arc<dyn DocumentStore>,
    routing: CollectionRouting,
}

impl KvFetchService {
    pub fn new(store: Arc<dyn DocumentStore>, routing: CollectionRouting) -> Self {
        Self { store, routing }
    }

    /// Fetch the resources behind `keys`, preserving input order. Documents
    /// of an unexpected `resourceType` are dropped with a warning.
    pub async fn fetch(&self, keys: &[String], resource_type: &str) -> SearchResult<Vec<Value>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keyspace = Keyspace::resources(self.routing.target_collection(resource_type));
        let docs = self.store.multi_get(&keyspace, keys).await?;
        if docs.len() < keys.len() {
            debug!(
                requested = keys.len(),
                found = docs.len(),
                resource_type,
                "some keys vanished between search and fetch"
            );
        }

        let resources = docs
            .into_iter()
            .filter_map(|doc| {
                let actual = doc.content.get("resourceType").and_then(Value::as_str);
                if actual == Some(resource_type) {
                    Some(doc.content)
                } else {
                    warn!(key = %doc.key, ?actual, expected = resource_type, "dropping mistyped document");
                    None
                }
            })
            .collect();
        Ok(resources)
    }
}

//! Tombstone bookkeeping.
//!
//! A tombstone records a deleted `(type, id)` so the pair can never be
//! reused. Lookup is a single KV existence check.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::WriteResult;
use medbase_core::id::document_key;
use medbase_core::time::now_instant_string;
use medbase_storage::{DocumentStore, Keyspace, StoreTransaction};

/// O(1) tombstone checks and marker writes.
pub struct TombstoneService {
    store: Arc<dyn DocumentStore>,
}

impl TombstoneService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Whether `(type, id)` was ever deleted.
    pub async fn is_tombstoned(&self, resource_type: &str, id: &str) -> WriteResult<bool> {
        let key = document_key(resource_type, id);
        Ok(self.store.exists(&Keyspace::tombstones(), &key).await?)
    }

    /// The marker document for a deletion.
    pub fn marker(resource_type: &str, id: &str, last_version_id: &str) -> Value {
        json!({
            "resourceType": resource_type,
            "id": id,
            "deletedAt": now_instant_string(),
            "lastVersionId": last_version_id,
        })
    }

    /// Write the marker inside an enclosing transaction.
    pub async fn write_marker_in_tx(
        &self,
        tx: &mut dyn StoreTransaction,
        resource_type: &str,
        id: &str,
        last_version_id: &str,
    ) -> WriteResult<()> {
        let key = document_key(resource_type, id);
        tx.upsert(
            &Keyspace::tombstones(),
            &key,
            Self::marker(resource_type, id, last_version_id),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbase_db_memory::MemoryStore;

    #[tokio::test]
    async fn test_tombstone_roundtrip() {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient"]);
        let store: Arc<dyn DocumentStore> = Arc::new(store);
        let service = TombstoneService::new(store.clone());

        assert!(!service.is_tombstoned("Patient", "p1").await.unwrap());

        let mut tx = store.begin().await.unwrap();
        service
            .write_marker_in_tx(tx.as_mut(), "Patient", "p1", "3")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(service.is_tombstoned("Patient", "p1").await.unwrap());
    }

    #[test]
    fn test_marker_shape() {
        let marker = TombstoneService::marker("Patient", "p1", "2");
        assert_eq!(marker["resourceType"], "Patient");
        assert_eq!(marker["id"], "p1");
        assert_eq!(marker["lastVersionId"], "2");
        assert!(marker["deletedAt"].is_string());
    }
}

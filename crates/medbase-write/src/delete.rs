//! DELETE with tombstoning.
//!
//! Removes the current document, snapshots it into history, and writes the
//! tombstone marker, all in one transaction. The id is unusable afterwards.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::{WriteError, WriteResult};
use crate::tombstone::TombstoneService;
use medbase_core::id::{document_key, history_key};
use medbase_storage::{DocumentStore, Keyspace};

pub struct DeleteService {
    store: Arc<dyn DocumentStore>,
    tombstones: Arc<TombstoneService>,
}

impl DeleteService {
    pub fn new(store: Arc<dyn DocumentStore>, tombstones: Arc<TombstoneService>) -> Self {
        Self { store, tombstones }
    }

    /// Delete `(type, id)`.
    ///
    /// # Errors
    /// `WriteError::NotFound` when no current document exists.
    pub async fn delete(&self, resource_type: &str, id: &str) -> WriteResult<()> {
        let keyspace = Keyspace::resources(resource_type);
        let key = document_key(resource_type, id);

        let mut tx = self.store.begin().await?;
        let current = tx
            .get(&keyspace, &key)
            .await?
            .ok_or_else(|| WriteError::not_found(resource_type, id))?;

        let version = current
            .content
            .pointer("/meta/versionId")
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();

        // Final state of the document is preserved in history.
        let snapshot_key = history_key(resource_type, id, &version);
        tx.upsert(&Keyspace::versions(), &snapshot_key, current.content.clone())
            .await?;
        tx.remove(&keyspace, &key).await?;
        self.tombstones
            .write_marker_in_tx(tx.as_mut(), resource_type, id, &version)
            .await?;
        tx.commit().await?;

        info!(key, version, "resource deleted and tombstoned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditInfo, Operation};
    use crate::put::PutService;
    use medbase_db_memory::MemoryStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        put: PutService,
        delete: DeleteService,
        tombstones: Arc<TombstoneService>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient"]);
        let store: Arc<dyn DocumentStore> = Arc::new(store);
        let tombstones = Arc::new(TombstoneService::new(store.clone()));
        Fixture {
            put: PutService::new(store.clone(), tombstones.clone()),
            delete: DeleteService::new(store.clone(), tombstones.clone()),
            store,
            tombstones,
        }
    }

    #[tokio::test]
    async fn test_delete_removes_current_and_tombstones() {
        let f = fixture();
        let audit = AuditInfo::system(Operation::Create);
        f.put
            .upsert(json!({"resourceType": "Patient", "id": "p1"}), &audit)
            .await
            .unwrap();

        f.delete.delete("Patient", "p1").await.unwrap();

        assert!(f
            .store
            .get(&Keyspace::resources("Patient"), "Patient/p1")
            .await
            .unwrap()
            .is_none());
        assert!(f.tombstones.is_tombstoned("Patient", "p1").await.unwrap());

        // Final version preserved in history
        assert!(f
            .store
            .get(&Keyspace::versions(), "Patient/p1/1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_resource_not_found() {
        let f = fixture();
        let err = f.delete.delete("Patient", "ghost").await.unwrap_err();
        assert!(matches!(err, WriteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_put_after_delete_conflicts() {
        let f = fixture();
        let audit = AuditInfo::system(Operation::Create);
        f.put
            .upsert(json!({"resourceType": "Patient", "id": "p1"}), &audit)
            .await
            .unwrap();
        f.delete.delete("Patient", "p1").await.unwrap();

        let err = f
            .put
            .upsert(json!({"resourceType": "Patient", "id": "p1"}), &audit)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
    }
}

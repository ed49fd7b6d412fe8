//! PUT (create-or-update with client-supplied id).
//!
//! Versioning algorithm, always inside a transaction:
//! 1. reject an empty or tombstoned id
//! 2. snapshot the current document (if any) into Versions under
//!    `<type>/<id>/<currentVersion>`; the snapshot result decides
//!    `nextVersion = current + 1` vs `1`
//! 3. stamp `meta` and audit provenance
//! 4. replace the current document, inserting when absent
//!
//! Concurrent PUTs to the same id race on the history-snapshot step; the
//! losing transaction aborts with a conflict, safe to retry.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::audit::{self, AuditInfo};
use crate::error::{WriteError, WriteResult};
use crate::tombstone::TombstoneService;
use medbase_core::id::{document_key, history_key, is_valid_id};
use medbase_storage::{DocumentStore, Keyspace, StoreTransaction};

/// Create-or-update service for client-supplied ids.
pub struct PutService {
    store: Arc<dyn DocumentStore>,
    tombstones: Arc<TombstoneService>,
}

impl PutService {
    pub fn new(store: Arc<dyn DocumentStore>, tombstones: Arc<TombstoneService>) -> Self {
        Self { store, tombstones }
    }

    /// PUT with a standalone transaction.
    pub async fn upsert(&self, resource: Value, audit: &AuditInfo) -> WriteResult<Value> {
        let (resource_type, id) = identify(&resource)?;
        self.check_tombstone(&resource_type, &id).await?;

        let mut tx = self.store.begin().await?;
        let result = self
            .versioned_write(tx.as_mut(), resource, &resource_type, &id, audit)
            .await;
        match result {
            Ok(written) => {
                tx.commit().await?;
                info!(key = document_key(&resource_type, &id), "put committed");
                Ok(written)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// PUT inside an enclosing transaction (Bundle processing). The caller
    /// owns commit/rollback.
    pub async fn upsert_in_tx(
        &self,
        tx: &mut dyn StoreTransaction,
        resource: Value,
        audit: &AuditInfo,
    ) -> WriteResult<Value> {
        let (resource_type, id) = identify(&resource)?;
        self.check_tombstone(&resource_type, &id).await?;
        self.versioned_write(tx, resource, &resource_type, &id, audit)
            .await
    }

    async fn check_tombstone(&self, resource_type: &str, id: &str) -> WriteResult<()> {
        if self.tombstones.is_tombstoned(resource_type, id).await? {
            return Err(WriteError::tombstoned(resource_type, id));
        }
        Ok(())
    }

    /// Snapshot-then-replace inside the given transaction.
    async fn versioned_write(
        &self,
        tx: &mut dyn StoreTransaction,
        mut resource: Value,
        resource_type: &str,
        id: &str,
        audit: &AuditInfo,
    ) -> WriteResult<Value> {
        let keyspace = Keyspace::resources(resource_type);
        let key = document_key(resource_type, id);

        let current = tx.get(&keyspace, &key).await?;
        let next_version = match &current {
            Some(doc) => {
                let current_version = doc
                    .content
                    .pointer("/meta/versionId")
                    .and_then(Value::as_str)
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                let snapshot_key = history_key(resource_type, id, &current_version.to_string());
                tx.insert(&Keyspace::versions(), &snapshot_key, doc.content.clone())
                    .await?;
                debug!(key, snapshot_key, "snapshotted current version to history");
                current_version + 1
            }
            None => 1,
        };

        audit::stamp_meta(&mut resource, &next_version.to_string(), audit);

        if current.is_some() {
            tx.replace(&keyspace, &key, resource.clone()).await?;
        } else {
            tx.insert(&keyspace, &key, resource.clone()).await?;
        }
        debug!(key, version = next_version, "staged current document");
        Ok(resource)
    }
}

fn identify(resource: &Value) -> WriteResult<(String, String)> {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|rt| !rt.is_empty())
        .ok_or_else(|| WriteError::validation("resource is missing resourceType"))?;
    let id = resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or(WriteError::MissingId)?;
    if !is_valid_id(id) {
        return Err(WriteError::invalid_id(id));
    }
    Ok((resource_type.to_string(), id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Operation;
    use medbase_db_memory::MemoryStore;
    use serde_json::json;

    fn services() -> (Arc<dyn DocumentStore>, PutService) {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient"]);
        let store: Arc<dyn DocumentStore> = Arc::new(store);
        let tombstones = Arc::new(TombstoneService::new(store.clone()));
        let put = PutService::new(store.clone(), tombstones);
        (store, put)
    }

    fn patient(id: &str, family: &str) -> Value {
        json!({
            "resourceType": "Patient",
            "id": id,
            "name": [{"family": family}]
        })
    }

    #[tokio::test]
    async fn test_first_put_creates_version_one() {
        let (_, put) = services();
        let audit = AuditInfo::system(Operation::Create);

        let written = put.upsert(patient("example", "Smith"), &audit).await.unwrap();
        assert_eq!(written["meta"]["versionId"], "1");
        assert!(written["meta"]["lastUpdated"].is_string());
    }

    #[tokio::test]
    async fn test_second_put_bumps_version_and_snapshots_history() {
        let (store, put) = services();
        let audit = AuditInfo::system(Operation::Update);

        put.upsert(patient("example", "Smith"), &audit).await.unwrap();
        let second = put.upsert(patient("example", "Smythe"), &audit).await.unwrap();
        assert_eq!(second["meta"]["versionId"], "2");

        // History holds the version-1 snapshot
        let snapshot = store
            .get(&Keyspace::versions(), "Patient/example/1")
            .await
            .unwrap()
            .expect("history snapshot");
        assert_eq!(snapshot.content["meta"]["versionId"], "1");
        assert_eq!(snapshot.content["name"][0]["family"], "Smith");

        // Current document reflects the update
        let current = store
            .get(&Keyspace::resources("Patient"), "Patient/example")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.content["name"][0]["family"], "Smythe");
    }

    #[tokio::test]
    async fn test_put_without_id_rejected() {
        let (_, put) = services();
        let audit = AuditInfo::system(Operation::Create);
        let err = put
            .upsert(json!({"resourceType": "Patient"}), &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::MissingId));
    }

    #[tokio::test]
    async fn test_put_with_invalid_id_rejected() {
        let (_, put) = services();
        let audit = AuditInfo::system(Operation::Create);
        let err = put
            .upsert(json!({"resourceType": "Patient", "id": "has spaces"}), &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::InvalidId(_)));
    }

    #[tokio::test]
    async fn test_put_to_tombstoned_id_conflicts() {
        let (store, put) = services();
        let audit = AuditInfo::system(Operation::Create);

        let mut tx = store.begin().await.unwrap();
        let tombstones = TombstoneService::new(store.clone());
        tombstones
            .write_marker_in_tx(tx.as_mut(), "Patient", "example", "1")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = put
            .upsert(patient("example", "Smith"), &audit)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn test_concurrent_puts_race_on_snapshot() {
        let (store, _) = services();
        let store2 = store.clone();
        let tombstones = Arc::new(TombstoneService::new(store.clone()));
        let put = PutService::new(store.clone(), tombstones.clone());
        let put2 = PutService::new(store2, tombstones);
        let audit = AuditInfo::system(Operation::Update);

        put.upsert(patient("example", "v1"), &audit).await.unwrap();

        // Open a transaction that reads the current version, then let a
        // competing PUT land before it commits.
        let mut tx = store.begin().await.unwrap();
        let staged = put
            .upsert_in_tx(tx.as_mut(), patient("example", "racer-a"), &audit)
            .await
            .unwrap();
        assert_eq!(staged["meta"]["versionId"], "2");

        put2.upsert(patient("example", "racer-b"), &audit).await.unwrap();

        let err = tx.commit().await.unwrap_err();
        let write_err = WriteError::from(err);
        assert!(write_err.is_version_conflict(), "loser must see a conflict");
    }
}

//! In-memory document store with optimistic transactions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use medbase_storage::{
    DocumentStore, Keyspace, StorageError, StoreTransaction, StoredDocument,
};

#[derive(Debug, Clone)]
struct VersionedDoc {
    content: Value,
    cas: u64,
}

type Collection = Arc<DashMap<String, VersionedDoc>>;

struct Inner {
    collections: DashMap<Keyspace, Collection>,
    cas_counter: AtomicU64,
    /// Serializes transaction commits so validate-then-apply is atomic.
    commit_lock: Mutex<()>,
}

/// In-memory [`DocumentStore`] implementation.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: DashMap::new(),
                cas_counter: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
            }),
        }
    }

    /// Provision a collection. Idempotent.
    pub fn create_collection(&self, keyspace: &Keyspace) {
        self.inner
            .collections
            .entry(keyspace.clone())
            .or_insert_with(|| Arc::new(DashMap::new()));
    }

    /// Provision the standard Resources layout for the given types plus the
    /// Versions and Tombstones collections.
    pub fn provision_resource_layout<I, S>(&self, resource_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for rt in resource_types {
            self.create_collection(&Keyspace::resources(rt.as_ref()));
        }
        self.create_collection(&Keyspace::versions());
        self.create_collection(&Keyspace::tombstones());
    }

    fn collection(&self, keyspace: &Keyspace) -> Result<Collection, StorageError> {
        self.inner
            .collections
            .get(keyspace)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                StorageError::collection_not_found(&keyspace.scope, &keyspace.collection)
            })
    }

    fn next_cas(&self) -> u64 {
        self.inner.cas_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn current_cas(&self, keyspace: &Keyspace, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.collection(keyspace)?.get(key).map(|doc| doc.cas))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(
        &self,
        keyspace: &Keyspace,
        key: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let collection = self.collection(keyspace)?;
        Ok(collection
            .get(key)
            .map(|doc| StoredDocument::new(key, doc.content.clone(), doc.cas)))
    }

    async fn multi_get(
        &self,
        keyspace: &Keyspace,
        keys: &[String],
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let collection = self.collection(keyspace)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(doc) = collection.get(key) {
                out.push(StoredDocument::new(key, doc.content.clone(), doc.cas));
            }
        }
        Ok(out)
    }

    async fn exists(&self, keyspace: &Keyspace, key: &str) -> Result<bool, StorageError> {
        Ok(self.collection(keyspace)?.contains_key(key))
    }

    async fn insert(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<StoredDocument, StorageError> {
        let collection = self.collection(keyspace)?;
        let cas = self.next_cas();
        let result = match collection.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(key)),
            Entry::Vacant(slot) => {
                slot.insert(VersionedDoc {
                    content: content.clone(),
                    cas,
                });
                Ok(StoredDocument::new(key, content, cas))
            }
        };
        result
    }

    async fn upsert(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<StoredDocument, StorageError> {
        let collection = self.collection(keyspace)?;
        let cas = self.next_cas();
        collection.insert(
            key.to_string(),
            VersionedDoc {
                content: content.clone(),
                cas,
            },
        );
        Ok(StoredDocument::new(key, content, cas))
    }

    async fn replace(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
        cas: Option<u64>,
    ) -> Result<StoredDocument, StorageError> {
        let collection = self.collection(keyspace)?;
        let mut entry = collection
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found(key))?;
        if let Some(expected) = cas {
            if entry.cas != expected {
                return Err(StorageError::write_conflict(key));
            }
        }
        let new_cas = self.next_cas();
        entry.content = content.clone();
        entry.cas = new_cas;
        Ok(StoredDocument::new(key, content, new_cas))
    }

    async fn remove(&self, keyspace: &Keyspace, key: &str) -> Result<(), StorageError> {
        let collection = self.collection(keyspace)?;
        collection
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn list(
        &self,
        keyspace: &Keyspace,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let collection = self.collection(keyspace)?;
        let mut docs: Vec<StoredDocument> = collection
            .iter()
            .map(|entry| StoredDocument::new(entry.key(), entry.value().content.clone(), entry.value().cas))
            .collect();
        docs.sort_by(|a, b| a.key.cmp(&b.key));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn collection_exists(&self, keyspace: &Keyspace) -> Result<bool, StorageError> {
        Ok(self.inner.collections.contains_key(keyspace))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: HashMap::new(),
            observed: HashMap::new(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

type DocKey = (Keyspace, String);

/// Optimistic transaction: reads record the observed CAS of every touched
/// document; commit re-validates all of them under the commit lock and
/// aborts when anything changed concurrently.
struct MemoryTransaction {
    store: MemoryStore,
    /// Staged writes; `None` stages a delete.
    staged: HashMap<DocKey, Option<Value>>,
    /// CAS observed at first touch; `None` means observed-absent.
    observed: HashMap<DocKey, Option<u64>>,
}

impl MemoryTransaction {
    fn observe(&mut self, keyspace: &Keyspace, key: &str) -> Result<Option<u64>, StorageError> {
        let doc_key = (keyspace.clone(), key.to_string());
        if let Some(cas) = self.observed.get(&doc_key) {
            return Ok(*cas);
        }
        let cas = self.store.current_cas(keyspace, key)?;
        self.observed.insert(doc_key, cas);
        Ok(cas)
    }

    fn staged_state(&self, keyspace: &Keyspace, key: &str) -> Option<&Option<Value>> {
        self.staged.get(&(keyspace.clone(), key.to_string()))
    }

    fn lives(&mut self, keyspace: &Keyspace, key: &str) -> Result<bool, StorageError> {
        match self.staged_state(keyspace, key) {
            Some(Some(_)) => Ok(true),
            Some(None) => Ok(false),
            None => Ok(self.observe(keyspace, key)?.is_some()),
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        // Read-your-writes: staged state wins over committed state.
        if let Some(state) = self.staged_state(keyspace, key) {
            return Ok(state
                .clone()
                .map(|content| StoredDocument::new(key, content, 0)));
        }
        self.observe(keyspace, key)?;
        self.store.get(keyspace, key).await
    }

    async fn insert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError> {
        if self.lives(keyspace, key)? {
            return Err(StorageError::already_exists(key));
        }
        self.staged
            .insert((keyspace.clone(), key.to_string()), Some(content));
        Ok(())
    }

    async fn replace(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError> {
        if !self.lives(keyspace, key)? {
            return Err(StorageError::not_found(key));
        }
        self.staged
            .insert((keyspace.clone(), key.to_string()), Some(content));
        Ok(())
    }

    async fn upsert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError> {
        self.observe(keyspace, key)?;
        self.staged
            .insert((keyspace.clone(), key.to_string()), Some(content));
        Ok(())
    }

    async fn remove(&mut self, keyspace: &Keyspace, key: &str) -> Result<(), StorageError> {
        if !self.lives(keyspace, key)? {
            return Err(StorageError::not_found(key));
        }
        self.staged
            .insert((keyspace.clone(), key.to_string()), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let store = self.store.clone();
        let _guard = store.inner.commit_lock.lock().await;

        // Validate: every observed document must be unchanged.
        for ((keyspace, key), observed_cas) in &self.observed {
            let current = store.current_cas(keyspace, key)?;
            if current != *observed_cas {
                return Err(StorageError::transaction_aborted(format!(
                    "{key} changed concurrently"
                )));
            }
        }

        // Validate staged target collections exist before applying anything.
        for (keyspace, _) in self.staged.keys() {
            if !store.inner.collections.contains_key(keyspace) {
                return Err(StorageError::collection_not_found(
                    &keyspace.scope,
                    &keyspace.collection,
                ));
            }
        }

        for ((keyspace, key), state) in self.staged {
            let collection = store.collection(&keyspace)?;
            match state {
                Some(content) => {
                    let cas = store.next_cas();
                    collection.insert(key, VersionedDoc { content, cas });
                }
                None => {
                    collection.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

//! Storage traits implemented by every backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::fts::FtsQuery;
use crate::types::{Keyspace, SearchHits, SearchOptions, StoredDocument};

/// Key-value document store with transactions.
///
/// Implementations must be thread-safe (`Send + Sync`). Reads outside a
/// transaction observe committed state only; writes are last-writer-wins
/// per document unless a CAS token is supplied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. Returns `None` when absent.
    async fn get(&self, keyspace: &Keyspace, key: &str)
        -> Result<Option<StoredDocument>, StorageError>;

    /// Bulk read. Preserves input order; missing keys are skipped, not an
    /// error, because the store may have deleted a row between an index hit
    /// and the fetch.
    async fn multi_get(
        &self,
        keyspace: &Keyspace,
        keys: &[String],
    ) -> Result<Vec<StoredDocument>, StorageError>;

    /// Existence check without materializing the document. O(1).
    async fn exists(&self, keyspace: &Keyspace, key: &str) -> Result<bool, StorageError>;

    /// Insert a new document.
    ///
    /// # Errors
    /// `StorageError::AlreadyExists` when the key is taken.
    async fn insert(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<StoredDocument, StorageError>;

    /// Insert or replace a document.
    async fn upsert(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<StoredDocument, StorageError>;

    /// Replace an existing document. When `cas` is `Some`, the replace only
    /// succeeds if the stored CAS still matches.
    ///
    /// # Errors
    /// `StorageError::NotFound` when absent,
    /// `StorageError::WriteConflict` on CAS mismatch.
    async fn replace(
        &self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
        cas: Option<u64>,
    ) -> Result<StoredDocument, StorageError>;

    /// Remove a document.
    ///
    /// # Errors
    /// `StorageError::NotFound` when absent.
    async fn remove(&self, keyspace: &Keyspace, key: &str) -> Result<(), StorageError>;

    /// List up to `limit` documents of a collection in key order.
    /// Used by administrative lookups such as the patient picker.
    async fn list(
        &self,
        keyspace: &Keyspace,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, StorageError>;

    /// Whether a collection has been provisioned. Provisioning itself is an
    /// external concern; backends only report availability.
    async fn collection_exists(&self, keyspace: &Keyspace) -> Result<bool, StorageError>;

    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// A transaction over the document store.
///
/// Reads inside the transaction observe its own uncommitted writes
/// (read-your-writes). Commit applies all staged operations atomically and
/// fails with `TransactionAborted` if any document read or written has
/// changed concurrently; the caller may retry.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn get(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
    ) -> Result<Option<StoredDocument>, StorageError>;

    async fn insert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError>;

    async fn replace(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError>;

    async fn upsert(
        &mut self,
        keyspace: &Keyspace,
        key: &str,
        content: Value,
    ) -> Result<(), StorageError>;

    async fn remove(&mut self, keyspace: &Keyspace, key: &str) -> Result<(), StorageError>;

    /// Commit all staged operations atomically.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard all staged operations.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Native full-text search over a named index.
///
/// Index names follow the `fts<Type>` convention, one index per searchable
/// collection.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Run a query against an index, returning document keys and the total
    /// match count. With `options.count_only` no keys are materialized.
    async fn search(
        &self,
        index: &str,
        query: &FtsQuery,
        options: &SearchOptions,
    ) -> Result<SearchHits, StorageError>;
}

/// Search executed through the store's query service with an embedded
/// `SEARCH(...)` predicate instead of the index SDK. Interchangeable with
/// [`SearchIndex`] behind a configuration flag.
#[async_trait]
pub trait SearchQueryEngine: Send + Sync {
    async fn search_query(
        &self,
        index: &str,
        query: &FtsQuery,
        options: &SearchOptions,
    ) -> Result<SearchHits, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time object-safety checks
    fn _assert_store_object_safe(_: &dyn DocumentStore) {}
    fn _assert_transaction_object_safe(_: &dyn StoreTransaction) {}
    fn _assert_index_object_safe(_: &dyn SearchIndex) {}
    fn _assert_query_engine_object_safe(_: &dyn SearchQueryEngine) {}
}

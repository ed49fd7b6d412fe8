//! Storage types shared by all backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Scope holding server administration collections.
pub const ADMIN_SCOPE: &str = "Admin";
/// Scope holding one collection per FHIR resource type.
pub const RESOURCES_SCOPE: &str = "Resources";
/// Collection of historical version snapshots.
pub const VERSIONS_COLLECTION: &str = "Versions";
/// Collection of deletion markers.
pub const TOMBSTONES_COLLECTION: &str = "Tombstones";
/// Admin collection holding server configuration documents (signing key).
pub const CONFIG_COLLECTION: &str = "config";
/// Admin collection holding user records.
pub const USERS_COLLECTION: &str = "users";

/// Addresses one collection inside the deployment bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyspace {
    pub scope: String,
    pub collection: String,
}

impl Keyspace {
    pub fn new(scope: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// Collection for the current documents of a resource type.
    pub fn resources(collection: impl Into<String>) -> Self {
        Self::new(RESOURCES_SCOPE, collection)
    }

    /// The `Resources.Versions` history collection.
    pub fn versions() -> Self {
        Self::new(RESOURCES_SCOPE, VERSIONS_COLLECTION)
    }

    /// The `Resources.Tombstones` collection.
    pub fn tombstones() -> Self {
        Self::new(RESOURCES_SCOPE, TOMBSTONES_COLLECTION)
    }

    /// The `Admin.config` collection.
    pub fn admin_config() -> Self {
        Self::new(ADMIN_SCOPE, CONFIG_COLLECTION)
    }

    /// The `Admin.users` collection.
    pub fn admin_users() -> Self {
        Self::new(ADMIN_SCOPE, USERS_COLLECTION)
    }
}

impl std::fmt::Display for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.scope, self.collection)
    }
}

/// A document as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document key, e.g. `Patient/example`.
    pub key: String,
    /// The JSON content.
    pub content: Value,
    /// Compare-and-swap token; changes on every mutation.
    pub cas: u64,
}

impl StoredDocument {
    pub fn new(key: impl Into<String>, content: Value, cas: u64) -> Self {
        Self {
            key: key.into(),
            content,
            cas,
        }
    }
}

/// Sort directive for search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Options for a search-index request.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Pagination offset.
    pub from: usize,
    /// Page size; `0` with `count_only` runs a count query.
    pub size: usize,
    /// Sort order; empty means index order.
    pub sort: Vec<SortField>,
    /// When set, no keys are materialized and only `total` is meaningful.
    pub count_only: bool,
}

impl SearchOptions {
    pub fn paged(from: usize, size: usize) -> Self {
        Self {
            from,
            size,
            ..Self::default()
        }
    }

    /// Count-only options: `limit = 0`, scoring irrelevant.
    pub fn count() -> Self {
        Self {
            count_only: true,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }
}

/// Result of a key-level search: ordered keys, total matches, server time.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub keys: Vec<String>,
    pub total: u64,
    pub took: Duration,
}

impl SearchHits {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

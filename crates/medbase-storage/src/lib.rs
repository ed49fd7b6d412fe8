//! Storage abstraction for the medbase document store.
//!
//! The deployment uses one bucket with `Admin` and `Resources` scopes; every
//! FHIR resource type gets its own collection, plus `Versions` and
//! `Tombstones`. Backends implement the KV, transaction, and full-text
//! search traits defined here.

pub mod error;
pub mod fts;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use fts::FtsQuery;
pub use traits::{DocumentStore, SearchIndex, SearchQueryEngine, StoreTransaction};
pub use types::{
    Keyspace, SearchHits, SearchOptions, SortField, StoredDocument, ADMIN_SCOPE,
    CONFIG_COLLECTION, RESOURCES_SCOPE, TOMBSTONES_COLLECTION, USERS_COLLECTION,
    VERSIONS_COLLECTION,
};

//! Key-level search execution.
//!
//! Routes a combined query to one of two interchangeable backends: the
//! native search index, or the store's query service with an embedded
//! `SEARCH(...)` predicate (selected by `use_query_service`). Both return
//! document keys, a total, and the server-side elapsed time.

use std::sync::Arc;

use tracing::debug;

use crate::error::SearchResult;
use medbase_storage::{
    FtsQuery, SearchHits, SearchIndex, SearchOptions, SearchQueryEngine, SortField,
};

/// Upper bound used by the unbounded-to-cap search path.
pub const MAX_KEYS_PER_SEARCH: usize = 1000;

/// Maps resource types to target collections and index names.
///
/// Per-type collections are the norm; types listed as "general" share the
/// mixed-type `General` collection and need a `resourceType` filter
/// conjuncted into every query.
#[derive(Debug, Clone, Default)]
pub struct CollectionRouting {
    general_types: Vec<String>,
}

impl CollectionRouting {
    pub fn new(general_types: Vec<String>) -> Self {
        Self { general_types }
    }

    pub fn target_collection(&self, resource_type: &str) -> String {
        if self.general_types.iter().any(|t| t == resource_type) {
            "General".to_string()
        } else {
            resource_type.to_string()
        }
    }

    /// Index names follow the `fts<Collection>` convention.
    pub fn fts_index(&self, resource_type: &str) -> String {
        format!("fts{}", self.target_collection(resource_type))
    }

    fn needs_resource_type_filter(&self, resource_type: &str) -> bool {
        self.target_collection(resource_type) == "General"
    }
}

/// Search service returning document keys only.
pub struct FtsSearchService {
    index: Arc<dyn SearchIndex>,
    query_engine: Arc<dyn SearchQueryEngine>,
    routing: CollectionRouting,
    use_query_service: bool,
}

impl FtsSearchService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        query_engine: Arc<dyn SearchQueryEngine>,
        routing: CollectionRouting,
        use_query_service: bool,
    ) -> Self {
        Self {
            index,
            query_engine,
            routing,
            use_query_service,
        }
    }

    pub fn routing(&self) -> &CollectionRouting {
        &self.routing
    }

    /// Default result ordering: most recently updated first.
    pub fn default_sort() -> Vec<SortField> {
        vec![SortField::desc("meta.lastUpdated")]
    }

    /// Paged search for document keys.
    pub async fn search_for_keys(
        &self,
        queries: Vec<FtsQuery>,
        resource_type: &str,
        from: usize,
        size: usize,
        sort: Vec<SortField>,
    ) -> SearchResult<SearchHits> {
        let index_name = self.routing.fts_index(resource_type);
        let combined = self.combined_query(queries, resource_type);
        let options = SearchOptions::paged(from, size).with_sort(sort);

        let hits = if self.use_query_service {
            debug!(resource_type, index = %index_name, "search via query service");
            self.query_engine
                .search_query(&index_name, &combined, &options)
                .await?
        } else {
            debug!(resource_type, index = %index_name, "search via index sdk");
            self.index.search(&index_name, &combined, &options).await?
        };

        debug!(
            resource_type,
            hits = hits.len(),
            total = hits.total,
            took_ms = hits.took.as_millis() as u64,
            "search complete"
        );
        Ok(hits)
    }

    /// Unbounded-to-cap search used internally: one page of up to
    /// [`MAX_KEYS_PER_SEARCH`] keys from offset zero.
    pub async fn search_for_all_keys(
        &self,
        queries: Vec<FtsQuery>,
        resource_type: &str,
        sort: Vec<SortField>,
    ) -> SearchResult<SearchHits> {
        self.search_for_keys(queries, resource_type, 0, MAX_KEYS_PER_SEARCH, sort)
            .await
    }

    /// Count-only query (`limit = 0`, scoring off).
    pub async fn count(&self, queries: Vec<FtsQuery>, resource_type: &str) -> SearchResult<u64> {
        let index_name = self.routing.fts_index(resource_type);
        let combined = self.combined_query(queries, resource_type);
        let options = SearchOptions::count();

        let hits = if self.use_query_service {
            self.query_engine
                .search_query(&index_name, &combined, &options)
                .await?
        } else {
            self.index.search(&index_name, &combined, &options).await?
        };
        Ok(hits.total)
    }

    /// Search an explicit index (e.g. `ftsVersions`), bypassing collection
    /// routing and the resource-type filter.
    pub async fn search_in_index(
        &self,
        queries: Vec<FtsQuery>,
        index_name: &str,
        sort: Vec<SortField>,
    ) -> SearchResult<SearchHits> {
        let combined = FtsQuery::conjuncts(queries);
        let options = SearchOptions::paged(0, MAX_KEYS_PER_SEARCH).with_sort(sort);
        Ok(self.index.search(index_name, &combined, &options).await?)
    }

    /// AND the fragments together, conjuncting a `resourceType` term only
    /// when the target is the mixed-type General collection.
    fn combined_query(&self, mut queries: Vec<FtsQuery>, resource_type: &str) -> FtsQuery {
        if self.routing.needs_resource_type_filter(resource_type) {
            let mut all = vec![FtsQuery::match_value("resourceType", resource_type)];
            all.append(&mut queries);
            FtsQuery::conjuncts(all)
        } else {
            FtsQuery::conjuncts(queries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbase_db_memory::{MemorySearchIndex, MemoryStore};
    use medbase_storage::{DocumentStore, Keyspace};
    use serde_json::json;

    async fn service(use_query_service: bool) -> FtsSearchService {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient"]);
        let ks = Keyspace::resources("Patient");
        for (id, family, updated) in [
            ("p1", "Smith", "2024-01-03T00:00:00Z"),
            ("p2", "Smith", "2024-01-01T00:00:00Z"),
            ("p3", "Jones", "2024-01-02T00:00:00Z"),
        ] {
            store
                .insert(
                    &ks,
                    &format!("Patient/{id}"),
                    json!({
                        "resourceType": "Patient", "id": id,
                        "name": [{"family": family}],
                        "meta": {"lastUpdated": updated}
                    }),
                )
                .await
                .unwrap();
        }
        let index = MemorySearchIndex::new(store);
        index.register_resource_indexes(["Patient"]);
        let index = Arc::new(index);
        FtsSearchService::new(
            index.clone(),
            index,
            CollectionRouting::default(),
            use_query_service,
        )
    }

    #[test]
    fn test_collection_routing() {
        let routing = CollectionRouting::new(vec!["Basic".to_string()]);
        assert_eq!(routing.target_collection("Patient"), "Patient");
        assert_eq!(routing.target_collection("Basic"), "General");
        assert_eq!(routing.fts_index("Patient"), "ftsPatient");
        assert_eq!(routing.fts_index("Basic"), "ftsGeneral");
        assert!(routing.needs_resource_type_filter("Basic"));
        assert!(!routing.needs_resource_type_filter("Patient"));
    }

    #[tokio::test]
    async fn test_search_returns_ordered_keys_and_total() {
        let service = service(false).await;
        let hits = service
            .search_for_keys(
                vec![FtsQuery::prefix("name.family", "smith")],
                "Patient",
                0,
                10,
                FtsSearchService::default_sort(),
            )
            .await
            .unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(hits.keys, vec!["Patient/p1", "Patient/p2"]);
    }

    #[tokio::test]
    async fn test_count_only() {
        let service = service(false).await;
        let total = service.count(vec![], "Patient").await.unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_query_service_path() {
        let service = service(true).await;
        let hits = service
            .search_for_all_keys(vec![], "Patient", FtsSearchService::default_sort())
            .await
            .unwrap();
        assert_eq!(hits.keys.len(), 3);
    }
}

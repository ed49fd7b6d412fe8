//! In-memory full-text search over the document store.
//!
//! Evaluates the [`FtsQuery`] AST directly against stored JSON documents.
//! Field paths are dotted and flatten arrays at every step, which mirrors how
//! the index server maps repeated FHIR elements. One registered index per
//! searchable collection, named `fts<Type>`.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use medbase_core::time::cmp_partial;
use medbase_storage::{
    DocumentStore, FtsQuery, Keyspace, SearchHits, SearchIndex, SearchOptions,
    SearchQueryEngine, StorageError,
};

use crate::store::MemoryStore;

/// Search-index backend over a [`MemoryStore`].
///
/// Serves both the native index path ([`SearchIndex`]) and the
/// query-service path ([`SearchQueryEngine`]); the latter reports the page
/// size as its total, matching the query service's approximate counting.
#[derive(Clone)]
pub struct MemorySearchIndex {
    store: MemoryStore,
    indexes: Arc<DashMap<String, Keyspace>>,
}

impl MemorySearchIndex {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            indexes: Arc::new(DashMap::new()),
        }
    }

    /// Register an index name for a collection.
    pub fn register_index(&self, name: impl Into<String>, keyspace: Keyspace) {
        self.indexes.insert(name.into(), keyspace);
    }

    /// Register `fts<Type>` indexes for the given resource types.
    pub fn register_resource_indexes<I, S>(&self, resource_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for rt in resource_types {
            let rt = rt.as_ref();
            self.register_index(format!("fts{rt}"), Keyspace::resources(rt));
        }
    }

    async fn run(
        &self,
        index: &str,
        query: &FtsQuery,
        options: &SearchOptions,
        approximate_total: bool,
    ) -> Result<SearchHits, StorageError> {
        let started = Instant::now();
        let keyspace = self
            .indexes
            .get(index)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::index_not_found(index))?;

        // Full scan of the collection; the in-memory backend has no inverted
        // index so matching cost is linear in collection size.
        let docs = self.store.list(&keyspace, usize::MAX).await?;
        let mut matched: Vec<(String, Value)> = docs
            .into_iter()
            .filter(|doc| eval(query, &doc.content))
            .map(|doc| (doc.key, doc.content))
            .collect();

        let total = matched.len() as u64;
        if options.count_only {
            debug!(index, total, "fts count query");
            return Ok(SearchHits {
                keys: Vec::new(),
                total,
                took: started.elapsed(),
            });
        }

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| {
                for sort in &options.sort {
                    let va = first_string(&a.1, &sort.field);
                    let vb = first_string(&b.1, &sort.field);
                    let ord = match (va, vb) {
                        (Some(x), Some(y)) => x.cmp(&y),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let ord = if sort.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.0.cmp(&b.0)
            });
        }

        let keys: Vec<String> = matched
            .into_iter()
            .skip(options.from)
            .take(options.size)
            .map(|(key, _)| key)
            .collect();

        let total = if approximate_total {
            keys.len() as u64
        } else {
            total
        };

        debug!(index, hits = keys.len(), total, "fts search");
        Ok(SearchHits {
            keys,
            total,
            took: started.elapsed(),
        })
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn search(
        &self,
        index: &str,
        query: &FtsQuery,
        options: &SearchOptions,
    ) -> Result<SearchHits, StorageError> {
        self.run(index, query, options, false).await
    }
}

#[async_trait]
impl SearchQueryEngine for MemorySearchIndex {
    async fn search_query(
        &self,
        index: &str,
        query: &FtsQuery,
        options: &SearchOptions,
    ) -> Result<SearchHits, StorageError> {
        // Count-only queries stay accurate (SELECT COUNT(*)); paged queries
        // only see the rows they fetched.
        self.run(index, query, options, !options.count_only).await
    }
}

/// Collect every value reachable from `doc` along a dotted field path,
/// flattening arrays at each step.
fn collect_field<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for part in path.split('.') {
        let mut next = Vec::new();
        for node in current {
            match node {
                Value::Object(map) => {
                    if let Some(child) = map.get(part) {
                        flatten_into(child, &mut next);
                    }
                }
                _ => {}
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_string(doc: &Value, path: &str) -> Option<String> {
    collect_field(doc, path).into_iter().find_map(value_as_text)
}

/// Evaluate a query node against one document.
fn eval(query: &FtsQuery, doc: &Value) -> bool {
    match query {
        FtsQuery::Term { field, term } => collect_field(doc, field)
            .into_iter()
            .filter_map(value_as_text)
            .any(|v| v == *term),
        FtsQuery::Match { field, value } => collect_field(doc, field)
            .into_iter()
            .filter_map(value_as_text)
            .any(|v| v.eq_ignore_ascii_case(value)),
        FtsQuery::Prefix { field, prefix } => collect_field(doc, field)
            .into_iter()
            .filter_map(value_as_text)
            .any(|v| v.to_lowercase().starts_with(&prefix.to_lowercase())),
        FtsQuery::Wildcard { field, wildcard } => collect_field(doc, field)
            .into_iter()
            .filter_map(value_as_text)
            .any(|v| wildcard_match(&v.to_lowercase(), &wildcard.to_lowercase())),
        FtsQuery::DateRange {
            field,
            start,
            end,
            inclusive_start,
            inclusive_end,
        } => collect_field(doc, field)
            .into_iter()
            .filter_map(value_as_text)
            .any(|v| {
                if let Some(start) = start {
                    match cmp_partial(&v, start) {
                        Ordering::Less => return false,
                        Ordering::Equal if !inclusive_start => return false,
                        _ => {}
                    }
                }
                if let Some(end) = end {
                    match cmp_partial(&v, end) {
                        Ordering::Greater => return false,
                        Ordering::Equal if !inclusive_end => return false,
                        _ => {}
                    }
                }
                true
            }),
        FtsQuery::NumericRange {
            field,
            min,
            max,
            inclusive_min,
            inclusive_max,
        } => collect_field(doc, field)
            .into_iter()
            .filter_map(Value::as_f64)
            .any(|v| {
                if let Some(min) = min {
                    if v < *min || (v == *min && !inclusive_min) {
                        return false;
                    }
                }
                if let Some(max) = max {
                    if v > *max || (v == *max && !inclusive_max) {
                        return false;
                    }
                }
                true
            }),
        FtsQuery::Conjunction(children) => children.iter().all(|child| eval(child, doc)),
        FtsQuery::Disjunction(children) => children.iter().any(|child| eval(child, doc)),
        FtsQuery::MatchAll => true,
        FtsQuery::MatchNone => false,
    }
}

/// Glob-style matching where `*` matches any run of characters.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return text == pattern;
    }
    let mut pos = 0;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(segment) {
                return false;
            }
            pos = segment.len();
        } else if i == segments.len() - 1 {
            let tail = &text[pos..];
            if !tail.ends_with(segment) {
                return false;
            }
        } else {
            match text[pos..].find(segment) {
                Some(found) => pos += found + segment.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbase_storage::{DocumentStore, SortField};
    use serde_json::json;

    async fn seeded_index() -> MemorySearchIndex {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient"]);
        let ks = Keyspace::resources("Patient");

        let patients = vec![
            json!({
                "resourceType": "Patient", "id": "p1",
                "name": [{"family": "Smith", "given": ["John"]}],
                "gender": "male", "birthDate": "1987-02-20",
                "meta": {"lastUpdated": "2024-01-03T00:00:00Z"}
            }),
            json!({
                "resourceType": "Patient", "id": "p2",
                "name": [{"family": "Smithson", "given": ["Anna"]}],
                "gender": "female", "birthDate": "1990-06-01",
                "meta": {"lastUpdated": "2024-01-01T00:00:00Z"}
            }),
            json!({
                "resourceType": "Patient", "id": "p3",
                "name": [{"family": "Jones", "given": ["Maria"]}],
                "gender": "female", "birthDate": "1987-11-30",
                "meta": {"lastUpdated": "2024-01-02T00:00:00Z"}
            }),
        ];
        for p in patients {
            let key = format!("Patient/{}", p["id"].as_str().unwrap());
            store.insert(&ks, &key, p).await.unwrap();
        }

        let index = MemorySearchIndex::new(store);
        index.register_resource_indexes(["Patient"]);
        index
    }

    #[tokio::test]
    async fn test_term_search() {
        let index = seeded_index().await;
        let hits = index
            .search(
                "ftsPatient",
                &FtsQuery::term("gender", "female"),
                &SearchOptions::paged(0, 10),
            )
            .await
            .unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(hits.keys.len(), 2);
    }

    #[tokio::test]
    async fn test_prefix_search_on_nested_array_field() {
        let index = seeded_index().await;
        let hits = index
            .search(
                "ftsPatient",
                &FtsQuery::prefix("name.family", "smith"),
                &SearchOptions::paged(0, 10),
            )
            .await
            .unwrap();
        assert_eq!(hits.total, 2, "Smith and Smithson share the prefix");
    }

    #[tokio::test]
    async fn test_date_range_year_window() {
        let index = seeded_index().await;
        let query = FtsQuery::date_range("birthDate")
            .start("1987-01-01", true)
            .end("1987-12-31", true)
            .build();
        let hits = index
            .search("ftsPatient", &query, &SearchOptions::paged(0, 10))
            .await
            .unwrap();
        assert_eq!(hits.total, 2, "both 1987 birthdates match");
    }

    #[tokio::test]
    async fn test_sort_by_last_updated_descending() {
        let index = seeded_index().await;
        let options = SearchOptions::paged(0, 10)
            .with_sort(vec![SortField::desc("meta.lastUpdated")]);
        let hits = index
            .search("ftsPatient", &FtsQuery::MatchAll, &options)
            .await
            .unwrap();
        assert_eq!(
            hits.keys,
            vec!["Patient/p1", "Patient/p3", "Patient/p2"],
            "most recently updated first"
        );
    }

    #[tokio::test]
    async fn test_count_only_returns_no_keys() {
        let index = seeded_index().await;
        let hits = index
            .search("ftsPatient", &FtsQuery::MatchAll, &SearchOptions::count())
            .await
            .unwrap();
        assert_eq!(hits.total, 3);
        assert!(hits.keys.is_empty());
    }

    #[tokio::test]
    async fn test_pagination() {
        let index = seeded_index().await;
        let options = SearchOptions::paged(1, 1)
            .with_sort(vec![SortField::desc("meta.lastUpdated")]);
        let hits = index
            .search("ftsPatient", &FtsQuery::MatchAll, &options)
            .await
            .unwrap();
        assert_eq!(hits.total, 3, "total is the full match count");
        assert_eq!(hits.keys, vec!["Patient/p3"]);
    }

    #[tokio::test]
    async fn test_unknown_index_errors() {
        let index = seeded_index().await;
        let err = index
            .search("ftsObservation", &FtsQuery::MatchAll, &SearchOptions::paged(0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_service_total_is_page_bound() {
        let index = seeded_index().await;
        let hits = index
            .search_query("ftsPatient", &FtsQuery::MatchAll, &SearchOptions::paged(0, 2))
            .await
            .unwrap();
        assert_eq!(hits.keys.len(), 2);
        assert_eq!(hits.total, 2, "query path reports fetched rows");

        let count = index
            .search_query("ftsPatient", &FtsQuery::MatchAll, &SearchOptions::count())
            .await
            .unwrap();
        assert_eq!(count.total, 3, "count query stays accurate");
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("smithson", "*mith*"));
        assert!(wildcard_match("smith", "smi*"));
        assert!(wildcard_match("smith", "*ith"));
        assert!(!wildcard_match("jones", "*mith*"));
        assert!(wildcard_match("exact", "exact"));
    }

    #[test]
    fn test_collect_field_flattens_arrays() {
        let doc = json!({"name": [{"given": ["a", "b"]}, {"given": ["c"]}]});
        let values = collect_field(&doc, "name.given");
        assert_eq!(values.len(), 3);
    }
}

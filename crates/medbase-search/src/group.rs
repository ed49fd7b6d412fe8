//! Bulk-membership filtering and `_has` reverse chaining.
//!
//! Serves "build a Group of all Patients matching these criteria" use
//! cases: preview (sample + accurate total) and all-keys enumeration with
//! internal pagination up to a hard cap. `_has:<Target>:<refField>:<param>`
//! first searches the target type, then extracts the reference values from
//! the fetched target resources. Exactly one hop.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::builders;
use crate::error::{SearchError, SearchResult};
use crate::kv::KvFetchService;
use crate::parser::{parse_query_string, ParamMap};
use crate::registry::ParameterResolver;
use crate::service::FtsSearchService;
use medbase_core::reference::collect_references;
use medbase_storage::FtsQuery;

use crate::fhirpath;

/// Page size for internal pagination, aligned with the index page cap.
const FTS_PAGE_SIZE: usize = 1000;
/// Default cap on all-keys enumeration.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// A parsed `_has:<Target>:<refField>:<param>` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasParam {
    pub target_type: String,
    pub reference_field: String,
    pub criteria_param: String,
    pub value: String,
}

impl HasParam {
    /// Parse from a decoded parameter name and its value.
    pub fn parse(name: &str, value: &str) -> SearchResult<Self> {
        let rest = name
            .strip_prefix("_has:")
            .ok_or_else(|| SearchError::invalid_has("parameter must start with _has:"))?;
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(SearchError::invalid_has(
                "_has requires Target:referenceField:param format",
            ));
        }
        if parts[2].starts_with("_has") {
            return Err(SearchError::invalid_has("_has chains beyond one hop are not supported"));
        }
        Ok(Self {
            target_type: parts[0].to_string(),
            reference_field: parts[1].to_string(),
            criteria_param: parts[2].to_string(),
            value: value.to_string(),
        })
    }

    /// Find a `_has` parameter in a decoded parameter map.
    pub fn detect(params: &ParamMap) -> SearchResult<Option<Self>> {
        for (name, values) in params {
            if name.starts_with("_has:") {
                let value = values
                    .first()
                    .ok_or_else(|| SearchError::invalid_has("_has parameter without a value"))?;
                return Ok(Some(Self::parse(name, value)?));
            }
        }
        Ok(None)
    }
}

/// Preview of a bulk filter: a sample of keys plus the accurate total.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub sample_keys: Vec<String>,
    pub total: u64,
}

/// Bulk filtered key enumeration over the search pipeline.
pub struct GroupFilterService {
    resolver: Arc<ParameterResolver>,
    search: Arc<FtsSearchService>,
    kv: Arc<KvFetchService>,
    max_keys: usize,
}

impl GroupFilterService {
    pub fn new(
        resolver: Arc<ParameterResolver>,
        search: Arc<FtsSearchService>,
        kv: Arc<KvFetchService>,
    ) -> Self {
        Self {
            resolver,
            search,
            kv,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// All matching keys, up to the configured cap. The filter query is a
    /// raw FHIR search string, e.g. `family=Smith&birthdate=ge1990`.
    pub async fn all_matching_keys(
        &self,
        resource_type: &str,
        filter_query: &str,
        max_results: usize,
    ) -> SearchResult<Vec<String>> {
        // Names and values must be decoded before _has dispatch.
        let params = parse_query_string(filter_query);
        let max_results = max_results.min(self.max_keys);

        if let Some(has) = HasParam::detect(&params)? {
            return self.reverse_chain(resource_type, &has, max_results).await;
        }

        let queries = self.build_queries(resource_type, &params)?;
        self.fetch_all_keys_paginated(queries, resource_type, max_results)
            .await
    }

    /// Sample of matching keys plus the accurate total count.
    pub async fn preview(
        &self,
        resource_type: &str,
        filter_query: &str,
        sample_size: usize,
    ) -> SearchResult<PreviewResult> {
        let params = parse_query_string(filter_query);

        if let Some(has) = HasParam::detect(&params)? {
            let keys = self.reverse_chain(resource_type, &has, sample_size).await?;
            let total = keys.len() as u64;
            return Ok(PreviewResult {
                sample_keys: keys,
                total,
            });
        }

        let queries = self.build_queries(resource_type, &params)?;
        let total = self.search.count(queries.clone(), resource_type).await?;
        let hits = self
            .search
            .search_for_keys(
                queries,
                resource_type,
                0,
                sample_size,
                FtsSearchService::default_sort(),
            )
            .await?;
        info!(resource_type, samples = hits.len(), total, "filter preview");
        Ok(PreviewResult {
            sample_keys: hits.keys,
            total,
        })
    }

    fn build_queries(
        &self,
        resource_type: &str,
        params: &ParamMap,
    ) -> SearchResult<Vec<FtsQuery>> {
        let mut all = Vec::new();
        for (name, values) in params {
            if name.starts_with('_') {
                continue;
            }
            let resolved = self.resolver.resolve(resource_type, name)?;
            let fragments = builders::build_queries(&resolved, values);
            if !fragments.is_empty() {
                // OR across the values of one parameter
                all.push(FtsQuery::disjuncts(fragments));
            }
        }
        Ok(all)
    }

    /// Internal pagination: 1000-key pages, stopping when a page comes back
    /// short.
    async fn fetch_all_keys_paginated(
        &self,
        queries: Vec<FtsQuery>,
        resource_type: &str,
        max_results: usize,
    ) -> SearchResult<Vec<String>> {
        let mut all_keys = Vec::new();
        let mut offset = 0usize;
        let mut remaining = max_results;
        let sort = FtsSearchService::default_sort();

        while remaining > 0 {
            let page_size = remaining.min(FTS_PAGE_SIZE);
            let hits = self
                .search
                .search_for_keys(queries.clone(), resource_type, offset, page_size, sort.clone())
                .await?;
            let got = hits.len();
            debug!(resource_type, offset, page_size, got, "group filter page");
            if got == 0 {
                break;
            }
            all_keys.extend(hits.keys);
            if got < page_size {
                break;
            }
            offset += got;
            remaining -= got;
        }

        info!(
            resource_type,
            keys = all_keys.len(),
            cap = max_results,
            "group filter enumeration complete"
        );
        Ok(all_keys)
    }

    /// One-hop `_has`: search the target type with the inner criteria, fetch
    /// the targets, and return the unique ids they reference.
    async fn reverse_chain(
        &self,
        resource_type: &str,
        has: &HasParam,
        max_results: usize,
    ) -> SearchResult<Vec<String>> {
        info!(
            base = resource_type,
            target = %has.target_type,
            field = %has.reference_field,
            "reverse chain search"
        );

        let resolved = self
            .resolver
            .resolve(&has.target_type, &has.criteria_param)?;
        let values = vec![has.value.clone()];
        let fragments = builders::build_queries(&resolved, &values);
        let queries = if fragments.is_empty() {
            Vec::new()
        } else {
            vec![FtsQuery::disjuncts(fragments)]
        };

        let target_keys = self
            .fetch_all_keys_paginated(queries, &has.target_type, self.max_keys)
            .await?;
        if target_keys.is_empty() {
            return Ok(Vec::new());
        }

        let targets = self.kv.fetch(&target_keys, &has.target_type).await?;

        // The reference field resolves through the target's own search
        // parameter so `subject` and `patient` land on the right element.
        let reference_element = self
            .resolver
            .resolve(&has.target_type, &has.reference_field)
            .map(|r| fhirpath::parse(&r.fhir_path, &has.target_type).primary_field_path)
            .unwrap_or_else(|_| has.reference_field.clone());

        let prefix = format!("{resource_type}/");
        let mut seen = HashSet::new();
        let mut referenced = Vec::new();
        for target in &targets {
            for reference in collect_references(target, &reference_element) {
                if reference.starts_with(&prefix) && seen.insert(reference.clone()) {
                    referenced.push(reference);
                }
            }
        }
        referenced.truncate(max_results);

        info!(
            base = resource_type,
            targets = targets.len(),
            referenced = referenced.len(),
            "reverse chain complete"
        );
        Ok(referenced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SearchParameterRegistry;
    use crate::service::CollectionRouting;
    use medbase_db_memory::{MemorySearchIndex, MemoryStore};
    use medbase_storage::{DocumentStore, Keyspace};
    use serde_json::json;

    async fn service() -> GroupFilterService {
        let store = MemoryStore::new();
        store.provision_resource_layout(["Patient", "Observation"]);

        let patients = Keyspace::resources("Patient");
        for (id, family, birth) in [
            ("p1", "Smith", "1991-05-01"),
            ("p2", "Smith", "1985-02-10"),
            ("p3", "Jones", "1995-08-21"),
        ] {
            store
                .insert(
                    &patients,
                    &format!("Patient/{id}"),
                    json!({
                        "resourceType": "Patient", "id": id,
                        "name": [{"family": family}], "birthDate": birth,
                        "meta": {"lastUpdated": "2024-01-01T00:00:00Z"}
                    }),
                )
                .await
                .unwrap();
        }

        let observations = Keyspace::resources("Observation");
        for (id, code, subject) in [
            ("o1", "12345", "Patient/p1"),
            ("o2", "12345", "Patient/p3"),
            ("o3", "99999", "Patient/p2"),
            ("o4", "12345", "Patient/p1"),
        ] {
            store
                .insert(
                    &observations,
                    &format!("Observation/{id}"),
                    json!({
                        "resourceType": "Observation", "id": id,
                        "code": {"coding": [{"code": code}]},
                        "subject": {"reference": subject},
                        "meta": {"lastUpdated": "2024-01-01T00:00:00Z"}
                    }),
                )
                .await
                .unwrap();
        }

        let store = Arc::new(store);
        let index = MemorySearchIndex::new((*store).clone());
        index.register_resource_indexes(["Patient", "Observation"]);
        let index = Arc::new(index);

        let routing = CollectionRouting::default();
        let resolver = Arc::new(ParameterResolver::new(Arc::new(
            SearchParameterRegistry::with_base_definitions(),
        )));
        let search = Arc::new(FtsSearchService::new(
            index.clone(),
            index,
            routing.clone(),
            false,
        ));
        let kv = Arc::new(KvFetchService::new(store, routing));
        GroupFilterService::new(resolver, search, kv)
    }

    #[test]
    fn test_has_param_parse() {
        let has = HasParam::parse("_has:Observation:subject:code", "12345").unwrap();
        assert_eq!(has.target_type, "Observation");
        assert_eq!(has.reference_field, "subject");
        assert_eq!(has.criteria_param, "code");
        assert_eq!(has.value, "12345");
    }

    #[test]
    fn test_has_param_rejects_malformed() {
        assert!(HasParam::parse("_has:Observation:subject", "x").is_err());
        assert!(HasParam::parse("patient", "x").is_err());
        assert!(HasParam::parse("_has:Observation::code", "x").is_err());
    }

    #[test]
    fn test_has_param_rejects_chained_hops() {
        let err =
            HasParam::parse("_has:Observation:subject:_has:Encounter:subject:status", "x")
                .unwrap_err();
        assert!(err.to_string().contains("one hop"));
    }

    #[tokio::test]
    async fn test_all_matching_keys_with_filter() {
        let service = service().await;
        let keys = service
            .all_matching_keys("Patient", "family=Smith&birthdate=ge1990-01-01", 100)
            .await
            .unwrap();
        assert_eq!(keys, vec!["Patient/p1"]);
    }

    #[tokio::test]
    async fn test_preview_reports_accurate_total() {
        let service = service().await;
        let preview = service.preview("Patient", "family=Smith", 1).await.unwrap();
        assert_eq!(preview.sample_keys.len(), 1);
        assert_eq!(preview.total, 2);
    }

    #[tokio::test]
    async fn test_reverse_chain_deduplicates() {
        let service = service().await;
        // p1 has two matching observations, p3 one; p2's observation has a
        // different code.
        let keys = service
            .all_matching_keys("Patient", "_has:Observation:subject:code=12345", 100)
            .await
            .unwrap();
        let set: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(set.len(), keys.len(), "no duplicates");
        assert_eq!(
            set,
            HashSet::from(["Patient/p1".to_string(), "Patient/p3".to_string()])
        );
    }

    #[tokio::test]
    async fn test_reverse_chain_with_encoded_name() {
        let service = service().await;
        let keys = service
            .all_matching_keys("Patient", "_has%3AObservation%3Asubject%3Acode=12345", 100)
            .await
            .unwrap();
        assert_eq!(keys.len(), 2, "URL-decoding happens before _has dispatch");
    }

    #[tokio::test]
    async fn test_reverse_chain_no_targets() {
        let service = service().await;
        let keys = service
            .all_matching_keys("Patient", "_has:Observation:subject:code=00000", 100)
            .await
            .unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_filter_parameter_fails() {
        let service = service().await;
        let err = service
            .all_matching_keys("Patient", "favorite-color=blue", 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownParameter { .. }));
    }
}

//! Search handler: validate → resolve → build → key search → KV fetch →
//! searchset Bundle.

use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use serde_json::Value;

use medbase_core::bundle as fhir_bundle;
use medbase_search::builders;
use medbase_search::parser::parse_query_string;
use medbase_search::preprocessor;
use medbase_search::service::FtsSearchService;
use medbase_search::SearchError;
use medbase_storage::FtsQuery;
use tracing::debug;

use super::{fhir_json, outcome_response};
use crate::state::AppState;

/// Parameters every search understands regardless of resource type.
const CONTROL_PREFIX: char = '_';
const FRAMEWORK_PARAMS: &[&str] = &["connectionName", "bucketName"];
/// Underscore parameters that are real search parameters, not controls.
const SEARCHABLE_CONTROL: &[&str] = &["_id", "_lastUpdated"];

/// `GET /fhir/{type}?...`
pub async fn search_resources(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    uri: Uri,
) -> Response {
    let raw_query = uri.query().unwrap_or_default().to_string();
    let params = parse_query_string(&raw_query);

    // Pre-flight validation; a rejected request never reaches the index.
    if let Err(err) = preprocessor::validate(&state.resolver, &resource_type, &params) {
        return search_error_response(&err);
    }

    let count = read_usize(&params, "_count", state.config.search.default_count)
        .min(state.config.search.max_count);
    let offset = read_usize(&params, "_offset", 0);

    // Reverse chaining takes the bulk-filter path: target search, reference
    // extraction, then plain KV fetch of the referenced ids.
    if params.keys().any(|k| k.starts_with("_has:")) {
        return reverse_chain_search(&state, &resource_type, &raw_query, offset, count).await;
    }

    let mut queries: Vec<FtsQuery> = Vec::new();
    for (name, values) in &params {
        let is_control = name.starts_with(CONTROL_PREFIX)
            && !SEARCHABLE_CONTROL.contains(&name.as_str());
        if is_control || FRAMEWORK_PARAMS.contains(&name.as_str()) {
            continue;
        }
        let resolved = match state.resolver.resolve(&resource_type, name) {
            Ok(resolved) => resolved,
            Err(err) => return search_error_response(&err),
        };
        let fragments = builders::build_queries(&resolved, values);
        if !fragments.is_empty() {
            queries.push(FtsQuery::disjuncts(fragments));
        }
    }
    debug!(resource_type, params = params.len(), fragments = queries.len(), "search compiled");

    let hits = match state
        .search
        .search_for_keys(
            queries,
            &resource_type,
            offset,
            count,
            FtsSearchService::default_sort(),
        )
        .await
    {
        Ok(hits) => hits,
        Err(err) => return search_error_response(&err),
    };

    let resources = match state.kv.fetch(&hits.keys, &resource_type).await {
        Ok(resources) => resources,
        Err(err) => return search_error_response(&err),
    };

    respond_searchset(
        &state,
        &resource_type,
        &raw_query,
        resources,
        Some(hits.total),
        offset,
        count,
    )
}

async fn reverse_chain_search(
    state: &AppState,
    resource_type: &str,
    raw_query: &str,
    offset: usize,
    count: usize,
) -> Response {
    let keys = match state
        .group
        .all_matching_keys(resource_type, raw_query, state.config.search.group_max_keys)
        .await
    {
        Ok(keys) => keys,
        Err(err) => return search_error_response(&err),
    };

    let total = keys.len() as u64;
    let page: Vec<String> = keys.into_iter().skip(offset).take(count).collect();
    let resources = match state.kv.fetch(&page, resource_type).await {
        Ok(resources) => resources,
        Err(err) => return search_error_response(&err),
    };

    respond_searchset(
        state,
        resource_type,
        raw_query,
        resources,
        Some(total),
        offset,
        count,
    )
}

fn respond_searchset(
    state: &AppState,
    resource_type: &str,
    raw_query: &str,
    resources: Vec<Value>,
    total: Option<u64>,
    offset: usize,
    count: usize,
) -> Response {
    let base_url = state.config.base_url();
    let entries: Vec<Value> = resources
        .into_iter()
        .map(|resource| fhir_bundle::searchset_entry(&base_url, resource))
        .collect();

    let self_link = search_link(&base_url, resource_type, raw_query, None);
    let next_link = total
        .filter(|total| ((offset + count) as u64) < *total)
        .map(|_| search_link(&base_url, resource_type, raw_query, Some(offset + count)));

    let bundle = fhir_bundle::searchset(entries, total, &self_link, next_link.as_deref());
    fhir_json(StatusCode::OK, &bundle)
}

/// Rebuild the search URL, optionally replacing `_offset`.
fn search_link(
    base_url: &str,
    resource_type: &str,
    raw_query: &str,
    new_offset: Option<usize>,
) -> String {
    match new_offset {
        None => {
            if raw_query.is_empty() {
                format!("{base_url}/{resource_type}")
            } else {
                format!("{base_url}/{resource_type}?{raw_query}")
            }
        }
        Some(offset) => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
                if name != "_offset" {
                    serializer.append_pair(&name, &value);
                }
            }
            serializer.append_pair("_offset", &offset.to_string());
            format!("{base_url}/{resource_type}?{}", serializer.finish())
        }
    }
}

fn read_usize(
    params: &std::collections::HashMap<String, Vec<String>>,
    name: &str,
    default: usize,
) -> usize {
    params
        .get(name)
        .and_then(|values| values.first())
        .and_then(|value| value.parse().ok())
        .filter(|n| *n > 0 || name == "_offset")
        .unwrap_or(default)
}

fn search_error_response(err: &SearchError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    outcome_response(status, &err.to_operation_outcome())
}

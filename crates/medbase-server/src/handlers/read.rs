//! Read and version-read handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use medbase_core::id::{document_key, history_key};
use medbase_storage::{DocumentStore, Keyspace};

use super::{fhir_json, gone, not_found};
use crate::state::AppState;

/// `GET /fhir/{type}/{id}`
pub async fn read_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Response {
    let keyspace = Keyspace::resources(state.search.routing().target_collection(&resource_type));
    let key = document_key(&resource_type, &id);

    match state.store.get(&keyspace, &key).await {
        Ok(Some(doc)) => fhir_json(StatusCode::OK, &doc.content),
        Ok(None) => {
            // A tombstoned id answers 410, a never-written id 404.
            match state.tombstones.is_tombstoned(&resource_type, &id).await {
                Ok(true) => gone(&resource_type, &id),
                _ => not_found(&resource_type, &id),
            }
        }
        Err(err) => super::outcome_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &medbase_core::outcome::OperationOutcome::error(
                medbase_core::outcome::IssueType::Exception,
                err.to_string(),
            ),
        ),
    }
}

/// `GET /fhir/{type}/{id}/_history/{vid}`
pub async fn read_version(
    State(state): State<AppState>,
    Path((resource_type, id, version_id)): Path<(String, String, String)>,
) -> Response {
    // The current document serves its own version; older versions come from
    // the history collection.
    let keyspace = Keyspace::resources(state.search.routing().target_collection(&resource_type));
    let key = document_key(&resource_type, &id);
    if let Ok(Some(doc)) = state.store.get(&keyspace, &key).await {
        let current_version = doc
            .content
            .pointer("/meta/versionId")
            .and_then(Value::as_str);
        if current_version == Some(version_id.as_str()) {
            return fhir_json(StatusCode::OK, &doc.content);
        }
    }

    let snapshot_key = history_key(&resource_type, &id, &version_id);
    match state.store.get(&Keyspace::versions(), &snapshot_key).await {
        Ok(Some(doc)) => fhir_json(StatusCode::OK, &doc.content),
        _ => not_found(&resource_type, &format!("{id}/_history/{version_id}")),
    }
}

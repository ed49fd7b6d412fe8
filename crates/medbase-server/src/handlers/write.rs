//! Create, update, and delete handlers.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use medbase_core::id::generate_id;
use medbase_core::outcome::{IssueType, OperationOutcome};
use medbase_write::audit::Operation;
use medbase_write::WriteError;

use super::{audit_from_request, fhir_json, outcome_response, write_error_response};
use crate::state::AppState;

/// `PUT /fhir/{type}/{id}` — conditional update with a client-supplied id.
pub async fn update_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(mut resource): Json<Value>,
) -> Response {
    if let Some(body_type) = resource.get("resourceType").and_then(Value::as_str) {
        if body_type != resource_type {
            return outcome_response(
                StatusCode::BAD_REQUEST,
                &OperationOutcome::error(
                    IssueType::Invalid,
                    format!("resourceType {body_type} does not match URL type {resource_type}"),
                ),
            );
        }
    }
    match resource.get("id").and_then(Value::as_str) {
        Some(body_id) if body_id != id => {
            return outcome_response(
                StatusCode::BAD_REQUEST,
                &OperationOutcome::error(
                    IssueType::Invalid,
                    format!("resource id {body_id} does not match URL id {id}"),
                ),
            );
        }
        Some(_) => {}
        None => {
            resource["id"] = Value::String(id.clone());
        }
    }

    let audit = audit_from_request(&state, &headers, Operation::Update);
    match state.put.upsert(resource, &audit).await {
        Ok(written) => {
            let version = written
                .pointer("/meta/versionId")
                .and_then(Value::as_str)
                .unwrap_or("1")
                .to_string();
            let status = if version == "1" {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let mut response = fhir_json(status, &written);
            if let Ok(etag) = format!("W/\"{version}\"").parse() {
                response.headers_mut().insert(header::ETAG, etag);
            }
            response
        }
        Err(err) => write_error_response(&err),
    }
}

/// `POST /fhir/{type}` — create with a server-assigned id.
pub async fn create_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    headers: HeaderMap,
    Json(mut resource): Json<Value>,
) -> Response {
    match resource.get("resourceType").and_then(Value::as_str) {
        Some(body_type) if body_type == resource_type => {}
        _ => {
            return outcome_response(
                StatusCode::BAD_REQUEST,
                &OperationOutcome::error(
                    IssueType::Invalid,
                    format!("body must be a {resource_type} resource"),
                ),
            )
        }
    }

    let id = generate_id();
    resource["id"] = Value::String(id.clone());
    let audit = audit_from_request(&state, &headers, Operation::Create);

    match state.put.upsert(resource, &audit).await {
        Ok(written) => {
            let location = format!("{}/{resource_type}/{id}", state.config.base_url());
            let mut response = fhir_json(StatusCode::CREATED, &written);
            if let Ok(value) = location.parse() {
                response.headers_mut().insert(header::LOCATION, value);
            }
            response
        }
        Err(err) => write_error_response(&err),
    }
}

/// `DELETE /fhir/{type}/{id}` — delete with tombstoning.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Response {
    match state.delete.delete(&resource_type, &id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(WriteError::NotFound { .. }) => super::not_found(&resource_type, &id),
        Err(err) => write_error_response(&err),
    }
}

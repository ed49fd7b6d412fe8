//! FHIR REST handlers.

pub mod bundle;
pub mod read;
pub mod search;
pub mod write;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use medbase_core::outcome::{IssueType, OperationOutcome};
use medbase_write::audit::{AuditInfo, Operation};

use crate::state::AppState;

/// The FHIR JSON media type.
pub const FHIR_JSON: &str = "application/fhir+json";

/// A response carrying a FHIR resource body.
pub fn fhir_json(status: StatusCode, body: &Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, FHIR_JSON)],
        body.to_string(),
    )
        .into_response()
}

/// An `OperationOutcome` error response.
pub fn outcome_response(status: StatusCode, outcome: &OperationOutcome) -> Response {
    fhir_json(status, &outcome.to_value())
}

pub fn not_found(resource_type: &str, id: &str) -> Response {
    outcome_response(
        StatusCode::NOT_FOUND,
        &OperationOutcome::error(
            IssueType::NotFound,
            format!("Resource not found: {resource_type}/{id}"),
        ),
    )
}

pub fn gone(resource_type: &str, id: &str) -> Response {
    outcome_response(
        StatusCode::GONE,
        &OperationOutcome::error(
            IssueType::Deleted,
            format!("Resource {resource_type}/{id} has been deleted"),
        ),
    )
}

/// Audit identity for a write: the bearer token's subject when one is
/// presented and valid, otherwise anonymous.
pub fn audit_from_request(state: &AppState, headers: &HeaderMap, operation: Operation) -> AuditInfo {
    let user = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.auth.tokens.verify_access_token(token).ok())
        .map(|claims| claims.sub)
        .unwrap_or_else(|| "anonymous".to_string());
    AuditInfo::new(user, operation)
}

/// Map a write error onto its HTTP response.
pub fn write_error_response(err: &medbase_write::WriteError) -> Response {
    let status = if err.is_version_conflict() {
        StatusCode::CONFLICT
    } else {
        match err {
            medbase_write::WriteError::NotFound { .. } => StatusCode::NOT_FOUND,
            medbase_write::WriteError::Storage(inner) if !inner.is_retryable() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    };
    outcome_response(status, &err.to_operation_outcome())
}

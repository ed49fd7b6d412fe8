//! Bundle endpoint: `POST /fhir` with a transaction or batch Bundle.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde_json::Value;

use medbase_write::audit::Operation;

use super::{audit_from_request, fhir_json, write_error_response};
use crate::state::AppState;

pub async fn process_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(bundle): Json<Value>,
) -> Response {
    let audit = audit_from_request(&state, &headers, Operation::Create);
    match state.bundles.process(bundle, &audit).await {
        Ok(response) => fhir_json(StatusCode::OK, &response),
        Err(err) => write_error_response(&err),
    }
}

//! JWKS endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::AuthState;

/// `GET /oauth2/jwks`. Also retries lazy key persistence, so a deployment
/// whose admin collection appeared after startup converges without a
/// restart.
pub async fn jwks_handler(State(state): State<AuthState>) -> Response {
    let _ = state.keys.ensure_persisted().await;
    match state.keys.jwks() {
        Ok(jwks) => (
            [(header::CACHE_CONTROL, "public, max-age=3600")],
            Json(jwks),
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

//! OpenID Connect UserInfo endpoint.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::{bearer_token, AuthState};

/// `GET /oauth2/userinfo` with a bearer access token.
pub async fn userinfo_handler(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };
    let claims = match state.tokens.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let mut body = json!({ "sub": claims.sub });
    if let Some(fhir_user) = claims.fhir_user {
        body["fhirUser"] = json!(fhir_user);
    }
    (StatusCode::OK, Json(body)).into_response()
}

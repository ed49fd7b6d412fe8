//! Token endpoint handler.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use super::{basic_auth, first, parse_form, AuthState};
use crate::oauth::token::TokenRequest;

pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = parse_form(&body);
    let request = TokenRequest {
        grant_type: first(&params, "grant_type").unwrap_or_default().to_string(),
        code: first(&params, "code").map(str::to_string),
        redirect_uri: first(&params, "redirect_uri").map(str::to_string),
        client_id: first(&params, "client_id").map(str::to_string),
        client_secret: first(&params, "client_secret").map(str::to_string),
        code_verifier: first(&params, "code_verifier").map(str::to_string),
        refresh_token: first(&params, "refresh_token").map(str::to_string),
        scope: first(&params, "scope").map(str::to_string),
    };
    debug!(grant_type = %request.grant_type, "token request");

    match state.tokens.handle(request, basic_auth(&headers)).await {
        Ok(response) => (
            StatusCode::OK,
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(response),
        )
            .into_response(),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Json(err.to_error_body())).into_response()
        }
    }
}

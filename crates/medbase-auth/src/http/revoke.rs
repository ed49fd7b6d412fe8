//! Token revocation (RFC 7009).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use super::{first, parse_form, AuthState};
use crate::store::TokenKind;

/// `POST /oauth2/revoke`. Retires the whole authorization record behind the
/// presented token. Unknown tokens still return 200 per the RFC.
pub async fn revoke_handler(State(state): State<AuthState>, body: String) -> Response {
    let params = parse_form(&body);
    let token = match first(&params, "token") {
        Some(token) => token,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    for kind in [TokenKind::AccessToken, TokenKind::RefreshToken] {
        if let Ok(Some(record)) = state.authorizations.find_by_token(token, kind).await {
            let _ = state.authorizations.remove(&record.id).await;
            info!(id = %record.id, "authorization revoked");
            break;
        }
    }
    StatusCode::OK.into_response()
}

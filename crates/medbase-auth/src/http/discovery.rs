//! Discovery endpoints. Both are public.

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use super::AuthState;
use crate::smart::discovery;

/// `GET /.well-known/smart-configuration`
pub async fn smart_configuration_handler(State(state): State<AuthState>) -> Json<Value> {
    Json(discovery::smart_configuration(&state.issuer))
}

/// `GET /.well-known/oauth-authorization-server`
pub async fn oauth_metadata_handler(State(state): State<AuthState>) -> Json<Value> {
    Json(discovery::oauth_server_metadata(&state.issuer))
}

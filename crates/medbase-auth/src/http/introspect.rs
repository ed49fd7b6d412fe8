//! Token introspection (RFC 7662).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::{first, parse_form, AuthState};
use crate::store::TokenKind;

/// `POST /oauth2/introspect`. Inactive or unknown tokens return
/// `{"active": false}` rather than an error.
pub async fn introspect_handler(State(state): State<AuthState>, body: String) -> Json<Value> {
    let params = parse_form(&body);
    let token = match first(&params, "token") {
        Some(token) => token,
        None => return Json(json!({ "active": false })),
    };

    // Signature and expiry first; then the record must still exist (a
    // revoked token fails here even before its exp).
    let claims = match state.tokens.verify_access_token(token) {
        Ok(claims) => claims,
        Err(_) => return Json(json!({ "active": false })),
    };
    let record = state
        .authorizations
        .find_by_token(token, TokenKind::AccessToken)
        .await;
    if !matches!(record, Ok(Some(_))) {
        return Json(json!({ "active": false }));
    }

    let mut body = json!({
        "active": true,
        "iss": claims.iss,
        "sub": claims.sub,
        "aud": claims.aud,
        "exp": claims.exp,
        "iat": claims.iat,
        "jti": claims.jti,
        "scope": claims.scope,
        "client_id": claims.client_id,
        "token_type": "Bearer",
    });
    if let Some(patient) = claims.patient {
        body["patient"] = json!(patient);
    }
    if let Some(fhir_user) = claims.fhir_user {
        body["fhirUser"] = json!(fhir_user);
    }
    Json(body)
}

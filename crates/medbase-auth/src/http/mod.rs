//! HTTP surface of the authorization server.
//!
//! Axum handlers for the OAuth endpoints and the server-rendered login,
//! patient picker, and consent pages. The consent form posts back to
//! `/oauth2/authorize`; the consent-state token decides whether a POST is a
//! consent response or a fresh authorization request.

pub mod authorize;
pub mod discovery;
pub mod html;
pub mod introspect;
pub mod jwks;
pub mod login;
pub mod picker;
pub mod revoke;
pub mod token;
pub mod userinfo;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::clients::ClientRepository;
use crate::config::AuthConfig;
use crate::consent::ConsentStateService;
use crate::keys::KeyService;
use crate::oauth::token::TokenService;
use crate::picker::PatientPickerService;
use crate::session::{self, Session, SessionStore};
use crate::store::AuthorizationStore;
use crate::types::user::UserStore;

/// Shared state of the authorization server.
#[derive(Clone)]
pub struct AuthState {
    pub clients: Arc<dyn ClientRepository>,
    pub authorizations: Arc<dyn AuthorizationStore>,
    pub sessions: Arc<SessionStore>,
    pub consents: Arc<ConsentStateService>,
    pub users: Arc<dyn UserStore>,
    pub keys: Arc<KeyService>,
    pub tokens: Arc<TokenService>,
    pub picker: Arc<PatientPickerService>,
    pub config: AuthConfig,
    pub issuer: String,
}

/// Router for all authorization endpoints.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/oauth2/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/oauth2/login", get(login::login_page).post(login::login_submit))
        .route(
            "/patient-picker",
            get(picker::picker_page).post(picker::picker_submit),
        )
        .route("/oauth2/token", post(token::token_handler))
        .route("/oauth2/jwks", get(jwks::jwks_handler))
        .route("/oauth2/introspect", post(introspect::introspect_handler))
        .route("/oauth2/revoke", post(revoke::revoke_handler))
        .route("/oauth2/userinfo", get(userinfo::userinfo_handler))
        .route(
            "/.well-known/smart-configuration",
            get(discovery::smart_configuration_handler),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(discovery::oauth_metadata_handler),
        )
        .with_state(state)
}

/// Multi-valued form/query parameters in arrival order.
pub(crate) type ParamMultiMap = Vec<(String, String)>;

/// Parse an `application/x-www-form-urlencoded` payload, keeping repeats.
pub(crate) fn parse_form(body: &str) -> ParamMultiMap {
    url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn first<'a>(params: &'a ParamMultiMap, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

pub(crate) fn all<'a>(params: &'a ParamMultiMap, name: &str) -> Vec<&'a str> {
    params
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .collect()
}

/// Load (or create) the session referenced by the request cookies.
pub(crate) fn load_session(state: &AuthState, headers: &HeaderMap) -> Session {
    let session_id = headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session::session_id_from_cookie_header);
    state.sessions.get_or_create(session_id.as_deref())
}

/// Parse an `Authorization: Basic` header into credentials.
pub(crate) fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Parse an `Authorization: Bearer` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_keeps_repeats() {
        let params = parse_form("scope=openid&scope=fhirUser&state=x");
        assert_eq!(all(&params, "scope"), vec!["openid", "fhirUser"]);
        assert_eq!(first(&params, "state"), Some("x"));
        assert_eq!(first(&params, "missing"), None);
    }

    #[test]
    fn test_basic_auth_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("admin-ui:s3cret"))
                .parse()
                .unwrap(),
        );
        assert_eq!(
            basic_auth(&headers),
            Some(("admin-ui".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def.ghi".parse().unwrap(),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));
        assert!(basic_auth(&headers).is_none());
    }
}

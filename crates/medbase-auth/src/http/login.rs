//! Login endpoints for the OAuth flow.
//!
//! Distinct from any admin API login. On success the handler redirects back
//! to `/oauth2/authorize` with the saved request so the authorization
//! endpoint's own state machine resumes the flow — never straight to a
//! consent page.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::{info, warn};

use super::authorize::{error_response, page_response, redirect};
use super::{first, html, load_session, parse_form, AuthState};

#[derive(Debug, Deserialize)]
pub struct LoginPageParams {
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn login_page(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Query(params): Query<LoginPageParams>,
) -> Response {
    let session = load_session(&state, &headers);
    page_response(html::login_page(params.error.as_deref()), Some(&session))
}

pub async fn login_submit(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session = load_session(&state, &headers);
    let params = parse_form(&body);
    let username = first(&params, "username").unwrap_or_default().to_string();
    let password = first(&params, "password").unwrap_or_default();

    let user = match state.users.find(&username).await {
        Ok(user) => user,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    };

    let user = match user {
        Some(user) if user.is_active() && user.verify_password(password) => user,
        _ => {
            warn!(username, "login failed");
            return page_response(
                html::login_page(Some("Invalid username or password")),
                Some(&session),
            );
        }
    };

    state.sessions.update(&session.id, |s| {
        s.username = Some(user.username.clone());
        s.role = Some(user.role);
        s.fhir_user = user.fhir_user.clone();
    });
    info!(username, role = user.role.as_str(), "user authenticated");

    // Resume the saved authorization request through the authorization
    // endpoint; its state machine owns consent-state generation.
    let session = state.sessions.get(&session.id).unwrap_or(session);
    match &session.saved_request {
        Some(saved) => {
            let location = format!("/oauth2/authorize?{saved}");
            redirect(&location, Some(&session))
        }
        None => redirect("/", Some(&session)),
    }
}

//! Patient picker endpoints for the provider standalone launch.
//!
//! Only practitioners reach these pages. Selecting a patient stores the
//! choice in the session and redirects back to the authorization endpoint
//! with the original OAuth parameters (plus `patient_id`), so the
//! authorization endpoint can attach consent state itself. Cancelling
//! redirects to the client with `error=access_denied`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use tracing::{info, warn};

use super::authorize::{error_response, page_response, redirect};
use super::{first, html, load_session, parse_form, AuthState, ParamMultiMap};
use crate::oauth::authorize::denied_redirect_url;

const OAUTH_PASSTHROUGH: &[&str] = &[
    "client_id",
    "scope",
    "state",
    "redirect_uri",
    "response_type",
    "code_challenge",
    "code_challenge_method",
    "aud",
];

pub async fn picker_page(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let session = load_session(&state, &headers);
    let params = parse_form(uri.query().unwrap_or_default());

    if !session.is_authenticated() {
        return error_response(StatusCode::UNAUTHORIZED, "Sign in first");
    }
    if !session.is_practitioner() {
        warn!(username = ?session.username, "non-practitioner attempted patient picker");
        return error_response(
            StatusCode::FORBIDDEN,
            "Only practitioners can select patients for provider applications",
        );
    }

    let search_term = first(&params, "searchTerm").unwrap_or_default().to_string();
    let patients = match state
        .picker
        .search(Some(search_term.as_str()).filter(|t| !t.is_empty()), 10)
        .await
    {
        Ok(patients) => patients,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    };

    let fields = passthrough_fields(&params);
    let page = html::picker_page(
        session.username.as_deref().unwrap_or("unknown"),
        &patients,
        &search_term,
        &fields,
        None,
    );
    page_response(page, Some(&session))
}

pub async fn picker_submit(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session = load_session(&state, &headers);
    let params = parse_form(&body);

    if !session.is_authenticated() || !session.is_practitioner() {
        return error_response(StatusCode::FORBIDDEN, "Only practitioners can select patients");
    }

    let redirect_uri = first(&params, "redirect_uri").unwrap_or_default();
    let oauth_state = first(&params, "state").unwrap_or_default();

    // Cancellation goes straight back to the client.
    if first(&params, "action") == Some("cancel") {
        info!("patient selection cancelled");
        return match denied_redirect_url(redirect_uri, oauth_state) {
            Ok(url) => redirect(&url, Some(&session)),
            Err(_) => error_response(StatusCode::BAD_REQUEST, "Invalid redirect URI"),
        };
    }

    let patient_id = first(&params, "patient_id").unwrap_or_default().trim();
    if patient_id.is_empty() {
        return rerender_with_error(&state, &session, &params, "Please select a patient").await;
    }

    match state.picker.get_by_id(patient_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return rerender_with_error(&state, &session, &params, "Invalid patient selected")
                .await
        }
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }

    let patient_id = patient_id.to_string();
    state.sessions.update(&session.id, |s| {
        s.selected_patient_id = Some(patient_id.clone());
    });
    info!(patient_id, "patient context stored in session");

    // Back to the authorization endpoint with the original parameters so it
    // can attach consent state; the patient id rides along explicitly.
    let mut pairs = url::form_urlencoded::Serializer::new(String::new());
    for name in OAUTH_PASSTHROUGH {
        if let Some(value) = first(&params, name) {
            if !value.is_empty() {
                pairs.append_pair(name, value);
            }
        }
    }
    pairs.append_pair("patient_id", &patient_id);
    let location = format!("/oauth2/authorize?{}", pairs.finish());
    redirect(&location, Some(&session))
}

async fn rerender_with_error(
    state: &AuthState,
    session: &crate::session::Session,
    params: &ParamMultiMap,
    message: &str,
) -> Response {
    let patients = state.picker.search(None, 10).await.unwrap_or_default();
    let fields = passthrough_fields(params);
    let page = html::picker_page(
        session.username.as_deref().unwrap_or("unknown"),
        &patients,
        "",
        &fields,
        Some(message),
    );
    page_response(page, Some(session))
}

fn passthrough_fields(params: &ParamMultiMap) -> Vec<(&'static str, &str)> {
    OAUTH_PASSTHROUGH
        .iter()
        .filter_map(|name| first(params, name).map(|value| (*name, value)))
        .collect()
}

//! The authorization endpoint and consent processing.
//!
//! `GET /oauth2/authorize` drives the interactive flow:
//! login → optional patient picker → consent → code issuance. The consent
//! form posts back to this same endpoint; a POST carrying a consent-state
//! token (and none of the authorization-request parameters) is processed as
//! a consent response, anything else as a fresh authorization request. The
//! login success handler and the picker both redirect back here rather than
//! to any internal page, so this endpoint owns all flow state transitions.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use rand::RngCore;
use tracing::{info, warn};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use time::OffsetDateTime;

use super::{all, first, html, load_session, parse_form, AuthState, ParamMultiMap};
use crate::oauth::authorize::{code_redirect_url, denied_redirect_url, AuthorizeRequest};
use crate::oauth::token::CODE_TTL_SECONDS;
use crate::session::{session_cookie, Session};
use crate::smart::scopes::ScopeSet;
use crate::types::authorization::{
    AuthorizationRecord, ATTR_AUD, ATTR_CODE_CHALLENGE, ATTR_CODE_CHALLENGE_METHOD, ATTR_LAUNCH,
    ATTR_NONCE, ATTR_REDIRECT_URI, ATTR_SESSION_ID, ATTR_USERNAME,
};
use crate::types::client::GrantType;

pub async fn authorize_get(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let query = uri.query().unwrap_or_default().to_string();
    let session = load_session(&state, &headers);
    let params = parse_form(&query);
    run_authorize(&state, session, &params, &query).await
}

pub async fn authorize_post(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session = load_session(&state, &headers);
    let params = parse_form(&body);

    // A consent response is recognized by its consent-state token. The
    // authorization-request parameters must be absent: their presence makes
    // this POST a new authorization request.
    let has_consent_state = first(&params, "consent_state").is_some();
    let looks_like_new_request = first(&params, "response_type").is_some()
        || first(&params, "code_challenge").is_some()
        || first(&params, "code_challenge_method").is_some();

    if has_consent_state && !looks_like_new_request {
        return process_consent(&state, session, &params).await;
    }
    if has_consent_state {
        warn!("consent POST carried authorization-request parameters; treating as new request");
    }
    run_authorize(&state, session, &params, &body).await
}

/// The authorization request state machine.
async fn run_authorize(
    state: &AuthState,
    session: Session,
    params: &ParamMultiMap,
    raw_request: &str,
) -> Response {
    let request = match request_from_params(params) {
        Ok(request) => request,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let client = match state.clients.find_by_client_id(&request.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Unknown client: {}", request.client_id),
            )
        }
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    };

    if let Err(err) = request.validate(&client) {
        return match err.to_redirect_url() {
            Some(url) => redirect(&url, Some(&session)),
            None => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        };
    }

    // Unauthenticated: save the original request and send to login. The
    // saved request is kept until the flow completes.
    if !session.is_authenticated() {
        state.sessions.update(&session.id, |s| {
            s.saved_request = Some(raw_request.to_string());
        });
        return redirect("/oauth2/login", Some(&session));
    }

    // Patient context handed back by the picker redirect.
    if let Some(patient_id) = &request.patient_id {
        let patient_id = patient_id.clone();
        state.sessions.update(&session.id, |s| {
            s.selected_patient_id = Some(patient_id);
        });
    }
    let session = state.sessions.get(&session.id).unwrap_or(session);

    // Provider standalone launch: a practitioner requesting launch/patient
    // picks the patient before consent.
    let scopes = ScopeSet::parse(&request.scope);
    if scopes.requests_patient_launch()
        && session.is_practitioner()
        && session.selected_patient_id.is_none()
    {
        let picker_url = picker_url(&request);
        info!(client_id = %request.client_id, "redirecting practitioner to patient picker");
        return redirect(&picker_url, Some(&session));
    }

    render_consent(state, &session, &request, &client.display_name().to_string()).await
}

/// Issue a consent state and render the consent page.
async fn render_consent(
    state: &AuthState,
    session: &Session,
    request: &AuthorizeRequest,
    client_name: &str,
) -> Response {
    let mut attributes = HashMap::new();
    if let Some(challenge) = &request.code_challenge {
        attributes.insert(ATTR_CODE_CHALLENGE.to_string(), challenge.clone());
        attributes.insert(
            ATTR_CODE_CHALLENGE_METHOD.to_string(),
            request
                .code_challenge_method
                .clone()
                .unwrap_or_else(|| "S256".to_string()),
        );
    }
    if let Some(aud) = &request.aud {
        attributes.insert(ATTR_AUD.to_string(), aud.clone());
    }
    if let Some(launch) = &request.launch {
        attributes.insert(ATTR_LAUNCH.to_string(), launch.clone());
    }
    if let Some(nonce) = &request.nonce {
        attributes.insert(ATTR_NONCE.to_string(), nonce.clone());
    }
    if let Some(username) = &session.username {
        attributes.insert(ATTR_USERNAME.to_string(), username.clone());
    }

    let pending = state.consents.issue(
        session.id.clone(),
        request.client_id.clone(),
        request.scope_list(),
        request.state.clone(),
        request.redirect_uri.clone(),
        attributes,
    );

    let page = html::consent_page(
        client_name,
        session.username.as_deref().unwrap_or("unknown"),
        &pending.scopes,
        &pending.consent_state,
        &pending.client_id,
        &pending.state,
        session.selected_patient_id.as_deref(),
    );
    page_response(page, Some(session))
}

/// Handle the consent form POST.
async fn process_consent(state: &AuthState, session: Session, params: &ParamMultiMap) -> Response {
    let consent_state = first(params, "consent_state").unwrap_or_default();
    let pending = match state.consents.take(consent_state) {
        Some(pending) => pending,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Unknown or expired consent state",
            )
        }
    };
    if pending.session_id != session.id {
        return error_response(StatusCode::BAD_REQUEST, "Consent does not match this session");
    }

    let action = first(params, "consent_action").unwrap_or("deny");
    if action != "approve" {
        info!(client_id = %pending.client_id, "consent denied");
        clear_flow_state(state, &session);
        return match denied_redirect_url(&pending.redirect_uri, &pending.state) {
            Ok(url) => redirect(&url, Some(&session)),
            Err(_) => error_response(StatusCode::BAD_REQUEST, "Invalid redirect URI"),
        };
    }

    // Scopes arrive as repeated fields; only requested scopes can be granted.
    let granted: Vec<String> = all(params, "scope")
        .into_iter()
        .filter(|scope| pending.scopes.iter().any(|s| s == scope))
        .map(str::to_string)
        .collect();
    if granted.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No scopes granted");
    }

    let code = generate_code();
    let mut record = AuthorizationRecord::new(
        pending.client_id.clone(),
        GrantType::AuthorizationCode,
        pending.state.clone(),
    )
    .with_scopes(granted)
    .with_attribute(ATTR_SESSION_ID, session.id.clone())
    .with_attribute(ATTR_REDIRECT_URI, pending.redirect_uri.clone());
    for (key, value) in &pending.attributes {
        record.attributes.insert(key.clone(), value.clone());
    }
    record.authorization_code = Some(code.clone());
    record.code_expires_at =
        Some(OffsetDateTime::now_utc().unix_timestamp() + CODE_TTL_SECONDS);

    // The decorated store injects the session's selected patient here.
    if let Err(err) = state.authorizations.save(record).await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
    }

    info!(client_id = %pending.client_id, "authorization code issued");
    clear_flow_state(state, &session);

    match code_redirect_url(&pending.redirect_uri, &code, &pending.state) {
        Ok(url) => redirect(&url, Some(&session)),
        Err(_) => error_response(StatusCode::BAD_REQUEST, "Invalid redirect URI"),
    }
}

fn clear_flow_state(state: &AuthState, session: &Session) {
    state.sessions.update(&session.id, |s| {
        s.saved_request = None;
        s.selected_patient_id = None;
    });
}

fn request_from_params(params: &ParamMultiMap) -> Result<AuthorizeRequest, String> {
    let required = |name: &str| {
        first(params, name)
            .map(str::to_string)
            .ok_or_else(|| format!("Missing required parameter: {name}"))
    };
    let optional = |name: &str| first(params, name).map(str::to_string);

    Ok(AuthorizeRequest {
        response_type: required("response_type")?,
        client_id: required("client_id")?,
        redirect_uri: required("redirect_uri")?,
        scope: required("scope")?,
        state: required("state")?,
        code_challenge: optional("code_challenge"),
        code_challenge_method: optional("code_challenge_method"),
        aud: optional("aud"),
        launch: optional("launch"),
        nonce: optional("nonce"),
        patient_id: optional("patient_id"),
    })
}

fn picker_url(request: &AuthorizeRequest) -> String {
    let mut pairs = url::form_urlencoded::Serializer::new(String::new());
    pairs
        .append_pair("client_id", &request.client_id)
        .append_pair("scope", &request.scope)
        .append_pair("state", &request.state)
        .append_pair("redirect_uri", &request.redirect_uri)
        .append_pair("response_type", &request.response_type);
    if let Some(challenge) = &request.code_challenge {
        pairs.append_pair("code_challenge", challenge);
    }
    if let Some(method) = &request.code_challenge_method {
        pairs.append_pair("code_challenge_method", method);
    }
    if let Some(aud) = &request.aud {
        pairs.append_pair("aud", aud);
    }
    format!("/patient-picker?{}", pairs.finish())
}

fn generate_code() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn redirect(location: &str, session: Option<&Session>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(session) = session {
        builder = builder.header(header::SET_COOKIE, session_cookie(session));
    }
    builder.body(axum::body::Body::empty()).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "redirect failed").into_response()
    })
}

pub(crate) fn page_response(page: String, session: Option<&Session>) -> Response {
    let mut response = Html(page).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, max-age=0".parse().unwrap(),
    );
    if let Some(session) = session {
        if let Ok(cookie) = session_cookie(session).parse() {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Html(html::error_page(message))).into_response()
}

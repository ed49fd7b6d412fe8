//! Authorization endpoint request model.

use serde::Deserialize;
use url::Url;

use crate::oauth::pkce::PkceChallengeMethod;
use crate::types::client::{GrantType, RegisteredClient};

/// Parameters of a `GET /oauth2/authorize` request.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Space-separated scopes.
    pub scope: String,
    pub state: String,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    /// FHIR server base URL (SMART audience).
    #[serde(default)]
    pub aud: Option<String>,
    /// EHR launch context identifier.
    #[serde(default)]
    pub launch: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    /// Patient context carried back from the picker redirect.
    #[serde(default)]
    pub patient_id: Option<String>,
}

/// Failures of an authorization request.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    /// The redirect URI cannot be trusted; render the error, never redirect.
    #[error("Invalid client or redirect URI: {0}")]
    Unredirectable(String),

    /// Communicated to the client via redirect with `error=<code>`.
    #[error("{description}")]
    Redirect {
        code: &'static str,
        description: String,
        state: String,
        redirect_uri: String,
    },
}

impl AuthorizeError {
    pub fn redirect(
        code: &'static str,
        description: impl Into<String>,
        state: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self::Redirect {
            code,
            description: description.into(),
            state: state.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Build the error redirect URL, when one is possible.
    pub fn to_redirect_url(&self) -> Option<String> {
        match self {
            Self::Unredirectable(_) => None,
            Self::Redirect {
                code,
                description,
                state,
                redirect_uri,
            } => {
                let mut url = Url::parse(redirect_uri).ok()?;
                url.query_pairs_mut()
                    .append_pair("error", code)
                    .append_pair("error_description", description)
                    .append_pair("state", state);
                Some(url.to_string())
            }
        }
    }
}

impl AuthorizeRequest {
    pub fn scope_list(&self) -> Vec<String> {
        self.scope
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Validate the request against the resolved client.
    ///
    /// # Errors
    /// `Unredirectable` for an unregistered redirect URI (the client cannot
    /// be trusted with a redirect); `Redirect` for everything else.
    pub fn validate(&self, client: &RegisteredClient) -> Result<(), AuthorizeError> {
        if !client.redirect_uri_registered(&self.redirect_uri) {
            return Err(AuthorizeError::Unredirectable(format!(
                "redirect_uri {} is not registered for client {}",
                self.redirect_uri, self.client_id
            )));
        }

        let redirect = |code, description: String| {
            AuthorizeError::redirect(code, description, self.state.clone(), self.redirect_uri.clone())
        };

        if self.response_type != "code" {
            return Err(redirect(
                "unsupported_response_type",
                format!("response_type must be code, got {}", self.response_type),
            ));
        }
        if !client.supports_grant(GrantType::AuthorizationCode) {
            return Err(redirect(
                "unauthorized_client",
                "client is not authorized for the authorization_code grant".to_string(),
            ));
        }
        if self.scope.trim().is_empty() {
            return Err(redirect("invalid_scope", "scope is required".to_string()));
        }

        if client.pkce_required {
            let challenge = self
                .code_challenge
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    redirect("invalid_request", "code_challenge is required".to_string())
                })?;
            if challenge.len() < 43 {
                return Err(redirect(
                    "invalid_request",
                    "code_challenge is too short".to_string(),
                ));
            }
            let method = self.code_challenge_method.as_deref().unwrap_or("S256");
            PkceChallengeMethod::parse(method)
                .map_err(|e| redirect("invalid_request", e.to_string()))?;
        }
        Ok(())
    }
}

/// Build the success redirect with the issued code.
pub fn code_redirect_url(redirect_uri: &str, code: &str, state: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(redirect_uri)?;
    url.query_pairs_mut()
        .append_pair("code", code)
        .append_pair("state", state);
    Ok(url.to_string())
}

/// Build the `access_denied` redirect used for picker/consent cancellation.
pub fn denied_redirect_url(redirect_uri: &str, state: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(redirect_uri)?;
    url.query_pairs_mut()
        .append_pair("error", "access_denied")
        .append_pair("state", state);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RegisteredClient {
        RegisteredClient::smart_app(
            "my-app",
            vec!["https://app.example.com/callback".into()],
            vec!["launch/patient".into(), "openid".into()],
        )
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: "code".into(),
            client_id: "my-app".into(),
            redirect_uri: "https://app.example.com/callback".into(),
            scope: "launch/patient openid fhirUser patient/*.rs".into(),
            state: "abc123".into(),
            code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into()),
            code_challenge_method: Some("S256".into()),
            aud: Some("https://fhir.example.com/fhir".into()),
            launch: None,
            nonce: None,
            patient_id: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate(&client()).is_ok());
    }

    #[test]
    fn test_scope_list() {
        let scopes = request().scope_list();
        assert_eq!(scopes.len(), 4);
        assert!(scopes.contains(&"launch/patient".to_string()));
    }

    #[test]
    fn test_unregistered_redirect_uri_never_redirects() {
        let mut req = request();
        req.redirect_uri = "https://evil.example.com/cb".into();
        let err = req.validate(&client()).unwrap_err();
        assert!(matches!(err, AuthorizeError::Unredirectable(_)));
        assert!(err.to_redirect_url().is_none());
    }

    #[test]
    fn test_wrong_response_type_redirects_with_error() {
        let mut req = request();
        req.response_type = "token".into();
        let err = req.validate(&client()).unwrap_err();
        let url = err.to_redirect_url().unwrap();
        assert!(url.contains("error=unsupported_response_type"));
        assert!(url.contains("state=abc123"));
    }

    #[test]
    fn test_missing_pkce_rejected() {
        let mut req = request();
        req.code_challenge = None;
        let err = req.validate(&client()).unwrap_err();
        assert!(err.to_redirect_url().unwrap().contains("error=invalid_request"));
    }

    #[test]
    fn test_plain_pkce_rejected() {
        let mut req = request();
        req.code_challenge_method = Some("plain".into());
        let err = req.validate(&client()).unwrap_err();
        assert!(err.to_redirect_url().unwrap().contains("error=invalid_request"));
    }

    #[test]
    fn test_denied_redirect_preserves_state() {
        let url = denied_redirect_url("https://app.example.com/cb", "xyz").unwrap();
        assert!(url.contains("error=access_denied"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_code_redirect() {
        let url = code_redirect_url("https://app.example.com/cb", "code-1", "xyz").unwrap();
        assert!(url.contains("code=code-1"));
        assert!(url.contains("state=xyz"));
    }
}

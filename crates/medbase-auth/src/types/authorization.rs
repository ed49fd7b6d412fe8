//! Authorization record: the state of one OAuth exchange.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::client::GrantType;

/// Attribute key carrying the picker-selected patient id.
pub const ATTR_PATIENT_ID: &str = "patient_id";
/// Attribute key carrying the EHR launch parameter.
pub const ATTR_LAUNCH: &str = "launch";
/// Attribute key carrying the requested audience.
pub const ATTR_AUD: &str = "aud";
/// Attribute key carrying the PKCE challenge.
pub const ATTR_CODE_CHALLENGE: &str = "code_challenge";
/// Attribute key carrying the PKCE challenge method.
pub const ATTR_CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
/// Attribute key carrying the redirect URI bound to the code.
pub const ATTR_REDIRECT_URI: &str = "redirect_uri";
/// Attribute key carrying the authenticated username.
pub const ATTR_USERNAME: &str = "username";
/// Attribute key carrying the OIDC nonce.
pub const ATTR_NONCE: &str = "nonce";
/// Attribute key linking the record to the browser session that created it.
pub const ATTR_SESSION_ID: &str = "session_id";

/// Per-exchange authorization state. Created at consent, mutated once at
/// code redemption, retired when its tokens expire or are revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: String,
    pub client_id: String,
    pub grant_type: GrantType,
    pub scopes: Vec<String>,
    /// The client's CSRF state, echoed on the redirect.
    pub state: String,
    /// Free-form attributes (patient_id, launch, aud, PKCE material).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub created_at: i64,
}

impl AuthorizationRecord {
    pub fn new(client_id: impl Into<String>, grant_type: GrantType, state: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            grant_type,
            scopes: Vec::new(),
            state: state.into(),
            attributes: HashMap::new(),
            authorization_code: None,
            code_expires_at: None,
            access_token: None,
            refresh_token: None,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The patient context, with any `Patient/` prefix stripped.
    pub fn patient_id(&self) -> Option<&str> {
        self.attribute(ATTR_PATIENT_ID)
            .map(|id| id.strip_prefix("Patient/").unwrap_or(id))
    }

    /// Whether the authorization code is still live.
    pub fn code_is_valid(&self, now: i64) -> bool {
        match (self.authorization_code.as_ref(), self.code_expires_at) {
            (Some(_), Some(expires)) => now < expires,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_construction() {
        let record = AuthorizationRecord::new("my-app", GrantType::AuthorizationCode, "state123")
            .with_scopes(vec!["openid".into(), "launch/patient".into()])
            .with_attribute(ATTR_AUD, "https://fhir.example.com");

        assert_eq!(record.client_id, "my-app");
        assert_eq!(record.state, "state123");
        assert_eq!(record.attribute(ATTR_AUD), Some("https://fhir.example.com"));
        assert!(record.authorization_code.is_none());
    }

    #[test]
    fn test_patient_id_strips_prefix() {
        let with_prefix = AuthorizationRecord::new("c", GrantType::AuthorizationCode, "s")
            .with_attribute(ATTR_PATIENT_ID, "Patient/example");
        assert_eq!(with_prefix.patient_id(), Some("example"));

        let bare = AuthorizationRecord::new("c", GrantType::AuthorizationCode, "s")
            .with_attribute(ATTR_PATIENT_ID, "example");
        assert_eq!(bare.patient_id(), Some("example"));

        let none = AuthorizationRecord::new("c", GrantType::AuthorizationCode, "s");
        assert_eq!(none.patient_id(), None);
    }

    #[test]
    fn test_code_validity_window() {
        let mut record = AuthorizationRecord::new("c", GrantType::AuthorizationCode, "s");
        assert!(!record.code_is_valid(1000));

        record.authorization_code = Some("code".into());
        record.code_expires_at = Some(2000);
        assert!(record.code_is_valid(1999));
        assert!(!record.code_is_valid(2000));
    }
}

//! Consent state tracking.
//!
//! Rendering the consent page issues an opaque consent-state token; its
//! presence in a later POST is what marks that POST as a consent response
//! rather than a fresh authorization request. Tokens are single-use and
//! expire with the flow.

use std::collections::HashMap;

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// How long a rendered consent page stays actionable.
const CONSENT_TTL_SECONDS: i64 = 600;

/// The authorization request a consent page was rendered for.
#[derive(Debug, Clone)]
pub struct PendingConsent {
    pub consent_state: String,
    pub session_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// The client's original CSRF state.
    pub state: String,
    pub redirect_uri: String,
    /// Request context that must survive to code issuance: PKCE material,
    /// aud, launch, nonce, username.
    pub attributes: HashMap<String, String>,
    pub created_at: i64,
}

/// Issues and redeems consent-state tokens.
#[derive(Default)]
pub struct ConsentStateService {
    pending: DashMap<String, PendingConsent>,
}

impl ConsentStateService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a consent state for a rendered consent page.
    pub fn issue(
        &self,
        session_id: impl Into<String>,
        client_id: impl Into<String>,
        scopes: Vec<String>,
        state: impl Into<String>,
        redirect_uri: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> PendingConsent {
        let pending = PendingConsent {
            consent_state: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            client_id: client_id.into(),
            scopes,
            state: state.into(),
            redirect_uri: redirect_uri.into(),
            attributes,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        self.pending
            .insert(pending.consent_state.clone(), pending.clone());
        pending
    }

    /// Redeem a consent state. Single use; `None` for unknown or expired
    /// tokens.
    pub fn take(&self, consent_state: &str) -> Option<PendingConsent> {
        let (_, pending) = self.pending.remove(consent_state)?;
        let age = OffsetDateTime::now_utc().unix_timestamp() - pending.created_at;
        if age > CONSENT_TTL_SECONDS {
            return None;
        }
        Some(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_take() {
        let service = ConsentStateService::new();
        let pending = service.issue(
            "sess-1",
            "my-app",
            vec!["openid".into()],
            "state-1",
            "https://app.example.com/cb",
            HashMap::from([("code_challenge".to_string(), "abc".to_string())]),
        );

        let taken = service.take(&pending.consent_state).unwrap();
        assert_eq!(taken.client_id, "my-app");
        assert_eq!(taken.session_id, "sess-1");
        assert_eq!(taken.state, "state-1");
    }

    #[test]
    fn test_consent_state_is_single_use() {
        let service = ConsentStateService::new();
        let pending = service.issue("s", "c", vec![], "st", "https://x/cb", HashMap::new());

        assert!(service.take(&pending.consent_state).is_some());
        assert!(
            service.take(&pending.consent_state).is_none(),
            "a second redemption must fail"
        );
    }

    #[test]
    fn test_unknown_state_is_none() {
        let service = ConsentStateService::new();
        assert!(service.take("nope").is_none());
    }
}

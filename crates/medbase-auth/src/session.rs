//! Browser sessions for the interactive authorization flow.
//!
//! Sessions carry the authenticated user, the picker-selected patient, and
//! the original authorization request saved before login. The saved request
//! is read with peek semantics: it stays in the session until the flow
//! completes, because login, picker, and consent all need it.

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::user::UserRole;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "MEDBASE_SESSION";

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: String,
    pub username: Option<String>,
    pub role: Option<UserRole>,
    pub fhir_user: Option<String>,
    /// Patient chosen in the picker.
    pub selected_patient_id: Option<String>,
    /// Query string of the original `/oauth2/authorize` request.
    pub saved_request: Option<String>,
    pub created_at: i64,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn is_practitioner(&self) -> bool {
        self.role == Some(UserRole::Practitioner)
    }
}

/// Process-wide session store.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            ..Session::default()
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Load an existing session or create a fresh one.
    pub fn get_or_create(&self, id: Option<&str>) -> Session {
        match id.and_then(|id| self.get(id)) {
            Some(session) => session,
            None => self.create(),
        }
    }

    /// Mutate a session in place.
    pub fn update<F>(&self, id: &str, f: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut entry = self.sessions.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.clone())
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }
}

/// Read the session id out of a `Cookie` header value.
pub fn session_id_from_cookie_header(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Build the `Set-Cookie` header value for a session.
pub fn session_cookie(session: &Session) -> String {
    format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
        session.id
    )
}

/// Shared handle used across handlers.
pub type SharedSessions = Arc<SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::new();
        let session = store.create();
        assert!(!session.is_authenticated());

        let loaded = store.get(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[test]
    fn test_update_persists() {
        let store = SessionStore::new();
        let session = store.create();
        store.update(&session.id, |s| {
            s.username = Some("dr-jones".into());
            s.role = Some(UserRole::Practitioner);
        });

        let loaded = store.get(&session.id).unwrap();
        assert!(loaded.is_authenticated());
        assert!(loaded.is_practitioner());
    }

    #[test]
    fn test_saved_request_survives_reads() {
        let store = SessionStore::new();
        let session = store.create();
        store.update(&session.id, |s| {
            s.saved_request = Some("client_id=app&state=xyz".into());
        });

        // Reading does not strip the saved request
        for _ in 0..3 {
            let loaded = store.get(&session.id).unwrap();
            assert!(loaded.saved_request.is_some());
        }
    }

    #[test]
    fn test_get_or_create() {
        let store = SessionStore::new();
        let session = store.create();
        let same = store.get_or_create(Some(&session.id));
        assert_eq!(same.id, session.id);

        let fresh = store.get_or_create(Some("nope"));
        assert_ne!(fresh.id, session.id);

        let anonymous = store.get_or_create(None);
        assert!(!anonymous.id.is_empty());
    }

    #[test]
    fn test_cookie_parsing() {
        let header = format!("other=1; {SESSION_COOKIE}=abc-123; theme=dark");
        assert_eq!(
            session_id_from_cookie_header(&header),
            Some("abc-123".to_string())
        );
        assert_eq!(session_id_from_cookie_header("other=1"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let session = Session {
            id: "abc".into(),
            ..Session::default()
        };
        let cookie = session_cookie(&session);
        assert!(cookie.starts_with("MEDBASE_SESSION=abc"));
        assert!(cookie.contains("HttpOnly"));
    }
}

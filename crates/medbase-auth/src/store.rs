//! Authorization record store and the patient-context decorator.
//!
//! The record must be discoverable by its internal id, its authorization
//! code, and any live token. The decorator intercepts `save`: when the
//! record links to a session that carries a selected patient, the patient
//! id is written into the record's attributes, so it survives the code
//! exchange (which arrives from a different client with no session cookie).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::AuthResult;
use crate::session::SharedSessions;
use crate::types::authorization::{AuthorizationRecord, ATTR_PATIENT_ID, ATTR_SESSION_ID};

/// Which token kind to look a record up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn save(&self, record: AuthorizationRecord) -> AuthResult<()>;
    async fn remove(&self, id: &str) -> AuthResult<()>;
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthorizationRecord>>;
    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> AuthResult<Option<AuthorizationRecord>>;
}

/// In-memory record store with secondary token indexes.
#[derive(Default)]
pub struct InMemoryAuthorizationStore {
    by_id: DashMap<String, AuthorizationRecord>,
    code_index: DashMap<String, String>,
    access_index: DashMap<String, String>,
    refresh_index: DashMap<String, String>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&self, record: &AuthorizationRecord) {
        if let Some(code) = &record.authorization_code {
            self.code_index.remove(code);
        }
        if let Some(token) = &record.access_token {
            self.access_index.remove(token);
        }
        if let Some(token) = &record.refresh_token {
            self.refresh_index.remove(token);
        }
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryAuthorizationStore {
    async fn save(&self, record: AuthorizationRecord) -> AuthResult<()> {
        if let Some(previous) = self.by_id.get(&record.id).map(|r| r.clone()) {
            self.unindex(&previous);
        }
        if let Some(code) = &record.authorization_code {
            self.code_index.insert(code.clone(), record.id.clone());
        }
        if let Some(token) = &record.access_token {
            self.access_index.insert(token.clone(), record.id.clone());
        }
        if let Some(token) = &record.refresh_token {
            self.refresh_index.insert(token.clone(), record.id.clone());
        }
        debug!(id = %record.id, "authorization saved");
        self.by_id.insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> AuthResult<()> {
        if let Some((_, record)) = self.by_id.remove(id) {
            self.unindex(&record);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthorizationRecord>> {
        Ok(self.by_id.get(id).map(|r| r.clone()))
    }

    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> AuthResult<Option<AuthorizationRecord>> {
        let index = match kind {
            TokenKind::AuthorizationCode => &self.code_index,
            TokenKind::AccessToken => &self.access_index,
            TokenKind::RefreshToken => &self.refresh_index,
        };
        let id = match index.get(token) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        self.find_by_id(&id).await
    }
}

/// Decorator injecting the session's selected patient into saved records.
///
/// Decorates the store, not the request converter: the injection happens
/// exactly once, at save time, and the token endpoint later reads the
/// attribute rather than any session state.
pub struct PatientContextStore {
    inner: Arc<dyn AuthorizationStore>,
    sessions: SharedSessions,
}

impl PatientContextStore {
    pub fn new(inner: Arc<dyn AuthorizationStore>, sessions: SharedSessions) -> Self {
        Self { inner, sessions }
    }
}

#[async_trait]
impl AuthorizationStore for PatientContextStore {
    async fn save(&self, mut record: AuthorizationRecord) -> AuthResult<()> {
        if !record.attributes.contains_key(ATTR_PATIENT_ID) {
            if let Some(session_id) = record.attribute(ATTR_SESSION_ID) {
                if let Some(patient_id) = self
                    .sessions
                    .get(session_id)
                    .and_then(|s| s.selected_patient_id)
                {
                    info!(
                        id = %record.id,
                        patient_id,
                        "injecting patient context into authorization"
                    );
                    record
                        .attributes
                        .insert(ATTR_PATIENT_ID.to_string(), patient_id);
                }
            }
        }
        self.inner.save(record).await
    }

    async fn remove(&self, id: &str) -> AuthResult<()> {
        self.inner.remove(id).await
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthorizationRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> AuthResult<Option<AuthorizationRecord>> {
        self.inner.find_by_token(token, kind).await
    }
}

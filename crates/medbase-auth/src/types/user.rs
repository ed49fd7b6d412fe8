//! User records and the user store.
//!
//! Users live in the `Admin.users` collection keyed by username. The
//! `fhir_user` back-reference is what lets an issued token carry a FHIR
//! identity claim.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthResult;
use medbase_storage::{DocumentStore, Keyspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Developer,
    Practitioner,
    Patient,
    SmartUser,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Developer => "developer",
            Self::Practitioner => "practitioner",
            Self::Patient => "patient",
            Self::SmartUser => "smart_user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub role: UserRole,
    /// FHIR principal, e.g. `Practitioner/p1` or `Patient/example`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
}

fn default_status() -> String {
    "active".into()
}
fn default_auth_method() -> String {
    "local".into()
}

impl User {
    pub fn new(username: impl Into<String>, password: &str, role: UserRole) -> Self {
        Self {
            username: username.into(),
            password_hash: bcrypt::hash(password, bcrypt::DEFAULT_COST).ok(),
            role,
            fhir_user: None,
            status: default_status(),
            auth_method: default_auth_method(),
        }
    }

    pub fn with_fhir_user(mut self, reference: impl Into<String>) -> Self {
        self.fhir_user = Some(reference.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn verify_password(&self, password: &str) -> bool {
        match &self.password_hash {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => false,
        }
    }
}

/// Lookup of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, username: &str) -> AuthResult<Option<User>>;
}

/// User store backed by the `Admin.users` collection.
pub struct StoreUserStore {
    store: Arc<dyn DocumentStore>,
}

impl StoreUserStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Seed a user document; used at bootstrap.
    pub async fn save(&self, user: &User) -> AuthResult<()> {
        let value = serde_json::to_value(user)
            .map_err(|e| crate::error::AuthError::server_error(e.to_string()))?;
        self.store
            .upsert(&Keyspace::admin_users(), &user.username, value)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for StoreUserStore {
    async fn find(&self, username: &str) -> AuthResult<Option<User>> {
        let doc = self.store.get(&Keyspace::admin_users(), username).await?;
        match doc {
            Some(doc) => {
                let user: User = serde_json::from_value(doc.content)
                    .map_err(|e| crate::error::AuthError::server_error(e.to_string()))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

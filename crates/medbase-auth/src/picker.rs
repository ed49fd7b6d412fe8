//! Patient picker lookups.
//!
//! Serves the provider standalone launch: a practitioner browses or
//! searches patients and selects the launch context. Reads go straight to
//! the Patient collection.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::AuthResult;
use medbase_storage::{DocumentStore, Keyspace};

const DEFAULT_PAGE_SIZE: usize = 10;

/// Minimal patient projection for the picker page.
#[derive(Debug, Clone)]
pub struct PatientSummary {
    pub id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub deceased: bool,
}

impl PatientSummary {
    fn from_resource(resource: &Value) -> Option<Self> {
        let id = resource.get("id")?.as_str()?.to_string();
        Some(Self {
            id,
            given_name: resource
                .pointer("/name/0/given/0")
                .and_then(Value::as_str)
                .map(str::to_string),
            family_name: resource
                .pointer("/name/0/family")
                .and_then(Value::as_str)
                .map(str::to_string),
            birth_date: resource
                .get("birthDate")
                .and_then(Value::as_str)
                .map(str::to_string),
            gender: resource
                .get("gender")
                .and_then(Value::as_str)
                .map(str::to_string),
            deceased: resource.get("deceasedDateTime").is_some()
                || resource.get("deceasedBoolean").and_then(Value::as_bool) == Some(true),
        })
    }

    pub fn full_name(&self) -> String {
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => format!("{given} {family}"),
            (Some(given), None) => given.clone(),
            (None, Some(family)) => family.clone(),
            (None, None) => self.id.clone(),
        }
    }
}

pub struct PatientPickerService {
    store: Arc<dyn DocumentStore>,
}

impl PatientPickerService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// List patients; a search term is treated as an id lookup.
    pub async fn search(
        &self,
        search_term: Option<&str>,
        page_size: usize,
    ) -> AuthResult<Vec<PatientSummary>> {
        let keyspace = Keyspace::resources("Patient");
        let limit = if page_size > 0 { page_size } else { DEFAULT_PAGE_SIZE };

        match search_term.map(str::trim).filter(|t| !t.is_empty()) {
            Some(term) => {
                let key = if term.starts_with("Patient/") {
                    term.to_string()
                } else {
                    format!("Patient/{term}")
                };
                debug!(key, "patient picker lookup by id");
                let doc = self.store.get(&keyspace, &key).await?;
                Ok(doc
                    .and_then(|d| PatientSummary::from_resource(&d.content))
                    .into_iter()
                    .collect())
            }
            None => {
                let docs = self.store.list(&keyspace, limit).await?;
                Ok(docs
                    .iter()
                    .filter_map(|d| PatientSummary::from_resource(&d.content))
                    .collect())
            }
        }
    }

    /// Validate a selection before it enters the session.
    pub async fn get_by_id(&self, patient_id: &str) -> AuthResult<Option<PatientSummary>> {
        let mut results = self.search(Some(patient_id), 1).await?;
        Ok(results.pop())
    }
}

//! Bundle transaction and batch processing.
//!
//! Three passes over the entries:
//! 1. assign a stable id to each entry — a `urn:uuid:<x>` fullUrl whose
//!    `<x>` is a valid FHIR id yields `<x>`, anything else a generated id —
//!    and build the `urn:uuid:… -> <Type>/<id>` mapping
//! 2. rewrite every matching `Reference.reference` anywhere in every entry,
//!    including the `"<Type>/urn:uuid:…"` form
//! 3. validate, stamp, and write each entry through the upsert algorithm
//!
//! Transaction mode shares one store transaction and fails as a whole;
//! batch mode runs each entry standalone and reports per-entry outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditInfo, Operation};
use crate::error::{WriteError, WriteResult};
use crate::put::PutService;
use medbase_core::bundle::{self, BundleType};
use medbase_core::id::is_valid_id;
use medbase_core::reference::for_each_reference;
use medbase_storage::DocumentStore;

const URN_UUID_PREFIX: &str = "urn:uuid:";

pub struct BundleProcessor {
    store: Arc<dyn DocumentStore>,
    put: Arc<PutService>,
}

impl BundleProcessor {
    pub fn new(store: Arc<dyn DocumentStore>, put: Arc<PutService>) -> Self {
        Self { store, put }
    }

    /// Process a transaction or batch Bundle, returning the response Bundle.
    ///
    /// # Errors
    /// Structural problems and, in transaction mode, any entry failure fail
    /// the whole call.
    pub async fn process(&self, bundle: Value, audit: &AuditInfo) -> WriteResult<Value> {
        let bundle_type = validate_structure(&bundle)?;
        let mut resources = extract_resources(&bundle)?;
        info!(
            bundle_type = bundle_type.as_str(),
            entries = resources.len(),
            "processing bundle"
        );

        let mapping = assign_ids(&mut resources);
        rewrite_references(&mut resources, &mapping);

        let entries = match bundle_type {
            BundleType::Batch => self.apply_batch(resources, audit).await,
            _ => self.apply_transaction(resources, audit).await?,
        };

        Ok(bundle::response_bundle(bundle_type.response_type(), entries))
    }

    /// All-or-nothing: one shared transaction; the first failure rolls
    /// everything back.
    async fn apply_transaction(
        &self,
        resources: Vec<Value>,
        audit: &AuditInfo,
    ) -> WriteResult<Vec<Value>> {
        let mut tx = self.store.begin().await?;
        let mut entries = Vec::with_capacity(resources.len());

        for resource in resources {
            match self.put.upsert_in_tx(tx.as_mut(), resource, audit).await {
                Ok(written) => {
                    let location = location_of(&written);
                    entries.push(bundle::created_entry(written, &location));
                }
                Err(err) => {
                    warn!(error = %err, "transaction entry failed, rolling back");
                    let _ = tx.rollback().await;
                    return Err(err);
                }
            }
        }

        tx.commit().await?;
        Ok(entries)
    }

    /// Batch mode: entries commit independently; a failed entry becomes a
    /// 4xx response entry while the rest proceed.
    async fn apply_batch(&self, resources: Vec<Value>, audit: &AuditInfo) -> Vec<Value> {
        let mut entries = Vec::with_capacity(resources.len());
        for resource in resources {
            match self.put.upsert(resource, audit).await {
                Ok(written) => {
                    let location = location_of(&written);
                    entries.push(bundle::created_entry(written, &location));
                }
                Err(err) => {
                    warn!(error = %err, "batch entry failed, continuing");
                    let status = if err.is_version_conflict() {
                        "409 Conflict"
                    } else {
                        "400 Bad Request"
                    };
                    entries.push(bundle::failed_entry(
                        status,
                        err.to_operation_outcome().to_value(),
                    ));
                }
            }
        }
        entries
    }
}

fn validate_structure(bundle: &Value) -> WriteResult<BundleType> {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(WriteError::bundle_invalid("resourceType must be Bundle"));
    }
    let type_code = bundle
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| WriteError::bundle_invalid("Bundle.type is required"))?;
    match BundleType::parse(type_code) {
        Some(t @ (BundleType::Transaction | BundleType::Batch)) => Ok(t),
        _ => Err(WriteError::bundle_invalid(format!(
            "unsupported Bundle.type: {type_code}"
        ))),
    }
}

/// Pull `(fullUrl, resource)` pairs out of the Bundle; the fullUrl (when
/// present) is carried in a private field consumed by id assignment.
fn extract_resources(bundle: &Value) -> WriteResult<Vec<Value>> {
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .ok_or_else(|| WriteError::bundle_invalid("Bundle.entry is required"))?;

    let mut resources = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let mut resource = entry
            .get("resource")
            .filter(|r| r.is_object())
            .cloned()
            .ok_or_else(|| {
                WriteError::bundle_invalid(format!("entry {index} has no resource"))
            })?;
        if resource.get("resourceType").and_then(Value::as_str).is_none() {
            return Err(WriteError::bundle_invalid(format!(
                "entry {index} resource has no resourceType"
            )));
        }
        if let Some(full_url) = entry.get("fullUrl").and_then(Value::as_str) {
            resource["__fullUrl"] = Value::String(full_url.to_string());
        }
        resources.push(resource);
    }
    Ok(resources)
}

/// First pass: stable ids plus the `urn:uuid -> Type/id` mapping.
fn assign_ids(resources: &mut [Value]) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for resource in resources.iter_mut() {
        let resource_type = resource["resourceType"].as_str().unwrap_or_default().to_string();
        let full_url = resource
            .as_object_mut()
            .and_then(|map| map.remove("__fullUrl"))
            .and_then(|v| v.as_str().map(str::to_string));

        let id = match full_url {
            Some(url) if url.starts_with(URN_UUID_PREFIX) => {
                let candidate = &url[URN_UUID_PREFIX.len()..];
                let id = if is_valid_id(candidate) {
                    candidate.to_string()
                } else {
                    warn!(full_url = url, "urn:uuid id not usable, generating one");
                    Uuid::new_v4().to_string()
                };
                mapping.insert(url, format!("{resource_type}/{id}"));
                id
            }
            _ => Uuid::new_v4().to_string(),
        };
        resource["id"] = Value::String(id);
    }
    debug!(?mapping, "bundle uuid mapping");
    mapping
}

/// Second pass: rewrite `urn:uuid:` references wherever they appear,
/// including the `"<Type>/urn:uuid:…"` form.
fn rewrite_references(resources: &mut [Value], mapping: &HashMap<String, String>) {
    for resource in resources.iter_mut() {
        for_each_reference(resource, &mut |reference| {
            if let Some(position) = reference.find(URN_UUID_PREFIX) {
                let urn = reference[position..].to_string();
                match mapping.get(&urn) {
                    Some(target) => {
                        debug!(from = %reference, to = %target, "resolved bundle reference");
                        *reference = target.clone();
                    }
                    None => warn!(reference = %reference, "unresolvable urn:uuid reference"),
                }
            }
        });
    }
}

fn location_of(resource: &Value) -> String {
    format!(
        "{}/{}",
        resource["resourceType"].as_str().unwrap_or_default(),
        resource["id"].as_str().unwrap_or_default()
    )
}

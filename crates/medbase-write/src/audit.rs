//! Resource metadata stamping.
//!
//! Every write stamps `meta.versionId`, `meta.lastUpdated`, and audit
//! provenance (who, what operation, when) as a meta extension.

use medbase_core::time::now_instant_string;
use serde_json::{json, Value};

const AUDIT_EXTENSION_URL: &str = "http://medbase.dev/fhir/StructureDefinition/audit";

/// Provenance attached to a write.
#[derive(Debug, Clone)]
pub struct AuditInfo {
    pub user: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl AuditInfo {
    pub fn new(user: impl Into<String>, operation: Operation) -> Self {
        Self {
            user: user.into(),
            operation,
        }
    }

    /// System-originated write (bootstrap, background jobs).
    pub fn system(operation: Operation) -> Self {
        Self::new("system", operation)
    }
}

/// Stamp version, timestamp, and audit provenance into `resource.meta`.
pub fn stamp_meta(resource: &mut Value, version_id: &str, audit: &AuditInfo) {
    let now = now_instant_string();

    if !resource.get("meta").is_some_and(Value::is_object) {
        resource["meta"] = json!({});
    }
    let meta = &mut resource["meta"];
    meta["versionId"] = json!(version_id);
    meta["lastUpdated"] = json!(now);

    let audit_extension = json!({
        "url": AUDIT_EXTENSION_URL,
        "extension": [
            { "url": "user", "valueString": audit.user },
            { "url": "operation", "valueCode": audit.operation.as_str() },
            { "url": "timestamp", "valueInstant": now },
        ]
    });

    match meta.get_mut("extension").and_then(Value::as_array_mut) {
        Some(extensions) => {
            extensions.retain(|ext| ext.get("url").and_then(Value::as_str) != Some(AUDIT_EXTENSION_URL));
            extensions.push(audit_extension);
        }
        None => {
            meta["extension"] = json!([audit_extension]);
        }
    }
}

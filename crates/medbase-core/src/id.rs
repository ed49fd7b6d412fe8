//! FHIR resource identifiers and document keys.
//!
//! Resources are keyed `"<Type>/<id>"` in their collection; historical
//! versions are keyed `"<Type>/<id>/<versionId>"` in the Versions
//! collection.

use crate::error::{CoreError, Result};
use uuid::Uuid;

/// Maximum length of a FHIR resource id per the R4 specification.
pub const MAX_ID_LENGTH: usize = 64;

/// Check whether a string is a valid FHIR resource id:
/// 1-64 characters from `[A-Za-z0-9.-]`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

/// Validate an id, returning it on success.
pub fn validate_id(id: &str) -> Result<&str> {
    if is_valid_id(id) {
        Ok(id)
    } else {
        Err(CoreError::invalid_id(id))
    }
}

/// Generate a new resource id (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Document key for the current version of a resource.
pub fn document_key(resource_type: &str, id: &str) -> String {
    format!("{resource_type}/{id}")
}

/// Document key for a historical version snapshot.
pub fn history_key(resource_type: &str, id: &str, version_id: &str) -> String {
    format!("{resource_type}/{id}/{version_id}")
}

/// Split a `"<Type>/<id>"` document key into its parts.
pub fn split_document_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((resource_type, id)) if !resource_type.is_empty() && !id.is_empty() => {
            Ok((resource_type, id))
        }
        _ => Err(CoreError::invalid_id(key)),
    }
}

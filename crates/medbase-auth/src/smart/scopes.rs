//! SMART scope handling.
//!
//! Scopes travel as a space-separated string in requests and tokens, and as
//! repeated `scope=` fields in the consent form. The descriptions table
//! feeds the consent page.

use std::collections::BTreeSet;

/// An ordered, de-duplicated set of scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: BTreeSet<String>,
}

impl ScopeSet {
    /// Parse a space-separated scope string.
    pub fn parse(raw: &str) -> Self {
        Self {
            scopes: raw.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn from_list(scopes: &[String]) -> Self {
        Self {
            scopes: scopes.iter().cloned().collect(),
        }
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Whether the flow must establish a patient context.
    pub fn requests_patient_launch(&self) -> bool {
        self.contains("launch/patient")
    }

    pub fn includes_openid(&self) -> bool {
        self.contains("openid")
    }

    pub fn includes_offline_access(&self) -> bool {
        self.contains("offline_access")
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.scopes.iter().cloned().collect()
    }

    /// Space-separated form for tokens and responses.
    pub fn to_scope_string(&self) -> String {
        self.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

/// Human-readable description of a scope for the consent page.
pub fn describe(scope: &str) -> String {
    match scope {
        "openid" => "Verify your identity".to_string(),
        "profile" => "Access your profile information".to_string(),
        "fhirUser" => "Know which user you are".to_string(),
        "launch" => "Receive the launch context".to_string(),
        "launch/patient" => "Know which patient record to access".to_string(),
        "offline_access" => "Access your data when you're not using the app".to_string(),
        "online_access" => "Access your data only when you're using the app".to_string(),
        "patient/*.rs" => "Read and search all your health data".to_string(),
        "patient/*.cud" => "Create, update, and delete your health data".to_string(),
        "patient/*.cruds" => "Full access to your health data".to_string(),
        "patient/*.read" => "Read all your health data".to_string(),
        "patient/*.write" => "Create and update your health data".to_string(),
        "patient/*.*" => "Full access to your health data".to_string(),
        "user/*.read" => "Read health data on your behalf".to_string(),
        "user/*.write" => "Create and update health data on your behalf".to_string(),
        "user/*.*" => "Full access to health data on your behalf".to_string(),
        other => describe_resource_scope(other)
            .unwrap_or_else(|| format!("Access: {other}")),
    }
}

fn describe_resource_scope(scope: &str) -> Option<String> {
    let rest = scope.strip_prefix("patient/")?;
    let (resource, access) = rest.split_once('.')?;
    let noun = friendly_resource_name(resource);
    match access {
        "read" | "rs" => Some(format!("Read your {noun} data")),
        "write" | "cud" => Some(format!("Create and update your {noun} data")),
        _ => None,
    }
}

fn friendly_resource_name(resource: &str) -> String {
    match resource {
        "AllergyIntolerance" => "allergies".to_string(),
        "MedicationRequest" => "medications".to_string(),
        "DiagnosticReport" => "lab results".to_string(),
        "DocumentReference" => "documents".to_string(),
        "Immunization" => "immunizations".to_string(),
        "Observation" => "observations".to_string(),
        "Condition" => "conditions".to_string(),
        "Procedure" => "procedures".to_string(),
        "Encounter" => "encounters".to_string(),
        "Patient" => "patient information".to_string(),
        other => other.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_roundtrip() {
        let scopes = ScopeSet::parse("launch/patient openid  fhirUser");
        assert!(scopes.requests_patient_launch());
        assert!(scopes.includes_openid());
        assert!(!scopes.includes_offline_access());
        assert_eq!(scopes.to_vec().len(), 3);
    }

    #[test]
    fn test_duplicates_collapse() {
        let scopes = ScopeSet::parse("openid openid fhirUser");
        assert_eq!(scopes.to_vec().len(), 2);
    }

    #[test]
    fn test_scope_string_is_space_separated() {
        let scopes = ScopeSet::parse("b a");
        let s = scopes.to_scope_string();
        assert!(s.contains(' '));
        assert!(!s.contains(','));
    }

    #[test]
    fn test_known_descriptions() {
        assert_eq!(describe("openid"), "Verify your identity");
        assert_eq!(
            describe("launch/patient"),
            "Know which patient record to access"
        );
    }

    #[test]
    fn test_resource_scope_descriptions() {
        assert_eq!(
            describe("patient/Observation.rs"),
            "Read your observations data"
        );
        assert_eq!(
            describe("patient/MedicationRequest.read"),
            "Read your medications data"
        );
    }

    #[test]
    fn test_unknown_scope_fallback() {
        assert_eq!(describe("system/*.*"), "Access: system/*.*");
    }
}

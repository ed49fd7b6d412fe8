//! FHIR `OperationOutcome` construction.
//!
//! Every FHIR API error surfaces as an `OperationOutcome` body; this module
//! provides the small typed subset medbase needs to build them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Issue severity codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// The subset of FHIR issue type codes medbase emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Structure,
    NotFound,
    Deleted,
    Conflict,
    Processing,
    NotSupported,
    Security,
    Login,
    Forbidden,
    Exception,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Structure => "structure",
            Self::NotFound => "not-found",
            Self::Deleted => "deleted",
            Self::Conflict => "conflict",
            Self::Processing => "processing",
            Self::NotSupported => "not-supported",
            Self::Security => "security",
            Self::Login => "login",
            Self::Forbidden => "forbidden",
            Self::Exception => "exception",
        }
    }
}

/// A FHIR `OperationOutcome` under construction.
#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    issues: Vec<Value>,
}

impl OperationOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single-issue error outcome.
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new().with_issue(IssueSeverity::Error, code, diagnostics)
    }

    /// Add an issue with the given severity, code, and diagnostics.
    pub fn with_issue(
        mut self,
        severity: IssueSeverity,
        code: IssueType,
        diagnostics: impl Into<String>,
    ) -> Self {
        let severity = match severity {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        };
        self.issues.push(json!({
            "severity": severity,
            "code": code.as_str(),
            "diagnostics": diagnostics.into(),
        }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Render as a FHIR resource.
    pub fn to_value(&self) -> Value {
        json!({
            "resourceType": "OperationOutcome",
            "issue": self.issues,
        })
    }
}

use medbase_core::outcome::{IssueType, OperationOutcome};
use medbase_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the search pipeline.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Unknown search parameter: {name} for resource type {resource_type}")]
    UnknownParameter { name: String, resource_type: String },

    #[error("Invalid value for parameter {param}: {value} (expected {expected})")]
    InvalidParameterValue {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Unsupported parameter combination for {param}: {message}")]
    UnsupportedCombination { param: String, message: String },

    #[error("Invalid _has parameter: {0}")]
    InvalidHas(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SearchError {
    pub fn unknown_parameter(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::UnknownParameter {
            name: name.into(),
            resource_type: resource_type.into(),
        }
    }

    pub fn invalid_value(
        param: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidParameterValue {
            param: param.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn unsupported_combination(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn invalid_has(message: impl Into<String>) -> Self {
        Self::InvalidHas(message.into())
    }

    /// True when the error is the client's fault and maps to a 400.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Render as the `OperationOutcome` returned to the caller.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let code = match self {
            Self::UnknownParameter { .. } => IssueType::NotSupported,
            Self::InvalidParameterValue { .. } | Self::InvalidHas(_) => IssueType::Invalid,
            Self::UnsupportedCombination { .. } => IssueType::NotSupported,
            Self::Storage(_) => IssueType::Exception,
        };
        OperationOutcome::error(code, self.to_string())
    }
}

/// Convenience result type for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_parameter_outcome() {
        let err = SearchError::unknown_parameter("foo", "Patient");
        let outcome = err.to_operation_outcome().to_value();
        assert_eq!(outcome["issue"][0]["code"], "not-supported");
        assert!(outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("foo"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(SearchError::unknown_parameter("x", "Patient").is_client_error());
        assert!(SearchError::invalid_value("birthdate", "nope", "date").is_client_error());
        assert!(!SearchError::Storage(StorageError::backend("down")).is_client_error());
    }

    #[test]
    fn test_invalid_value_message() {
        let err = SearchError::invalid_value("birthdate", "20-02", "YYYY-MM-DD");
        assert!(err.to_string().contains("birthdate"));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }
}

use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {key}")]
    NotFound { key: String },

    #[error("Document already exists: {key}")]
    AlreadyExists { key: String },

    #[error("Write conflict on {key}: document changed concurrently")]
    WriteConflict { key: String },

    #[error("Collection not found: {scope}.{collection}")]
    CollectionNotFound { scope: String, collection: String },

    #[error("Search index not found: {name}")]
    IndexNotFound { name: String },

    #[error("Transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    #[error("Store operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    pub fn write_conflict(key: impl Into<String>) -> Self {
        Self::WriteConflict { key: key.into() }
    }

    pub fn collection_not_found(scope: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound { name: name.into() }
    }

    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// True for errors a caller may safely retry (conflicts and timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WriteConflict { .. } | Self::TransactionAborted { .. } | Self::Timeout { .. }
        )
    }

    /// True when the error indicates missing data rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StorageError::not_found("Patient/1").to_string(),
            "Document not found: Patient/1"
        );
        assert_eq!(
            StorageError::collection_not_found("Admin", "config").to_string(),
            "Collection not found: Admin.config"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::write_conflict("Patient/1").is_retryable());
        assert!(StorageError::transaction_aborted("raced").is_retryable());
        assert!(StorageError::Timeout { seconds: 30 }.is_retryable());
        assert!(!StorageError::not_found("Patient/1").is_retryable());
        assert!(!StorageError::backend("boom").is_retryable());
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(StorageError::not_found("x").is_not_found());
        assert!(!StorageError::already_exists("x").is_not_found());
    }
}

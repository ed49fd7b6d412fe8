use medbase_core::outcome::{IssueType, OperationOutcome};
use medbase_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the write pipeline.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("PUT operation requires a client-supplied ID")]
    MissingId,

    #[error("Invalid resource ID: {0}")]
    InvalidId(String),

    #[error("Resource ID {id} was previously deleted and cannot be reused. Please choose a new ID.")]
    TombstonedId { resource_type: String, id: String },

    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Resource validation failed: {message}")]
    Validation { message: String },

    #[error("Bundle processing failed: {message}")]
    BundleInvalid { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WriteError {
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    pub fn tombstoned(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::TombstonedId {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn bundle_invalid(message: impl Into<String>) -> Self {
        Self::BundleInvalid {
            message: message.into(),
        }
    }

    /// True when the error maps to a version conflict (409): a tombstoned id
    /// or a concurrent write losing the history-snapshot race.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::TombstonedId { .. })
            || matches!(
                self,
                Self::Storage(StorageError::TransactionAborted { .. })
                    | Self::Storage(StorageError::WriteConflict { .. })
            )
    }

    /// Render as the `OperationOutcome` returned to the caller.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let code = match self {
            Self::MissingId | Self::InvalidId(_) => IssueType::Invalid,
            Self::TombstonedId { .. } => IssueType::Conflict,
            Self::NotFound { .. } => IssueType::NotFound,
            Self::Validation { .. } => IssueType::Invalid,
            Self::BundleInvalid { .. } => IssueType::Processing,
            Self::Storage(err) if err.is_retryable() => IssueType::Conflict,
            Self::Storage(_) => IssueType::Exception,
        };
        OperationOutcome::error(code, self.to_string())
    }
}

/// Convenience result type for write operations.
pub type WriteResult<T> = std::result::Result<T, WriteError>;

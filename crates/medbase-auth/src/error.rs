use medbase_storage::StorageError;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced by the authorization server.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Client is not authorized for this grant type")]
    UnauthorizedClient,

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Access denied")]
    AccessDenied,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Key error: {0}")]
    Key(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant(message.into())
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope(message.into())
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::Key(message.into())
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError(message.into())
    }

    /// The RFC 6749 error code.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::Unauthenticated => "invalid_request",
            Self::Key(_) | Self::ServerError(_) | Self::Storage(_) => "server_error",
        }
    }

    /// HTTP status for a JSON error response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::Unauthenticated => 401,
            Self::AccessDenied => 403,
            Self::Key(_) | Self::ServerError(_) | Self::Storage(_) => 500,
            _ => 400,
        }
    }

    /// RFC 6749 error body.
    pub fn to_error_body(&self) -> Value {
        json!({
            "error": self.oauth_error_code(),
            "error_description": self.to_string(),
        })
    }
}

/// Convenience result type for auth operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(
            AuthError::invalid_request("x").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(AuthError::InvalidClient.oauth_error_code(), "invalid_client");
        assert_eq!(
            AuthError::invalid_grant("bad code").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(AuthError::AccessDenied.oauth_error_code(), "access_denied");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidClient.status_code(), 401);
        assert_eq!(AuthError::invalid_grant("x").status_code(), 400);
        assert_eq!(AuthError::server_error("x").status_code(), 500);
    }

    #[test]
    fn test_error_body_shape() {
        let body = AuthError::invalid_grant("code expired").to_error_body();
        assert_eq!(body["error"], "invalid_grant");
        assert!(body["error_description"]
            .as_str()
            .unwrap()
            .contains("code expired"));
    }
}

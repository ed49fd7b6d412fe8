//! Registered OAuth client model.

use serde::{Deserialize, Serialize};

/// OAuth 2.0 grant types the server supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    /// Bcrypt hash; public clients have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access token lifetime in seconds; `None` uses the server default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ttl_seconds: Option<i64>,
    /// PKCE is mandatory for authorization-code clients unless explicitly
    /// relaxed.
    #[serde(default = "default_pkce_required")]
    pub pkce_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

fn default_pkce_required() -> bool {
    true
}

impl RegisteredClient {
    /// A public SMART app using the authorization-code flow with PKCE.
    pub fn smart_app(
        client_id: impl Into<String>,
        redirect_uris: Vec<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            secret_hash: None,
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            redirect_uris,
            scopes,
            token_ttl_seconds: None,
            pkce_required: true,
            client_name: None,
        }
    }

    /// A confidential client using client credentials only.
    pub fn confidential(
        client_id: impl Into<String>,
        secret: &str,
        scopes: Vec<String>,
    ) -> Self {
        let secret_hash = bcrypt::hash(secret, bcrypt::DEFAULT_COST).ok();
        Self {
            client_id: client_id.into(),
            secret_hash,
            grant_types: vec![GrantType::ClientCredentials],
            redirect_uris: Vec::new(),
            scopes,
            token_ttl_seconds: None,
            pkce_required: false,
            client_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn supports_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Exact-match check against the registered redirect URIs.
    pub fn redirect_uri_registered(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Verify a presented secret against the stored hash.
    pub fn verify_secret(&self, secret: &str) -> bool {
        match &self.secret_hash {
            Some(hash) => bcrypt::verify(secret, hash).unwrap_or(false),
            None => false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(&self.client_id)
    }
}

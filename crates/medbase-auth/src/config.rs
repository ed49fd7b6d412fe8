//! Authorization server configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token lifetime in hours. Overridable via
    /// `OAUTH_TOKEN_EXPIRY_HOURS`.
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,

    /// Whether refresh tokens are issued for authorization-code grants.
    #[serde(default = "default_refresh_tokens")]
    pub refresh_tokens: bool,

    /// Built-in admin client id.
    #[serde(default = "default_admin_client_id")]
    pub admin_client_id: String,

    /// Admin client secret. Overridable via `ADMIN_UI_CLIENT_SECRET`;
    /// the fallback is for development only.
    #[serde(default)]
    pub admin_client_secret: String,

    /// Admin client scopes, space or comma separated.
    #[serde(default = "default_admin_scopes")]
    pub admin_scopes: String,
}

fn default_token_ttl_hours() -> u64 {
    1
}
fn default_refresh_tokens() -> bool {
    true
}
fn default_admin_client_id() -> String {
    "admin-ui".into()
}
fn default_admin_scopes() -> String {
    "system/*.* user/*.*".into()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
            refresh_tokens: default_refresh_tokens(),
            admin_client_id: default_admin_client_id(),
            admin_client_secret: String::new(),
            admin_scopes: default_admin_scopes(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.token_ttl_hours == 0 {
            return Err("auth.token_ttl_hours must be > 0".into());
        }
        if self.admin_client_id.is_empty() {
            return Err("auth.admin_client_id must not be empty".into());
        }
        Ok(())
    }

    /// Token lifetime in seconds.
    pub fn token_ttl_seconds(&self) -> i64 {
        (self.token_ttl_hours * 3600) as i64
    }

    /// Admin scopes split on spaces and commas.
    pub fn admin_scope_list(&self) -> Vec<String> {
        self.admin_scopes
            .split([' ', ','])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

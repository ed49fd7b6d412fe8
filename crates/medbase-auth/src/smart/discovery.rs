//! Discovery documents: `.well-known/smart-configuration` and
//! `.well-known/oauth-authorization-server`.

use serde_json::{json, Value};

/// SMART configuration document (public, no auth required).
pub fn smart_configuration(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "introspection_endpoint": format!("{issuer}/oauth2/introspect"),
        "revocation_endpoint": format!("{issuer}/oauth2/revoke"),
        "jwks_uri": format!("{issuer}/oauth2/jwks"),
        "grant_types_supported": ["authorization_code", "client_credentials", "refresh_token"],
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"],
        "scopes_supported": [
            "openid", "profile", "fhirUser", "launch", "launch/patient",
            "offline_access", "online_access",
            "patient/*.rs", "patient/*.cruds", "user/*.cruds", "system/*.*"
        ],
        "capabilities": [
            "launch-standalone", "launch-ehr",
            "client-public", "client-confidential-symmetric",
            "context-standalone-patient", "context-ehr-patient",
            "sso-openid-connect", "permission-patient", "permission-user"
        ],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"]
    })
}

/// RFC 8414 authorization server metadata.
pub fn oauth_server_metadata(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "introspection_endpoint": format!("{issuer}/oauth2/introspect"),
        "revocation_endpoint": format!("{issuer}/oauth2/revoke"),
        "jwks_uri": format!("{issuer}/oauth2/jwks"),
        "userinfo_endpoint": format!("{issuer}/oauth2/userinfo"),
        "grant_types_supported": ["authorization_code", "client_credentials", "refresh_token"],
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_configuration_endpoints() {
        let config = smart_configuration("https://ehr.example.com");
        assert_eq!(
            config["authorization_endpoint"],
            "https://ehr.example.com/oauth2/authorize"
        );
        assert_eq!(
            config["token_endpoint"],
            "https://ehr.example.com/oauth2/token"
        );
        assert_eq!(config["code_challenge_methods_supported"][0], "S256");
    }

    #[test]
    fn test_smart_capabilities_include_standalone_patient() {
        let config = smart_configuration("https://ehr.example.com");
        let capabilities = config["capabilities"].as_array().unwrap();
        assert!(capabilities.iter().any(|c| c == "context-standalone-patient"));
        assert!(capabilities.iter().any(|c| c == "launch-standalone"));
    }

    #[test]
    fn test_server_metadata_issuer() {
        let metadata = oauth_server_metadata("https://ehr.example.com");
        assert_eq!(metadata["issuer"], "https://ehr.example.com");
        assert_eq!(
            metadata["jwks_uri"],
            "https://ehr.example.com/oauth2/jwks"
        );
    }
}

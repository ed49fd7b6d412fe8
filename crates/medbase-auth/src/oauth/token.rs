//! Token endpoint: code exchange, refresh, and client credentials.
//!
//! Access tokens are RS256 JWTs. The `patient` claim comes from the
//! authorization record's attributes (never from any session — the token
//! request arrives from a different client with no cookie); the `fhirUser`
//! claim comes from the user record. A response filter then decodes the
//! freshly minted token and copies both claims to the top level of the
//! token response, matching SMART's expected shape.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::ClientRepository;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::KeyService;
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
use crate::smart::scopes::ScopeSet;
use crate::store::{AuthorizationStore, TokenKind};
use crate::types::authorization::{
    AuthorizationRecord, ATTR_CODE_CHALLENGE, ATTR_NONCE, ATTR_REDIRECT_URI, ATTR_USERNAME,
};
use crate::types::client::{GrantType, RegisteredClient};
use crate::types::user::UserStore;

/// Lifetime of an authorization code.
pub const CODE_TTL_SECONDS: i64 = 600;

/// Parameters of a `POST /oauth2/token` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// RFC 6749 token response plus the SMART context fields.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    #[serde(rename = "fhirUser", skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub scope: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    #[serde(rename = "fhirUser", skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
}

/// OpenID Connect id token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(rename = "fhirUser", skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
}

pub struct TokenService {
    clients: Arc<dyn ClientRepository>,
    authorizations: Arc<dyn AuthorizationStore>,
    users: Arc<dyn UserStore>,
    keys: Arc<KeyService>,
    config: AuthConfig,
    issuer: String,
}

impl TokenService {
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        authorizations: Arc<dyn AuthorizationStore>,
        users: Arc<dyn UserStore>,
        keys: Arc<KeyService>,
        config: AuthConfig,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            clients,
            authorizations,
            users,
            keys,
            config,
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Dispatch a token request. `basic_auth` carries credentials from an
    /// `Authorization: Basic` header when present.
    pub async fn handle(
        &self,
        request: TokenRequest,
        basic_auth: Option<(String, String)>,
    ) -> AuthResult<TokenResponse> {
        match request.grant_type.as_str() {
            "authorization_code" => self.exchange_code(request).await,
            "refresh_token" => self.refresh(request).await,
            "client_credentials" => self.client_credentials(request, basic_auth).await,
            other => Err(AuthError::UnsupportedGrantType(other.to_string())),
        }
    }

    async fn exchange_code(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("code is required"))?;

        let mut record = self
            .authorizations
            .find_by_token(code, TokenKind::AuthorizationCode)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("unknown authorization code"))?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if !record.code_is_valid(now) {
            return Err(AuthError::invalid_grant("authorization code expired"));
        }

        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("client_id is required"))?;
        if record.client_id != client_id {
            return Err(AuthError::invalid_grant("code was issued to a different client"));
        }
        let client = self.resolve_client(client_id).await?;

        if let Some(bound_uri) = record.attribute(ATTR_REDIRECT_URI) {
            match request.redirect_uri.as_deref() {
                Some(uri) if uri == bound_uri => {}
                _ => return Err(AuthError::invalid_grant("redirect_uri mismatch")),
            }
        }

        // PKCE: a recorded challenge makes the verifier mandatory.
        if let Some(challenge) = record.attribute(ATTR_CODE_CHALLENGE) {
            let verifier_raw = request
                .code_verifier
                .as_deref()
                .ok_or_else(|| AuthError::invalid_request("code_verifier is required"))?;
            let verifier = PkceVerifier::new(verifier_raw.to_string())
                .map_err(|e| AuthError::invalid_request(e.to_string()))?;
            PkceChallenge::new(challenge.to_string())
                .verify(&verifier)
                .map_err(|e| AuthError::invalid_grant(e.to_string()))?;
            debug!(client_id, "PKCE verification passed");
        }

        let username = record.attribute(ATTR_USERNAME).map(str::to_string);
        let user = match &username {
            Some(name) => self.users.find(name).await?,
            None => None,
        };
        let fhir_user = user.as_ref().and_then(|u| u.fhir_user.clone());

        // Patient context: picker selection wins; a Patient-role user's own
        // principal is the standalone-launch fallback.
        let patient = record.patient_id().map(str::to_string).or_else(|| {
            fhir_user
                .as_deref()
                .and_then(|f| f.strip_prefix("Patient/"))
                .map(str::to_string)
        });

        let scopes = ScopeSet::from_list(&record.scopes);
        let ttl = client.token_ttl_seconds.unwrap_or(self.config.token_ttl_seconds());
        let subject = username.clone().unwrap_or_else(|| client_id.to_string());

        let access_token = self.mint_access_token(
            &subject,
            client_id,
            &record,
            &scopes,
            patient.clone(),
            fhir_user.clone(),
            ttl,
        )?;

        let id_token = if scopes.includes_openid() {
            Some(self.mint_id_token(
                &subject,
                client_id,
                record.attribute(ATTR_NONCE).map(str::to_string),
                fhir_user.clone(),
                ttl,
            )?)
        } else {
            None
        };

        let refresh_token = if self.config.refresh_tokens
            && client.supports_grant(GrantType::RefreshToken)
        {
            Some(Uuid::new_v4().to_string())
        } else {
            None
        };

        // Mutated exactly once at redemption: code retired, tokens recorded.
        record.authorization_code = None;
        record.code_expires_at = None;
        record.access_token = Some(access_token.clone());
        record.refresh_token = refresh_token.clone();
        self.authorizations.save(record).await?;

        info!(client_id, has_patient = patient.is_some(), "access token issued");
        let response = TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: ttl,
            scope: scopes.to_scope_string(),
            refresh_token,
            id_token,
            patient: None,
            fhir_user: None,
        };
        Ok(enhance_response(response))
    }

    async fn refresh(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("refresh_token is required"))?;

        let mut record = self
            .authorizations
            .find_by_token(refresh_token, TokenKind::RefreshToken)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("unknown refresh token"))?;

        if let Some(client_id) = request.client_id.as_deref() {
            if record.client_id != client_id {
                return Err(AuthError::invalid_grant("token was issued to a different client"));
            }
        }
        let client = self.resolve_client(&record.client_id).await?;
        if !client.supports_grant(GrantType::RefreshToken) {
            return Err(AuthError::UnauthorizedClient);
        }

        let username = record.attribute(ATTR_USERNAME).map(str::to_string);
        let user = match &username {
            Some(name) => self.users.find(name).await?,
            None => None,
        };
        let fhir_user = user.as_ref().and_then(|u| u.fhir_user.clone());
        let patient = record.patient_id().map(str::to_string);

        let scopes = ScopeSet::from_list(&record.scopes);
        let ttl = client.token_ttl_seconds.unwrap_or(self.config.token_ttl_seconds());
        let subject = username.unwrap_or_else(|| record.client_id.clone());
        let client_id = record.client_id.clone();

        let access_token = self.mint_access_token(
            &subject,
            &client_id,
            &record,
            &scopes,
            patient,
            fhir_user,
            ttl,
        )?;

        record.access_token = Some(access_token.clone());
        self.authorizations.save(record).await?;

        let response = TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: ttl,
            scope: scopes.to_scope_string(),
            refresh_token: Some(refresh_token.to_string()),
            id_token: None,
            patient: None,
            fhir_user: None,
        };
        Ok(enhance_response(response))
    }

    async fn client_credentials(
        &self,
        request: TokenRequest,
        basic_auth: Option<(String, String)>,
    ) -> AuthResult<TokenResponse> {
        let (client_id, client_secret) = match basic_auth {
            Some(credentials) => credentials,
            None => {
                let id = request
                    .client_id
                    .clone()
                    .ok_or_else(|| AuthError::invalid_request("client_id is required"))?;
                let secret = request.client_secret.clone().unwrap_or_default();
                (id, secret)
            }
        };

        let client = self.resolve_client(&client_id).await?;
        if !client.verify_secret(&client_secret) {
            warn!(client_id, "client authentication failed");
            return Err(AuthError::InvalidClient);
        }
        if !client.supports_grant(GrantType::ClientCredentials) {
            return Err(AuthError::UnauthorizedClient);
        }

        let scopes = match request.scope.as_deref() {
            Some(requested) => {
                let requested = ScopeSet::parse(requested);
                for scope in requested.iter() {
                    if !client.scopes.iter().any(|s| s == scope) {
                        return Err(AuthError::invalid_scope(scope));
                    }
                }
                requested
            }
            None => ScopeSet::from_list(&client.scopes),
        };

        let ttl = client.token_ttl_seconds.unwrap_or(self.config.token_ttl_seconds());
        let record = AuthorizationRecord::new(client_id.clone(), GrantType::ClientCredentials, "")
            .with_scopes(scopes.to_vec());

        let access_token =
            self.mint_access_token(&client_id, &client_id, &record, &scopes, None, None, ttl)?;

        let mut record = record;
        record.access_token = Some(access_token.clone());
        self.authorizations.save(record).await?;

        info!(client_id, "client credentials token issued");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: ttl,
            scope: scopes.to_scope_string(),
            refresh_token: None,
            id_token: None,
            patient: None,
            fhir_user: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn mint_access_token(
        &self,
        subject: &str,
        client_id: &str,
        record: &AuthorizationRecord,
        scopes: &ScopeSet,
        patient: Option<String>,
        fhir_user: Option<String>,
        ttl: i64,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: record
                .attribute(crate::types::authorization::ATTR_AUD)
                .unwrap_or(&self.issuer)
                .to_string(),
            exp: now + ttl,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            scope: scopes.to_scope_string(),
            client_id: client_id.to_string(),
            patient,
            fhir_user,
        };
        self.sign(&claims)
    }

    fn mint_id_token(
        &self,
        subject: &str,
        client_id: &str,
        nonce: Option<String>,
        fhir_user: Option<String>,
        ttl: i64,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: client_id.to_string(),
            exp: now + ttl,
            iat: now,
            nonce,
            fhir_user,
        };
        self.sign(&claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        let key = self.keys.current()?;
        let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(key.kid.clone());
        encode(&header, claims, key.encoding_key())
            .map_err(|e| AuthError::server_error(e.to_string()))
    }

    /// Verify an access token's signature and expiry; returns its claims.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let key = self.keys.current()?;
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        let data = jsonwebtoken::decode::<AccessTokenClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| AuthError::invalid_grant(e.to_string()))?;
        Ok(data.claims)
    }

    async fn resolve_client(&self, client_id: &str) -> AuthResult<RegisteredClient> {
        self.clients
            .find_by_client_id(client_id)
            .await?
            .ok_or(AuthError::InvalidClient)
    }
}

/// Copy `patient` and `fhirUser` claims from the just-issued access token to
/// the top level of the token response, unless already present. Error
/// responses never pass through here.
pub fn enhance_response(mut response: TokenResponse) -> TokenResponse {
    let claims = match decode_jwt_payload(&response.access_token) {
        Some(claims) => claims,
        None => return response,
    };

    if response.patient.is_none() {
        response.patient = claims
            .get("patient")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    if response.fhir_user.is_none() {
        response.fhir_user = claims
            .get("fhirUser")
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    response
}

/// Decode a JWT payload without verifying the signature. Used only to lift
/// claims we just signed ourselves into the response body.
pub fn decode_jwt_payload(token: &str) -> Option<HashMap<String, Value>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_jwt_payload() {
        // header.payload.signature with payload {"patient":"example"}
        let payload = URL_SAFE_NO_PAD.encode(br#"{"patient":"example","fhirUser":"Practitioner/p1"}"#);
        let token = format!("xxx.{payload}.yyy");
        let claims = decode_jwt_payload(&token).unwrap();
        assert_eq!(claims["patient"], "example");
        assert_eq!(claims["fhirUser"], "Practitioner/p1");
    }

    #[test]
    fn test_decode_garbage_is_none() {
        assert!(decode_jwt_payload("not-a-jwt").is_none());
        assert!(decode_jwt_payload("a.!!!.c").is_none());
    }

    #[test]
    fn test_enhance_copies_claims_to_top_level() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"patient":"example","fhirUser":"Practitioner/p1"}"#);
        let response = TokenResponse {
            access_token: format!("h.{payload}.s"),
            token_type: "Bearer",
            expires_in: 3600,
            scope: "openid".into(),
            refresh_token: None,
            id_token: None,
            patient: None,
            fhir_user: None,
        };
        let enhanced = enhance_response(response);
        assert_eq!(enhanced.patient.as_deref(), Some("example"));
        assert_eq!(enhanced.fhir_user.as_deref(), Some("Practitioner/p1"));
    }

    #[test]
    fn test_enhance_does_not_override_existing() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"patient":"from-jwt"}"#);
        let response = TokenResponse {
            access_token: format!("h.{payload}.s"),
            token_type: "Bearer",
            expires_in: 3600,
            scope: String::new(),
            refresh_token: None,
            id_token: None,
            patient: Some("already".into()),
            fhir_user: None,
        };
        let enhanced = enhance_response(response);
        assert_eq!(enhanced.patient.as_deref(), Some("already"));
    }

    #[test]
    fn test_token_response_serialization_shape() {
        let response = TokenResponse {
            access_token: "at".into(),
            token_type: "Bearer",
            expires_in: 3600,
            scope: "openid fhirUser".into(),
            refresh_token: None,
            id_token: None,
            patient: Some("example".into()),
            fhir_user: Some("Practitioner/p1".into()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["patient"], "example");
        assert_eq!(json["fhirUser"], "Practitioner/p1");
        assert!(json.get("refresh_token").is_none());
        assert!(json["scope"].as_str().unwrap().contains(' '));
    }
}

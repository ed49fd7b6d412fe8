//! Token signing keys.
//!
//! One RSA-2048 key pair with a stable `kid`, persisted as a JWK set under
//! the `Admin.config` document `oauth-signing-key` (private parts
//! included). On startup the key is loaded when the admin collection is
//! available; otherwise it is generated in memory and persisted lazily once
//! the collection is provisioned. A key that exists but cannot be loaded is
//! fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use medbase_storage::{DocumentStore, Keyspace};

/// Document id of the persisted JWK set.
pub const JWK_DOCUMENT_ID: &str = "oauth-signing-key";

/// An RSA signing key pair ready for RS256 operations.
pub struct SigningKeyPair {
    pub kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Public modulus and exponent, big-endian.
    n: Vec<u8>,
    e: Vec<u8>,
    /// The full private JWK as persisted.
    private_jwk: Value,
}

impl SigningKeyPair {
    /// Generate a fresh RSA-2048 pair with a random `kid`.
    pub fn generate() -> AuthResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::key(format!("key generation failed: {e}")))?;
        Self::from_private_key(private_key, Uuid::new_v4().to_string())
    }

    fn from_private_key(private_key: RsaPrivateKey, kid: String) -> AuthResult<Self> {
        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let primes = private_key.primes();
        if primes.len() < 2 {
            return Err(AuthError::key("RSA key must have two primes"));
        }
        let private_jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(&n),
            "e": URL_SAFE_NO_PAD.encode(&e),
            "d": URL_SAFE_NO_PAD.encode(private_key.d().to_bytes_be()),
            "p": URL_SAFE_NO_PAD.encode(primes[0].to_bytes_be()),
            "q": URL_SAFE_NO_PAD.encode(primes[1].to_bytes_be()),
        });

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::key(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::key(e.to_string()))?;

        Ok(Self {
            kid,
            encoding_key,
            decoding_key,
            n,
            e,
            private_jwk,
        })
    }

    /// Rebuild a pair from a persisted private JWK.
    pub fn from_private_jwk(jwk: &Value) -> AuthResult<Self> {
        let field = |name: &str| -> AuthResult<BigUint> {
            let encoded = jwk
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| AuthError::key(format!("JWK is missing '{name}'")))?;
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(|e| AuthError::key(format!("JWK field '{name}': {e}")))?;
            Ok(BigUint::from_bytes_be(&bytes))
        };
        let kid = jwk
            .get("kid")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::key("JWK is missing 'kid'"))?
            .to_string();

        let private_key = RsaPrivateKey::from_components(
            field("n")?,
            field("e")?,
            field("d")?,
            vec![field("p")?, field("q")?],
        )
        .map_err(|e| AuthError::key(format!("invalid persisted RSA key: {e}")))?;

        Self::from_private_key(private_key, kid)
    }

    /// Public JWK for the JWKS endpoint.
    pub fn public_jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(&self.n),
            "e": URL_SAFE_NO_PAD.encode(&self.e),
        })
    }

    /// The persisted JWK set document (private parts included).
    pub fn private_jwk_set(&self) -> Value {
        json!({ "keys": [self.private_jwk] })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Lazily-persisted signing key source. The only shared state mutated after
/// startup is the persistence flag, flipped once under a single-writer
/// discipline.
pub struct KeyService {
    store: Arc<dyn DocumentStore>,
    key: RwLock<Option<Arc<SigningKeyPair>>>,
    persisted: AtomicBool,
}

impl KeyService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            key: RwLock::new(None),
            persisted: AtomicBool::new(false),
        }
    }

    /// Load or generate the signing key.
    ///
    /// # Errors
    /// Fatal when the admin collection exists and holds a key document that
    /// cannot be parsed; the server must not start with a different `kid`.
    pub async fn init(&self) -> AuthResult<()> {
        let keyspace = Keyspace::admin_config();
        if self.store.collection_exists(&keyspace).await? {
            if let Some(doc) = self.store.get(&keyspace, JWK_DOCUMENT_ID).await? {
                let jwk = doc
                    .content
                    .pointer("/keys/0")
                    .ok_or_else(|| AuthError::key("persisted JWK set has no keys"))?;
                let pair = Arc::new(SigningKeyPair::from_private_jwk(jwk)?);
                info!(kid = %pair.kid, "loaded OAuth signing key from admin config");
                *self.key.write().expect("key lock") = Some(pair);
                self.persisted.store(true, Ordering::SeqCst);
                return Ok(());
            }
            let pair = Arc::new(SigningKeyPair::generate()?);
            self.store
                .upsert(&keyspace, JWK_DOCUMENT_ID, pair.private_jwk_set())
                .await?;
            info!(kid = %pair.kid, "generated and persisted new OAuth signing key");
            *self.key.write().expect("key lock") = Some(pair);
            self.persisted.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let pair = Arc::new(SigningKeyPair::generate()?);
        warn!(
            kid = %pair.kid,
            "admin config collection unavailable; signing key is in-memory only and will not survive restart"
        );
        *self.key.write().expect("key lock") = Some(pair);
        self.persisted.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// The current key pair.
    ///
    /// # Errors
    /// `Key` when `init` has not run.
    pub fn current(&self) -> AuthResult<Arc<SigningKeyPair>> {
        self.key
            .read()
            .expect("key lock")
            .clone()
            .ok_or_else(|| AuthError::key("signing key not initialized"))
    }

    /// Retry persistence once the admin collection appears.
    pub async fn ensure_persisted(&self) -> AuthResult<()> {
        if self.persisted.load(Ordering::SeqCst) {
            return Ok(());
        }
        let keyspace = Keyspace::admin_config();
        if !self.store.collection_exists(&keyspace).await? {
            return Ok(());
        }
        let pair = self.current()?;
        self.store
            .upsert(&keyspace, JWK_DOCUMENT_ID, pair.private_jwk_set())
            .await?;
        self.persisted.store(true, Ordering::SeqCst);
        info!(kid = %pair.kid, "persisted in-memory signing key");
        Ok(())
    }

    /// Public JWKS document.
    pub fn jwks(&self) -> AuthResult<Value> {
        let pair = self.current()?;
        Ok(json!({ "keys": [pair.public_jwk()] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbase_db_memory::MemoryStore;

    #[test]
    fn test_generate_and_restore_from_jwk() {
        let pair = SigningKeyPair::generate().unwrap();
        let jwk_set = pair.private_jwk_set();
        let restored = SigningKeyPair::from_private_jwk(&jwk_set["keys"][0]).unwrap();
        assert_eq!(restored.kid, pair.kid);
        assert_eq!(restored.public_jwk()["n"], pair.public_jwk()["n"]);
    }

    #[test]
    fn test_public_jwk_has_no_private_parts() {
        let pair = SigningKeyPair::generate().unwrap();
        let public = pair.public_jwk();
        assert!(public.get("d").is_none());
        assert!(public.get("p").is_none());
        assert_eq!(public["alg"], "RS256");
        assert_eq!(public["use"], "sig");
    }

    #[tokio::test]
    async fn test_kid_stable_across_restarts() {
        let store = MemoryStore::new();
        store.create_collection(&Keyspace::admin_config());
        let store: Arc<dyn DocumentStore> = Arc::new(store);

        let first = KeyService::new(store.clone());
        first.init().await.unwrap();
        let kid1 = first.current().unwrap().kid.clone();

        // "Restart": a new service over the same store
        let second = KeyService::new(store);
        second.init().await.unwrap();
        assert_eq!(second.current().unwrap().kid, kid1);
    }

    #[tokio::test]
    async fn test_lazy_persistence_when_collection_appears_later() {
        let store = MemoryStore::new();
        let arc_store: Arc<dyn DocumentStore> = Arc::new(store.clone());

        let service = KeyService::new(arc_store.clone());
        service.init().await.unwrap();
        let kid = service.current().unwrap().kid.clone();

        // Nothing persisted yet; ensure_persisted is a no-op
        service.ensure_persisted().await.unwrap();

        // Provision the admin collection, then retry
        store.create_collection(&Keyspace::admin_config());
        service.ensure_persisted().await.unwrap();

        let doc = arc_store
            .get(&Keyspace::admin_config(), JWK_DOCUMENT_ID)
            .await
            .unwrap()
            .expect("key persisted after provisioning");
        assert_eq!(doc.content["keys"][0]["kid"], kid);
    }

    #[tokio::test]
    async fn test_corrupt_key_document_is_fatal() {
        let store = MemoryStore::new();
        store.create_collection(&Keyspace::admin_config());
        store
            .upsert(
                &Keyspace::admin_config(),
                JWK_DOCUMENT_ID,
                json!({"keys": [{"kty": "RSA", "kid": "k", "n": "!!!"}]}),
            )
            .await
            .unwrap();

        let service = KeyService::new(Arc::new(store));
        assert!(service.init().await.is_err());
    }

    #[tokio::test]
    async fn test_jwks_document() {
        let store = MemoryStore::new();
        store.create_collection(&Keyspace::admin_config());
        let service = KeyService::new(Arc::new(store));
        service.init().await.unwrap();

        let jwks = service.jwks().unwrap();
        assert_eq!(jwks["keys"].as_array().unwrap().len(), 1);
        assert_eq!(jwks["keys"][0]["kty"], "RSA");
    }
}

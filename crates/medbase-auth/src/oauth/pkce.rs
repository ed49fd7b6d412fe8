//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! S256 only; the "plain" method is explicitly forbidden per SMART on FHIR.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    #[error("Invalid verifier characters: must be [A-Za-z0-9-._~]")]
    InvalidVerifierCharacters,

    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// The RFC 6749 error code for this failure.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

/// PKCE challenge method. Only S256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkceChallengeMethod {
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// # Errors
    /// `UnsupportedMethod` for anything but `S256`; "plain" is called out.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" => Err(PkceError::UnsupportedMethod(
                "plain (forbidden by SMART on FHIR)".to_string(),
            )),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        "S256"
    }
}

/// PKCE code verifier: 43-128 characters of `[A-Za-z0-9-._~]`.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// # Errors
    /// Length or character-set violations per RFC 7636 §4.1.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }
        let valid = verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'));
        if !valid {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generate a fresh high-entropy verifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PKCE code challenge: base64url(SHA-256(verifier)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    #[must_use]
    pub fn new(challenge: String) -> Self {
        Self(challenge)
    }

    /// Derive the challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let digest = Sha256::digest(verifier.as_str().as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Verify a presented verifier against this stored challenge.
    ///
    /// # Errors
    /// `VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        if Self::from_verifier(verifier).0 == self.0 {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_verify_roundtrip() {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        assert!(challenge.verify(&verifier).is_ok());
    }

    #[test]
    fn test_wrong_verifier_fails() {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let other = PkceVerifier::generate();
        assert!(matches!(
            challenge.verify(&other),
            Err(PkceError::VerificationFailed)
        ));
    }

    #[test]
    fn test_rfc_7636_appendix_b_vector() {
        let verifier =
            PkceVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string()).unwrap();
        let challenge = PkceChallenge::from_verifier(&verifier);
        assert_eq!(challenge.as_str(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_verifier_length_bounds() {
        assert!(matches!(
            PkceVerifier::new("short".to_string()),
            Err(PkceError::InvalidVerifierLength(5))
        ));
        assert!(matches!(
            PkceVerifier::new("x".repeat(129)),
            Err(PkceError::InvalidVerifierLength(129))
        ));
        assert!(PkceVerifier::new("x".repeat(43)).is_ok());
        assert!(PkceVerifier::new("x".repeat(128)).is_ok());
    }

    #[test]
    fn test_verifier_character_set() {
        let invalid = format!("{}!", "x".repeat(43));
        assert!(matches!(
            PkceVerifier::new(invalid),
            Err(PkceError::InvalidVerifierCharacters)
        ));
    }

    #[test]
    fn test_plain_method_forbidden() {
        let err = PkceChallengeMethod::parse("plain").unwrap_err();
        assert!(err.to_string().contains("SMART"));
        assert!(PkceChallengeMethod::parse("S256").is_ok());
        assert!(PkceChallengeMethod::parse("S512").is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PkceError::VerificationFailed.oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            PkceError::UnsupportedMethod("plain".into()).oauth_error_code(),
            "invalid_request"
        );
    }
}

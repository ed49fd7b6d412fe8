//! OAuth 2.0 protocol pieces: authorization requests, PKCE, and token
//! issuance.

pub mod authorize;
pub mod pkce;
pub mod token;

pub use authorize::{AuthorizeError, AuthorizeRequest};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use token::{TokenRequest, TokenResponse, TokenService};

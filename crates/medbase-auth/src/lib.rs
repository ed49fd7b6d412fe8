//! SMART-on-FHIR authorization server.
//!
//! OAuth 2.0 authorization-code grant with PKCE, plus client-credentials
//! for the built-in admin client. The flow runs login → optional patient
//! picker → consent → code issuance → token mint; the picker-selected
//! patient id is injected into the persisted authorization record by a
//! decorator around the record store, and surfaces as the `patient` claim
//! of the issued token and the top level of the token response.

pub mod clients;
pub mod config;
pub mod consent;
pub mod error;
pub mod http;
pub mod keys;
pub mod oauth;
pub mod picker;
pub mod session;
pub mod smart;
pub mod store;
pub mod types;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use http::AuthState;

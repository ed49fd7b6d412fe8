//! SMART on FHIR specifics: scope semantics and discovery documents.

pub mod discovery;
pub mod scopes;

pub use discovery::{oauth_server_metadata, smart_configuration};
pub use scopes::ScopeSet;

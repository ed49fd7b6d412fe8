//! FHIR R4 server composition.
//!
//! Wires the document store, search engine, write pipeline, and
//! authorization server into one axum application. `main` loads the YAML
//! configuration, initializes logging and the signing key, and serves.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use state::AppState;

//! Authorization domain types.

pub mod authorization;
pub mod client;
pub mod user;

pub use authorization::{AuthorizationRecord, ATTR_AUD, ATTR_LAUNCH, ATTR_PATIENT_ID};
pub use client::{GrantType, RegisteredClient};
pub use user::{User, UserRole};

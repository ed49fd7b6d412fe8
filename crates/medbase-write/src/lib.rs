//! Resource write pipeline.
//!
//! The sole mutator of resources, versions, and tombstones. PUT snapshots
//! the prior version into the history collection and bumps `meta.versionId`
//! inside a transaction; DELETE tombstones the id so it can never be
//! reused; Bundle processing resolves `urn:uuid:` forward references and
//! applies every entry through the same upsert algorithm.

pub mod audit;
pub mod bundle;
pub mod delete;
pub mod error;
pub mod put;
pub mod tombstone;

pub use audit::AuditInfo;
pub use bundle::BundleProcessor;
pub use delete::DeleteService;
pub use error::{WriteError, WriteResult};
pub use put::PutService;
pub use tombstone::TombstoneService;

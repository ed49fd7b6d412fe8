//! FHIR search engine.
//!
//! Translates FHIR search parameter grammar into full-text-search queries
//! against typed indexes, then retrieves results key-then-fetch:
//!
//! 1. [`registry`] resolves a parameter name to its type and FHIRPath
//! 2. [`preprocessor`] rejects unknown names, malformed values, and
//!    logically impossible combinations before any query runs
//! 3. [`builders`] emit per-type query fragments (AND across parameters,
//!    OR across values of one parameter)
//! 4. [`service`] runs the combined query and returns document keys
//! 5. [`kv`] materializes the resources by bulk multi-get
//!
//! [`group`] layers bulk-membership filtering and `_has` reverse chaining on
//! top of the same pipeline.

pub mod builders;
pub mod error;
pub mod fhirpath;
pub mod group;
pub mod kv;
pub mod meta;
pub mod parameters;
pub mod parser;
pub mod preprocessor;
pub mod registry;
pub mod service;

pub use error::{SearchError, SearchResult};
pub use group::{GroupFilterService, HasParam, PreviewResult};
pub use kv::KvFetchService;
pub use parameters::{ParamSource, ResolvedParam, SearchModifier, SearchParamDef, SearchParamType};
pub use parser::{parse_query_string, ParamMap};
pub use registry::{ParameterResolver, SearchParameterRegistry};
pub use service::{CollectionRouting, FtsSearchService};

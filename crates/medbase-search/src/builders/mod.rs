//! Per-type query builders.
//!
//! Each builder consumes one resolved parameter plus its values and emits
//! zero or more query fragments. Multiple values of one parameter are OR;
//! the fragments of different parameters are combined by AND in
//! [`combined_query`].

mod date;
mod quantity;
mod reference;
mod string;
mod token;

pub use date::build_date_query;
pub use quantity::build_quantity_queries;
pub use reference::build_reference_queries;
pub use string::build_string_queries;
pub use token::build_token_queries;

use tracing::warn;

use crate::parameters::{ResolvedParam, SearchParamType};
use medbase_storage::FtsQuery;

/// Build the query fragments for one resolved parameter.
///
/// Unsupported parameter types log a warning and contribute nothing, so a
/// search never fails on a parameter the engine cannot express.
pub fn build_queries(resolved: &ResolvedParam, values: &[String]) -> Vec<FtsQuery> {
    if values.is_empty() {
        warn!(param = %resolved, "no values to build a query from");
        return Vec::new();
    }

    match resolved.param_type {
        SearchParamType::Token => build_token_queries(resolved, values),
        SearchParamType::String => build_string_queries(resolved, values),
        SearchParamType::Date => build_date_query(resolved, values)
            .map(|q| vec![q])
            .unwrap_or_default(),
        SearchParamType::Reference => build_reference_queries(resolved, values),
        SearchParamType::Quantity => build_quantity_queries(resolved, values),
        SearchParamType::Number | SearchParamType::Uri | SearchParamType::Composite
        | SearchParamType::Special => {
            warn!(
                param = %resolved,
                param_type = %resolved.param_type,
                "unsupported search parameter type, contributing no query"
            );
            Vec::new()
        }
    }
}

/// AND across all fragments of all parameters; match-all when empty.
pub fn combined_query(all_queries: Vec<FtsQuery>) -> FtsQuery {
    FtsQuery::conjuncts(all_queries)
}

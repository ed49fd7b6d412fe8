//! String query builder.
//!
//! Default semantics are a case-insensitive prefix match on the normalized
//! string field; `:exact` is an exact phrase, `:contains` a substring.
//! Complex elements like `name` expand to a disjunction over their
//! text-bearing sub-fields.

use tracing::warn;

use crate::fhirpath;
use crate::meta::string_fields;
use crate::parameters::{ResolvedParam, SearchModifier};
use medbase_storage::FtsQuery;

pub fn build_string_queries(resolved: &ResolvedParam, values: &[String]) -> Vec<FtsQuery> {
    let parsed = fhirpath::parse(&resolved.fhir_path, &resolved.resource_type);
    let fields = string_fields(&parsed.primary_field_path);

    let mut queries = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            warn!(param = %resolved, "skipping empty string value");
            continue;
        }
        let per_field: Vec<FtsQuery> = fields
            .iter()
            .map(|field| build_one(field, value, resolved.modifier.as_ref()))
            .collect();
        queries.push(FtsQuery::disjuncts(per_field));
    }
    queries
}

fn build_one(field: &str, value: &str, modifier: Option<&SearchModifier>) -> FtsQuery {
    match modifier {
        Some(SearchModifier::Exact) => FtsQuery::match_value(field, value),
        Some(SearchModifier::Contains) => FtsQuery::contains(field, value.to_lowercase()),
        _ => FtsQuery::prefix(field, value.to_lowercase()),
    }
}

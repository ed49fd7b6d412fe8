//! Quantity query builder.
//!
//! Accepts `value`, `value|system|code`, or `value||code` with an optional
//! comparison prefix on the numeric part. Emits a numeric range on the
//! quantity's `.value` plus unit/system terms when provided.

use tracing::warn;

use crate::fhirpath;
use crate::parameters::ResolvedParam;
use crate::parser::split_prefix;
use medbase_storage::FtsQuery;

pub fn build_quantity_queries(resolved: &ResolvedParam, values: &[String]) -> Vec<FtsQuery> {
    let parsed = fhirpath::parse(&resolved.fhir_path, &resolved.resource_type);
    let element = parsed.primary_field_path;

    values
        .iter()
        .filter_map(|value| build_one(&element, value, resolved))
        .collect()
}

fn build_one(element: &str, raw: &str, resolved: &ResolvedParam) -> Option<FtsQuery> {
    let mut parts = raw.splitn(3, '|');
    let number_part = parts.next().unwrap_or_default();
    let system = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();

    let (prefix, number_text) = split_prefix(number_part);
    let number: f64 = match number_text.parse() {
        Ok(n) => n,
        Err(_) => {
            warn!(param = %resolved, value = raw, "unparseable quantity value");
            return None;
        }
    };

    let value_field = format!("{element}.value");
    let range = match prefix {
        Some("gt") => FtsQuery::numeric_range(&value_field).min(number, false).build(),
        Some("ge") => FtsQuery::numeric_range(&value_field).min(number, true).build(),
        Some("lt") => FtsQuery::numeric_range(&value_field).max(number, false).build(),
        Some("le") => FtsQuery::numeric_range(&value_field).max(number, true).build(),
        // eq, ap, and unprefixed pin the value
        _ => FtsQuery::numeric_range(&value_field)
            .min(number, true)
            .max(number, true)
            .build(),
    };

    let mut conjuncts = vec![range];
    if !system.is_empty() {
        conjuncts.push(FtsQuery::term(format!("{element}.system"), system));
    }
    if !code.is_empty() {
        conjuncts.push(FtsQuery::term(format!("{element}.code"), code));
    }
    Some(FtsQuery::conjuncts(conjuncts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ParamSource, SearchParamType};

    fn param() -> ResolvedParam {
        ResolvedParam {
            name: "value-quantity".to_string(),
            modifier: None,
            param_type: SearchParamType::Quantity,
            fhir_path: "Observation.valueQuantity".to_string(),
            resource_type: "Observation".to_string(),
            source: ParamSource::Base,
        }
    }

    #[test]
    fn test_plain_value_pins_range() {
        let queries = build_quantity_queries(&param(), &["5.4".to_string()]);
        assert_eq!(queries.len(), 1);
        match &queries[0] {
            FtsQuery::NumericRange { field, min, max, .. } => {
                assert_eq!(field, "valueQuantity.value");
                assert_eq!(*min, Some(5.4));
                assert_eq!(*max, Some(5.4));
            }
            other => panic!("expected numeric range, got {other:?}"),
        }
    }

    #[test]
    fn test_full_triple_adds_unit_terms() {
        let queries = build_quantity_queries(
            &param(),
            &["gt5.4|http://unitsofmeasure.org|mg".to_string()],
        );
        match &queries[0] {
            FtsQuery::Conjunction(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(parts.contains(&FtsQuery::term(
                    "valueQuantity.system",
                    "http://unitsofmeasure.org"
                )));
                assert!(parts.contains(&FtsQuery::term("valueQuantity.code", "mg")));
                match &parts[0] {
                    FtsQuery::NumericRange { min, inclusive_min, .. } => {
                        assert_eq!(*min, Some(5.4));
                        assert!(!inclusive_min);
                    }
                    other => panic!("expected numeric range first, got {other:?}"),
                }
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_code_without_system() {
        let queries = build_quantity_queries(&param(), &["le10||mg".to_string()]);
        match &queries[0] {
            FtsQuery::Conjunction(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(parts.contains(&FtsQuery::term("valueQuantity.code", "mg")));
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_value_is_skipped() {
        assert!(build_quantity_queries(&param(), &["abc|x|y".to_string()]).is_empty());
    }
}

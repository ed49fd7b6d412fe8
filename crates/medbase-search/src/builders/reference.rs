//! Reference query builder.
//!
//! Accepts `Type/id`, a bare `id`, or an absolute URL; matches the
//! `.reference` field exactly. A bare id matches any target type via a
//! wildcard. The `:identifier` modifier switches to the referenced
//! identifier field.

use tracing::warn;

use crate::fhirpath;
use crate::parameters::{ResolvedParam, SearchModifier};
use medbase_storage::FtsQuery;

pub fn build_reference_queries(resolved: &ResolvedParam, values: &[String]) -> Vec<FtsQuery> {
    let parsed = fhirpath::parse(&resolved.fhir_path, &resolved.resource_type);
    let element = parsed.primary_field_path;

    values
        .iter()
        .filter_map(|value| {
            let value = value.trim();
            if value.is_empty() {
                warn!(param = %resolved, "skipping empty reference value");
                return None;
            }
            Some(build_one(&element, value, resolved.modifier.as_ref()))
        })
        .collect()
}

fn build_one(element: &str, value: &str, modifier: Option<&SearchModifier>) -> FtsQuery {
    if matches!(modifier, Some(SearchModifier::Identifier)) {
        let field = format!("{element}.identifier.value");
        return match value.split_once('|') {
            Some((system, code)) if !system.is_empty() && !code.is_empty() => {
                FtsQuery::conjuncts(vec![
                    FtsQuery::term(format!("{element}.identifier.system"), system),
                    FtsQuery::term(field, code),
                ])
            }
            Some((_, code)) => FtsQuery::term(field, code),
            None => FtsQuery::term(field, value),
        };
    }

    // Type modifier (subject:Patient=123) qualifies a bare id
    if let Some(SearchModifier::Type(target)) = modifier {
        if !value.contains('/') {
            return FtsQuery::term(format!("{element}.reference"), format!("{target}/{value}"));
        }
    }

    let field = format!("{element}.reference");
    if value.contains('/') || value.starts_with("http") {
        FtsQuery::term(field, value)
    } else {
        // Bare id: any target type
        FtsQuery::wildcard(field, format!("*/{value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ParamSource, SearchParamType};

    fn param(modifier: Option<SearchModifier>) -> ResolvedParam {
        ResolvedParam {
            name: "subject".to_string(),
            modifier,
            param_type: SearchParamType::Reference,
            fhir_path: "Observation.subject.where(resolve() is Patient)".to_string(),
            resource_type: "Observation".to_string(),
            source: ParamSource::Base,
        }
    }

    #[test]
    fn test_typed_reference() {
        let queries = build_reference_queries(&param(None), &["Patient/p1".to_string()]);
        assert_eq!(
            queries,
            vec![FtsQuery::term("subject.reference", "Patient/p1")]
        );
    }

    #[test]
    fn test_bare_id_uses_wildcard() {
        let queries = build_reference_queries(&param(None), &["p1".to_string()]);
        assert_eq!(
            queries,
            vec![FtsQuery::wildcard("subject.reference", "*/p1")]
        );
    }

    #[test]
    fn test_absolute_url() {
        let url = "https://fhir.example.com/r4/Patient/p1";
        let queries = build_reference_queries(&param(None), &[url.to_string()]);
        assert_eq!(queries, vec![FtsQuery::term("subject.reference", url)]);
    }

    #[test]
    fn test_type_modifier_qualifies_bare_id() {
        let queries = build_reference_queries(
            &param(Some(SearchModifier::Type("Patient".to_string()))),
            &["p1".to_string()],
        );
        assert_eq!(
            queries,
            vec![FtsQuery::term("subject.reference", "Patient/p1")]
        );
    }

    #[test]
    fn test_identifier_modifier() {
        let queries = build_reference_queries(
            &param(Some(SearchModifier::Identifier)),
            &["http://hospital.org/mrn|MRN-7".to_string()],
        );
        assert_eq!(queries.len(), 1);
        assert!(matches!(queries[0], FtsQuery::Conjunction(_)));
    }

    #[test]
    fn test_multiple_values_build_multiple_queries() {
        let queries = build_reference_queries(
            &param(None),
            &["Patient/p1".to_string(), "Patient/p2".to_string()],
        );
        assert_eq!(queries.len(), 2);
    }
}

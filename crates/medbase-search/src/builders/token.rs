//! Token query builder.
//!
//! Accepts `code`, `system|code`, `|code`, and `system|` value shapes. The
//! concrete fields depend on the element's datatype: CodeableConcepts match
//! on `.coding.code`/`.coding.system`, Identifiers on `.value`/`.system`,
//! bare codes match the field itself.

use tracing::warn;

use crate::fhirpath;
use crate::meta::{token_element_kind, TokenElementKind};
use crate::parameters::ResolvedParam;
use medbase_storage::FtsQuery;

/// One query per value (OR semantics handled by the caller's disjunction).
pub fn build_token_queries(resolved: &ResolvedParam, values: &[String]) -> Vec<FtsQuery> {
    let parsed = fhirpath::parse(&resolved.fhir_path, &resolved.resource_type);
    let element = parsed.primary_field_path;
    let kind = token_element_kind(&resolved.resource_type, &element);

    let (code_field, system_field) = match kind {
        TokenElementKind::Code => (element.clone(), None),
        TokenElementKind::CodeableConcept => (
            format!("{element}.coding.code"),
            Some(format!("{element}.coding.system")),
        ),
        TokenElementKind::Identifier | TokenElementKind::ContactPoint => {
            (format!("{element}.value"), Some(format!("{element}.system")))
        }
        TokenElementKind::Coding => {
            (format!("{element}.code"), Some(format!("{element}.system")))
        }
    };

    values
        .iter()
        .filter_map(|value| build_one(value, &code_field, system_field.as_deref()))
        .collect()
}

fn build_one(value: &str, code_field: &str, system_field: Option<&str>) -> Option<FtsQuery> {
    match value.split_once('|') {
        None => Some(FtsQuery::term(code_field, value)),
        Some((system, code)) => {
            let system = system.trim();
            let code = code.trim();
            match (system.is_empty(), code.is_empty()) {
                // |code: code match regardless of system
                (true, false) => Some(FtsQuery::term(code_field, code)),
                // system|: presence of the system
                (false, true) => match system_field {
                    Some(field) => Some(FtsQuery::term(field, system)),
                    None => {
                        warn!(value, "system query on a bare code field matches nothing");
                        Some(FtsQuery::MatchNone)
                    }
                },
                // system|code: both must match
                (false, false) => {
                    let code_query = FtsQuery::term(code_field, code);
                    match system_field {
                        Some(field) => Some(FtsQuery::conjuncts(vec![
                            FtsQuery::term(field, system),
                            code_query,
                        ])),
                        None => {
                            warn!(value, "system|code on a bare code field, matching code only");
                            Some(code_query)
                        }
                    }
                }
                (true, true) => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ParamSource, SearchParamType};

    fn param(resource_type: &str, name: &str, path: &str) -> ResolvedParam {
        ResolvedParam {
            name: name.to_string(),
            modifier: None,
            param_type: SearchParamType::Token,
            fhir_path: format!("{resource_type}.{path}"),
            resource_type: resource_type.to_string(),
            source: ParamSource::Base,
        }
    }

    #[test]
    fn test_bare_code_field() {
        let queries = build_token_queries(
            &param("Patient", "gender", "gender"),
            &["male".to_string()],
        );
        assert_eq!(queries, vec![FtsQuery::term("gender", "male")]);
    }

    #[test]
    fn test_codeable_concept_plain_code() {
        let queries = build_token_queries(
            &param("Observation", "code", "code"),
            &["12345".to_string()],
        );
        assert_eq!(queries, vec![FtsQuery::term("code.coding.code", "12345")]);
    }

    #[test]
    fn test_system_and_code_conjunction() {
        let queries = build_token_queries(
            &param("Observation", "code", "code"),
            &["http://loinc.org|12345".to_string()],
        );
        assert_eq!(queries.len(), 1);
        match &queries[0] {
            FtsQuery::Conjunction(parts) => {
                assert!(parts.contains(&FtsQuery::term("code.coding.system", "http://loinc.org")));
                assert!(parts.contains(&FtsQuery::term("code.coding.code", "12345")));
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_code_only_with_leading_pipe() {
        let queries = build_token_queries(
            &param("Patient", "identifier", "identifier"),
            &["|MRN-7".to_string()],
        );
        assert_eq!(queries, vec![FtsQuery::term("identifier.value", "MRN-7")]);
    }

    #[test]
    fn test_system_presence_query() {
        let queries = build_token_queries(
            &param("Patient", "identifier", "identifier"),
            &["http://hospital.org/mrn|".to_string()],
        );
        assert_eq!(
            queries,
            vec![FtsQuery::term("identifier.system", "http://hospital.org/mrn")]
        );
    }

    #[test]
    fn test_system_on_bare_code_matches_nothing() {
        let queries = build_token_queries(
            &param("Patient", "gender", "gender"),
            &["http://x|".to_string()],
        );
        assert_eq!(queries, vec![FtsQuery::MatchNone]);
    }

    #[test]
    fn test_boolean_token() {
        let queries = build_token_queries(
            &param("Patient", "active", "active"),
            &["true".to_string()],
        );
        assert_eq!(queries, vec![FtsQuery::term("active", "true")]);
    }
}

//! Date query builder.
//!
//! Folds all values of the parameter into one range (`ge`/`gt` set the
//! start, `le`/`lt` the end, unprefixed values set both), expands choice
//! elements to their concrete date fields, prunes Period endpoints by the
//! comparison direction, and emits a disjunction across the surviving
//! fields. `ne` negates the point into two open ranges; `ap` widens it by a
//! day on each side.

use tracing::{debug, warn};

use crate::fhirpath;
use crate::meta::{expand_date_paths, prune_period_paths};
use crate::parameters::ResolvedParam;
use crate::parser::split_prefix;
use medbase_core::time::shift_days;
use medbase_storage::FtsQuery;

#[derive(Debug, Default)]
struct DateBounds {
    start: Option<String>,
    end: Option<String>,
    inclusive_start: bool,
    inclusive_end: bool,
    /// Set by `ne`: match outside the point instead of inside.
    negated: Option<String>,
}

/// Build one combined query for all values of a date parameter.
/// Returns `None` when nothing usable could be built.
pub fn build_date_query(resolved: &ResolvedParam, values: &[String]) -> Option<FtsQuery> {
    if values.is_empty() {
        return None;
    }

    let mut bounds = DateBounds {
        inclusive_start: true,
        inclusive_end: true,
        ..DateBounds::default()
    };

    for value in values {
        let (prefix, date) = split_prefix(value);
        match prefix {
            Some("gt") | Some("sa") => {
                bounds.start = Some(date.to_string());
                bounds.inclusive_start = false;
            }
            Some("ge") => {
                bounds.start = Some(date.to_string());
                bounds.inclusive_start = true;
            }
            Some("lt") | Some("eb") => {
                bounds.end = Some(date.to_string());
                bounds.inclusive_end = false;
            }
            Some("le") => {
                bounds.end = Some(date.to_string());
                bounds.inclusive_end = true;
            }
            Some("ne") => {
                bounds.negated = Some(date.to_string());
            }
            Some("ap") => {
                // Approximately: widen the point by a day on each side
                match (shift_days(date, -1), shift_days(date, 1)) {
                    (Ok(before), Ok(after)) => {
                        bounds.start = Some(before);
                        bounds.end = Some(after);
                        bounds.inclusive_start = true;
                        bounds.inclusive_end = true;
                    }
                    _ => {
                        warn!(value, "cannot widen approximate date, using exact match");
                        bounds.start = Some(date.to_string());
                        bounds.end = Some(date.to_string());
                    }
                }
            }
            // eq and unprefixed both pin the point
            _ => {
                bounds.start = Some(date.to_string());
                bounds.end = Some(date.to_string());
                bounds.inclusive_start = true;
                bounds.inclusive_end = true;
            }
        }
    }

    let fields = date_fields(resolved, &bounds);
    if fields.is_empty() {
        warn!(param = %resolved, "no date fields to query");
        return None;
    }
    debug!(param = %resolved, ?fields, "date query fields");

    let per_field: Vec<FtsQuery> = fields
        .iter()
        .map(|field| field_query(field, &bounds))
        .collect();
    Some(FtsQuery::disjuncts(per_field))
}

/// Resolve the concrete date fields: union branches are taken as-is (their
/// choice handling happened at expression parse time); single elements go
/// through choice expansion, then Period endpoints are pruned by comparison
/// direction.
fn date_fields(resolved: &ResolvedParam, bounds: &DateBounds) -> Vec<String> {
    let parsed = fhirpath::parse(&resolved.fhir_path, &resolved.resource_type);

    let expanded: Vec<String> = if parsed.is_union && parsed.field_paths.len() > 1 {
        parsed
            .field_paths
            .iter()
            .flat_map(|path| expand_date_paths(&resolved.resource_type, path))
            .collect()
    } else {
        expand_date_paths(&resolved.resource_type, &parsed.primary_field_path)
    };

    let has_start = bounds.start.is_some() || bounds.negated.is_some();
    let has_end = bounds.end.is_some() || bounds.negated.is_some();
    prune_period_paths(expanded, has_start, has_end)
}

fn field_query(field: &str, bounds: &DateBounds) -> FtsQuery {
    if let Some(point) = &bounds.negated {
        // ne: strictly before or strictly after the point
        return FtsQuery::disjuncts(vec![
            FtsQuery::date_range(field).end(point.clone(), false).build(),
            FtsQuery::date_range(field).start(point.clone(), false).build(),
        ]);
    }

    let mut builder = FtsQuery::date_range(field);
    if let Some(start) = &bounds.start {
        builder = builder.start(start.clone(), bounds.inclusive_start);
    }
    if let Some(end) = &bounds.end {
        builder = builder.end(end.clone(), bounds.inclusive_end);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{ParamSource, SearchParamType};

    fn param(resource_type: &str, name: &str, path: &str) -> ResolvedParam {
        ResolvedParam {
            name: name.to_string(),
            modifier: None,
            param_type: SearchParamType::Date,
            fhir_path: format!("{resource_type}.{path}"),
            resource_type: resource_type.to_string(),
            source: ParamSource::Base,
        }
    }

    #[test]
    fn test_equality_pins_both_endpoints() {
        let query = build_date_query(
            &param("Patient", "birthdate", "birthDate"),
            &["1987-02-20".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::DateRange {
                field,
                start,
                end,
                inclusive_start,
                inclusive_end,
            } => {
                assert_eq!(field, "birthDate");
                assert_eq!(start.as_deref(), Some("1987-02-20"));
                assert_eq!(end.as_deref(), Some("1987-02-20"));
                assert!(inclusive_start && inclusive_end);
            }
            other => panic!("expected date range, got {other:?}"),
        }
    }

    #[test]
    fn test_prefixed_pair_builds_closed_range() {
        let query = build_date_query(
            &param("Patient", "birthdate", "birthDate"),
            &["ge1987-01-01".to_string(), "le1987-12-31".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::DateRange { start, end, .. } => {
                assert_eq!(start.as_deref(), Some("1987-01-01"));
                assert_eq!(end.as_deref(), Some("1987-12-31"));
            }
            other => panic!("expected date range, got {other:?}"),
        }
    }

    #[test]
    fn test_gt_is_exclusive() {
        let query = build_date_query(
            &param("Patient", "birthdate", "birthDate"),
            &["gt2000-01-01".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::DateRange {
                start,
                inclusive_start,
                end,
                ..
            } => {
                assert_eq!(start.as_deref(), Some("2000-01-01"));
                assert!(!inclusive_start);
                assert!(end.is_none());
            }
            other => panic!("expected date range, got {other:?}"),
        }
    }

    #[test]
    fn test_choice_type_expands_to_disjunction() {
        let query = build_date_query(
            &param("Observation", "date", "effective[x]"),
            &["2024-01-01".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::Disjunction(parts) => {
                let fields: Vec<&str> = parts
                    .iter()
                    .filter_map(|q| match q {
                        FtsQuery::DateRange { field, .. } => Some(field.as_str()),
                        _ => None,
                    })
                    .collect();
                assert!(fields.contains(&"effectiveDateTime"));
                assert!(fields.contains(&"effectivePeriod.start"));
                assert!(fields.contains(&"effectivePeriod.end"));
            }
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_lower_bound_prunes_period_end() {
        let query = build_date_query(
            &param("Observation", "date", "effective[x]"),
            &["ge2024-01-01".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::Disjunction(parts) => {
                for part in &parts {
                    if let FtsQuery::DateRange { field, .. } = part {
                        assert_ne!(field, "effectivePeriod.end");
                    }
                }
            }
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_period_element_range_keeps_both_endpoints() {
        let query = build_date_query(
            &param("Encounter", "date", "period"),
            &["2024-03-05".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::Disjunction(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_ne_builds_outside_ranges() {
        let query = build_date_query(
            &param("Patient", "birthdate", "birthDate"),
            &["ne1987-02-20".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::Disjunction(parts) => {
                assert_eq!(parts.len(), 2);
            }
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_ap_widens_by_a_day() {
        let query = build_date_query(
            &param("Patient", "birthdate", "birthDate"),
            &["ap1987-02-20".to_string()],
        )
        .unwrap();
        match query {
            FtsQuery::DateRange { start, end, .. } => {
                assert_eq!(start.as_deref(), Some("1987-02-19"));
                assert_eq!(end.as_deref(), Some("1987-02-21"));
            }
            other => panic!("expected date range, got {other:?}"),
        }
    }

    #[test]
    fn test_union_expression_queries_all_branches() {
        let query = build_date_query(
            &param("Condition", "onset-date", "onset[x] | Condition.recordedDate"),
            &["2024-01-01".to_string()],
        );
        // onsetDateTime, onsetPeriod.start, onsetPeriod.end, recordedDate
        match query.unwrap() {
            FtsQuery::Disjunction(parts) => assert_eq!(parts.len(), 4),
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_values_build_nothing() {
        assert!(build_date_query(&param("Patient", "birthdate", "birthDate"), &[]).is_none());
    }
}

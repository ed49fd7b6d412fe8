//! Query-string parsing.
//!
//! Decodes an `application/x-www-form-urlencoded` query into a parameter
//! map. Both names and values are URL-decoded here, before any `_has`
//! detection or resolution happens; comma-separated values split into OR
//! alternatives per FHIR search rules.

use std::collections::HashMap;
use url::form_urlencoded;

/// Parameter name -> values, preserving repeats.
pub type ParamMap = HashMap<String, Vec<String>>;

/// Parse a raw query string. A leading `?` is tolerated. Empty values are
/// dropped.
pub fn parse_query_string(query: &str) -> ParamMap {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut params: ParamMap = HashMap::new();
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            params
                .entry(name.to_string())
                .or_default()
                .push(part.to_string());
        }
    }
    params
}

/// Extract the FHIR search prefix from a value, if present.
/// Prefixes are exactly two lowercase letters from the fixed set.
pub fn split_prefix(value: &str) -> (Option<&str>, &str) {
    const PREFIXES: [&str; 9] = ["eq", "ne", "gt", "lt", "ge", "le", "sa", "eb", "ap"];
    if value.len() >= 2 {
        let head = &value[..2];
        if PREFIXES.contains(&head) {
            return (Some(head), &value[2..]);
        }
    }
    (None, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_parsing() {
        let params = parse_query_string("name=Smith&birthdate=ge1990-01-01");
        assert_eq!(params["name"], vec!["Smith"]);
        assert_eq!(params["birthdate"], vec!["ge1990-01-01"]);
    }

    #[test]
    fn test_repeated_parameters_accumulate() {
        let params = parse_query_string("birthdate=ge1987-01-01&birthdate=le1987-12-31");
        assert_eq!(params["birthdate"].len(), 2);
    }

    #[test]
    fn test_comma_splits_into_or_values() {
        let params = parse_query_string("gender=male,female");
        assert_eq!(params["gender"], vec!["male", "female"]);
    }

    #[test]
    fn test_names_and_values_are_decoded() {
        let params = parse_query_string("_has%3AObservation%3Asubject%3Acode=123%7C456");
        assert_eq!(params["_has:Observation:subject:code"], vec!["123|456"]);
    }

    #[test]
    fn test_leading_question_mark_tolerated() {
        let params = parse_query_string("?name=Smith");
        assert_eq!(params["name"], vec!["Smith"]);
    }

    #[test]
    fn test_empty_values_dropped() {
        let params = parse_query_string("name=&gender=male");
        assert!(!params.contains_key("name"));
        assert_eq!(params["gender"], vec!["male"]);
    }

    #[test]
    fn test_plus_decodes_to_space() {
        let params = parse_query_string("name=John+Doe");
        assert_eq!(params["name"], vec!["John Doe"]);
    }

    #[test]
    fn test_split_prefix() {
        assert_eq!(split_prefix("ge1990-01-01"), (Some("ge"), "1990-01-01"));
        assert_eq!(split_prefix("1990-01-01"), (None, "1990-01-01"));
        assert_eq!(split_prefix("le5.4"), (Some("le"), "5.4"));
        // "female" does not start with a valid prefix
        assert_eq!(split_prefix("female"), (None, "female"));
    }
}

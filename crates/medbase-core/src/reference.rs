//! FHIR reference parsing and traversal.
//!
//! References appear as `{"reference": "<Type>/<id>"}` objects anywhere in a
//! resource. Bundle processing rewrites them in place; reverse chaining reads
//! them out. Both work through [`for_each_reference`].

use serde_json::Value;

/// A parsed reference target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    /// Resource type when the reference is `Type/id` or an absolute URL
    /// ending in `Type/id`.
    pub resource_type: Option<String>,
    /// The id portion.
    pub id: String,
    /// Set when the reference was an absolute URL.
    pub url: Option<String>,
}

impl ParsedReference {
    /// The `"<Type>/<id>"` form, when the type is known.
    pub fn local_key(&self) -> Option<String> {
        self.resource_type
            .as_ref()
            .map(|rt| format!("{rt}/{}", self.id))
    }
}

/// Parse a reference value: `Type/id`, a bare `id`, or an absolute URL.
pub fn parse_reference(value: &str) -> Option<ParsedReference> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        let mut segments = value.rsplit('/');
        let id = segments.next()?.to_string();
        let resource_type = segments.next().map(str::to_string);
        return Some(ParsedReference {
            resource_type,
            id,
            url: Some(value.to_string()),
        });
    }

    match value.split_once('/') {
        Some((resource_type, id)) if !resource_type.is_empty() && !id.is_empty() => {
            Some(ParsedReference {
                resource_type: Some(resource_type.to_string()),
                id: id.to_string(),
                url: None,
            })
        }
        Some(_) => None,
        None => Some(ParsedReference {
            resource_type: None,
            id: value.to_string(),
            url: None,
        }),
    }
}

/// Visit every `Reference.reference` string in a resource, depth-first.
///
/// The callback receives a mutable borrow so callers can rewrite references
/// in place (Bundle `urn:uuid:` resolution) or just inspect them.
pub fn for_each_reference<F>(resource: &mut Value, f: &mut F)
where
    F: FnMut(&mut String),
{
    match resource {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get_mut("reference") {
                f(reference);
            }
            for (_, child) in map.iter_mut() {
                for_each_reference(child, f);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                for_each_reference(item, f);
            }
        }
        _ => {}
    }
}

/// Collect every reference string found under the given top-level element.
pub fn collect_references(resource: &Value, element: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(node) = resource.get(element) {
        let mut node = node.clone();
        for_each_reference(&mut node, &mut |reference| {
            out.push(reference.clone());
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_local_reference() {
        let parsed = parse_reference("Patient/example").unwrap();
        assert_eq!(parsed.resource_type.as_deref(), Some("Patient"));
        assert_eq!(parsed.id, "example");
        assert_eq!(parsed.local_key().unwrap(), "Patient/example");
        assert!(parsed.url.is_none());
    }

    #[test]
    fn test_parse_bare_id() {
        let parsed = parse_reference("example").unwrap();
        assert!(parsed.resource_type.is_none());
        assert_eq!(parsed.id, "example");
    }

    #[test]
    fn test_parse_absolute_url() {
        let parsed = parse_reference("https://fhir.example.com/r4/Patient/p1").unwrap();
        assert_eq!(parsed.resource_type.as_deref(), Some("Patient"));
        assert_eq!(parsed.id, "p1");
        assert!(parsed.url.is_some());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(parse_reference("").is_none());
        assert!(parse_reference("Patient/").is_none());
        assert!(parse_reference("/123").is_none());
    }

    #[test]
    fn test_for_each_reference_rewrites_nested() {
        let mut patient = json!({
            "resourceType": "Patient",
            "managingOrganization": { "reference": "urn:uuid:org1" },
            "contact": [
                { "organization": { "reference": "urn:uuid:org1" } },
                { "organization": { "reference": "Organization/other" } }
            ]
        });

        for_each_reference(&mut patient, &mut |reference| {
            if reference == "urn:uuid:org1" {
                *reference = "Organization/org1".to_string();
            }
        });

        assert_eq!(
            patient["managingOrganization"]["reference"],
            "Organization/org1"
        );
        assert_eq!(
            patient["contact"][0]["organization"]["reference"],
            "Organization/org1"
        );
        assert_eq!(
            patient["contact"][1]["organization"]["reference"],
            "Organization/other"
        );
    }

    #[test]
    fn test_collect_references() {
        let observation = json!({
            "resourceType": "Observation",
            "subject": { "reference": "Patient/p1" },
            "performer": [{ "reference": "Practitioner/d1" }]
        });

        assert_eq!(
            collect_references(&observation, "subject"),
            vec!["Patient/p1"]
        );
        assert_eq!(
            collect_references(&observation, "performer"),
            vec!["Practitioner/d1"]
        );
        assert!(collect_references(&observation, "encounter").is_empty());
    }
}

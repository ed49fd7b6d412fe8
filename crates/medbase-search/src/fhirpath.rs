//! Mini-parser for the FHIRPath subset used in search parameter expressions.
//!
//! Handles simple paths (`Patient.name.family`), choice types
//! (`Observation.value[x]`), unions (`a | b`), `.where(...)` filters (the
//! filter is dropped), `as`/`ofType` casts, and extension selectors
//! (`extension('url').value[x]`). Anything else degrades to the raw element
//! name with a warning, never an error.

use tracing::warn;

/// The parsed form of a search parameter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExpression {
    /// The first (or only) field path, relative to the resource root.
    pub primary_field_path: String,
    /// All field paths; more than one for unions.
    pub field_paths: Vec<String>,
    /// True when the expression was a union (`a | b`).
    pub is_union: bool,
    /// True when any branch ended in a `[x]` choice marker.
    pub is_choice: bool,
    /// True for `extension('url')...` selectors.
    pub is_extension: bool,
    /// The extension URL when `is_extension`.
    pub extension_url: Option<String>,
    /// The value field inside the extension, e.g. `value[x]` or
    /// `valueCodeableConcept`.
    pub extension_value_field: Option<String>,
}

impl ParsedExpression {
    fn single(path: String, is_choice: bool) -> Self {
        Self {
            primary_field_path: path.clone(),
            field_paths: vec![path],
            is_union: false,
            is_choice,
            is_extension: false,
            extension_url: None,
            extension_value_field: None,
        }
    }
}

/// Parse an expression for one resource type. The `Type.` prefix is stripped
/// per union branch; branches for other resource types are skipped.
pub fn parse(expression: &str, resource_type: &str) -> ParsedExpression {
    let expression = expression.trim();

    // Extension selector: Patient.extension('url').value[x]
    if let Some(parsed) = parse_extension(expression, resource_type) {
        return parsed;
    }

    let branches: Vec<&str> = expression.split('|').map(str::trim).collect();
    if branches.len() > 1 {
        let mut field_paths = Vec::new();
        let mut is_choice = false;
        for branch in &branches {
            if let Some(path) = parse_branch(branch, resource_type) {
                is_choice |= path.was_choice;
                field_paths.push(path.path);
            }
        }
        if field_paths.is_empty() {
            warn!(expression, "no usable union branch, using raw element name");
            return ParsedExpression::single(raw_element_name(expression), false);
        }
        return ParsedExpression {
            primary_field_path: field_paths[0].clone(),
            field_paths,
            is_union: true,
            is_choice,
            is_extension: false,
            extension_url: None,
            extension_value_field: None,
        };
    }

    match parse_branch(expression, resource_type) {
        Some(path) => ParsedExpression::single(path.path, path.was_choice),
        None => {
            warn!(expression, "unparseable expression, using raw element name");
            ParsedExpression::single(raw_element_name(expression), false)
        }
    }
}

struct BranchPath {
    path: String,
    was_choice: bool,
}

/// Parse one union branch into a dotted field path.
fn parse_branch(branch: &str, resource_type: &str) -> Option<BranchPath> {
    let mut branch = branch.trim();

    // Parenthesized casts: (Observation.value as dateTime)
    if branch.starts_with('(') && branch.ends_with(')') {
        branch = &branch[1..branch.len() - 1];
    }

    // `x as Type` concretizes the choice element: value as dateTime -> valueDateTime
    if let Some((path_part, cast)) = branch.split_once(" as ") {
        let base = strip_resource_prefix(path_part.trim(), resource_type)?;
        let base = drop_function_calls(&base);
        return Some(BranchPath {
            path: concretize_choice(&base, cast.trim()),
            was_choice: false,
        });
    }

    let stripped = strip_resource_prefix(branch, resource_type)?;
    let mut path = drop_function_calls(&stripped);

    // `.ofType(Type)` behaves like a cast on the preceding element
    if let Some(index) = stripped.find(".ofType(") {
        let base = drop_function_calls(&stripped[..index]);
        let rest = &stripped[index + ".ofType(".len()..];
        if let Some(close) = rest.find(')') {
            return Some(BranchPath {
                path: concretize_choice(&base, &rest[..close]),
                was_choice: false,
            });
        }
    }

    let was_choice = path.ends_with("[x]");
    if was_choice {
        path.truncate(path.len() - 3);
    }
    if path.is_empty() {
        return None;
    }
    Some(BranchPath { path, was_choice })
}

/// Strip the leading `Type.` prefix; `None` when the branch targets a
/// different resource type.
fn strip_resource_prefix(branch: &str, resource_type: &str) -> Option<String> {
    let (head, rest) = branch.split_once('.')?;
    if head == resource_type || head == "Resource" || head == "DomainResource" {
        Some(rest.to_string())
    } else if head.chars().next().is_some_and(char::is_uppercase) {
        // A branch for some other resource type in a shared expression
        None
    } else {
        // Already relative
        Some(branch.to_string())
    }
}

/// Remove `.where(...)` and other call segments from a dotted path.
fn drop_function_calls(path: &str) -> String {
    path.split('.')
        .take_while(|segment| !segment.contains('('))
        .collect::<Vec<_>>()
        .join(".")
}

/// `value` + `dateTime` -> `valueDateTime`; nested paths keep their prefix.
fn concretize_choice(base: &str, cast: &str) -> String {
    let mut capitalized = String::new();
    let mut chars = cast.chars();
    if let Some(first) = chars.next() {
        capitalized.push(first.to_ascii_uppercase());
        capitalized.extend(chars);
    }
    match base.rsplit_once('.') {
        Some((prefix, last)) => format!("{prefix}.{last}{capitalized}"),
        None => format!("{base}{capitalized}"),
    }
}

fn raw_element_name(expression: &str) -> String {
    expression
        .rsplit('.')
        .next()
        .unwrap_or(expression)
        .trim()
        .to_string()
}

fn parse_extension(expression: &str, resource_type: &str) -> Option<ParsedExpression> {
    let relative = strip_resource_prefix(expression, resource_type)
        .unwrap_or_else(|| expression.to_string());
    let rest = relative.strip_prefix("extension(")?;
    let close = rest.find(')')?;
    let url = rest[..close].trim_matches(|c| c == '\'' || c == '"').to_string();
    let value_field = rest[close + 1..].trim_start_matches('.').to_string();

    let is_choice = value_field.ends_with("[x]");
    let value_field = if value_field.is_empty() {
        None
    } else {
        Some(value_field)
    };

    Some(ParsedExpression {
        primary_field_path: "extension".to_string(),
        field_paths: vec!["extension".to_string()],
        is_union: false,
        is_choice,
        is_extension: true,
        extension_url: Some(url),
        extension_value_field: value_field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        let parsed = parse("Patient.name.family", "Patient");
        assert_eq!(parsed.primary_field_path, "name.family");
        assert!(!parsed.is_union);
        assert!(!parsed.is_choice);
        assert!(!parsed.is_extension);
    }

    #[test]
    fn test_choice_marker() {
        let parsed = parse("Observation.effective[x]", "Observation");
        assert_eq!(parsed.primary_field_path, "effective");
        assert!(parsed.is_choice);
    }

    #[test]
    fn test_union_expression() {
        let parsed = parse(
            "Condition.onset[x] | Condition.recordedDate",
            "Condition",
        );
        assert!(parsed.is_union);
        assert_eq!(parsed.field_paths, vec!["onset", "recordedDate"]);
        assert_eq!(parsed.primary_field_path, "onset");
        assert!(parsed.is_choice);
    }

    #[test]
    fn test_union_skips_other_resource_types() {
        let parsed = parse(
            "Patient.birthDate | Person.birthDate",
            "Patient",
        );
        assert!(parsed.is_union);
        assert_eq!(parsed.field_paths, vec!["birthDate"]);
    }

    #[test]
    fn test_where_clause_is_dropped() {
        let parsed = parse(
            "Observation.subject.where(resolve() is Patient)",
            "Observation",
        );
        assert_eq!(parsed.primary_field_path, "subject");
    }

    #[test]
    fn test_as_cast_concretizes_choice() {
        let parsed = parse("(Observation.value as dateTime)", "Observation");
        assert_eq!(parsed.primary_field_path, "valueDateTime");
    }

    #[test]
    fn test_of_type_cast() {
        let parsed = parse("Observation.value.ofType(Quantity)", "Observation");
        assert_eq!(parsed.primary_field_path, "valueQuantity");
    }

    #[test]
    fn test_extension_selector() {
        let parsed = parse(
            "Patient.extension('http://example.org/race').value[x]",
            "Patient",
        );
        assert!(parsed.is_extension);
        assert_eq!(
            parsed.extension_url.as_deref(),
            Some("http://example.org/race")
        );
        assert_eq!(parsed.extension_value_field.as_deref(), Some("value[x]"));
        assert!(parsed.is_choice);
    }

    #[test]
    fn test_unknown_construct_degrades_to_element_name() {
        let parsed = parse("Patient.name.first().family", "Patient");
        // first() cuts the path at the call; never an error
        assert_eq!(parsed.primary_field_path, "name");
    }

    #[test]
    fn test_relative_path_without_prefix() {
        let parsed = parse("Patient.birthDate", "Patient");
        assert_eq!(parsed.primary_field_path, "birthDate");
    }
}

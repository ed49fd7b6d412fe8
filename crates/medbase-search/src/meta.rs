//! FHIR structure metadata driving query building.
//!
//! Choice-type variants, Period elements, and element kinds come from this
//! table rather than hard-coded paths in the builders: the date builder
//! walks it to enumerate `effective[x]`-style variants and expand `Period`
//! elements to `.start`/`.end`, and the token/string builders use it to pick
//! the concrete sub-fields of complex datatypes.

/// Date-bearing datatypes a choice element can concretize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Date,
    DateTime,
    Instant,
    Period,
}

/// One concrete variant of a choice element.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceVariant {
    pub field_name: &'static str,
    pub kind: DateKind,
}

/// Choice elements (`element[x]`) with their date-bearing variants.
/// Non-date variants (e.g. `valueString`) are intentionally absent: the
/// date builder only expands to fields a date range can hit.
const CHOICE_ELEMENTS: &[(&str, &str, &[ChoiceVariant])] = &[
    (
        "Observation",
        "effective",
        &[
            ChoiceVariant { field_name: "effectiveDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "effectiveInstant", kind: DateKind::Instant },
            ChoiceVariant { field_name: "effectivePeriod", kind: DateKind::Period },
        ],
    ),
    (
        "Observation",
        "value",
        &[
            ChoiceVariant { field_name: "valueDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "valuePeriod", kind: DateKind::Period },
        ],
    ),
    (
        "Condition",
        "onset",
        &[
            ChoiceVariant { field_name: "onsetDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "onsetPeriod", kind: DateKind::Period },
        ],
    ),
    (
        "Condition",
        "abatement",
        &[
            ChoiceVariant { field_name: "abatementDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "abatementPeriod", kind: DateKind::Period },
        ],
    ),
    (
        "Patient",
        "deceased",
        &[ChoiceVariant { field_name: "deceasedDateTime", kind: DateKind::DateTime }],
    ),
    (
        "Procedure",
        "performed",
        &[
            ChoiceVariant { field_name: "performedDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "performedPeriod", kind: DateKind::Period },
        ],
    ),
    (
        "DiagnosticReport",
        "effective",
        &[
            ChoiceVariant { field_name: "effectiveDateTime", kind: DateKind::DateTime },
            ChoiceVariant { field_name: "effectivePeriod", kind: DateKind::Period },
        ],
    ),
    (
        "Immunization",
        "occurrence",
        &[ChoiceVariant { field_name: "occurrenceDateTime", kind: DateKind::DateTime }],
    ),
];

/// Elements that are Period datatypes directly (no `[x]`).
const PERIOD_ELEMENTS: &[(&str, &str)] = &[
    ("Encounter", "period"),
    ("Group", "member.period"),
    ("DocumentReference", "context.period"),
];

/// Concrete sub-field layout of complex datatypes the token builder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenElementKind {
    /// A bare `code`, `boolean`, or primitive field; matched directly.
    Code,
    /// A `CodeableConcept`; code at `.coding.code`, system at
    /// `.coding.system`.
    CodeableConcept,
    /// An `Identifier`; value at `.value`, system at `.system`.
    Identifier,
    /// A `Coding`; code at `.code`, system at `.system`.
    Coding,
    /// A `ContactPoint`; value at `.value`, system is the channel kind.
    ContactPoint,
}

const TOKEN_ELEMENTS: &[(&str, &str, TokenElementKind)] = &[
    ("Observation", "code", TokenElementKind::CodeableConcept),
    ("Observation", "category", TokenElementKind::CodeableConcept),
    ("Observation", "valueCodeableConcept", TokenElementKind::CodeableConcept),
    ("Condition", "code", TokenElementKind::CodeableConcept),
    ("Condition", "clinicalStatus", TokenElementKind::CodeableConcept),
    ("Procedure", "code", TokenElementKind::CodeableConcept),
    ("DiagnosticReport", "code", TokenElementKind::CodeableConcept),
    ("Immunization", "vaccineCode", TokenElementKind::CodeableConcept),
    ("Encounter", "class", TokenElementKind::Coding),
    ("Patient", "identifier", TokenElementKind::Identifier),
    ("Observation", "identifier", TokenElementKind::Identifier),
    ("Encounter", "identifier", TokenElementKind::Identifier),
    ("Condition", "identifier", TokenElementKind::Identifier),
    ("Organization", "identifier", TokenElementKind::Identifier),
    ("Practitioner", "identifier", TokenElementKind::Identifier),
    ("Group", "identifier", TokenElementKind::Identifier),
    ("Patient", "telecom", TokenElementKind::ContactPoint),
];

/// String parameters on complex datatypes search a disjunction of their
/// text-bearing sub-fields.
const STRING_EXPANSIONS: &[(&str, &[&str])] = &[
    ("name", &["name.family", "name.given", "name.text"]),
    (
        "address",
        &["address.line", "address.city", "address.state", "address.postalCode"],
    ),
];

/// Look up the date-bearing variants of a choice element.
pub fn choice_variants(resource_type: &str, element: &str) -> Option<&'static [ChoiceVariant]> {
    CHOICE_ELEMENTS
        .iter()
        .find(|(rt, el, _)| *rt == resource_type && *el == element)
        .map(|(_, _, variants)| *variants)
}

/// Whether an element is a direct Period datatype.
pub fn is_period_element(resource_type: &str, element: &str) -> bool {
    PERIOD_ELEMENTS
        .iter()
        .any(|(rt, el)| *rt == resource_type && *el == element)
}

/// Token sub-field layout for an element; defaults to a bare code.
pub fn token_element_kind(resource_type: &str, element: &str) -> TokenElementKind {
    TOKEN_ELEMENTS
        .iter()
        .find(|(rt, el, _)| *rt == resource_type && *el == element)
        .map(|(_, _, kind)| *kind)
        .unwrap_or(TokenElementKind::Code)
}

/// Expanded text fields for a string parameter path, when the path names a
/// complex element like `name` or `address`.
pub fn string_fields(path: &str) -> Vec<String> {
    STRING_EXPANSIONS
        .iter()
        .find(|(el, _)| *el == path)
        .map(|(_, fields)| fields.iter().map(|f| f.to_string()).collect())
        .unwrap_or_else(|| vec![path.to_string()])
}

/// Expand an element to its concrete date field paths.
///
/// Choice elements expand to every date-bearing variant; Period variants and
/// direct Period elements further expand to `.start` and `.end`.
pub fn expand_date_paths(resource_type: &str, element: &str) -> Vec<String> {
    if let Some(variants) = choice_variants(resource_type, element) {
        let mut paths = Vec::new();
        for variant in variants {
            match variant.kind {
                DateKind::Period => {
                    paths.push(format!("{}.start", variant.field_name));
                    paths.push(format!("{}.end", variant.field_name));
                }
                _ => paths.push(variant.field_name.to_string()),
            }
        }
        return paths;
    }
    if is_period_element(resource_type, element) {
        return vec![format!("{element}.start"), format!("{element}.end")];
    }
    vec![element.to_string()]
}

/// Prune Period sub-fields by comparison direction:
/// `gt`/`ge` (start-only bound) keeps `.start`, `lt`/`le` (end-only bound)
/// keeps `.end`, equality and two-sided ranges keep both. Non-Period fields
/// always survive.
pub fn prune_period_paths(paths: Vec<String>, has_start: bool, has_end: bool) -> Vec<String> {
    paths
        .into_iter()
        .filter(|path| {
            let is_start = path.ends_with(".start");
            let is_end = path.ends_with(".end");
            if !is_start && !is_end {
                return true;
            }
            if has_start && !has_end {
                return is_start;
            }
            if has_end && !has_start {
                return is_end;
            }
            true
        })
        .collect()
}

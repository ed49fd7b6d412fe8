//! Full-text-search query model.
//!
//! Query builders emit fragments of this AST; backends either execute it
//! natively or embed its JSON export inside a `SEARCH(...)` predicate of a
//! SQL-like query. The export format mirrors the index server's wire shape.

use serde_json::{json, Value};

/// One node of a full-text-search query.
#[derive(Debug, Clone, PartialEq)]
pub enum FtsQuery {
    /// Exact, non-analyzed term match on a field.
    Term { field: String, term: String },
    /// Analyzed match on a field.
    Match { field: String, value: String },
    /// Prefix match on a field.
    Prefix { field: String, prefix: String },
    /// Wildcard match (`*` matches any run of characters).
    Wildcard { field: String, wildcard: String },
    /// Date range with per-endpoint inclusivity; open endpoints are `None`.
    DateRange {
        field: String,
        start: Option<String>,
        end: Option<String>,
        inclusive_start: bool,
        inclusive_end: bool,
    },
    /// Numeric range with per-endpoint inclusivity.
    NumericRange {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
        inclusive_min: bool,
        inclusive_max: bool,
    },
    /// All children must match.
    Conjunction(Vec<FtsQuery>),
    /// At least one child must match.
    Disjunction(Vec<FtsQuery>),
    /// Matches every document.
    MatchAll,
    /// Matches nothing.
    MatchNone,
}

impl FtsQuery {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn match_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn wildcard(field: impl Into<String>, wildcard: impl Into<String>) -> Self {
        Self::Wildcard {
            field: field.into(),
            wildcard: wildcard.into(),
        }
    }

    /// Substring match, expressed as a `*value*` wildcard.
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::Wildcard {
            field: field.into(),
            wildcard: format!("*{value}*"),
        }
    }

    pub fn date_range(field: impl Into<String>) -> DateRangeBuilder {
        DateRangeBuilder {
            field: field.into(),
            start: None,
            end: None,
            inclusive_start: true,
            inclusive_end: true,
        }
    }

    pub fn numeric_range(field: impl Into<String>) -> NumericRangeBuilder {
        NumericRangeBuilder {
            field: field.into(),
            min: None,
            max: None,
            inclusive_min: true,
            inclusive_max: true,
        }
    }

    /// AND across queries; collapses trivial cases.
    pub fn conjuncts(mut queries: Vec<FtsQuery>) -> Self {
        match queries.len() {
            0 => Self::MatchAll,
            1 => queries.remove(0),
            _ => Self::Conjunction(queries),
        }
    }

    /// OR across queries; collapses trivial cases.
    pub fn disjuncts(mut queries: Vec<FtsQuery>) -> Self {
        match queries.len() {
            0 => Self::MatchNone,
            1 => queries.remove(0),
            _ => Self::Disjunction(queries),
        }
    }

    /// Export as the index server's JSON query shape.
    pub fn export(&self) -> Value {
        match self {
            Self::Term { field, term } => json!({ "term": term, "field": field }),
            Self::Match { field, value } => json!({ "match": value, "field": field }),
            Self::Prefix { field, prefix } => json!({ "prefix": prefix, "field": field }),
            Self::Wildcard { field, wildcard } => {
                json!({ "wildcard": wildcard, "field": field })
            }
            Self::DateRange {
                field,
                start,
                end,
                inclusive_start,
                inclusive_end,
            } => {
                let mut obj = json!({ "field": field });
                if let Some(start) = start {
                    obj["start"] = json!(start);
                    obj["inclusive_start"] = json!(inclusive_start);
                }
                if let Some(end) = end {
                    obj["end"] = json!(end);
                    obj["inclusive_end"] = json!(inclusive_end);
                }
                obj
            }
            Self::NumericRange {
                field,
                min,
                max,
                inclusive_min,
                inclusive_max,
            } => {
                let mut obj = json!({ "field": field });
                if let Some(min) = min {
                    obj["min"] = json!(min);
                    obj["inclusive_min"] = json!(inclusive_min);
                }
                if let Some(max) = max {
                    obj["max"] = json!(max);
                    obj["inclusive_max"] = json!(inclusive_max);
                }
                obj
            }
            Self::Conjunction(children) => {
                json!({ "conjuncts": children.iter().map(Self::export).collect::<Vec<_>>() })
            }
            Self::Disjunction(children) => {
                json!({ "disjuncts": children.iter().map(Self::export).collect::<Vec<_>>() })
            }
            Self::MatchAll => json!({ "match_all": {} }),
            Self::MatchNone => json!({ "match_none": {} }),
        }
    }
}

/// Builder for [`FtsQuery::DateRange`].
pub struct DateRangeBuilder {
    field: String,
    start: Option<String>,
    end: Option<String>,
    inclusive_start: bool,
    inclusive_end: bool,
}

impl DateRangeBuilder {
    pub fn start(mut self, start: impl Into<String>, inclusive: bool) -> Self {
        self.start = Some(start.into());
        self.inclusive_start = inclusive;
        self
    }

    pub fn end(mut self, end: impl Into<String>, inclusive: bool) -> Self {
        self.end = Some(end.into());
        self.inclusive_end = inclusive;
        self
    }

    pub fn build(self) -> FtsQuery {
        FtsQuery::DateRange {
            field: self.field,
            start: self.start,
            end: self.end,
            inclusive_start: self.inclusive_start,
            inclusive_end: self.inclusive_end,
        }
    }
}

/// Builder for [`FtsQuery::NumericRange`].
pub struct NumericRangeBuilder {
    field: String,
    min: Option<f64>,
    max: Option<f64>,
    inclusive_min: bool,
    inclusive_max: bool,
}

impl NumericRangeBuilder {
    pub fn min(mut self, min: f64, inclusive: bool) -> Self {
        self.min = Some(min);
        self.inclusive_min = inclusive;
        self
    }

    pub fn max(mut self, max: f64, inclusive: bool) -> Self {
        self.max = Some(max);
        self.inclusive_max = inclusive;
        self
    }

    pub fn build(self) -> FtsQuery {
        FtsQuery::NumericRange {
            field: self.field,
            min: self.min,
            max: self.max,
            inclusive_min: self.inclusive_min,
            inclusive_max: self.inclusive_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_export() {
        let q = FtsQuery::term("gender", "male");
        assert_eq!(q.export(), json!({ "term": "male", "field": "gender" }));
    }

    #[test]
    fn test_date_range_export_open_end() {
        let q = FtsQuery::date_range("birthDate")
            .start("1990-01-01", true)
            .build();
        let exported = q.export();
        assert_eq!(exported["start"], "1990-01-01");
        assert_eq!(exported["inclusive_start"], true);
        assert!(exported.get("end").is_none());
    }

    #[test]
    fn test_conjuncts_collapse() {
        assert_eq!(FtsQuery::conjuncts(vec![]), FtsQuery::MatchAll);

        let single = FtsQuery::conjuncts(vec![FtsQuery::term("a", "b")]);
        assert_eq!(single, FtsQuery::term("a", "b"));

        let pair = FtsQuery::conjuncts(vec![FtsQuery::term("a", "b"), FtsQuery::term("c", "d")]);
        assert!(matches!(pair, FtsQuery::Conjunction(ref v) if v.len() == 2));
    }

    #[test]
    fn test_disjuncts_collapse() {
        assert_eq!(FtsQuery::disjuncts(vec![]), FtsQuery::MatchNone);
        let pair = FtsQuery::disjuncts(vec![FtsQuery::term("a", "b"), FtsQuery::term("c", "d")]);
        assert_eq!(pair.export()["disjuncts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_contains_builds_wildcard() {
        let q = FtsQuery::contains("name.family", "mit");
        assert_eq!(
            q.export(),
            json!({ "wildcard": "*mit*", "field": "name.family" })
        );
    }

    #[test]
    fn test_numeric_range_export() {
        let q = FtsQuery::numeric_range("valueQuantity.value")
            .min(5.0, true)
            .max(10.0, false)
            .build();
        let exported = q.export();
        assert_eq!(exported["min"], 5.0);
        assert_eq!(exported["inclusive_min"], true);
        assert_eq!(exported["max"], 10.0);
        assert_eq!(exported["inclusive_max"], false);
    }
}

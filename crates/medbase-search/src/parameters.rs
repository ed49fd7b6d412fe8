//! Search parameter types and resolved-parameter model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIR R4 SearchParameter type enumeration.
/// See: <https://hl7.org/fhir/R4/search.html#table>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Composite,
    Quantity,
    Uri,
    Special,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Composite => "composite",
            Self::Quantity => "quantity",
            Self::Uri => "uri",
            Self::Special => "special",
        };
        f.write_str(s)
    }
}

/// Where a parameter definition came from. Base definitions win over IG
/// definitions of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Base FHIR R4 specification.
    Base,
    /// A configured Implementation Guide (e.g. US Core).
    Ig,
    /// Locally defined.
    Custom,
}

/// Search modifiers applied as a suffix to the parameter name
/// (`name:modifier`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Exact,
    Contains,
    Text,
    Missing,
    Identifier,
    Type(String),
}

impl SearchModifier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "text" => Some(Self::Text),
            "missing" => Some(Self::Missing),
            "identifier" => Some(Self::Identifier),
            other if !other.is_empty() => Some(Self::Type(other.to_string())),
            _ => None,
        }
    }
}

/// A search parameter definition as registered (base spec or IG).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParamDef {
    /// Parameter code, e.g. `birthdate`.
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: SearchParamType,
    /// FHIRPath expression, e.g. `Patient.birthDate` or a union.
    pub expression: String,
    /// Resource types this parameter applies to. `Resource` marks a common
    /// parameter applicable everywhere.
    pub base: Vec<String>,
    pub source: ParamSource,
}

impl SearchParamDef {
    pub fn new(
        name: impl Into<String>,
        param_type: SearchParamType,
        expression: impl Into<String>,
        base: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            expression: expression.into(),
            base,
            source: ParamSource::Base,
        }
    }

    pub fn with_source(mut self, source: ParamSource) -> Self {
        self.source = source;
        self
    }

    /// True when the definition applies to every resource type.
    pub fn is_common(&self) -> bool {
        self.base.iter().any(|b| b == "Resource" || b == "DomainResource")
    }
}

/// A parameter resolved for a concrete resource type, ready for query
/// building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParam {
    pub name: String,
    pub modifier: Option<SearchModifier>,
    pub param_type: SearchParamType,
    /// The FHIRPath expression from the winning definition.
    pub fhir_path: String,
    pub resource_type: String,
    pub source: ParamSource,
}

impl ResolvedParam {
    pub fn has_modifier(&self) -> bool {
        self.modifier.is_some()
    }

    pub fn is_from_ig(&self) -> bool {
        self.source == ParamSource::Ig
    }
}

impl fmt::Display for ResolvedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}, {:?})",
            self.resource_type, self.name, self.param_type, self.source
        )
    }
}

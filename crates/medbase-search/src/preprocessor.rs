//! Pre-flight validation of search parameters.
//!
//! Runs before any query building: unknown names, malformed values, and
//! logically impossible combinations are rejected with an
//! `OperationOutcome`-convertible error so the query never executes on bad
//! input.

use tracing::debug;

use crate::error::{SearchError, SearchResult};
use crate::parameters::SearchParamType;
use crate::parser::{split_prefix, ParamMap};
use crate::registry::ParameterResolver;
use medbase_core::time::is_valid_search_date;

/// Framework parameters that bypass resolution (tenant-routing hints).
const FRAMEWORK_PARAMS: &[&str] = &["connectionName", "bucketName"];

/// Token parameters that are semantically single-valued; multiple distinct
/// codes can never match one resource.
const SINGLE_VALUE_TOKEN_PARAMS: &[&str] = &["gender", "active", "deceased"];

/// Validate all parameters of a search request.
///
/// # Errors
/// - `UnknownParameter` for names neither base nor IG definitions know
/// - `InvalidParameterValue` for malformed values per the parameter type
/// - `UnsupportedCombination` for conflicting repeated values
pub fn validate(
    resolver: &ParameterResolver,
    resource_type: &str,
    params: &ParamMap,
) -> SearchResult<()> {
    debug!(resource_type, count = params.len(), "validating search parameters");

    for (raw_name, values) in params {
        if is_exempt(raw_name) {
            continue;
        }

        // Existence (resolver fails with UnknownParameter)
        let resolved = resolver.resolve(resource_type, raw_name)?;

        // Per-value format checks
        for value in values {
            validate_value_format(resolved.param_type, raw_name, value)?;
        }

        // Cross-value consistency
        if values.len() > 1 {
            validate_repeated_values(resolved.param_type, raw_name, values)?;
        }
    }
    Ok(())
}

/// Control parameters (leading `_`, including `_has:...`) and the framework
/// whitelist skip resolution entirely.
fn is_exempt(name: &str) -> bool {
    name.starts_with('_') || FRAMEWORK_PARAMS.contains(&name)
}

fn validate_value_format(
    param_type: SearchParamType,
    param: &str,
    value: &str,
) -> SearchResult<()> {
    match param_type {
        SearchParamType::Date => {
            let (_, date) = split_prefix(value);
            if !is_valid_search_date(date) {
                return Err(SearchError::invalid_value(
                    param,
                    value,
                    "YYYY-MM-DD or RFC 3339 datetime, optionally prefixed with eq|ne|gt|lt|ge|le|sa|eb|ap",
                ));
            }
        }
        SearchParamType::Number => {
            let (_, number) = split_prefix(value);
            if number.parse::<f64>().is_err() {
                return Err(SearchError::invalid_value(
                    param,
                    value,
                    "numeric value, optionally prefixed with eq|ne|gt|lt|ge|le",
                ));
            }
        }
        SearchParamType::Token => {
            // code, system|code, |code, system| — both sides empty is malformed
            if let Some((system, code)) = value.split_once('|') {
                if system.trim().is_empty() && code.trim().is_empty() {
                    return Err(SearchError::invalid_value(param, value, "code or system|code"));
                }
            }
        }
        SearchParamType::Reference => {
            if let Some((head, tail)) = value.split_once('/') {
                let is_url = value.starts_with("http://") || value.starts_with("https://");
                if !is_url && (head.trim().is_empty() || tail.trim().is_empty()) {
                    return Err(SearchError::invalid_value(
                        param,
                        value,
                        "ResourceType/id, id, or absolute URL",
                    ));
                }
            }
        }
        SearchParamType::String => {
            if value.trim().is_empty() {
                return Err(SearchError::invalid_value(param, value, "non-empty text"));
            }
        }
        SearchParamType::Quantity => {
            let number_part = value.split('|').next().unwrap_or(value);
            let (_, number) = split_prefix(number_part);
            if number.parse::<f64>().is_err() {
                return Err(SearchError::invalid_value(
                    param,
                    value,
                    "value[|system|code] with numeric value",
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_repeated_values(
    param_type: SearchParamType,
    param: &str,
    values: &[String],
) -> SearchResult<()> {
    match param_type {
        SearchParamType::Date => validate_repeated_range_values(param, values, "date"),
        SearchParamType::Number => validate_repeated_range_values(param, values, "number"),
        SearchParamType::Token => validate_repeated_tokens(param, values),
        // STRING and REFERENCE repeats are OR logic, always valid
        _ => Ok(()),
    }
}

/// Repeated range-typed values: multiple unprefixed values are logically
/// impossible (a birthdate cannot be two different days); mixing unprefixed
/// with prefixed is ambiguous; multiple prefixed values form a range and are
/// allowed.
fn validate_repeated_range_values(
    param: &str,
    values: &[String],
    _kind: &str,
) -> SearchResult<()> {
    let unprefixed = values
        .iter()
        .filter(|v| split_prefix(v).0.is_none())
        .count();
    let prefixed = values.len() - unprefixed;

    if unprefixed > 1 || (unprefixed > 0 && prefixed > 0) {
        return Err(SearchError::unsupported_combination(
            param,
            "Can not have multiple date range parameters for the same param without a qualifier",
        ));
    }

    debug!(param, prefixed, "repeated prefixed range values treated as a range");
    Ok(())
}

fn validate_repeated_tokens(param: &str, values: &[String]) -> SearchResult<()> {
    if !SINGLE_VALUE_TOKEN_PARAMS.contains(&param) {
        return Ok(());
    }
    let mut distinct: Vec<&str> = values
        .iter()
        .map(|v| v.split_once('|').map_or(v.as_str(), |(_, code)| code))
        .collect();
    distinct.sort_unstable();
    distinct.dedup();

    if distinct.len() > 1 {
        return Err(SearchError::unsupported_combination(
            param,
            "Multiple conflicting values not allowed for single-value field",
        ));
    }
    Ok(())
}

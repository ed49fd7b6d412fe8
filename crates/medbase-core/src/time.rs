//! FHIR instant helpers on top of the `time` crate.
//!
//! All stored timestamps are UTC RFC 3339 instants. Search values may carry
//! reduced precision (a bare date, or a datetime without fractional seconds);
//! comparisons between values of different precision are resolved by
//! comparing only the components both values carry, which gives the
//! day-granular semantics FHIR date search expects.

use crate::error::{CoreError, Result};
use std::cmp::Ordering;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

/// Current UTC instant.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Format an instant as an RFC 3339 string with a `Z` offset,
/// e.g. `2024-05-15T14:30:00.123Z`.
pub fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.to_string())
}

/// Current UTC instant as an RFC 3339 string.
pub fn now_instant_string() -> String {
    format_instant(now_utc())
}

/// Parse an RFC 3339 instant.
pub fn parse_instant(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(CoreError::from)
}

/// Validate that a search date value is either a bare ISO date
/// (`YYYY-MM-DD`) or a full RFC 3339 datetime.
pub fn is_valid_search_date(value: &str) -> bool {
    if value.len() == 10 {
        let format = time::macros::format_description!("[year]-[month]-[day]");
        Date::parse(value, &format).is_ok()
    } else {
        OffsetDateTime::parse(value, &Rfc3339).is_ok()
    }
}

/// Compare two date/datetime strings at their shared precision.
///
/// `"1987-02-20T10:00:00Z"` compared with `"1987-02-20"` is `Equal`:
/// the datetime falls inside the day. Full-precision values compare
/// lexically, which is correct for same-offset RFC 3339 strings.
pub fn cmp_partial(a: &str, b: &str) -> Ordering {
    let n = a.len().min(b.len());
    a.as_bytes()[..n].cmp(&b.as_bytes()[..n])
}

/// Shift a date value by whole days, preserving its precision.
/// Used for the `ap` (approximately) search prefix.
pub fn shift_days(value: &str, days: i64) -> Result<String> {
    let duration = time::Duration::days(days);
    if value.len() == 10 {
        let format = time::macros::format_description!("[year]-[month]-[day]");
        let date = Date::parse(value, &format).map_err(CoreError::from)?;
        let shifted = date
            .checked_add(duration)
            .ok_or_else(|| CoreError::invalid_instant(value))?;
        shifted.format(&format).map_err(|_| CoreError::invalid_instant(value))
    } else {
        let instant = parse_instant(value)?;
        Ok(format_instant(instant + duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse_roundtrip() {
        let now = now_utc();
        let formatted = format_instant(now);
        let parsed = parse_instant(&formatted).unwrap();
        assert_eq!(parsed.unix_timestamp(), now.unix_timestamp());
    }

    #[test]
    fn test_format_uses_utc_offset() {
        let formatted = now_instant_string();
        assert!(formatted.ends_with('Z'), "expected Z offset: {formatted}");
    }

    #[test]
    fn test_valid_search_dates() {
        assert!(is_valid_search_date("1987-02-20"));
        assert!(is_valid_search_date("2024-01-01T10:30:00Z"));
        assert!(is_valid_search_date("2024-01-01T10:30:00.250+02:00"));
    }

    #[test]
    fn test_invalid_search_dates() {
        assert!(!is_valid_search_date("1987-13-20"));
        assert!(!is_valid_search_date("1987-02-30"));
        assert!(!is_valid_search_date("20-02-1987"));
        assert!(!is_valid_search_date("not-a-date"));
        assert!(!is_valid_search_date("2024-01-01T25:00:00Z"));
    }

    #[test]
    fn test_cmp_partial_same_precision() {
        assert_eq!(cmp_partial("1987-02-20", "1987-02-21"), Ordering::Less);
        assert_eq!(cmp_partial("1987-02-21", "1987-02-20"), Ordering::Greater);
        assert_eq!(cmp_partial("1987-02-20", "1987-02-20"), Ordering::Equal);
    }

    #[test]
    fn test_cmp_partial_mixed_precision() {
        // A datetime inside the day compares equal to the bare date
        assert_eq!(
            cmp_partial("1987-02-20T10:00:00Z", "1987-02-20"),
            Ordering::Equal
        );
        assert_eq!(
            cmp_partial("1987-02-20T10:00:00Z", "1987-02-21"),
            Ordering::Less
        );
    }

    #[test]
    fn test_shift_days_date_precision() {
        assert_eq!(shift_days("1987-02-20", 1).unwrap(), "1987-02-21");
        assert_eq!(shift_days("1987-03-01", -1).unwrap(), "1987-02-28");
    }

    #[test]
    fn test_shift_days_datetime_precision() {
        let shifted = shift_days("2024-01-01T10:00:00Z", 1).unwrap();
        assert!(shifted.starts_with("2024-01-02T10:00:00"));
    }
}

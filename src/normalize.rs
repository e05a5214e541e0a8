//! Canonical typed values from the heterogeneous representations the
//! observation store hands back.
//!
//! Every function here is total: malformed input yields absence (`None`),
//! never an error. Absence is a first-class state downstream.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse an ISO-8601 datetime string into a UTC instant.
///
/// A trailing literal `Z` is treated as the `+00:00` offset. Naive
/// datetimes (no offset, `T` or space separator) are taken as UTC.
/// Anything unparsable yields `None`.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let canonical: Cow<'_, str> = match raw.strip_suffix('Z') {
        Some(head) => Cow::Owned(format!("{head}+00:00")),
        None => Cow::Borrowed(raw),
    };

    if let Ok(instant) = DateTime::parse_from_rfc3339(&canonical) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&canonical, format) {
            return Some(naive.and_utc());
        }
    }

    None
}

/// Canonical instant from a raw JSON field value.
///
/// Only strings carry datetimes on the JSON path; typed `TIMESTAMPTZ`
/// columns arrive as native instants through sqlx and bypass this entirely.
pub fn instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_instant(s),
        _ => None,
    }
}

/// Coerce a raw JSON field value to a monetary amount.
pub fn money(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a raw JSON field value to an integer count.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// serde adapter: timestamp fields that tolerate any JSON shape.
pub fn lenient_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(instant))
}

/// serde adapter: cost fields that tolerate any JSON shape.
pub fn lenient_money<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(money))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_instant("2023-10-26T10:23:45.000+00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2023, 10, 26, 10, 23, 45).unwrap());
    }

    #[test]
    fn trailing_z_means_utc() {
        let zulu = parse_instant("2023-10-26T10:23:45.500Z").unwrap();
        let explicit = parse_instant("2023-10-26T10:23:45.500+00:00").unwrap();
        assert_eq!(zulu, explicit);
    }

    #[test]
    fn naive_datetimes_are_utc() {
        let parsed = parse_instant("2025-11-21 21:09:52").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 21, 21, 9, 52).unwrap());
    }

    #[test]
    fn garbage_is_unavailable_not_an_error() {
        assert_eq!(parse_instant("not a datetime"), None);
        assert_eq!(parse_instant(""), None);
        assert_eq!(instant(&json!(42)), None);
        assert_eq!(instant(&json!(null)), None);
        assert_eq!(instant(&json!({"nested": true})), None);
    }

    #[test]
    fn money_coerces_numbers_and_numeric_strings() {
        assert_eq!(money(&json!(0.000362)), Some(0.000362));
        assert_eq!(money(&json!("1.5")), Some(1.5));
        assert_eq!(money(&json!("  2 ")), Some(2.0));
        assert_eq!(money(&json!("free")), None);
        assert_eq!(money(&json!(null)), None);
        assert_eq!(money(&json!([1.0])), None);
    }

    #[test]
    fn integer_coerces_numbers_and_numeric_strings() {
        assert_eq!(integer(&json!(752)), Some(752));
        assert_eq!(integer(&json!(38.0)), Some(38));
        assert_eq!(integer(&json!("120")), Some(120));
        assert_eq!(integer(&json!("oops")), None);
        assert_eq!(integer(&json!({})), None);
    }
}

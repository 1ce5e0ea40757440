//! Forgiving field deserializers.
//!
//! Upstream records and older cache documents disagree on field types: counts
//! arrive as floats, strings or `null`, timestamps as unix seconds or ISO
//! strings. Every helper here maps what it cannot read to "absent" instead of
//! failing the whole record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn as_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|n| n.is_finite())
}

pub fn as_count(value: &Value) -> u64 {
    match as_number(value) {
        Some(n) if n > 0.0 => n as u64,
        _ => 0,
    }
}

/// Non-empty string content; numbers are rendered as text.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unix seconds, RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` or a bare date.
///
/// Zero and unparseable values are treated as missing.
pub fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .filter(|secs| *secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null))
}

pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(as_number(&raw(deserializer)?))
}

pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(as_number(&raw(deserializer)?).unwrap_or(0.0))
}

pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(as_count(&raw(deserializer)?))
}

pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(as_string(&raw(deserializer)?))
}

pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(as_string(&raw(deserializer)?).unwrap_or_default())
}

pub fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(as_timestamp(&raw(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_strings_and_reject_garbage() {
        assert_eq!(as_number(&json!(12.5)), Some(12.5));
        assert_eq!(as_number(&json!(" 7 ")), Some(7.0));
        assert_eq!(as_number(&json!("n/a")), None);
        assert_eq!(as_number(&json!(null)), None);
        assert_eq!(as_number(&json!({"a": 1})), None);
    }

    #[test]
    fn counts_floor_and_clamp_negative() {
        assert_eq!(as_count(&json!(10.9)), 10);
        assert_eq!(as_count(&json!(-3)), 0);
        assert_eq!(as_count(&json!("42")), 42);
    }

    #[test]
    fn timestamps_from_unix_seconds_and_iso() {
        let from_secs = as_timestamp(&json!(1_767_225_600)).unwrap();
        assert_eq!(from_secs.to_rfc3339(), "2026-01-01T00:00:00+00:00");

        let from_iso = as_timestamp(&json!("2026-01-01T00:00:00.000Z")).unwrap();
        assert_eq!(from_iso, from_secs);

        let from_date = as_timestamp(&json!("2026-01-01")).unwrap();
        assert_eq!(from_date, from_secs);
    }

    #[test]
    fn zero_and_invalid_timestamps_are_missing() {
        assert_eq!(as_timestamp(&json!(0)), None);
        assert_eq!(as_timestamp(&json!("not a date")), None);
        assert_eq!(as_timestamp(&json!("")), None);
    }

    #[test]
    fn empty_strings_are_missing() {
        assert_eq!(as_string(&json!("")), None);
        assert_eq!(as_string(&json!(123)), Some("123".to_string()));
    }
}

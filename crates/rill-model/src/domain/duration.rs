use std::time::Duration;

use serde_json::Value;

use crate::error::SettingsError;

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;
const MS_PER_WEEK: f64 = 7.0 * MS_PER_DAY;

/// Parse a duration string such as `"30s"`, `"1.5m"` or `"250"`.
///
/// A number may be suffixed with one of `ms`, `s`, `m`, `h`, `d`, `w`.
/// An unsuffixed number is interpreted as milliseconds.
/// `key` only names the setting in the returned error.
pub fn parse_duration(key: &str, value: &str) -> Result<Duration, SettingsError> {
    let err = || SettingsError::Duration {
        key: key.to_string(),
        value: value.to_string(),
    };

    let norm = value.trim().to_ascii_lowercase();
    let (number, factor) = if let Some(n) = norm.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = norm.strip_suffix('s') {
        (n, MS_PER_SECOND)
    } else if let Some(n) = norm.strip_suffix('m') {
        (n, MS_PER_MINUTE)
    } else if let Some(n) = norm.strip_suffix('h') {
        (n, MS_PER_HOUR)
    } else if let Some(n) = norm.strip_suffix('d') {
        (n, MS_PER_DAY)
    } else if let Some(n) = norm.strip_suffix('w') {
        (n, MS_PER_WEEK)
    } else {
        (norm.as_str(), 1.0)
    };

    let number: f64 = number.trim().parse().map_err(|_| err())?;
    if !number.is_finite() || number < 0.0 {
        return Err(err());
    }
    Ok(Duration::from_millis((number * factor).round() as u64))
}

/// Read a duration setting from a JSON object field.
///
/// Strings use the [`parse_duration`] grammar, bare numbers are milliseconds.
/// A missing or `null` field yields `default`.
pub fn duration_setting(
    object: &serde_json::Map<String, Value>,
    key: &str,
    default: Duration,
) -> Result<Duration, SettingsError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) => parse_duration(key, s),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Duration::from_millis)
            .ok_or_else(|| SettingsError::Duration {
                key: key.to_string(),
                value: n.to_string(),
            }),
        Some(other) => Err(SettingsError::Duration {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

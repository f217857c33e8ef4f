//! Type-aware value equality, ordering, and normalization.
//!
//! Golden comparison goes through the declared [`FieldType`] of each
//! golden field: floating point numbers compare with a relative tolerance,
//! everything else compares exactly after normalization.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use pipetest_types::{FieldType, Value};

/// Relative tolerance for [`FieldType::Number`] comparisons.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// Coerce a raw cell to the representation used for `field_type`.
///
/// Values that cannot be converted are returned unchanged so comparisons
/// report them instead of silently dropping them.
#[must_use]
pub fn coerce(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (_, Value::Null) => Value::Null,
        (FieldType::Integer, v) => v.as_i64().map_or(v, Value::Integer),
        (FieldType::Number, v) => v.as_f64().map_or(v, Value::Number),
        (FieldType::Boolean, v) => v.as_bool().map_or(v, Value::Boolean),
        (_, Value::String(s)) => Value::String(s),
        (_, v) => Value::String(v.to_string()),
    }
}

/// Type-aware equality of a golden value and an actual value.
#[must_use]
pub fn values_equal(field_type: FieldType, expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => return true,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null)
            if field_type == FieldType::String =>
        {
            return s.is_empty();
        }
        (Value::Null, _) | (_, Value::Null) => return false,
        _ => {}
    }

    match field_type {
        FieldType::Number => match (expected.as_f64(), actual.as_f64()) {
            (Some(a), Some(b)) => floats_equal(a, b),
            _ => expected.to_string() == actual.to_string(),
        },
        FieldType::Integer => match (expected.as_i64(), actual.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => expected.to_string() == actual.to_string(),
        },
        FieldType::BigNumber => {
            normalize_decimal(&expected.to_string()) == normalize_decimal(&actual.to_string())
        }
        FieldType::Boolean => match (expected.as_bool(), actual.as_bool()) {
            (Some(a), Some(b)) => a == b,
            _ => expected.to_string() == actual.to_string(),
        },
        FieldType::Date | FieldType::Timestamp => {
            match (parse_temporal(expected), parse_temporal(actual)) {
                (Some(a), Some(b)) => a == b,
                _ => expected.to_string() == actual.to_string(),
            }
        }
        FieldType::String | FieldType::Binary => expected.to_string() == actual.to_string(),
    }
}

/// `true` when `a` and `b` are within [`FLOAT_TOLERANCE`] relative to the
/// larger magnitude (absolute below 1.0).
#[must_use]
pub fn floats_equal(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a.is_infinite() || b.is_infinite() {
        return a == b;
    }
    let scale = 1.0_f64.max(a.abs()).max(b.abs());
    (a - b).abs() <= FLOAT_TOLERANCE * scale
}

/// Total order used for `order_by` sorting. Nulls sort first.
#[must_use]
pub fn compare_values(field_type: FieldType, a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    let fallback = || a.to_string().cmp(&b.to_string());
    match field_type {
        FieldType::Integer | FieldType::Number | FieldType::BigNumber => {
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => fallback(),
            }
        }
        FieldType::Boolean => match (a.as_bool(), b.as_bool()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => fallback(),
        },
        FieldType::Date | FieldType::Timestamp => match (parse_temporal(a), parse_temporal(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => fallback(),
        },
        FieldType::String | FieldType::Binary => fallback(),
    }
}

/// Canonical text form of a decimal: no sign noise, no leading zeros in
/// the integer part, no trailing zeros in the fraction.
fn normalize_decimal(raw: &str) -> String {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let mut out = String::with_capacity(raw.len());
    if negative && !(int_part == "0" && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parse a date or timestamp into a comparable UTC-naive instant.
fn parse_temporal(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ndt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_beyond_i64_range_are_not_saturated() {
        assert!(!values_equal(
            FieldType::Integer,
            &Value::Integer(i64::MAX),
            &Value::Number(1e19)
        ));
        assert!(!values_equal(
            FieldType::Integer,
            &Value::Integer(i64::MIN),
            &Value::Number(-1e19)
        ));
        assert!(values_equal(
            FieldType::Integer,
            &Value::Integer(-4),
            &Value::Number(-4.0)
        ));
    }

    #[test]
    fn numbers_use_relative_tolerance() {
        assert!(values_equal(
            FieldType::Number,
            &Value::Number(0.1 + 0.2),
            &Value::Number(0.3)
        ));
        assert!(values_equal(
            FieldType::Number,
            &Value::Number(1e12),
            &Value::Number(1e12 + 1e-4)
        ));
        assert!(!values_equal(
            FieldType::Number,
            &Value::Number(1.0),
            &Value::Number(1.001)
        ));
        assert!(values_equal(
            FieldType::Number,
            &Value::Integer(2),
            &Value::from("2.0")
        ));
    }

    #[test]
    fn integers_are_exact() {
        assert!(values_equal(FieldType::Integer, &Value::Integer(5), &Value::from("5")));
        assert!(!values_equal(FieldType::Integer, &Value::Integer(5), &Value::Integer(6)));
    }

    #[test]
    fn big_numbers_compare_normalized_text() {
        assert!(values_equal(
            FieldType::BigNumber,
            &Value::from("00123.4500"),
            &Value::from("+123.45")
        ));
        assert!(values_equal(FieldType::BigNumber, &Value::from("-0.0"), &Value::from("0")));
        assert!(!values_equal(
            FieldType::BigNumber,
            &Value::from("123.450001"),
            &Value::from("123.45")
        ));
    }

    #[test]
    fn null_handling() {
        assert!(values_equal(FieldType::Integer, &Value::Null, &Value::Null));
        assert!(!values_equal(FieldType::Integer, &Value::Null, &Value::Integer(0)));
        assert!(values_equal(FieldType::String, &Value::Null, &Value::from("")));
        assert!(!values_equal(FieldType::Date, &Value::Null, &Value::from("")));
    }

    #[test]
    fn temporal_values_parse_before_comparing() {
        assert!(values_equal(
            FieldType::Timestamp,
            &Value::from("2024-03-01T10:00:00Z"),
            &Value::from("2024-03-01 10:00:00")
        ));
        assert!(values_equal(
            FieldType::Timestamp,
            &Value::from("2024-03-01T12:00:00+02:00"),
            &Value::from("2024-03-01T10:00:00Z")
        ));
        assert!(values_equal(
            FieldType::Date,
            &Value::from("2024/03/01"),
            &Value::from("2024-03-01")
        ));
        assert!(!values_equal(
            FieldType::Date,
            &Value::from("2024-03-02"),
            &Value::from("2024-03-01")
        ));
    }

    #[test]
    fn booleans_accept_flags() {
        assert!(values_equal(FieldType::Boolean, &Value::from("Y"), &Value::Boolean(true)));
        assert!(!values_equal(FieldType::Boolean, &Value::from("N"), &Value::Boolean(true)));
    }

    #[test]
    fn ordering_puts_nulls_first_and_sorts_numerically() {
        let mut values = vec![Value::Integer(10), Value::Null, Value::from("9")];
        values.sort_by(|a, b| compare_values(FieldType::Integer, a, b));
        assert_eq!(values, vec![Value::Null, Value::from("9"), Value::Integer(10)]);
    }

    #[test]
    fn coerce_converts_when_possible() {
        assert_eq!(coerce(FieldType::Integer, Value::from("42")), Value::Integer(42));
        assert_eq!(coerce(FieldType::Number, Value::Integer(2)), Value::Number(2.0));
        assert_eq!(coerce(FieldType::Boolean, Value::from("yes")), Value::Boolean(true));
        assert_eq!(coerce(FieldType::String, Value::Integer(7)), Value::from("7"));
        assert_eq!(coerce(FieldType::Integer, Value::from("x")), Value::from("x"));
        assert_eq!(coerce(FieldType::Date, Value::Null), Value::Null);
    }
}

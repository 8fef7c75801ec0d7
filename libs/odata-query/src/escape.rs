//! Literal and path escaping.

use chrono::SecondsFormat;
use regex::Regex;
use serde_json::Number;

use crate::model::{Primitive, ResourcePath};

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static TRAILING_COUNT: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"(?:%2F|/)%24count$").expect("static regex should not panic")
});

// Characters `encodeURIComponent` leaves alone that `urlencoding` escapes.
const KEPT_MARKS: &[(&str, &str)] = &[
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
];

/// Percent-encode one URI component.
///
/// Unreserved characters and the marks `!'()*` are kept literal.
#[must_use]
pub fn encode_component(value: &str) -> String {
    let mut encoded = urlencoding::encode(value).into_owned();
    for (escaped, mark) in KEPT_MARKS {
        if encoded.contains(escaped) {
            encoded = encoded.replace(escaped, mark);
        }
    }
    encoded
}

/// Render a primitive as an `OData` literal.
///
/// Strings are quoted with interior quotes doubled and then percent-encoded;
/// dates become `datetime'<ISO-8601>'`; everything else is written as is.
#[must_use]
pub fn escape_value(value: &Primitive) -> String {
    match value {
        Primitive::Null => "null".to_owned(),
        Primitive::Bool(b) => b.to_string(),
        Primitive::Number(n) => format_number(n),
        Primitive::String(s) => format!("'{}'", encode_component(&s.replace('\'', "''"))),
        Primitive::DateTime(dt) => {
            format!("datetime'{}'", dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    }
}

/// Encode a resource name or path, keeping a trailing `/$count` literal.
#[must_use]
pub fn escape_resource(resource: &ResourcePath) -> String {
    let encoded = match resource {
        ResourcePath::Single(name) => encode_component(name),
        ResourcePath::Segments(segments) => encode_segments(segments),
    };
    TRAILING_COUNT.replace(&encoded, "/$$count").into_owned()
}

/// Encode a navigation path made of property names.
#[must_use]
pub fn escape_path(segments: &[String]) -> String {
    TRAILING_COUNT
        .replace(&encode_segments(segments), "/$$count")
        .into_owned()
}

/// `@name` reference to a parameter alias.
#[must_use]
pub fn escape_parameter_alias(name: &str) -> String {
    format!("@{}", encode_component(name))
}

fn encode_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| encode_component(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Numbers are written the way a JSON consumer would print them: integral
/// floats lose their fractional part.
pub(crate) fn format_number(number: &Number) -> String {
    if number.is_f64()
        && let Some(value) = number.as_f64()
    {
        return format_f64(value);
    }
    number.to_string()
}

/// Render a float the way `Number.prototype.toString` does: plain decimals
/// inside `[1e-6, 1e21)`, exponent form with an explicit sign outside it.
pub(crate) fn format_f64(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }
    if (1e-6..1e21).contains(&value.abs()) {
        return value.to_string();
    }
    let exponential = format!("{value:e}");
    match exponential.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exponential,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_string_quotes_are_doubled_before_encoding() {
        assert_eq!(escape_value(&"it's".into()), "'it''s'");
        assert_eq!(escape_value(&"a b/c".into()), "'a%20b%2Fc'");
    }

    #[test]
    fn test_escaping_is_not_applied_twice() {
        let once = escape_value(&"it's".into());
        let twice = escape_value(&Primitive::String(once.clone()));
        assert_ne!(once, twice);
        assert_eq!(twice, "'''it''''s'''");
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(escape_value(&Primitive::Null), "null");
        assert_eq!(escape_value(&true.into()), "true");
        assert_eq!(escape_value(&42i64.into()), "42");
        assert_eq!(escape_value(&Primitive::from_f64(1.5).unwrap()), "1.5");
        assert_eq!(escape_value(&Primitive::from_f64(3.0).unwrap()), "3");
    }

    #[test]
    fn test_floats_outside_the_decimal_range_use_exponents() {
        let float = |value: f64| escape_value(&Primitive::from_f64(value).unwrap());
        assert_eq!(float(1e-20), "1e-20");
        assert_eq!(float(-2.5e-7), "-2.5e-7");
        assert_eq!(float(0.000_001), "0.000001");
        assert_eq!(float(1e21), "1e+21");
        assert_eq!(float(1.5e22), "1.5e+22");
        assert_eq!(float(1e20), "100000000000000000000");
        assert_eq!(float(-0.0), "0");
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        let err = Primitive::from_f64(f64::NAN).unwrap_err();
        assert_eq!(err.to_string(), "Not a valid value: number");
    }

    #[test]
    fn test_dates_use_millisecond_iso_format() {
        let dt = Utc.with_ymd_and_hms(2015, 10, 20, 14, 4, 5).unwrap()
            + chrono::Duration::milliseconds(374);
        assert_eq!(
            escape_value(&dt.into()),
            "datetime'2015-10-20T14:04:05.374Z'"
        );
    }

    #[test]
    fn test_resource_segments_are_encoded() {
        assert_eq!(escape_resource(&"a/b".into()), "a%2Fb");
        assert_eq!(
            escape_resource(&ResourcePath::Segments(vec!["a b".into(), "c".into()])),
            "a%20b/c"
        );
    }

    #[test]
    fn test_trailing_count_survives_encoding() {
        assert_eq!(escape_resource(&"a/$count".into()), "a/$count");
        assert_eq!(
            escape_resource(&ResourcePath::Segments(vec!["a".into(), "$count".into()])),
            "a/$count"
        );
        assert_eq!(escape_resource(&"$count".into()), "%24count");
    }

    #[test]
    fn test_parameter_alias_is_encoded() {
        assert_eq!(escape_parameter_alias("b"), "@b");
        assert_eq!(escape_parameter_alias("a b"), "@a%20b");
    }

    #[test]
    fn test_marks_stay_literal() {
        assert_eq!(encode_component("!'()*"), "!'()*");
        assert_eq!(encode_component("$E"), "%24E");
    }
}

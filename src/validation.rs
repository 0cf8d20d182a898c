//! Field-level validation primitives shared by the user and record payloads.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime,
};

const YEARS: std::ops::RangeInclusive<i32> = 1..=9999;
/// 0001-01-01T00:00:00Z through 9999-12-31T23:59:59Z.
const UNIX_RANGE: std::ops::RangeInclusive<i64> = -62_135_596_800..=253_402_300_799;

pub const REQUIRED: &str = "required";
pub const NULL: &str = "null";
pub const BLANK: &str = "blank";
pub const INVALID: &str = "invalid";
pub const INVALID_CHOICE: &str = "invalid_choice";
pub const MAX_LENGTH: &str = "max_length";
pub const MIN_LENGTH: &str = "min_length";
pub const MIN_VALUE: &str = "min_value";
pub const MAX_VALUE: &str = "max_value";
pub const UNIQUE: &str = "unique";
pub const DOES_NOT_EXIST: &str = "does_not_exist";
pub const AUTHORIZATION: &str = "authorization";

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: &'static str,
    pub message: String,
}

/// Offending fields keyed by name, each with one or more reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<FieldError>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, code, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, code: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(FieldError {
            code,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has_code(&self, field: &str, code: &str) -> bool {
        self.get(field)
            .map(|errs| errs.iter().any(|e| e.code == code))
            .unwrap_or(false)
    }

    /// `Ok(())` when nothing was collected, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// A body field as received: absent, explicit null, a value of the expected
/// JSON type, or a value of some other type. Pair with `#[serde(default)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Input<T> {
    #[default]
    Missing,
    Null,
    Value(T),
    WrongType,
}

impl<T> Input<T> {
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Input::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Input<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if raw.is_null() {
            return Ok(Input::Null);
        }
        Ok(serde_json::from_value(raw).map_or(Input::WrongType, Input::Value))
    }
}

fn wrong_type(errors: &mut FieldErrors, field: &'static str) {
    errors.add(field, INVALID, "Incorrect type.");
}

/// Unwraps a required field, recording `required`, `null` or `invalid`.
pub fn require<T>(errors: &mut FieldErrors, field: &'static str, value: Input<T>) -> Option<T> {
    match value {
        Input::Value(v) => Some(v),
        Input::Null => {
            errors.add(field, NULL, "This field may not be null.");
            None
        }
        Input::Missing => {
            errors.add(field, REQUIRED, "This field is required.");
            None
        }
        Input::WrongType => {
            wrong_type(errors, field);
            None
        }
    }
}

/// Unwraps a field that may be omitted but not set to null.
pub fn non_null<T>(errors: &mut FieldErrors, field: &'static str, value: Input<T>) -> Option<T> {
    match value {
        Input::Missing => None,
        other => require(errors, field, other),
    }
}

/// Unwraps a field that may be omitted or null: `Some(None)` is an explicit null,
/// `None` is absent or of the wrong type.
pub fn nullable<T>(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Input<T>,
) -> Option<Option<T>> {
    match value {
        Input::Missing => None,
        Input::Null => Some(None),
        Input::Value(v) => Some(Some(v)),
        Input::WrongType => {
            wrong_type(errors, field);
            None
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Checks a free-text field for blankness and length (in characters).
pub fn check_text(
    errors: &mut FieldErrors,
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> bool {
    if value.trim().is_empty() {
        errors.add(field, BLANK, "This field may not be blank.");
        return false;
    }
    let len = value.chars().count();
    if len > max_chars {
        errors.add(
            field,
            MAX_LENGTH,
            format!("Ensure this field has no more than {max_chars} characters (it has {len})."),
        );
        return false;
    }
    true
}

/// Parses a dotted-quad IPv4 address. Leading zeros, IPv6 and host names are rejected.
pub fn parse_ipv4(value: &str) -> Option<Ipv4Addr> {
    value.parse::<Ipv4Addr>().ok()
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC and
/// the result is truncated to microseconds, the precision the database keeps.
/// Years outside 1..=9999, in the given offset or in UTC, are rejected.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    let normalized = match value.as_bytes().get(10) {
        Some(b' ') => format!("{}T{}", &value[..10], &value[11..]),
        _ => value.to_string(),
    };

    let parsed = OffsetDateTime::parse(&normalized, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(&normalized, &Iso8601::DEFAULT))
        .or_else(|_| PrimitiveDateTime::parse(&normalized, &Iso8601::DEFAULT).map(|p| p.assume_utc()))
        .ok()?;

    if !YEARS.contains(&parsed.year()) || !UNIX_RANGE.contains(&parsed.unix_timestamp()) {
        return None;
    }
    parsed
        .replace_nanosecond(parsed.nanosecond() / 1_000 * 1_000)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("joe@email.com"));
        assert!(is_valid_email("a.b+tag@sub.example.org"));
        assert!(!is_valid_email("joe"));
        assert!(!is_valid_email("joe@localhost"));
        assert!(!is_valid_email("joe @email.com"));
        assert!(!is_valid_email("@email.com"));
    }

    #[test]
    fn ipv4_accepts_only_dotted_quads() {
        assert_eq!(parse_ipv4("127.0.0.1"), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(parse_ipv4("255.255.255.255"), Some(Ipv4Addr::BROADCAST));
        assert!(parse_ipv4("a.b.c.d").is_none());
        assert!(parse_ipv4("256.0.0.1").is_none());
        assert!(parse_ipv4("10.0.0").is_none());
        assert!(parse_ipv4("::1").is_none());
        assert!(parse_ipv4("").is_none());
    }

    #[test]
    fn timestamps_in_common_iso_forms() {
        let expected = datetime!(2020-07-19 19:05:00 UTC);
        assert_eq!(parse_timestamp("2020-07-19T19:05:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-07-19T19:05:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-07-19T19:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-07-19 19:05:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2020-07-19T21:05:00+02:00"),
            Some(datetime!(2020-07-19 21:05:00 +2))
        );
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2020-13-40T00:00:00Z").is_none());
    }

    #[test]
    fn timestamps_outside_four_digit_years_are_rejected() {
        assert!(parse_timestamp("-000001-01-01T00:00:00Z").is_none());
        assert!(parse_timestamp("+010000-01-01T00:00:00Z").is_none());
        assert!(parse_timestamp("0000-06-01T00:00:00Z").is_none());
        assert!(parse_timestamp("0001-01-01T00:30:00+01:00").is_none());
        assert!(parse_timestamp("9999-12-31T23:00:00-02:00").is_none());
        assert_eq!(
            parse_timestamp("0001-01-01T00:00:00Z").map(|d| d.year()),
            Some(1)
        );
        assert!(parse_timestamp("9999-12-31T23:59:59Z").is_some());
    }

    #[test]
    fn timestamps_are_truncated_to_microseconds() {
        let parsed = parse_timestamp("2020-07-19T19:05:00.123456789Z").unwrap();
        assert_eq!(parsed.nanosecond(), 123_456_000);
    }

    #[test]
    fn require_distinguishes_missing_null_and_wrong_type() {
        let mut errors = FieldErrors::new();
        assert_eq!(require::<i32>(&mut errors, "a", Input::Missing), None);
        assert_eq!(require::<i32>(&mut errors, "b", Input::Null), None);
        assert_eq!(require(&mut errors, "c", Input::Value(3)), Some(3));
        assert_eq!(require::<i32>(&mut errors, "d", Input::WrongType), None);
        assert!(errors.has_code("a", REQUIRED));
        assert!(errors.has_code("b", NULL));
        assert!(errors.get("c").is_none());
        assert!(errors.has_code("d", INVALID));
    }

    #[test]
    fn optional_fields_tolerate_absence() {
        let mut errors = FieldErrors::new();
        assert_eq!(non_null::<bool>(&mut errors, "a", Input::Missing), None);
        assert_eq!(nullable::<i64>(&mut errors, "b", Input::Missing), None);
        assert_eq!(nullable::<i64>(&mut errors, "b", Input::Null), Some(None));
        assert!(errors.is_empty());
        assert_eq!(non_null::<bool>(&mut errors, "a", Input::Null), None);
        assert_eq!(nullable::<i64>(&mut errors, "b", Input::WrongType), None);
        assert!(errors.has_code("a", NULL));
        assert!(errors.has_code("b", INVALID));
    }

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        flag: Input<bool>,
        #[serde(default)]
        count: Input<i64>,
        #[serde(default)]
        name: Input<String>,
    }

    #[test]
    fn inputs_keep_wrong_types_apart_from_absence() {
        let body: Body = serde_json::from_str(r#"{"flag": "yes", "count": null}"#).unwrap();
        assert_eq!(body.flag, Input::WrongType);
        assert_eq!(body.count, Input::Null);
        assert_eq!(body.name, Input::Missing);

        let body: Body =
            serde_json::from_str(r#"{"flag": true, "count": "1", "name": 5}"#).unwrap();
        assert_eq!(body.flag, Input::Value(true));
        assert_eq!(body.count, Input::WrongType);
        assert_eq!(body.name, Input::WrongType);
    }

    #[test]
    fn text_checks_count_characters_not_bytes() {
        let mut errors = FieldErrors::new();
        assert!(check_text(&mut errors, "environment", &"é".repeat(30), 30));
        assert!(!check_text(&mut errors, "environment", &"x".repeat(31), 30));
        assert!(!check_text(&mut errors, "message", "   ", 200));
        assert!(errors.has_code("environment", MAX_LENGTH));
        assert!(errors.has_code("message", BLANK));
    }

    #[test]
    fn errors_serialize_keyed_by_field() {
        let errors = FieldErrors::single("level", INVALID_CHOICE, "nope");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["level"][0]["code"], "invalid_choice");
        assert_eq!(json["level"][0]["message"], "nope");
    }
}

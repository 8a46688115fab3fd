use std::borrow::Cow;

use serde::{Serialize, Serializer};

use crate::field_type::Type;
use crate::type_detection::is_null_token;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Convert a raw field into a value of the column type.
    ///
    /// Null tokens become [`Value::Null`] whatever the type; a field that
    /// does not fit a numeric type also degrades to null.
    pub fn parse(raw: &str, ty: Type) -> Value {
        let trimmed = raw.trim();
        if is_null_token(trimmed) {
            return Value::Null;
        }
        match ty {
            Type::Null => Value::Null,
            Type::Bool => Value::Bool(trimmed.eq_ignore_ascii_case("true")),
            Type::Int => parse_int(trimmed).map_or(Value::Null, Value::Int),
            Type::Float => parse_float(trimmed).map_or(Value::Null, Value::Float),
            Type::DateTime | Type::Text => Value::Text(raw.to_string()),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used for exact-match filtering.
    ///
    /// Integral floats keep a trailing `.0` so `12.0` never equals `"12"`;
    /// nulls are the empty string.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(true) => Cow::Borrowed("True"),
            Value::Bool(false) => Cow::Borrowed("False"),
            Value::Int(i) => Cow::Owned(i.to_string()),
            Value::Float(f) => Cow::Owned(format_float(*f)),
            Value::Text(s) => Cow::Borrowed(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

pub(crate) fn parse_int(s: &str) -> Option<i64> {
    s.strip_prefix('+').unwrap_or(s).parse::<i64>().ok()
}

pub(crate) fn parse_float(s: &str) -> Option<f64> {
    // `f64::from_str` also accepts "inf"/"NaN"; only plain decimal syntax counts
    if !s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

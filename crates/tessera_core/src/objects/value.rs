//! Script value representation.
//!
//! This module provides [`Value`], the enum that every field, argument and
//! result in the runtime travels as, together with type-checking predicates
//! and the conversions used by keys and built-in methods.

use crate::lifetime::ObjectRef;

/// Any script value.
///
/// The default value is the empty string, which is also what a missing
/// result reads as.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A text value.
    String(String),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A double-precision float.
    Float(f64),
    /// A counted reference to a script object.
    Object(ObjectRef),
}

impl Default for Value {
    fn default() -> Self {
        Self::String(String::new())
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Type-checking predicates
// ──────────────────────────────────────────────────────────────────────────────

impl Value {
    /// Returns `true` if this value is a string.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns `true` for the empty string.
    #[inline]
    pub fn is_empty_string(&self) -> bool {
        matches!(self, Self::String(s) if s.is_empty())
    }

    /// Returns `true` if this value is an integer.
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    /// Returns `true` if this value is a float.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// Returns `true` if this value is an integer or a float.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Returns `true` if this value is an object reference.
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// The object reference, if this value holds one.
    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The string slice, if this value is a string.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Conversions
// ──────────────────────────────────────────────────────────────────────────────

impl Value {
    /// Text form of the value.
    ///
    /// | Value type | Result |
    /// |---|---|
    /// | `String` | the string itself |
    /// | `Integer` | decimal digits |
    /// | `Float` | decimal form, always with a fractional part (`2.0`) |
    /// | `Object` | the empty string |
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Object(_) => String::new(),
        }
    }

    /// Integer form of the value, if it has one.
    ///
    /// Floats truncate toward zero.  Strings parse as optionally signed
    /// decimal or `0x` hexadecimal after trimming whitespace.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Float(_) => None,
            Self::String(s) => parse_integer(s),
            Self::Object(_) => None,
        }
    }

    /// Truthiness: the empty string, `"0"`, `0` and `0.0` are false.
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::String(s) => !(s.is_empty() || s == "0"),
            Self::Integer(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Object(_) => true,
        }
    }
}

/// Formats a float so that it never reads back as an integer.
pub fn format_float(f: f64) -> String {
    let text = f.to_string();
    if f.is_finite() && !text.contains(['.', 'e', 'E']) {
        format!("{text}.0")
    } else {
        text
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        i64::from_str_radix(hex, 16).ok()?
    } else {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Integer(i64::from(b))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── predicates ────────────────────────────────────────────────────────────

    #[test]
    fn test_default_is_empty_string() {
        let v = Value::default();
        assert!(v.is_string());
        assert!(v.is_empty_string());
    }

    #[test]
    fn test_number_predicates() {
        assert!(Value::Integer(3).is_number());
        assert!(Value::Float(0.5).is_number());
        assert!(!Value::from("3").is_number());
    }

    // ── to_text ───────────────────────────────────────────────────────────────

    #[test]
    fn test_to_text_integer() {
        assert_eq!(Value::Integer(-42).to_text(), "-42");
    }

    #[test]
    fn test_to_text_float_keeps_fraction() {
        assert_eq!(Value::Float(2.0).to_text(), "2.0");
        assert_eq!(Value::Float(0.25).to_text(), "0.25");
        assert_eq!(Value::Float(f64::NAN).to_text(), "NaN");
    }

    // ── to_integer ────────────────────────────────────────────────────────────

    #[test]
    fn test_to_integer_parses_strings() {
        assert_eq!(Value::from(" 17 ").to_integer(), Some(17));
        assert_eq!(Value::from("-0x10").to_integer(), Some(-16));
        assert_eq!(Value::from("1.5").to_integer(), None);
        assert_eq!(Value::from("").to_integer(), None);
    }

    #[test]
    fn test_to_integer_rejects_sign_after_hex_prefix() {
        assert_eq!(Value::from("0x+5").to_integer(), None);
        assert_eq!(Value::from("0x-5").to_integer(), None);
        assert_eq!(Value::from("+0x5").to_integer(), Some(5));
        assert_eq!(Value::from("0x").to_integer(), None);
        assert_eq!(Value::from("0xfF").to_integer(), Some(255));
    }

    #[test]
    fn test_to_integer_truncates_floats() {
        assert_eq!(Value::Float(-2.9).to_integer(), Some(-2));
        assert_eq!(Value::Float(f64::INFINITY).to_integer(), None);
    }

    // ── to_boolean ────────────────────────────────────────────────────────────

    #[test]
    fn test_to_boolean() {
        assert!(!Value::default().to_boolean());
        assert!(!Value::from("0").to_boolean());
        assert!(Value::from("00").to_boolean());
        assert!(!Value::Integer(0).to_boolean());
        assert!(Value::Float(0.1).to_boolean());
    }

    #[test]
    fn test_from_bool_is_integer() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
    }
}

//! Field keys and their ordering.
//!
//! A key lives in one of three zones.  Integer keys sort numerically,
//! object keys by identity and string keys case-insensitively.  A string
//! that is the canonical decimal form of an integer (`"7"`, `"-3"`, but not
//! `"07"` or `"+7"`) is stored as that integer, so `a["7"]` and `a[7]` name
//! the same field.

use std::cmp::Ordering;

use crate::lifetime::ObjectRef;
use crate::objects::value::Value;

/// The zone a key is stored in.  Zones are laid out in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Zone {
    Integer,
    Object,
    String,
}

/// A normalized field key.
#[derive(Debug, Clone)]
pub enum Key {
    /// An integer key.
    Int(i64),
    /// An object key, compared by identity.  Holds a reference.
    Object(ObjectRef),
    /// A string key, compared ignoring case.  The original spelling is kept.
    Str(String),
}

impl Key {
    /// Normalizes a value into a key.
    ///
    /// Floats become string keys through their text form, so `2.0` and `2`
    /// are different keys.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Integer(n) => Self::Int(*n),
            Value::Object(obj) => Self::Object(obj.clone()),
            Value::String(s) => Self::from_text(s),
            Value::Float(_) => Self::from_text(&value.to_text()),
        }
    }

    /// Normalizes a string into a key.
    pub fn from_text(text: &str) -> Self {
        match parse_canonical_int(text) {
            Some(n) => Self::Int(n),
            None => Self::Str(text.to_owned()),
        }
    }

    /// The zone this key belongs to.
    #[inline]
    pub fn zone(&self) -> Zone {
        match self {
            Self::Int(_) => Zone::Integer,
            Self::Object(_) => Zone::Object,
            Self::Str(_) => Zone::String,
        }
    }

    /// The key as a script value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::Integer(*n),
            Self::Object(obj) => Value::Object(obj.clone()),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

    /// The integer, for keys in the integer zone.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns `true` if this is a string key equal to `name` ignoring case.
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Self::Str(s) if eq_ignore_case(s, name))
    }

    /// Total order: by zone first, then within the zone.
    pub fn compare(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Object(a), Self::Object(b)) => a.id().cmp(&b.id()),
            (Self::Str(a), Self::Str(b)) => cmp_ignore_case(a, b),
            _ => self.zone().cmp(&other.zone()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Key {}

/// Parses `text` as an integer only if it is the canonical decimal spelling
/// of that integer.
pub fn parse_canonical_int(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let bytes = digits.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    if text.starts_with('-') && digits == "0" {
        return None;
    }
    text.parse().ok()
}

/// Compares two strings ignoring case.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let lower = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
    if a.is_ascii() && b.is_ascii() {
        return a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()));
    }
    lower(a).cmp(&lower(b))
}

/// Returns `true` if the strings are equal ignoring case.
#[inline]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    cmp_ignore_case(a, b) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── normalization ─────────────────────────────────────────────────────────

    #[test]
    fn test_canonical_integer_strings_become_int_keys() {
        assert_eq!(Key::from_text("7"), Key::Int(7));
        assert_eq!(Key::from_text("-3"), Key::Int(-3));
        assert_eq!(Key::from_text("0"), Key::Int(0));
    }

    #[test]
    fn test_non_canonical_strings_stay_strings() {
        for text in ["07", "+7", "-0", " 7", "7.0", "", "-", "99999999999999999999"] {
            assert_eq!(Key::from_text(text).zone(), Zone::String, "{text:?}");
        }
    }

    #[test]
    fn test_float_keys_use_text_form() {
        assert_eq!(Key::from_value(&Value::Float(2.0)), Key::Str("2.0".into()));
        assert_eq!(Key::from_value(&Value::Float(2.5)).zone(), Zone::String);
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn test_string_keys_ignore_case() {
        assert_eq!(Key::from_text("Name"), Key::from_text("nAME"));
        assert_eq!(cmp_ignore_case("apple", "Banana"), Ordering::Less);
        assert!(eq_ignore_case("ÄBC", "äbc"));
    }

    #[test]
    fn test_zones_order_integer_object_string() {
        assert!(Zone::Integer < Zone::Object);
        assert!(Zone::Object < Zone::String);
        assert_eq!(Key::Int(99).compare(&Key::Str("a".into())), Ordering::Less);
    }

    #[test]
    fn test_is_name() {
        assert!(Key::from_text("BASE").is_name("base"));
        assert!(!Key::Int(1).is_name("1"));
    }
}

//! Names of the built-in methods every associative array answers to.

/// A built-in method of an associative array.
///
/// Built-ins are consulted only after the receiver and its prototype chain
/// miss, so a script can override any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    InsertAt,
    Push,
    RemoveAt,
    Pop,
    Delete,
    MinIndex,
    MaxIndex,
    Length,
    Count,
    SetCapacity,
    GetCapacity,
    GetAddress,
    NewEnum,
    HasKey,
    Clone,
}

const TABLE: &[(&str, Builtin)] = &[
    ("InsertAt", Builtin::InsertAt),
    ("Push", Builtin::Push),
    ("RemoveAt", Builtin::RemoveAt),
    ("Pop", Builtin::Pop),
    ("Delete", Builtin::Delete),
    ("MinIndex", Builtin::MinIndex),
    ("MaxIndex", Builtin::MaxIndex),
    ("Length", Builtin::Length),
    ("Count", Builtin::Count),
    ("SetCapacity", Builtin::SetCapacity),
    ("GetCapacity", Builtin::GetCapacity),
    ("GetAddress", Builtin::GetAddress),
    ("NewEnum", Builtin::NewEnum),
    ("HasKey", Builtin::HasKey),
    ("Clone", Builtin::Clone),
];

impl Builtin {
    /// Looks up a built-in by name, ignoring case and one leading `_`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix('_').unwrap_or(name);
        TABLE
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, b)| b)
    }

    /// Canonical spelling of the name.
    pub fn name(self) -> &'static str {
        TABLE
            .iter()
            .find(|&&(_, b)| b == self)
            .map_or("", |&(n, _)| n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(Builtin::from_name("push"), Some(Builtin::Push));
        assert_eq!(Builtin::from_name("MAXINDEX"), Some(Builtin::MaxIndex));
        assert_eq!(Builtin::from_name("getaddress"), Some(Builtin::GetAddress));
    }

    #[test]
    fn test_lookup_accepts_leading_underscore() {
        assert_eq!(Builtin::from_name("_NewEnum"), Some(Builtin::NewEnum));
        assert_eq!(Builtin::from_name("__NewEnum"), None);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(Builtin::from_name("Frobnicate"), None);
        assert_eq!(Builtin::from_name(""), None);
    }

    #[test]
    fn test_every_builtin_round_trips_its_name() {
        for &(name, builtin) in TABLE {
            assert_eq!(builtin.name(), name);
            assert_eq!(Builtin::from_name(name), Some(builtin));
        }
    }
}

//! Read-only textual dumps of object state for debuggers.
//!
//! ```text
//! Object {1: "a", 2: 2.5, inner: Object {...}, ...}
//! ```
//!
//! Only the requested page of the top-level fields is shown; nested objects
//! show their first page and collapse to `{...}` below `max_depth`.  Objects
//! that do not expose their fields render as their type name alone.

use std::fmt;

use crate::objects::value::Value;

/// Paging and depth limits for [`dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    /// Zero-based page of top-level fields.
    pub page: usize,
    /// Fields per page.
    pub page_size: usize,
    /// Nesting levels expanded below the top-level object.
    pub max_depth: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 10,
            max_depth: 1,
        }
    }
}

/// [`fmt::Display`] adapter rendering a value under [`DumpOptions`].
#[derive(Debug)]
pub struct Dump<'a> {
    value: &'a Value,
    options: DumpOptions,
}

impl<'a> Dump<'a> {
    pub fn new(value: &'a Value, options: DumpOptions) -> Self {
        Self { value, options }
    }

    fn fmt_value(&self, value: &Value, depth: usize, page: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obj = match value {
            Value::String(s) => return write!(f, "{s:?}"),
            Value::Object(obj) => obj,
            other => return write!(f, "{}", other.to_text()),
        };
        write!(f, "{}", obj.type_name())?;
        let Some(entries) = obj.get().entries() else {
            return Ok(());
        };
        if depth > self.options.max_depth {
            return write!(f, " {{...}}");
        }
        let size = self.options.page_size.max(1);
        let start = page.saturating_mul(size).min(entries.len());
        let end = start.saturating_add(size).min(entries.len());

        write!(f, " {{")?;
        let mut sep = "";
        if start > 0 {
            write!(f, "...")?;
            sep = ", ";
        }
        for (key, item) in &entries[start..end] {
            write!(f, "{sep}{}: ", key.to_text())?;
            self.fmt_value(item, depth + 1, 0, f)?;
            sep = ", ";
        }
        if end < entries.len() {
            write!(f, "{sep}...")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_value(self.value, 0, self.options.page, f)
    }
}

/// Renders `value` for display.
pub fn dump(value: &Value, options: &DumpOptions) -> String {
    Dump::new(value, *options).to_string()
}

//! List behaviour of the integer zone.
//!
//! An array whose integer keys run `1..=n` is a list.  `append` extends it
//! past the largest key, `insert_values` shifts later keys up and
//! `remove_at` shifts them back down, so a contiguous run stays contiguous.
//! `delete_range` removes keys without renumbering.

use crate::error::{TesseraError, TesseraResult};
use crate::objects::field::{Field, FieldStore};
use crate::objects::key::{Key, Zone};
use crate::objects::value::Value;

impl FieldStore {
    /// Appends `value` under the key one past the largest integer key (or
    /// `1` if there is none) and returns that key.
    pub fn append(&mut self, value: Value) -> TesseraResult<i64> {
        let key = self.next_index()?;
        let field = Field::new(Key::Int(key), value)?;
        let at = self.int_count();
        self.insert_at(at, field)?;
        Ok(key)
    }

    /// The key [`FieldStore::append`] would use.
    pub fn next_index(&self) -> TesseraResult<i64> {
        match self.max_index() {
            None => Ok(1),
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| TesseraError::KeyError(format!("no integer key after {max}"))),
        }
    }

    /// Inserts `values` under consecutive keys starting at `index`, shifting
    /// every existing key `>= index` up by `values.len()`.
    pub fn insert_values(&mut self, index: i64, values: Vec<Value>) -> TesseraResult<()> {
        let count = i64::try_from(values.len())
            .map_err(|_| TesseraError::KeyError("too many values".into()))?;
        if count == 0 {
            return Ok(());
        }
        let last = index
            .checked_add(count - 1)
            .ok_or_else(|| TesseraError::KeyError(format!("key {index} + {count} overflows")))?;
        if let Some(max) = self.max_index()
            && max >= index
            && max.checked_add(count).is_none()
        {
            return Err(TesseraError::KeyError(format!("key {max} + {count} overflows")));
        }
        let mut fields = Vec::with_capacity(values.len());
        for (offset, value) in (index..=last).zip(values) {
            fields.push(Field::new(Key::Int(offset), value)?);
        }
        self.reserve(fields.len())?;

        let at = self.find(&Key::Int(index)).unwrap_or_else(|at| at);
        for field in &mut self.int_fields_mut()[at..] {
            if let Key::Int(n) = &mut field.key {
                *n += count;
            }
        }
        for (offset, field) in fields.into_iter().enumerate() {
            self.insert_at(at + offset, field)?;
        }
        Ok(())
    }

    /// Removes the integer keys `index..index + length` and shifts every
    /// later integer key down by `length`.
    ///
    /// Keys in the span that do not exist are skipped; the shift happens
    /// regardless.  Returns the removed fields.
    pub fn remove_at(&mut self, index: i64, length: i64) -> TesseraResult<Vec<Field>> {
        if length <= 0 {
            return Ok(Vec::new());
        }
        let end = index
            .checked_add(length)
            .ok_or_else(|| TesseraError::KeyError(format!("key {index} + {length} overflows")))?;
        let start_at = self.find(&Key::Int(index)).unwrap_or_else(|at| at);
        let end_at = self.find(&Key::Int(end)).unwrap_or_else(|at| at);
        let removed = self.remove_range(start_at..end_at);
        for field in &mut self.int_fields_mut()[start_at..] {
            if let Key::Int(n) = &mut field.key {
                *n -= length;
            }
        }
        Ok(removed)
    }

    /// Removes the field with the largest integer key.
    pub fn pop(&mut self) -> Option<Field> {
        let count = self.int_count();
        if count == 0 {
            return None;
        }
        Some(self.remove_index(count - 1))
    }

    /// Removes every integer key in `min..=max` without renumbering.
    pub fn delete_range(&mut self, min: i64, max: i64) -> Vec<Field> {
        if min > max {
            return Vec::new();
        }
        let start_at = self.find(&Key::Int(min)).unwrap_or_else(|at| at);
        let end_at = match self.find(&Key::Int(max)) {
            Ok(at) => at + 1,
            Err(at) => at,
        };
        self.remove_range(start_at..end_at)
    }

    /// Values of the integer zone in key order.
    pub fn list_values(&self) -> Vec<Value> {
        self.fields()[self.zone_range(Zone::Integer)]
            .iter()
            .map(|f| f.value.to_value())
            .collect()
    }

    /// Returns `true` if the integer keys are exactly `1..=n`.
    pub fn is_contiguous_list(&self) -> bool {
        self.fields()[self.zone_range(Zone::Integer)]
            .iter()
            .zip(1_i64..)
            .all(|(f, expected)| f.key.as_int() == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> FieldStore {
        let mut store = FieldStore::new();
        for v in values {
            store.append(Value::from(*v)).unwrap();
        }
        store
    }

    fn texts(store: &FieldStore) -> Vec<String> {
        store.list_values().iter().map(Value::to_text).collect()
    }

    // ── append / pop ──────────────────────────────────────────────────────────

    #[test]
    fn test_append_starts_at_one() {
        let mut store = FieldStore::new();
        assert_eq!(store.append(Value::from("a")).unwrap(), 1);
        assert_eq!(store.append(Value::from("b")).unwrap(), 2);
        assert!(store.is_contiguous_list());
    }

    #[test]
    fn test_append_follows_largest_key() {
        let mut store = FieldStore::new();
        store.set(Key::Int(-5), Value::Integer(0)).unwrap();
        assert_eq!(store.append(Value::Integer(1)).unwrap(), -4);
        store.set(Key::from_text("name"), Value::Integer(0)).unwrap();
        assert_eq!(store.append(Value::Integer(2)).unwrap(), -3);
        assert!(store.check_invariants());
    }

    #[test]
    fn test_append_after_max_key_overflows() {
        let mut store = FieldStore::new();
        store.set(Key::Int(i64::MAX), Value::Integer(0)).unwrap();
        assert!(matches!(store.append(Value::Integer(1)), Err(TesseraError::KeyError(_))));
    }

    #[test]
    fn test_pop_removes_largest() {
        let mut store = list(&["a", "b", "c"]);
        let popped = store.pop().unwrap();
        assert_eq!(popped.key, Key::Int(3));
        assert_eq!(texts(&store), ["a", "b"]);
        assert!(FieldStore::new().pop().is_none());
    }

    // ── insert_values ─────────────────────────────────────────────────────────

    #[test]
    fn test_insert_shifts_later_keys() {
        let mut store = list(&["a", "d"]);
        store
            .insert_values(2, vec![Value::from("b"), Value::from("c")])
            .unwrap();
        assert_eq!(texts(&store), ["a", "b", "c", "d"]);
        assert!(store.is_contiguous_list());
        assert!(store.check_invariants());
    }

    #[test]
    fn test_insert_at_front_and_past_end() {
        let mut store = list(&["b"]);
        store.insert_values(1, vec![Value::from("a")]).unwrap();
        store.insert_values(3, vec![Value::from("c")]).unwrap();
        assert_eq!(texts(&store), ["a", "b", "c"]);
    }

    #[test]
    fn test_insert_nothing_is_noop() {
        let mut store = list(&["a"]);
        store.insert_values(1, Vec::new()).unwrap();
        assert_eq!(texts(&store), ["a"]);
    }

    // ── remove_at ─────────────────────────────────────────────────────────────

    #[test]
    fn test_remove_at_renumbers_down() {
        let mut store = list(&["a", "b", "c"]);
        let removed = store.remove_at(2, 1).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].value.to_text(), "b");
        assert_eq!(texts(&store), ["a", "c"]);
        assert!(store.is_contiguous_list());
    }

    #[test]
    fn test_remove_at_span_with_gap() {
        let mut store = list(&["a", "b", "c", "d"]);
        store.remove(&Key::Int(2));
        let removed = store.remove_at(2, 2).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(texts(&store), ["a", "d"]);
        assert_eq!(store.max_index(), Some(2));
    }

    #[test]
    fn test_remove_at_leaves_other_zones_alone() {
        let mut store = list(&["a", "b"]);
        store.set(Key::from_text("x"), Value::Integer(9)).unwrap();
        store.remove_at(1, 1).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.lookup(&Key::from_text("x")).is_some());
        assert!(store.check_invariants());
    }

    // ── delete_range ──────────────────────────────────────────────────────────

    #[test]
    fn test_delete_range_does_not_renumber() {
        let mut store = list(&["a", "b", "c", "d"]);
        let removed = store.delete_range(2, 3);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.min_index(), Some(1));
        assert_eq!(store.max_index(), Some(4));
        assert!(!store.is_contiguous_list());
    }

    #[test]
    fn test_delete_range_empty_when_reversed() {
        let mut store = list(&["a"]);
        assert!(store.delete_range(3, 1).is_empty());
    }
}

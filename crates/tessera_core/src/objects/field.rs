//! Field storage of an associative array.
//!
//! A [`FieldStore`] keeps every field in one [`GrowableBuffer`] divided into
//! three sorted zones: integer keys, then object keys, then string keys.
//! Two offsets mark where the object and string zones begin, so a lookup
//! binary-searches only the zone its key belongs to.
//!
//! Mutators that can displace an object value hand it back to the caller
//! instead of dropping it.  The caller drops it after releasing its borrow of
//! the store, since the release may run script code that touches the same
//! array.

use std::ops::Range;

use crate::buffer::{GrowableBuffer, TextBuffer};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::ObjectRef;
use crate::native::memory::MemoryBlock;
use crate::objects::key::{Key, Zone};
use crate::objects::value::{Value, format_float};

/// The stored form of a field value.
///
/// Strings own a [`TextBuffer`] so that reassignment can reuse the
/// allocation.  A string whose address has been taken moves into a
/// [`MemoryBlock`] and is read back up to its first NUL.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Object(ObjectRef),
    Text(TextBuffer),
    Pinned(MemoryBlock),
}

impl FieldValue {
    /// Converts a script value into its stored form.
    pub fn from_value(value: Value) -> TesseraResult<Self> {
        Ok(match value {
            Value::Integer(n) => Self::Integer(n),
            Value::Float(f) => Self::Float(f),
            Value::Object(obj) => Self::Object(obj),
            Value::String(s) => Self::Text(TextBuffer::from_text(&s)?),
        })
    }

    /// Reads the stored value back out.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::Integer(*n),
            Self::Float(f) => Value::Float(*f),
            Self::Object(obj) => Value::Object(obj.clone()),
            Self::Text(text) => Value::String(text.as_str().to_owned()),
            Self::Pinned(block) => Value::String(pinned_text(block)),
        }
    }

    /// Text form without allocating a [`Value`].
    pub fn to_text(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Object(_) => String::new(),
            Self::Text(text) => text.as_str().to_owned(),
            Self::Pinned(block) => pinned_text(block),
        }
    }

    /// Byte capacity of a string value, not counting the terminator of a
    /// pinned one.
    pub fn text_capacity(&self) -> Option<usize> {
        match self {
            Self::Text(text) => Some(text.capacity()),
            Self::Pinned(block) => Some(block.len().saturating_sub(1)),
            _ => None,
        }
    }

    /// Grows a string value to hold at least `capacity` bytes and returns
    /// the new capacity.  A pinned string that must grow moves to a new
    /// block, so its address changes.
    pub fn grow_text(&mut self, capacity: usize) -> TesseraResult<usize> {
        match self {
            Self::Text(text) => {
                if text.set_capacity(capacity) {
                    Ok(text.capacity())
                } else {
                    Err(TesseraError::OutOfMemory)
                }
            }
            Self::Pinned(block) => {
                if capacity >= block.len() {
                    let text = pinned_text(block);
                    let size = capacity.checked_add(1).ok_or(TesseraError::OutOfMemory)?;
                    let grown = MemoryBlock::zeroed(size)?;
                    grown.write(0, text.as_bytes())?;
                    *block = grown;
                }
                Ok(block.len() - 1)
            }
            _ => Err(TesseraError::TypeError("field does not hold a string".into())),
        }
    }

    /// Address of a string value's bytes, pinning it on first use.  `None`
    /// for values that are not strings.
    pub fn pin(&mut self) -> TesseraResult<Option<u64>> {
        match self {
            Self::Text(text) => {
                let size = text
                    .capacity()
                    .max(text.len())
                    .checked_add(1)
                    .ok_or(TesseraError::OutOfMemory)?;
                let block = MemoryBlock::zeroed(size)?;
                block.write(0, text.as_str().as_bytes())?;
                let address = block.address();
                *self = Self::Pinned(block);
                Ok(Some(address))
            }
            Self::Pinned(block) => Ok(Some(block.address())),
            _ => Ok(None),
        }
    }
}

/// Text of a pinned string: the bytes before the first NUL, with invalid
/// UTF-8 replaced.
fn pinned_text(block: &MemoryBlock) -> String {
    let bytes = block.read_vec(0, block.len()).unwrap_or_default();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// One key/value entry.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: Key,
    pub value: FieldValue,
}

impl Field {
    /// Builds a field, converting the value to its stored form.
    pub fn new(key: Key, value: Value) -> TesseraResult<Self> {
        Ok(Self {
            key,
            value: FieldValue::from_value(value)?,
        })
    }

    /// Overwrites the value and returns a displaced object reference.
    ///
    /// Assigning a string to a string field reuses its text buffer.
    pub fn assign(&mut self, value: Value) -> TesseraResult<Option<ObjectRef>> {
        if let (FieldValue::Text(text), Value::String(s)) = (&mut self.value, &value) {
            text.assign(s)?;
            return Ok(None);
        }
        if let (FieldValue::Pinned(block), Value::String(s)) = (&self.value, &value)
            && s.len() < block.len()
        {
            block.write(0, s.as_bytes())?;
            block.zero(s.len(), block.len() - s.len())?;
            return Ok(None);
        }
        let stored = FieldValue::from_value(value)?;
        Ok(match std::mem::replace(&mut self.value, stored) {
            FieldValue::Object(old) => Some(old),
            _ => None,
        })
    }
}

/// Zoned, sorted field array.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    fields: GrowableBuffer<Field>,
    object_offset: usize,
    string_offset: usize,
}

impl FieldStore {
    /// An empty store.  Does not allocate.
    pub const fn new() -> Self {
        Self {
            fields: GrowableBuffer::new(),
            object_offset: 0,
            string_offset: 0,
        }
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when there are no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field slots allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.fields.capacity()
    }

    /// Grows the field capacity.  Never shrinks.
    pub fn set_capacity(&mut self, capacity: usize) -> bool {
        self.fields.set_capacity(capacity)
    }

    /// Number of integer-keyed fields.
    #[inline]
    pub fn int_count(&self) -> usize {
        self.object_offset
    }

    /// All fields in storage order.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        self.fields.as_slice()
    }

    /// The field at `index` in storage order.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Mutable access to the field at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Field> {
        self.fields.get_mut(index)
    }

    /// Index range of a zone.
    pub fn zone_range(&self, zone: Zone) -> Range<usize> {
        match zone {
            Zone::Integer => 0..self.object_offset,
            Zone::Object => self.object_offset..self.string_offset,
            Zone::String => self.string_offset..self.fields.len(),
        }
    }

    /// Binary-searches the key's zone.
    ///
    /// Returns `Ok(index)` if found, otherwise `Err(index)` with the position
    /// where the key would be inserted.
    pub fn find(&self, key: &Key) -> Result<usize, usize> {
        let range = self.zone_range(key.zone());
        let start = range.start;
        self.fields.as_slice()[range]
            .binary_search_by(|field| field.key.compare(key))
            .map(|i| i + start)
            .map_err(|i| i + start)
    }

    /// Looks up a field by key.
    pub fn lookup(&self, key: &Key) -> Option<&Field> {
        self.find(key).ok().and_then(|i| self.fields.get(i))
    }

    /// Inserts `field` at `index`, which must be the position reported by
    /// [`FieldStore::find`] for its key.
    pub fn insert_at(&mut self, index: usize, field: Field) -> TesseraResult<()> {
        let zone = field.key.zone();
        self.fields.insert(index, field)?;
        match zone {
            Zone::Integer => {
                self.object_offset += 1;
                self.string_offset += 1;
            }
            Zone::Object => self.string_offset += 1,
            Zone::String => {}
        }
        Ok(())
    }

    /// Sets `key` to `value`, inserting the field if needed.
    ///
    /// Returns a displaced object value.
    pub fn set(&mut self, key: Key, value: Value) -> TesseraResult<Option<ObjectRef>> {
        match self.find(&key) {
            Ok(index) => self.fields.as_mut_slice()[index].assign(value),
            Err(index) => {
                self.fields.reserve(1)?;
                let field = Field::new(key, value)?;
                self.insert_at(index, field)?;
                Ok(None)
            }
        }
    }

    /// Removes the field at `index`.
    pub fn remove_index(&mut self, index: usize) -> Field {
        let field = self.fields.remove(index);
        self.shrink_offsets(field.key.zone(), 1);
        field
    }

    /// Removes the fields in `range`, which must lie inside one zone.
    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<Field> {
        let removed: Vec<Field> = self.fields.drain(range).collect();
        if let Some(first) = removed.first() {
            self.shrink_offsets(first.key.zone(), removed.len());
        }
        removed
    }

    /// Removes a field by key.
    pub fn remove(&mut self, key: &Key) -> Option<Field> {
        let index = self.find(key).ok()?;
        Some(self.remove_index(index))
    }

    fn shrink_offsets(&mut self, zone: Zone, count: usize) {
        match zone {
            Zone::Integer => {
                self.object_offset -= count;
                self.string_offset -= count;
            }
            Zone::Object => self.string_offset -= count,
            Zone::String => {}
        }
    }

    /// Smallest integer key.
    pub fn min_index(&self) -> Option<i64> {
        self.fields.as_slice()[..self.object_offset]
            .first()
            .and_then(|f| f.key.as_int())
    }

    /// Largest integer key.
    pub fn max_index(&self) -> Option<i64> {
        self.fields.as_slice()[..self.object_offset]
            .last()
            .and_then(|f| f.key.as_int())
    }

    /// Makes room for `additional` more fields.
    pub fn reserve(&mut self, additional: usize) -> TesseraResult<()> {
        self.fields.reserve(additional)
    }

    /// Mutable access to the integer zone, for renumbering.
    pub(crate) fn int_fields_mut(&mut self) -> &mut [Field] {
        let end = self.object_offset;
        &mut self.fields.as_mut_slice()[..end]
    }

    /// Copies every field into a store sized exactly to fit them.
    pub fn try_clone(&self) -> TesseraResult<Self> {
        let mut fields = GrowableBuffer::new();
        if !fields.set_capacity(self.fields.len()) {
            return Err(TesseraError::OutOfMemory);
        }
        fields.extend_from_slice(self.fields.as_slice())?;
        for field in fields.as_mut_slice() {
            if let FieldValue::Pinned(block) = &field.value {
                field.value = FieldValue::Text(TextBuffer::from_text(&pinned_text(block))?);
            }
        }
        Ok(Self {
            fields,
            object_offset: self.object_offset,
            string_offset: self.string_offset,
        })
    }

    /// Checks the zone layout: every key in its zone and every zone sorted
    /// without duplicates.
    pub fn check_invariants(&self) -> bool {
        let fields = self.fields.as_slice();
        if self.object_offset > self.string_offset || self.string_offset > fields.len() {
            return false;
        }
        let zones_ok = [Zone::Integer, Zone::Object, Zone::String]
            .into_iter()
            .all(|zone| fields[self.zone_range(zone)].iter().all(|f| f.key.zone() == zone));
        zones_ok
            && fields
                .windows(2)
                .all(|w| w[0].key.compare(&w[1].key) == std::cmp::Ordering::Less)
    }
}

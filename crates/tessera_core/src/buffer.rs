//! Grow-only contiguous storage.
//!
//! [`GrowableBuffer`] backs both the field array of an
//! [`AssociativeArray`][crate::objects::assoc_array::AssociativeArray] and the
//! text of string-valued fields ([`TextBuffer`]).  An empty buffer owns no
//! allocation: it sits on the zero-capacity sentinel that `Vec::new` provides,
//! so "no string value yet" costs nothing.
//!
//! Capacity only ever grows.  Growth goes through [`GrowableBuffer::set_capacity`],
//! which reports allocator failure as `false` and leaves the buffer untouched
//! instead of aborting the process.

use tracing::warn;

use crate::error::{TesseraError, TesseraResult};

/// Capacity used the first time an empty buffer is expanded.
pub const INITIAL_CAPACITY: usize = 4;

/// A capacity-doubling, grow-only contiguous store.
#[derive(Debug, Clone)]
pub struct GrowableBuffer<T> {
    data: Vec<T>,
}

impl<T> GrowableBuffer<T> {
    /// Creates a buffer bound to the empty sentinel.  Does not allocate.
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Returns `true` while the buffer has never been given any capacity.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.data.capacity() == 0
    }

    /// Number of initialised elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of elements the buffer can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Grows the buffer so that it can hold at least `new_capacity` elements.
    ///
    /// Requests at or below the current capacity succeed without doing
    /// anything; the buffer never shrinks.  Returns `false` if the allocator
    /// cannot satisfy the request, in which case the buffer is unchanged.
    pub fn set_capacity(&mut self, new_capacity: usize) -> bool {
        if new_capacity <= self.data.capacity() {
            return true;
        }
        let additional = new_capacity - self.data.len();
        match self.data.try_reserve_exact(additional) {
            Ok(()) => true,
            Err(err) => {
                warn!(requested = new_capacity, %err, "buffer growth failed");
                false
            }
        }
    }

    /// Doubles the capacity, or moves off the sentinel to
    /// [`INITIAL_CAPACITY`].
    pub fn expand(&mut self) -> bool {
        let current = self.data.capacity();
        let target = if current == 0 {
            INITIAL_CAPACITY
        } else {
            current.saturating_mul(2)
        };
        self.set_capacity(target)
    }

    /// Makes room for `additional` more elements, doubling as often as
    /// needed so that repeated appends stay amortised O(1).
    pub fn reserve(&mut self, additional: usize) -> TesseraResult<()> {
        let needed = self
            .data
            .len()
            .checked_add(additional)
            .ok_or(TesseraError::OutOfMemory)?;
        while self.data.capacity() < needed {
            if !self.expand() {
                return Err(TesseraError::OutOfMemory);
            }
        }
        Ok(())
    }

    /// Inserts `value` at `index`, shifting later elements up by one.
    ///
    /// # Panics
    /// Panics if `index > len`, like [`Vec::insert`].
    pub fn insert(&mut self, index: usize, value: T) -> TesseraResult<()> {
        self.reserve(1)?;
        self.data.insert(index, value);
        Ok(())
    }

    /// Appends `value` after the last element.
    pub fn push(&mut self, value: T) -> TesseraResult<()> {
        self.reserve(1)?;
        self.data.push(value);
        Ok(())
    }

    /// Removes and returns the element at `index`.  Capacity is retained.
    pub fn remove(&mut self, index: usize) -> T {
        self.data.remove(index)
    }

    /// Removes `range` and returns the removed elements.  Capacity is
    /// retained.
    pub fn drain(&mut self, range: std::ops::Range<usize>) -> std::vec::Drain<'_, T> {
        self.data.drain(range)
    }

    /// Drops every element but keeps the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Drops every element and returns the buffer to the empty sentinel.
    pub fn free(&mut self) {
        self.data = Vec::new();
    }

    /// Returns the initialised elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the initialised elements mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Returns a reference to the element at `index`, if any.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Returns a mutable reference to the element at `index`, if any.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    /// Iterates over the initialised elements.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T: Clone> GrowableBuffer<T> {
    /// Appends every element of `items`.
    pub fn extend_from_slice(&mut self, items: &[T]) -> TesseraResult<()> {
        self.reserve(items.len())?;
        self.data.extend_from_slice(items);
        Ok(())
    }
}

impl<T> Default for GrowableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// TextBuffer
// ──────────────────────────────────────────────────────────────────────────────

/// UTF-8 text stored in a [`GrowableBuffer`].
///
/// Reassigning a shorter string reuses the existing allocation.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    bytes: GrowableBuffer<u8>,
}

impl TextBuffer {
    /// Creates an empty text buffer on the sentinel.
    pub const fn new() -> Self {
        Self {
            bytes: GrowableBuffer::new(),
        }
    }

    /// Creates a text buffer holding a copy of `text`.
    pub fn from_text(text: &str) -> TesseraResult<Self> {
        let mut buffer = Self::new();
        buffer.assign(text)?;
        Ok(buffer)
    }

    /// Replaces the contents with `text`.
    ///
    /// The buffer is sized exactly on first use and only grows afterwards.
    /// If growth fails the old text is kept.
    pub fn assign(&mut self, text: &str) -> TesseraResult<()> {
        if !self.bytes.set_capacity(text.len()) {
            return Err(TesseraError::OutOfMemory);
        }
        self.bytes.clear();
        self.bytes.extend_from_slice(text.as_bytes())
    }

    /// Grows the byte capacity.  Never shrinks.
    pub fn set_capacity(&mut self, capacity: usize) -> bool {
        self.bytes.set_capacity(capacity)
    }

    /// Appends `text`, doubling the capacity when it runs out.
    pub fn push_str(&mut self, text: &str) -> TesseraResult<()> {
        self.bytes.extend_from_slice(text.as_bytes())
    }

    /// Returns the stored text.
    pub fn as_str(&self) -> &str {
        // Only `&str` data is ever written, so the bytes are valid UTF-8.
        std::str::from_utf8(self.bytes.as_slice()).unwrap_or_default()
    }

    /// Length of the text in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for the empty string.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Capacity of the underlying buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Releases the allocation and returns to the sentinel.
    pub fn free(&mut self) {
        self.bytes.free();
    }
}

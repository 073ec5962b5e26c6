//! Script objects that read and write a struct layout in place.
//!
//! A [`NativeStructView`] pairs a [`StructDefinition`] with a base address.
//! The memory is either allocated by the view (zeroed, and freed when the
//! view is torn down) or supplied by the caller through
//! [`NativeStructView::at_address`] or [`NativeStructView::set_pointer`], in
//! which case the view never frees it.
//!
//! Field access from script code:
//!
//! | Access | Meaning |
//! |---|---|
//! | `s.x` | read field `x` (element 1 of an array) |
//! | `s.x[i]` | read element `i` (1-based) of an array or through a pointer |
//! | `s.name` | read a `Char`/`WChar` array as text |
//! | `s.inner` | a view over a nested struct field |
//! | `s[i]` | a view over element `i` of a struct array |
//!
//! Built-in methods: `Size`, `Clone`, `SetPointer`, `Address`, `NewEnum`,
//! `Fill`.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject, invoke_value};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::{ObjectRef, RefCount};
use crate::native::descriptor::{FieldDescriptor, FieldType, ScalarKind, StructDefinition, TextEncoding};
use crate::native::memory::MemoryBlock;
use crate::objects::assoc_array::AssociativeArray;
use crate::objects::enumerator::StructEnumerator;
use crate::objects::key::{Key, eq_ignore_case};
use crate::objects::value::Value;

#[derive(Debug)]
struct ViewState {
    address: u64,
    count: usize,
    /// Keeps the viewed memory alive; `owned` says whether this view
    /// allocated it.
    block: Option<MemoryBlock>,
    owned: bool,
}

/// A typed window onto raw memory.
#[derive(Debug)]
pub struct NativeStructView {
    ref_count: RefCount,
    definition: Rc<StructDefinition>,
    state: RefCell<ViewState>,
}

impl NativeStructView {
    /// Allocates zeroed memory for one instance of `definition`.
    pub fn new(definition: Rc<StructDefinition>) -> TesseraResult<Self> {
        Self::with_count(definition, 1)
    }

    /// Allocates zeroed memory for `count` consecutive instances.
    pub fn with_count(definition: Rc<StructDefinition>, count: usize) -> TesseraResult<Self> {
        let count = count.max(1);
        let len = definition
            .size()
            .checked_mul(count)
            .ok_or(TesseraError::OutOfMemory)?;
        let block = MemoryBlock::zeroed(len)?;
        Ok(Self {
            ref_count: RefCount::new(),
            definition,
            state: RefCell::new(ViewState {
                address: block.address(),
                count,
                block: Some(block),
                owned: true,
            }),
        })
    }

    /// Allocates a view and returns the creator's handle.
    pub fn create(definition: Rc<StructDefinition>) -> TesseraResult<ObjectRef> {
        Ok(ObjectRef::new(Self::new(definition)?))
    }

    /// Parses `text` as a field list and allocates a view of it.
    pub fn from_definition_text(text: &str) -> TesseraResult<ObjectRef> {
        Self::create(StructDefinition::parse(text)?)
    }

    /// Views caller-owned memory at `address`.  Nothing is checked until the
    /// first access, and the memory is never freed by the view.
    pub fn at_address(definition: Rc<StructDefinition>, address: u64) -> Self {
        Self::external(definition, address, 1)
    }

    fn external(definition: Rc<StructDefinition>, address: u64, count: usize) -> Self {
        let block = MemoryBlock::resolve(address).ok().map(|(block, _)| block);
        Self {
            ref_count: RefCount::new(),
            definition,
            state: RefCell::new(ViewState {
                address,
                count: count.max(1),
                block,
                owned: false,
            }),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// The layout this view reads through.
    pub fn definition(&self) -> &Rc<StructDefinition> {
        &self.definition
    }

    /// Base address of element 1.
    pub fn address(&self) -> u64 {
        self.state.borrow().address
    }

    /// Size of one instance in bytes.
    pub fn size(&self) -> usize {
        self.definition.size()
    }

    /// Number of consecutive instances the view covers.
    pub fn element_count(&self) -> usize {
        self.state.borrow().count
    }

    /// Returns `true` if the view allocated its memory.
    pub fn is_owned(&self) -> bool {
        self.state.borrow().owned
    }

    fn field(&self, name: &str) -> TesseraResult<&FieldDescriptor> {
        self.definition
            .find(name)
            .ok_or_else(|| TesseraError::UnknownField(name.to_owned()))
    }

    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    // ── Addressing ────────────────────────────────────────────────────────────

    /// Address of the field's storage inside the struct.
    pub fn address_of(&self, name: &str) -> TesseraResult<u64> {
        let field = self.field(name)?;
        self.field_base(field)
    }

    /// Reads the address stored in a pointer field.
    pub fn get_pointer(&self, name: &str) -> TesseraResult<u64> {
        let field = self.field(name)?;
        if !field.is_pointer() {
            return Err(TesseraError::TypeError(format!("field '{name}' is not a pointer")));
        }
        read_address(self.field_base(field)?)
    }

    /// Stores `address` in a pointer field.
    pub fn set_pointer_field(&self, name: &str, address: u64) -> TesseraResult<()> {
        let field = self.field(name)?;
        if !field.is_pointer() {
            return Err(TesseraError::TypeError(format!("field '{name}' is not a pointer")));
        }
        write_at(self.field_base(field)?, &address.to_ne_bytes())
    }

    fn field_base(&self, field: &FieldDescriptor) -> TesseraResult<u64> {
        offset_address(self.address(), field.offset())
    }

    fn follow(&self, mut address: u64, depth: u8) -> TesseraResult<u64> {
        for _ in 0..depth {
            address = read_address(address)?;
            if address == 0 {
                return Err(TesseraError::InvalidAddress(0));
            }
        }
        Ok(address)
    }

    /// Address of element `index` (0-based) of a field, after following any
    /// pointers.
    fn element_address(&self, field: &FieldDescriptor, index: usize) -> TesseraResult<u64> {
        let base = self.field_base(field)?;
        if field.is_pointer() && field.array_len().is_none() {
            let target = self.follow(base, field.pointer_depth())?;
            return offset_address(target, index.saturating_mul(field.field_type().size()));
        }
        let len = field.array_len().unwrap_or(1);
        if index >= len {
            return Err(TesseraError::KeyError(format!(
                "index {} outside {}[1..={len}]",
                index + 1,
                field.name()
            )));
        }
        self.follow(offset_address(base, index * field.element_size())?, field.pointer_depth())
    }

    // ── Field values ──────────────────────────────────────────────────────────

    /// Reads a field.
    ///
    /// Character arrays read as text, struct fields as a view over the
    /// nested memory and other arrays as their first element.
    pub fn get(&self, name: &str) -> TesseraResult<Value> {
        let field = self.field(name)?;
        if let Some(encoding) = field.text_encoding() {
            let address = self.field_base(field)?;
            return read_text(address, field.storage_size(), encoding).map(Value::String);
        }
        if let FieldType::Struct(def) = field.field_type() {
            let address = self.element_address(field, 0)?;
            let count = field.array_len().unwrap_or(1);
            let view = Self::external(Rc::clone(def), address, count);
            return Ok(Value::Object(ObjectRef::new(view)));
        }
        self.get_element(name, 1)
    }

    /// Reads element `index` (1-based) of an array field or through a
    /// pointer field.
    pub fn get_element(&self, name: &str, index: usize) -> TesseraResult<Value> {
        let field = self.field(name)?;
        let index = index
            .checked_sub(1)
            .ok_or_else(|| TesseraError::KeyError(format!("index 0 of {name}")))?;
        let address = self.element_address(field, index)?;
        match field.field_type() {
            FieldType::Scalar { size, kind, .. } => {
                let mut raw = [0_u8; 8];
                read_at(address, &mut raw[..*size])?;
                Ok(decode_scalar(&raw[..*size], *kind))
            }
            FieldType::Struct(def) => Ok(Value::Object(ObjectRef::new(Self::external(
                Rc::clone(def),
                address,
                1,
            )))),
        }
    }

    /// Writes a field.
    ///
    /// Character arrays take text, truncated to leave room for the
    /// terminator.  Struct fields take an associative array (copied field by
    /// field) or another view of the same size (copied byte for byte).
    pub fn set(&self, name: &str, value: &Value) -> TesseraResult<()> {
        let field = self.field(name)?;
        if let Some(encoding) = field.text_encoding() {
            let address = self.field_base(field)?;
            return write_text(address, field.storage_size(), encoding, &value.to_text());
        }
        if let FieldType::Struct(def) = field.field_type() {
            let address = self.element_address(field, 0)?;
            let nested = Self::external(Rc::clone(def), address, 1);
            return nested.assign_from(value);
        }
        self.set_element(name, 1, value)
    }

    /// Writes element `index` (1-based) of an array field or through a
    /// pointer field.
    pub fn set_element(&self, name: &str, index: usize, value: &Value) -> TesseraResult<()> {
        let field = self.field(name)?;
        let index = index
            .checked_sub(1)
            .ok_or_else(|| TesseraError::KeyError(format!("index 0 of {name}")))?;
        let address = self.element_address(field, index)?;
        match field.field_type() {
            FieldType::Scalar { size, kind, .. } => {
                let raw = encode_scalar(value, *size, *kind)?;
                write_at(address, &raw)
            }
            FieldType::Struct(def) => {
                Self::external(Rc::clone(def), address, 1).assign_from(value)
            }
        }
    }

    fn assign_from(&self, value: &Value) -> TesseraResult<()> {
        let Some(obj) = value.as_object() else {
            return Err(TesseraError::TypeError(
                "a struct field takes an object".into(),
            ));
        };
        if let Some(source) = obj.downcast_ref::<AssociativeArray>() {
            self.object_to_struct(source);
            return Ok(());
        }
        if let Some(source) = obj.downcast_ref::<NativeStructView>() {
            if source.size() != self.size() {
                return Err(TesseraError::TypeError(format!(
                    "cannot copy a {}-byte struct into {} bytes",
                    source.size(),
                    self.size()
                )));
            }
            let mut bytes = vec![0; self.size()];
            read_at(source.address(), &mut bytes)?;
            return write_at(self.address(), &bytes);
        }
        Err(TesseraError::TypeError(format!(
            "cannot copy a {} into a struct",
            obj.type_name()
        )))
    }

    /// Copies same-named fields of `source` into the struct.
    ///
    /// Names are matched ignoring case.  Keys with no matching field, and
    /// values that cannot be stored in their field, are skipped.  Nested
    /// arrays fill nested structs, and lists fill array fields element by
    /// element.
    pub fn object_to_struct(&self, source: &AssociativeArray) {
        for field in self.definition.fields() {
            let Some(value) = source.get(&Value::from(field.name())) else {
                continue;
            };
            let list = value
                .as_object()
                .and_then(|obj| obj.downcast_ref::<AssociativeArray>());
            match (field.array_len(), list) {
                (Some(_), Some(list)) if field.text_encoding().is_none() => {
                    for (key, item) in list.pairs() {
                        if let Some(index) = key.to_integer().and_then(|i| usize::try_from(i).ok()) {
                            let _ = self.set_element(field.name(), index, &item);
                        }
                    }
                }
                _ => {
                    let _ = self.set(field.name(), &value);
                }
            }
        }
    }

    /// Snapshot of every field as an associative array.
    pub fn to_object(&self) -> TesseraResult<ObjectRef> {
        let pairs = self
            .definition
            .fields()
            .iter()
            .map(|f| Ok((Value::from(f.name()), self.get(f.name())?)))
            .collect::<TesseraResult<Vec<_>>>()?;
        AssociativeArray::create_from_pairs(pairs)
    }

    /// Fills every byte of the struct (all elements) with `byte`.
    pub fn fill(&self, byte: u8) -> TesseraResult<()> {
        let (block, offset, len) = self.extent()?;
        block.fill(offset, len, byte)
    }

    /// The block behind the view, the view's offset in it and the byte length
    /// of all elements.  Fails unless every element lies inside the block.
    fn extent(&self) -> TesseraResult<(MemoryBlock, usize, usize)> {
        let len = self
            .size()
            .checked_mul(self.element_count())
            .ok_or(TesseraError::OutOfMemory)?;
        let (block, offset) = MemoryBlock::resolve(self.address())?;
        match offset.checked_add(len) {
            Some(end) if end <= block.len() => Ok((block, offset, len)),
            _ => Err(TesseraError::OutOfBounds {
                offset,
                len: block.len(),
                size: len,
            }),
        }
    }

    // ── Rebinding and copying ─────────────────────────────────────────────────

    /// Points the view at caller-owned memory holding `count` instances.
    ///
    /// Memory the view allocated itself is released.  Returns `address`.
    pub fn set_pointer(&self, address: u64, count: usize) -> u64 {
        let block = MemoryBlock::resolve(address).ok().map(|(block, _)| block);
        let old = {
            let mut state = self.state.borrow_mut();
            state.address = address;
            state.count = count.max(1);
            state.owned = false;
            std::mem::replace(&mut state.block, block)
        };
        debug!(address, count, "struct view rebound");
        drop(old);
        address
    }

    /// A view over element `index` (1-based) of a struct array.
    pub fn element(&self, index: usize) -> TesseraResult<Self> {
        let count = self.element_count();
        if index == 0 || index > count {
            return Err(TesseraError::KeyError(format!(
                "element {index} outside 1..={count}"
            )));
        }
        let address = offset_address(self.address(), (index - 1) * self.size())?;
        Ok(Self::external(Rc::clone(&self.definition), address, 1))
    }

    /// A new view with its own copy of the viewed bytes.
    pub fn clone_view(&self) -> TesseraResult<Self> {
        let (block, offset, len) = self.extent()?;
        let bytes = block.read_vec(offset, len)?;
        let copy = Self::with_count(Rc::clone(&self.definition), self.element_count())?;
        write_at(copy.address(), &bytes)?;
        Ok(copy)
    }

    /// A view sharing the memory of nested struct field `name`.
    pub fn clone_field(&self, name: &str) -> TesseraResult<Self> {
        let field = self.field(name)?;
        let FieldType::Struct(def) = field.field_type() else {
            return Err(TesseraError::TypeError(format!(
                "field '{name}' is not a struct"
            )));
        };
        let address = self.element_address(field, 0)?;
        Ok(Self::external(
            Rc::clone(def),
            address,
            field.array_len().unwrap_or(1),
        ))
    }

    /// A `Next`-style enumerator over the fields of `view`.
    pub fn enumerator(view: &ObjectRef) -> TesseraResult<ObjectRef> {
        Ok(ObjectRef::new(StructEnumerator::new(view.clone())?))
    }

    /// Field names with their current values, in declaration order.
    /// Fields that cannot be read show as the empty string.
    pub fn field_values(&self) -> Vec<(Value, Value)> {
        self.definition
            .fields()
            .iter()
            .map(|f| (Value::from(f.name()), self.get(f.name()).unwrap_or_default()))
            .collect()
    }

    fn call_builtin(&self, this: &Value, name: &str, params: &[Value]) -> TesseraResult<Invoked> {
        let value = if eq_ignore_case(name, "Size") {
            Value::from(self.size())
        } else if eq_ignore_case(name, "Clone") {
            Value::Object(ObjectRef::new(self.clone_view()?))
        } else if eq_ignore_case(name, "SetPointer") {
            let address = params
                .first()
                .and_then(Value::to_integer)
                .ok_or_else(|| TesseraError::TypeError("SetPointer: expected an address".into()))?;
            let count = match params.get(1) {
                Some(v) => v
                    .to_integer()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| TesseraError::TypeError("SetPointer: bad count".into()))?,
                None => 1,
            };
            Value::Integer(self.set_pointer(address as u64, count) as i64)
        } else if eq_ignore_case(name, "Address") || eq_ignore_case(name, "GetAddress") {
            let address = match params.first() {
                Some(field) => self.address_of(&field.to_text())?,
                None => self.address(),
            };
            Value::Integer(address as i64)
        } else if eq_ignore_case(name, "NewEnum") || eq_ignore_case(name, "_NewEnum") {
            let owner = match this {
                Value::Object(obj) if obj.id() == self.id() => obj.clone(),
                _ => {
                    return Err(TesseraError::Internal(
                        "NewEnum called with a foreign receiver".into(),
                    ));
                }
            };
            Value::Object(Self::enumerator(&owner)?)
        } else if eq_ignore_case(name, "Fill") {
            let byte = params.first().and_then(Value::to_integer).unwrap_or(0);
            self.fill(byte as u8)?;
            Value::default()
        } else {
            return Ok(Invoked::NotHandled);
        };
        Ok(Invoked::Handled(value))
    }
}

impl ScriptObject for NativeStructView {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        if self.ref_count.is_destroyed() {
            return Err(TesseraError::Destroyed);
        }
        let Some((first, rest)) = args.split_first() else {
            return Ok(Invoked::NotHandled);
        };
        let key = Key::from_value(first);

        if flags.is_call() {
            return match &key {
                Key::Str(name) => self.call_builtin(this, name, rest),
                _ => Ok(Invoked::NotHandled),
            };
        }

        if let Key::Int(index) = key {
            let index = usize::try_from(index)
                .map_err(|_| TesseraError::KeyError(format!("element {index}")))?;
            let element = Value::Object(ObjectRef::new(self.element(index)?));
            return match rest {
                [] if flags.is_get() => Ok(Invoked::Handled(element)),
                [] => Ok(Invoked::NotHandled),
                _ => invoke_value(&element, flags.kind(), rest),
            };
        }

        let Key::Str(name) = key else {
            return Ok(Invoked::NotHandled);
        };
        if self.definition.find(&name).is_none() {
            if flags.is_set() {
                return Err(TesseraError::UnknownField(name));
            }
            return Ok(Invoked::NotHandled);
        }

        if flags.is_set() {
            return match rest {
                [value] => {
                    self.set(&name, value)?;
                    Ok(Invoked::Handled(value.clone()))
                }
                [index, value] => {
                    self.set_element(&name, element_index(index)?, value)?;
                    Ok(Invoked::Handled(value.clone()))
                }
                [] => Ok(Invoked::NotHandled),
                [index, more @ ..] => {
                    let element = self.get_element(&name, element_index(index)?)?;
                    invoke_value(&element, flags.kind(), more)
                }
            };
        }

        match rest {
            [] => Ok(Invoked::Handled(self.get(&name)?)),
            [index] => Ok(Invoked::Handled(self.get_element(&name, element_index(index)?)?)),
            [index, more @ ..] => {
                let element = self.get_element(&name, element_index(index)?)?;
                invoke_value(&element, flags.kind(), more)
            }
        }
    }

    fn type_name(&self) -> &'static str {
        "Struct"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn teardown(&self) {
        let block = {
            let mut state = self.state.borrow_mut();
            state.owned = false;
            state.block.take()
        };
        drop(block);
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        Some(self.field_values())
    }
}

fn element_index(value: &Value) -> TesseraResult<usize> {
    value
        .to_integer()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| TesseraError::KeyError(format!("bad element index '{}'", value.to_text())))
}

// ──────────────────────────────────────────────────────────────────────────────
// Raw memory helpers
// ──────────────────────────────────────────────────────────────────────────────

fn offset_address(base: u64, delta: usize) -> TesseraResult<u64> {
    base.checked_add(delta as u64)
        .ok_or(TesseraError::InvalidAddress(base))
}

fn read_at(address: u64, out: &mut [u8]) -> TesseraResult<()> {
    let (block, offset) = MemoryBlock::resolve(address)?;
    block.read(offset, out)
}

fn write_at(address: u64, data: &[u8]) -> TesseraResult<()> {
    let (block, offset) = MemoryBlock::resolve(address)?;
    block.write(offset, data)
}

fn read_address(address: u64) -> TesseraResult<u64> {
    let (block, offset) = MemoryBlock::resolve(address)?;
    block.read_address(offset)
}

fn read_text(address: u64, capacity: usize, encoding: TextEncoding) -> TesseraResult<String> {
    let mut raw = vec![0; capacity];
    read_at(address, &mut raw)?;
    Ok(match encoding {
        TextEncoding::Utf8 => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8_lossy(&raw[..end]).into_owned()
        }
        TextEncoding::Utf16 => {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
    })
}

fn write_text(address: u64, capacity: usize, encoding: TextEncoding, text: &str) -> TesseraResult<()> {
    let mut raw = vec![0; capacity];
    match encoding {
        TextEncoding::Utf8 => {
            let mut end = text.len().min(capacity.saturating_sub(1));
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            raw[..end].copy_from_slice(&text.as_bytes()[..end]);
        }
        TextEncoding::Utf16 => {
            let room = (capacity / 2).saturating_sub(1);
            let mut units: Vec<u16> = text.encode_utf16().take(room).collect();
            if units.last().is_some_and(|u| (0xD800..0xDC00).contains(u)) {
                units.pop();
            }
            for (slot, unit) in raw.chunks_exact_mut(2).zip(&units) {
                slot.copy_from_slice(&unit.to_ne_bytes());
            }
        }
    }
    write_at(address, &raw)
}

fn decode_scalar(raw: &[u8], kind: ScalarKind) -> Value {
    fn bytes<const N: usize>(raw: &[u8]) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&raw[..N]);
        out
    }
    match (kind, raw.len()) {
        (ScalarKind::Float, 4) => Value::Float(f64::from(f32::from_ne_bytes(bytes(raw)))),
        (ScalarKind::Float, _) => Value::Float(f64::from_ne_bytes(bytes(raw))),
        (ScalarKind::Signed, 1) => Value::Integer(i64::from(i8::from_ne_bytes(bytes(raw)))),
        (ScalarKind::Signed, 2) => Value::Integer(i64::from(i16::from_ne_bytes(bytes(raw)))),
        (ScalarKind::Signed, 4) => Value::Integer(i64::from(i32::from_ne_bytes(bytes(raw)))),
        (ScalarKind::Signed, _) => Value::Integer(i64::from_ne_bytes(bytes(raw))),
        (ScalarKind::Unsigned, 1) => Value::Integer(i64::from(raw[0])),
        (ScalarKind::Unsigned, 2) => Value::Integer(i64::from(u16::from_ne_bytes(bytes(raw)))),
        (ScalarKind::Unsigned, 4) => Value::Integer(i64::from(u32::from_ne_bytes(bytes(raw)))),
        // 64-bit unsigned values above i64::MAX wrap to negative.
        (ScalarKind::Unsigned, _) => Value::Integer(u64::from_ne_bytes(bytes(raw)) as i64),
    }
}

fn encode_scalar(value: &Value, size: usize, kind: ScalarKind) -> TesseraResult<SmallVec<[u8; 8]>> {
    let not_numeric = || {
        TesseraError::TypeError(format!("'{}' is not a number", value.to_text()))
    };
    if kind == ScalarKind::Float {
        let f = match value {
            Value::Float(f) => *f,
            Value::Integer(n) => *n as f64,
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| not_numeric())?,
            Value::Object(_) => return Err(not_numeric()),
        };
        return Ok(if size == 4 {
            SmallVec::from_slice(&(f as f32).to_ne_bytes())
        } else {
            SmallVec::from_slice(&f.to_ne_bytes())
        });
    }
    let n = match value {
        Value::Object(_) => return Err(not_numeric()),
        other => other.to_integer().ok_or_else(not_numeric)?,
    };
    Ok(match size {
        1 => SmallVec::from_slice(&(n as i8).to_ne_bytes()),
        2 => SmallVec::from_slice(&(n as i16).to_ne_bytes()),
        4 => SmallVec::from_slice(&(n as i32).to_ne_bytes()),
        _ => SmallVec::from_slice(&n.to_ne_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{call_method, get_member, set_member};

    fn view(text: &str) -> NativeStructView {
        NativeStructView::new(StructDefinition::parse(text).unwrap()).unwrap()
    }

    // ── scalar fields ─────────────────────────────────────────────────────────

    #[test]
    fn test_new_view_is_zeroed() {
        let s = view("Int lo; Int hi");
        assert_eq!(s.size(), 8);
        assert_eq!(s.get("lo").unwrap(), Value::Integer(0));
        assert!(s.is_owned());
    }

    #[test]
    fn test_set_then_get_scalars() {
        let s = view("Char c; UShort w; Int i; Float f; Double d; UInt64 u");
        s.set("c", &Value::Integer(-1)).unwrap();
        s.set("w", &Value::Integer(70_000)).unwrap();
        s.set("i", &Value::from("-12")).unwrap();
        s.set("f", &Value::Float(0.5)).unwrap();
        s.set("d", &Value::Integer(3)).unwrap();
        s.set("u", &Value::Integer(-1)).unwrap();
        assert_eq!(s.get("c").unwrap(), Value::Integer(-1));
        assert_eq!(s.get("w").unwrap(), Value::Integer(70_000 - 65_536));
        assert_eq!(s.get("I").unwrap(), Value::Integer(-12));
        assert_eq!(s.get("f").unwrap(), Value::Float(0.5));
        assert_eq!(s.get("d").unwrap(), Value::Float(3.0));
        assert_eq!(s.get("u").unwrap(), Value::Integer(-1));
    }

    #[test]
    fn test_unknown_field_and_bad_value() {
        let s = view("Int x");
        assert_eq!(s.get("y"), Err(TesseraError::UnknownField("y".into())));
        assert!(s.set("x", &Value::from("abc")).is_err());
    }

    // ── arrays and text ───────────────────────────────────────────────────────

    #[test]
    fn test_array_elements_are_one_based() {
        let s = view("Short a[3]");
        s.set_element("a", 3, &Value::Integer(7)).unwrap();
        assert_eq!(s.get_element("a", 3).unwrap(), Value::Integer(7));
        assert_eq!(s.get("a").unwrap(), Value::Integer(0));
        assert!(s.get_element("a", 0).is_err());
        assert!(s.get_element("a", 4).is_err());
    }

    #[test]
    fn test_char_array_text_truncates() {
        let s = view("Char name[6]; Int after");
        s.set("after", &Value::Integer(99)).unwrap();
        s.set("name", &Value::from("tessera")).unwrap();
        assert_eq!(s.get("name").unwrap(), Value::from("tesse"));
        assert_eq!(s.get("after").unwrap(), Value::Integer(99));
        s.set("name", &Value::from("ab")).unwrap();
        assert_eq!(s.get("name").unwrap(), Value::from("ab"));
    }

    #[test]
    fn test_utf8_truncation_keeps_char_boundary() {
        let s = view("Char t[4]");
        s.set("t", &Value::from("aéé")).unwrap();
        assert_eq!(s.get("t").unwrap(), Value::from("aé"));
    }

    #[test]
    fn test_wchar_array_text() {
        let s = view("WChar t[4]");
        s.set("t", &Value::from("héllo")).unwrap();
        assert_eq!(s.get("t").unwrap(), Value::from("hél"));
    }

    // ── pointers ──────────────────────────────────────────────────────────────

    #[test]
    fn test_pointer_field_follows_address() {
        let target = view("Int a[2]");
        target.set_element("a", 2, &Value::Integer(5)).unwrap();
        let s = view("Int* p");
        s.set_pointer_field("p", target.address()).unwrap();
        assert_eq!(s.get_pointer("p").unwrap(), target.address());
        assert_eq!(s.get("p").unwrap(), Value::Integer(0));
        assert_eq!(s.get_element("p", 2).unwrap(), Value::Integer(5));
        s.set("p", &Value::Integer(8)).unwrap();
        assert_eq!(target.get("a").unwrap(), Value::Integer(8));
    }

    #[test]
    fn test_null_pointer_fails() {
        let s = view("Int* p");
        assert_eq!(s.get("p"), Err(TesseraError::InvalidAddress(0)));
        assert!(s.get_pointer("missing").is_err());
        assert!(view("Int x").get_pointer("x").is_err());
    }

    // ── nested structs ────────────────────────────────────────────────────────

    fn nested() -> NativeStructView {
        let point = StructDefinition::parse("Int x; Int y").unwrap();
        let def = StructDefinition::parse_with("Int tag; Point pos; Point pts[2]", |n| {
            eq_ignore_case(n, "Point").then(|| Rc::clone(&point))
        })
        .unwrap();
        NativeStructView::new(def).unwrap()
    }

    #[test]
    fn test_clone_field_shares_memory() {
        let s = nested();
        let pos = s.clone_field("pos").unwrap();
        pos.set("y", &Value::Integer(4)).unwrap();
        assert_eq!(pos.address(), s.address_of("pos").unwrap());
        let again = s.get("pos").unwrap();
        let again = again.as_object().unwrap().downcast_ref::<NativeStructView>().unwrap();
        assert_eq!(again.get("y").unwrap(), Value::Integer(4));
        assert!(s.clone_field("tag").is_err());
    }

    #[test]
    fn test_struct_array_elements() {
        let s = nested();
        let pts = s.clone_field("pts").unwrap();
        assert_eq!(pts.element_count(), 2);
        pts.element(2).unwrap().set("x", &Value::Integer(11)).unwrap();
        let second = s.get_element("pts", 2).unwrap();
        let second = second.as_object().unwrap().downcast_ref::<NativeStructView>().unwrap();
        assert_eq!(second.get("x").unwrap(), Value::Integer(11));
        assert!(pts.element(3).is_err());
    }

    // ── copying and rebinding ─────────────────────────────────────────────────

    #[test]
    fn test_clone_view_is_independent() {
        let s = view("Int x");
        s.set("x", &Value::Integer(1)).unwrap();
        let copy = s.clone_view().unwrap();
        copy.set("x", &Value::Integer(2)).unwrap();
        assert_eq!(s.get("x").unwrap(), Value::Integer(1));
        assert_eq!(copy.get("x").unwrap(), Value::Integer(2));
        assert_ne!(copy.address(), s.address());
    }

    #[test]
    fn test_set_pointer_rebinds_without_owning() {
        let backing = view("Int v[2]");
        backing.set_element("v", 2, &Value::Integer(42)).unwrap();
        let s = view("Int v");
        let old = s.address();
        s.set_pointer(backing.address(), 2);
        assert!(!s.is_owned());
        assert!(MemoryBlock::resolve(old).is_err());
        assert_eq!(s.element(2).unwrap().get("v").unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_oversized_count_fails_fill_and_clone() {
        let backing = view("Int64 a");
        let obj = Value::Object(NativeStructView::from_definition_text("Int64 a").unwrap());
        let address = Value::Integer(backing.address() as i64);
        call_method(&obj, "SetPointer", &[address.clone(), Value::Integer(i64::MAX / 4)]).unwrap();
        assert!(call_method(&obj, "Fill", &[Value::Integer(1)]).is_err());
        assert!(call_method(&obj, "Clone", &[]).is_err());

        call_method(&obj, "SetPointer", &[address.clone(), Value::Integer(4)]).unwrap();
        assert!(matches!(
            call_method(&obj, "Fill", &[Value::Integer(1)]),
            Err(TesseraError::OutOfBounds { .. })
        ));
        assert_eq!(backing.get("a").unwrap(), Value::Integer(0));

        call_method(&obj, "SetPointer", &[address, Value::Integer(1)]).unwrap();
        call_method(&obj, "Fill", &[Value::Integer(1)]).unwrap();
        assert_eq!(backing.get("a").unwrap(), Value::Integer(0x0101_0101_0101_0101));
        assert!(call_method(&obj, "Clone", &[]).is_ok());
    }

    #[test]
    fn test_object_to_struct_skips_mismatches() {
        let s = nested();
        let pos = AssociativeArray::create_from_pairs([
            (Value::from("x"), Value::Integer(3)),
            (Value::from("y"), Value::Integer(4)),
        ])
        .unwrap();
        let source = AssociativeArray::create_from_pairs([
            (Value::from("TAG"), Value::Integer(9)),
            (Value::from("pos"), Value::Object(pos)),
            (Value::from("unrelated"), Value::Integer(1)),
        ])
        .unwrap();
        s.object_to_struct(source.downcast_ref::<AssociativeArray>().unwrap());
        assert_eq!(s.get("tag").unwrap(), Value::Integer(9));
        let pos = s.clone_field("pos").unwrap();
        assert_eq!(pos.get("x").unwrap(), Value::Integer(3));
        assert_eq!(pos.get("y").unwrap(), Value::Integer(4));
    }

    #[test]
    fn test_object_to_struct_fills_arrays() {
        let s = view("Int a[3]; Int b");
        let list = AssociativeArray::create_list([Value::Integer(1), Value::Integer(2)]).unwrap();
        let source = AssociativeArray::create_from_pairs([
            (Value::from("a"), Value::Object(list)),
            (Value::from("b"), Value::from("not a number")),
        ])
        .unwrap();
        s.object_to_struct(source.downcast_ref::<AssociativeArray>().unwrap());
        assert_eq!(s.get_element("a", 2).unwrap(), Value::Integer(2));
        assert_eq!(s.get("b").unwrap(), Value::Integer(0));
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[test]
    fn test_dispatch_get_set_and_builtins() {
        let s = Value::Object(NativeStructView::from_definition_text("Int lo; Int hi").unwrap());
        set_member(&s, "hi", Value::Integer(5)).unwrap();
        assert_eq!(get_member(&s, "HI").unwrap(), Invoked::Handled(Value::Integer(5)));
        assert_eq!(get_member(&s, "nope").unwrap(), Invoked::NotHandled);
        assert!(set_member(&s, "nope", Value::Integer(1)).is_err());
        assert_eq!(call_method(&s, "Size", &[]).unwrap(), Invoked::Handled(Value::Integer(8)));
        let copy = call_method(&s, "Clone", &[]).unwrap().into_value().unwrap();
        assert_eq!(get_member(&copy, "hi").unwrap(), Invoked::Handled(Value::Integer(5)));
    }

    #[test]
    fn test_dispatch_element_index() {
        let s = Value::Object(NativeStructView::from_definition_text("Int a[2]").unwrap());
        invoke_value(
            &s,
            InvokeFlags::SET,
            &[Value::from("a"), Value::Integer(2), Value::Integer(6)],
        )
        .unwrap();
        let got = invoke_value(&s, InvokeFlags::GET, &[Value::from("a"), Value::Integer(2)])
            .unwrap();
        assert_eq!(got, Invoked::Handled(Value::Integer(6)));
    }

    #[test]
    fn test_teardown_frees_owned_memory() {
        let obj = NativeStructView::from_definition_text("Int x").unwrap();
        let address = obj.downcast_ref::<NativeStructView>().unwrap().address();
        assert!(MemoryBlock::resolve(address).is_ok());
        drop(obj);
        assert!(MemoryBlock::resolve(address).is_err());
    }

    #[test]
    fn test_external_view_does_not_free() {
        let backing = view("Int x");
        let obj = ObjectRef::new(NativeStructView::at_address(
            Rc::clone(backing.definition()),
            backing.address(),
        ));
        drop(obj);
        assert!(MemoryBlock::resolve(backing.address()).is_ok());
    }
}

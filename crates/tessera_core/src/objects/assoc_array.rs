//! The associative array: the general-purpose script object.
//!
//! # Storage model
//!
//! Fields live in a [`FieldStore`] split into integer, object and string
//! zones, each kept sorted.  Integer keys double as list positions (see
//! [`crate::objects::list`]).
//!
//! # Dispatch
//!
//! [`AssociativeArray::invoke`] resolves a member in this order:
//!
//! 1. an own field, which is read, written, called or, for a
//!    [`Property`], routed through its accessors;
//! 2. the prototype chain, asked with [`InvokeFlags::META_OBJECT`];
//! 3. the `base` pseudo-key, which reads or replaces the prototype;
//! 4. for calls, the [built-in methods][Builtin];
//! 5. the `__Get`, `__Set` or `__Call` meta-function found on the chain;
//! 6. for writes, a new own field.
//!
//! Steps 3 to 6 only run on the receiver itself, never on a prototype
//! answering for it.  When the last holder is released, a `__Delete`
//! meta-function on the chain runs first and may keep the array alive.

use std::any::Any;
use std::cell::RefCell;

use tracing::{debug, warn};

use crate::dispatch::{
    Builtin, InvokeFlags, Invoked, ScriptObject, call_value, invoke_value,
};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::{ObjectRef, RefCount};
use crate::objects::enumerator::{FieldEnumerator, ListEnumerator};
use crate::objects::field::FieldStore;
use crate::objects::key::Key;
use crate::objects::property::Property;
use crate::objects::value::Value;

/// Longest prototype chain [`AssociativeArray::set_prototype`] accepts.
pub const MAX_PROTOTYPE_DEPTH: usize = 256;

/// Name of the pseudo-key that reads and writes the prototype.
pub const BASE_KEY: &str = "base";

/// A reference-counted map from keys to values with an optional prototype.
#[derive(Debug)]
pub struct AssociativeArray {
    ref_count: RefCount,
    store: RefCell<FieldStore>,
    prototype: RefCell<Option<ObjectRef>>,
}

impl AssociativeArray {
    /// Creates an empty array with no prototype.  Does not allocate fields.
    pub fn new() -> Self {
        Self {
            ref_count: RefCount::new(),
            store: RefCell::new(FieldStore::new()),
            prototype: RefCell::new(None),
        }
    }

    /// Creates an empty array that delegates to `prototype`.
    pub fn with_prototype(prototype: ObjectRef) -> Self {
        let array = Self::new();
        *array.prototype.borrow_mut() = Some(prototype);
        array
    }

    /// Creates an empty array and returns the creator's handle.
    pub fn create() -> ObjectRef {
        ObjectRef::new(Self::new())
    }

    /// Creates a list holding `values` under keys `1..=n`.
    pub fn create_list(values: impl IntoIterator<Item = Value>) -> TesseraResult<ObjectRef> {
        let array = Self::new();
        for value in values {
            array.append(value)?;
        }
        Ok(ObjectRef::new(array))
    }

    /// Creates an array from key/value pairs.
    pub fn create_from_pairs(
        pairs: impl IntoIterator<Item = (Value, Value)>,
    ) -> TesseraResult<ObjectRef> {
        let array = Self::new();
        for (key, value) in pairs {
            array.set(&key, value)?;
        }
        Ok(ObjectRef::new(array))
    }

    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    // ── Field access ──────────────────────────────────────────────────────────

    /// Number of fields.
    pub fn count(&self) -> usize {
        self.store.borrow().len()
    }

    /// Field slots allocated.
    pub fn capacity(&self) -> usize {
        self.store.borrow().capacity()
    }

    /// Grows the field capacity to at least `capacity`.  Never shrinks.
    pub fn set_capacity(&self, capacity: usize) -> TesseraResult<()> {
        if self.store.borrow_mut().set_capacity(capacity) {
            debug!(capacity, "field capacity set");
            Ok(())
        } else {
            Err(TesseraError::OutOfMemory)
        }
    }

    /// Reads an own field.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.get_key(&Key::from_value(key))
    }

    /// Reads an own field by normalized key.
    pub fn get_key(&self, key: &Key) -> Option<Value> {
        self.store.borrow().lookup(key).map(|f| f.value.to_value())
    }

    /// Writes an own field, inserting it if needed.
    pub fn set(&self, key: &Value, value: Value) -> TesseraResult<()> {
        self.set_key(Key::from_value(key), value)
    }

    /// Writes an own field by normalized key.
    pub fn set_key(&self, key: Key, value: Value) -> TesseraResult<()> {
        let displaced = self.store.borrow_mut().set(key, value)?;
        drop(displaced);
        Ok(())
    }

    /// Returns `true` if an own field exists for `key`.
    pub fn has_key(&self, key: &Value) -> bool {
        let key = Key::from_value(key);
        self.store.borrow().find(&key).is_ok()
    }

    /// Removes an own field without renumbering and returns its value.
    pub fn remove(&self, key: &Value) -> Option<Value> {
        let key = Key::from_value(key);
        let removed = self.store.borrow_mut().remove(&key);
        removed.map(|f| f.value.to_value())
    }

    /// Drops every field and returns the store to the empty sentinel.
    pub fn clear(&self) {
        let store = std::mem::take(&mut *self.store.borrow_mut());
        drop(store);
    }

    /// Snapshot of every key/value pair in storage order.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.store
            .borrow()
            .fields()
            .iter()
            .map(|f| (f.key.to_value(), f.value.to_value()))
            .collect()
    }

    /// The pair at `index` in storage order.
    pub fn pair_at(&self, index: usize) -> Option<(Value, Value)> {
        self.store
            .borrow()
            .get(index)
            .map(|f| (f.key.to_value(), f.value.to_value()))
    }

    /// The pair at `index` within the integer zone.
    pub fn int_pair_at(&self, index: usize) -> Option<(Value, Value)> {
        let store = self.store.borrow();
        if index >= store.int_count() {
            return None;
        }
        store
            .get(index)
            .map(|f| (f.key.to_value(), f.value.to_value()))
    }

    /// Byte capacity of a string field, if `key` holds a string.
    pub fn text_capacity(&self, key: &Value) -> Option<usize> {
        let key = Key::from_value(key);
        self.store
            .borrow()
            .lookup(&key)
            .and_then(|f| f.value.text_capacity())
    }

    /// Grows the text buffer of a string field, creating an empty string
    /// field if `key` is absent.  Returns the new byte capacity.
    pub fn set_text_capacity(&self, key: &Value, capacity: usize) -> TesseraResult<usize> {
        let key = Key::from_value(key);
        let mut store = self.store.borrow_mut();
        let index = match store.find(&key) {
            Ok(index) => index,
            Err(index) => {
                let field = crate::objects::field::Field::new(key, Value::default())?;
                store.insert_at(index, field)?;
                index
            }
        };
        match store.get_mut(index) {
            Some(field) => field.value.grow_text(capacity),
            None => Err(TesseraError::KeyError(format!("no field at slot {index}"))),
        }
    }

    /// Address of the bytes of string field `key`, NUL-terminated, for
    /// native code to read or fill in place.  The address stays valid until
    /// the field is assigned a non-string, grown past its capacity, or
    /// removed.  `None` if `key` is absent or not a string.
    pub fn text_address(&self, key: &Value) -> TesseraResult<Option<u64>> {
        let key = Key::from_value(key);
        let mut store = self.store.borrow_mut();
        let Ok(index) = store.find(&key) else {
            return Ok(None);
        };
        match store.get_mut(index) {
            Some(field) => field.value.pin(),
            None => Ok(None),
        }
    }

    // ── List operations ───────────────────────────────────────────────────────

    /// Appends after the largest integer key and returns the new key.
    pub fn append(&self, value: Value) -> TesseraResult<i64> {
        self.store.borrow_mut().append(value)
    }

    /// Inserts `values` at `index`, shifting later integer keys up.
    pub fn insert_at(&self, index: i64, values: Vec<Value>) -> TesseraResult<()> {
        self.store.borrow_mut().insert_values(index, values)
    }

    /// Removes integer key `index`, shifting later integer keys down.
    /// Returns the removed value, if the key existed.
    pub fn remove_at(&self, index: i64) -> TesseraResult<Option<Value>> {
        let removed = self.store.borrow_mut().remove_at(index, 1)?;
        Ok(removed.into_iter().next().map(|f| f.value.to_value()))
    }

    /// Removes `length` integer keys from `index`, shifting later keys down.
    /// Returns how many fields existed in the span.
    pub fn remove_span(&self, index: i64, length: i64) -> TesseraResult<usize> {
        let removed = self.store.borrow_mut().remove_at(index, length)?;
        Ok(removed.len())
    }

    /// Removes the field with the largest integer key.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.store.borrow_mut().pop();
        popped.map(|f| f.value.to_value())
    }

    /// Removes integer keys in `min..=max` without renumbering.
    pub fn delete_range(&self, min: i64, max: i64) -> usize {
        let removed = self.store.borrow_mut().delete_range(min, max);
        removed.len()
    }

    /// Smallest integer key.
    pub fn min_index(&self) -> Option<i64> {
        self.store.borrow().min_index()
    }

    /// Largest integer key.
    pub fn max_index(&self) -> Option<i64> {
        self.store.borrow().max_index()
    }

    /// Number of integer-keyed fields.
    pub fn int_count(&self) -> usize {
        self.store.borrow().int_count()
    }

    /// Values under integer keys, in key order.
    pub fn list_values(&self) -> Vec<Value> {
        self.store.borrow().list_values()
    }

    // ── Prototype ─────────────────────────────────────────────────────────────

    /// Replaces the prototype.
    ///
    /// Fails with a type error if `prototype` is this array or already
    /// delegates to it, or if the resulting chain would be longer than
    /// [`MAX_PROTOTYPE_DEPTH`].
    pub fn set_prototype(&self, prototype: Option<ObjectRef>) -> TesseraResult<()> {
        let mut cursor = prototype.clone();
        let mut depth = 0;
        while let Some(link) = cursor {
            if link.id() == self.id() {
                warn!("prototype cycle rejected");
                return Err(TesseraError::TypeError("prototype chain would form a cycle".into()));
            }
            depth += 1;
            if depth > MAX_PROTOTYPE_DEPTH {
                return Err(TesseraError::TypeError(format!(
                    "prototype chain longer than {MAX_PROTOTYPE_DEPTH}"
                )));
            }
            cursor = link.prototype();
        }
        let old = self.prototype.replace(prototype);
        drop(old);
        Ok(())
    }

    /// Returns `true` if `base` appears anywhere on this array's prototype
    /// chain.  An array is not derived from itself.
    pub fn is_derived_from(&self, base: &ObjectRef) -> bool {
        let mut cursor = self.prototype.borrow().clone();
        for _ in 0..MAX_PROTOTYPE_DEPTH {
            let Some(link) = cursor else {
                return false;
            };
            if link.id() == base.id() {
                return true;
            }
            cursor = link.prototype();
        }
        false
    }

    // ── Copying ───────────────────────────────────────────────────────────────

    /// Shallow copy: same keys, values and prototype; object values are
    /// shared.  The copy's field capacity equals its field count.
    pub fn clone_array(&self) -> TesseraResult<Self> {
        let store = self.store.borrow().try_clone()?;
        Ok(Self {
            ref_count: RefCount::new(),
            store: RefCell::new(store),
            prototype: RefCell::new(self.prototype()),
        })
    }

    /// Checks the zone layout of the field store.
    pub fn check_invariants(&self) -> bool {
        self.store.borrow().check_invariants()
    }

    // ── Dispatch helpers ──────────────────────────────────────────────────────

    fn self_ref(&self, this: &Value) -> TesseraResult<ObjectRef> {
        match this {
            Value::Object(obj) if obj.id() == self.id() => Ok(obj.clone()),
            _ => Err(TesseraError::Internal(
                "built-in called with a foreign receiver".into(),
            )),
        }
    }

    fn delegate(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        match self.prototype() {
            Some(proto) => proto.get().invoke(this, flags | InvokeFlags::META_OBJECT, args),
            None => Ok(Invoked::NotHandled),
        }
    }

    /// Finds a meta-function by name on the prototype chain.
    fn meta_function(&self, this: &Value, name: &str) -> TesseraResult<Option<Value>> {
        let flags = InvokeFlags::META_OBJECT | InvokeFlags::META_FUNC;
        let found = self.delegate(this, flags, &[Value::from(name)])?;
        Ok(found.into_value().filter(Value::is_object))
    }

    fn invoke_field(
        &self,
        this: &Value,
        flags: InvokeFlags,
        args: &[Value],
        key: Key,
        value: Value,
    ) -> TesseraResult<Invoked> {
        if let Value::Object(obj) = &value
            && let Some(property) = obj.downcast_ref::<Property>()
        {
            return property.access(this, flags, &args[1..]);
        }
        if flags.is_call() {
            let mut call_args = Vec::with_capacity(args.len());
            call_args.push(this.clone());
            call_args.extend_from_slice(&args[1..]);
            return call_value(&value, &call_args);
        }
        if flags.is_set() {
            if flags.is_meta() {
                return Ok(Invoked::NotHandled);
            }
            return match args {
                [_, new_value] => {
                    self.set_key(key, new_value.clone())?;
                    Ok(Invoked::Handled(new_value.clone()))
                }
                [_, rest @ ..] if value.is_object() => invoke_value(&value, flags.kind(), rest),
                _ => Err(TesseraError::TypeError(format!(
                    "cannot assign through non-object field '{}'",
                    key.to_value().to_text()
                ))),
            };
        }
        if args.len() > 1 {
            return invoke_value(&value, flags.kind(), &args[1..]);
        }
        Ok(Invoked::Handled(value))
    }

    fn invoke_missing(
        &self,
        this: &Value,
        flags: InvokeFlags,
        args: &[Value],
        key: Key,
    ) -> TesseraResult<Invoked> {
        if let Invoked::Handled(value) = self.delegate(this, flags, args)? {
            return Ok(Invoked::Handled(value));
        }
        if flags.is_meta() {
            return Ok(Invoked::NotHandled);
        }

        if key.is_name(BASE_KEY) && !flags.is_call() {
            match args {
                [_] => {
                    return Ok(Invoked::Handled(
                        self.prototype().map_or_else(Value::default, Value::Object),
                    ));
                }
                [_, new_base] if flags.is_set() => {
                    self.set_prototype(new_base.as_object().cloned())?;
                    return Ok(Invoked::Handled(new_base.clone()));
                }
                _ => {}
            }
        }

        if flags.is_call()
            && let Key::Str(name) = &key
            && let Some(builtin) = Builtin::from_name(name)
        {
            return self.call_builtin(this, builtin, &args[1..]);
        }

        if let Some(meta) = self.meta_function(this, flags.meta_function_name())? {
            let mut meta_args = Vec::with_capacity(args.len() + 1);
            meta_args.push(this.clone());
            meta_args.extend_from_slice(args);
            return call_value(&meta, &meta_args);
        }

        if flags.is_set() {
            return match args {
                [] | [_] => Ok(Invoked::NotHandled),
                [_, value] => {
                    self.set_key(key, value.clone())?;
                    Ok(Invoked::Handled(value.clone()))
                }
                [_, rest @ ..] => {
                    let nested = match self.prototype() {
                        Some(proto) => ObjectRef::new(Self::with_prototype(proto)),
                        None => Self::create(),
                    };
                    self.set_key(key, Value::Object(nested.clone()))?;
                    nested.invoke(flags.kind(), rest)
                }
            };
        }
        Ok(Invoked::NotHandled)
    }

    fn call_builtin(
        &self,
        this: &Value,
        builtin: Builtin,
        params: &[Value],
    ) -> TesseraResult<Invoked> {
        let value = match builtin {
            Builtin::Push => {
                let mut last = self.max_index().unwrap_or(0);
                for param in params {
                    last = self.append(param.clone())?;
                }
                Value::Integer(last)
            }
            Builtin::InsertAt => {
                let (position, values) = params
                    .split_first()
                    .ok_or_else(|| too_few_params(builtin))?;
                self.insert_at(int_param(builtin, position)?, values.to_vec())?;
                Value::default()
            }
            Builtin::RemoveAt => match params {
                [position] => self
                    .remove_at(int_param(builtin, position)?)?
                    .unwrap_or_default(),
                [position, length] => Value::from(
                    self.remove_span(int_param(builtin, position)?, int_param(builtin, length)?)?,
                ),
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::Pop => self.pop().unwrap_or_default(),
            Builtin::Delete => match params {
                [key] => self.remove(key).unwrap_or_default(),
                [min, max] => Value::from(
                    self.delete_range(int_param(builtin, min)?, int_param(builtin, max)?),
                ),
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::MinIndex => self.min_index().map_or_else(Value::default, Value::Integer),
            Builtin::MaxIndex => self.max_index().map_or_else(Value::default, Value::Integer),
            Builtin::Length => Value::Integer(self.max_index().unwrap_or(0).max(0)),
            Builtin::Count => Value::from(self.count()),
            Builtin::GetCapacity => match params {
                [] => Value::from(self.capacity()),
                [key] => self
                    .text_capacity(key)
                    .map_or_else(Value::default, Value::from),
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::SetCapacity => match params {
                [capacity] => {
                    self.set_capacity(size_param(builtin, capacity)?)?;
                    Value::from(self.capacity())
                }
                [key, capacity] => {
                    Value::from(self.set_text_capacity(key, size_param(builtin, capacity)?)?)
                }
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::GetAddress => match params {
                [key] => self
                    .text_address(key)?
                    .map_or_else(Value::default, |address| Value::Integer(address as i64)),
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::NewEnum => {
                Value::Object(ObjectRef::new(ListEnumerator::new(self.self_ref(this)?)?))
            }
            Builtin::HasKey => match params {
                [key] => Value::from(self.has_key(key)),
                _ => return Err(bad_param_count(builtin)),
            },
            Builtin::Clone => Value::Object(ObjectRef::new(self.clone_array()?)),
        };
        Ok(Invoked::Handled(value))
    }

    /// An enumerator over every field of `array`, in storage order.
    pub fn field_enumerator(array: &ObjectRef) -> TesseraResult<ObjectRef> {
        Ok(ObjectRef::new(FieldEnumerator::new(array.clone())?))
    }
}

fn too_few_params(builtin: Builtin) -> TesseraError {
    TesseraError::TypeError(format!("{}: too few parameters", builtin.name()))
}

fn bad_param_count(builtin: Builtin) -> TesseraError {
    TesseraError::TypeError(format!("{}: wrong number of parameters", builtin.name()))
}

fn int_param(builtin: Builtin, value: &Value) -> TesseraResult<i64> {
    value.to_integer().ok_or_else(|| {
        TesseraError::TypeError(format!(
            "{}: expected an integer, got '{}'",
            builtin.name(),
            value.to_text()
        ))
    })
}

fn size_param(builtin: Builtin, value: &Value) -> TesseraResult<usize> {
    let n = int_param(builtin, value)?;
    usize::try_from(n).map_err(|_| {
        TesseraError::TypeError(format!("{}: capacity must not be negative", builtin.name()))
    })
}

impl Default for AssociativeArray {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptObject for AssociativeArray {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        if self.ref_count.is_destroyed() {
            return Err(TesseraError::Destroyed);
        }
        let Some(first) = args.first() else {
            return Ok(Invoked::NotHandled);
        };
        let key = Key::from_value(first);

        if flags.contains(InvokeFlags::META_FUNC) {
            if let Some(value) = self.get_key(&key) {
                return Ok(Invoked::Handled(value));
            }
            return self.delegate(this, flags, args);
        }

        match self.get_key(&key) {
            Some(value) => self.invoke_field(this, flags, args, key, value),
            None => self.invoke_missing(this, flags, args, key),
        }
    }

    fn type_name(&self) -> &'static str {
        "Object"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.borrow().clone()
    }

    fn delete(&self, this: &ObjectRef) -> bool {
        if self.prototype.borrow().is_some() {
            let receiver = Value::Object(this.clone());
            match self.meta_function(&receiver, "__Delete") {
                Ok(Some(meta)) => {
                    if let Err(err) = call_value(&meta, std::slice::from_ref(&receiver)) {
                        warn!(%err, "__Delete failed");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "__Delete lookup failed"),
            }
            drop(receiver);
            if self.ref_count.count() > 1 {
                return false;
            }
        }
        self.teardown();
        true
    }

    fn teardown(&self) {
        let store = std::mem::take(&mut *self.store.borrow_mut());
        let prototype = self.prototype.borrow_mut().take();
        drop(store);
        drop(prototype);
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        Some(self.pairs())
    }
}

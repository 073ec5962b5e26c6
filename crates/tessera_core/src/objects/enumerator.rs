//! Cursor objects over arrays and struct views.
//!
//! An enumerator holds a reference to its owner and an offset that only
//! moves forward.  Script code drives it by calling `Next`, which returns a
//! two-element list `[key, value]` or the empty string once exhausted.
//! Rust code uses [`Enumerator::next_pair`] or [`Enumerator::pairs`].
//!
//! Enumerators read the owner live: entries added behind the cursor are
//! skipped and entries added ahead of it are seen.

use std::any::Any;
use std::cell::Cell;

use tracing::trace;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::{ObjectRef, RefCount};
use crate::native::struct_view::NativeStructView;
use crate::objects::assoc_array::AssociativeArray;
use crate::objects::key::Key;
use crate::objects::value::Value;

/// Method name that advances an enumerator.
pub const NEXT_METHOD: &str = "Next";

/// A forward-only cursor producing key/value pairs.
pub trait Enumerator {
    /// Advances the cursor and returns the next pair.
    fn next_pair(&self) -> Option<(Value, Value)>;

    /// Drains the remaining pairs.
    fn pairs(&self) -> impl Iterator<Item = (Value, Value)> + '_
    where
        Self: Sized,
    {
        std::iter::from_fn(move || self.next_pair())
    }
}

fn invoke_enumerator(
    enumerator: &dyn Enumerator,
    flags: InvokeFlags,
    args: &[Value],
) -> TesseraResult<Invoked> {
    let is_next = args
        .first()
        .is_some_and(|name| Key::from_value(name).is_name(NEXT_METHOD));
    if !flags.is_call() || !is_next {
        return Ok(Invoked::NotHandled);
    }
    match enumerator.next_pair() {
        Some((key, value)) => Ok(Invoked::Handled(Value::Object(
            AssociativeArray::create_list([key, value])?,
        ))),
        None => {
            trace!("enumerator exhausted");
            Ok(Invoked::Handled(Value::default()))
        }
    }
}

fn owner_array(owner: &ObjectRef) -> TesseraResult<&AssociativeArray> {
    owner
        .downcast_ref::<AssociativeArray>()
        .ok_or_else(|| TesseraError::TypeError(format!("cannot enumerate {}", owner.type_name())))
}

// ──────────────────────────────────────────────────────────────────────────────
// ListEnumerator
// ──────────────────────────────────────────────────────────────────────────────

/// Walks the integer zone of an array in key order.
///
/// This is what an array's `NewEnum` returns.
#[derive(Debug)]
pub struct ListEnumerator {
    ref_count: RefCount,
    owner: ObjectRef,
    offset: Cell<usize>,
}

impl ListEnumerator {
    /// Creates a cursor before the first integer key of `owner`.
    pub fn new(owner: ObjectRef) -> TesseraResult<Self> {
        owner_array(&owner)?;
        Ok(Self {
            ref_count: RefCount::new(),
            owner,
            offset: Cell::new(0),
        })
    }
}

impl Enumerator for ListEnumerator {
    fn next_pair(&self) -> Option<(Value, Value)> {
        let array = self.owner.downcast_ref::<AssociativeArray>()?;
        let pair = array.int_pair_at(self.offset.get())?;
        self.offset.set(self.offset.get() + 1);
        Some(pair)
    }
}

impl ScriptObject for ListEnumerator {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        invoke_enumerator(self, flags, args)
    }

    fn type_name(&self) -> &'static str {
        "ListEnumerator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// FieldEnumerator
// ──────────────────────────────────────────────────────────────────────────────

/// Walks every field of an array: integer keys, then object keys, then
/// string keys.
#[derive(Debug)]
pub struct FieldEnumerator {
    ref_count: RefCount,
    owner: ObjectRef,
    offset: Cell<usize>,
}

impl FieldEnumerator {
    /// Creates a cursor before the first field of `owner`.
    pub fn new(owner: ObjectRef) -> TesseraResult<Self> {
        owner_array(&owner)?;
        Ok(Self {
            ref_count: RefCount::new(),
            owner,
            offset: Cell::new(0),
        })
    }
}

impl Enumerator for FieldEnumerator {
    fn next_pair(&self) -> Option<(Value, Value)> {
        let array = self.owner.downcast_ref::<AssociativeArray>()?;
        let pair = array.pair_at(self.offset.get())?;
        self.offset.set(self.offset.get() + 1);
        Some(pair)
    }
}

impl ScriptObject for FieldEnumerator {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        invoke_enumerator(self, flags, args)
    }

    fn type_name(&self) -> &'static str {
        "FieldEnumerator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// StructEnumerator
// ──────────────────────────────────────────────────────────────────────────────

/// Walks the fields of a struct view in declaration order, yielding each
/// field name with its current value.
#[derive(Debug)]
pub struct StructEnumerator {
    ref_count: RefCount,
    owner: ObjectRef,
    offset: Cell<usize>,
}

impl StructEnumerator {
    /// Creates a cursor before the first field of the view `owner`.
    pub fn new(owner: ObjectRef) -> TesseraResult<Self> {
        if !owner.is::<NativeStructView>() {
            return Err(TesseraError::TypeError(format!(
                "cannot enumerate {} as a struct",
                owner.type_name()
            )));
        }
        Ok(Self {
            ref_count: RefCount::new(),
            owner,
            offset: Cell::new(0),
        })
    }
}

impl Enumerator for StructEnumerator {
    fn next_pair(&self) -> Option<(Value, Value)> {
        let view = self.owner.downcast_ref::<NativeStructView>()?;
        let name = view.definition().fields().get(self.offset.get())?.name().to_owned();
        self.offset.set(self.offset.get() + 1);
        let value = view.get(&name).unwrap_or_default();
        Some((Value::String(name), value))
    }
}

impl ScriptObject for StructEnumerator {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        invoke_enumerator(self, flags, args)
    }

    fn type_name(&self) -> &'static str {
        "StructEnumerator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

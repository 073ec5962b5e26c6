//! Accessor properties.
//!
//! A [`Property`] stored as a field value turns reads and writes of that
//! field into calls.  The getter receives `[this, params...]`; the setter
//! receives `[this, params..., value]`.  A property without a getter reads
//! as missing; one without a setter is read-only.

use std::any::Any;
use std::cell::RefCell;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject, call_function, call_value};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::{ObjectRef, RefCount};
use crate::objects::key::Key;
use crate::objects::value::Value;

/// A getter/setter pair.
#[derive(Debug)]
pub struct Property {
    ref_count: RefCount,
    getter: RefCell<Option<ObjectRef>>,
    setter: RefCell<Option<ObjectRef>>,
}

impl Property {
    /// Creates a property from optional accessor functions.
    pub fn new(getter: Option<ObjectRef>, setter: Option<ObjectRef>) -> Self {
        Self {
            ref_count: RefCount::new(),
            getter: RefCell::new(getter),
            setter: RefCell::new(setter),
        }
    }

    /// Creates a property and returns the creator's handle.
    pub fn create(getter: Option<ObjectRef>, setter: Option<ObjectRef>) -> ObjectRef {
        ObjectRef::new(Self::new(getter, setter))
    }

    /// The getter, if any.
    pub fn getter(&self) -> Option<ObjectRef> {
        self.getter.borrow().clone()
    }

    /// The setter, if any.
    pub fn setter(&self) -> Option<ObjectRef> {
        self.setter.borrow().clone()
    }

    /// Runs the accessor matching `flags` on behalf of `this`.
    ///
    /// `params` excludes the member name.  For a call, the getter's result is
    /// called with `params`.
    pub fn access(&self, this: &Value, flags: InvokeFlags, params: &[Value]) -> TesseraResult<Invoked> {
        let with_this = |extra: &[Value]| {
            let mut args = Vec::with_capacity(extra.len() + 1);
            args.push(this.clone());
            args.extend_from_slice(extra);
            args
        };
        if flags.is_set() {
            let Some(setter) = self.setter() else {
                return Err(TesseraError::TypeError("property is read-only".into()));
            };
            return call_function(&setter, &with_this(params));
        }
        let Some(getter) = self.getter() else {
            return Ok(Invoked::NotHandled);
        };
        if flags.is_call() {
            let Invoked::Handled(target) = call_function(&getter, &with_this(&[]))? else {
                return Ok(Invoked::NotHandled);
            };
            return call_value(&target, &with_this(params));
        }
        call_function(&getter, &with_this(params))
    }

    fn accessor_slot(&self, name: &Value) -> Option<&RefCell<Option<ObjectRef>>> {
        let key = Key::from_value(name);
        if key.is_name("Get") {
            Some(&self.getter)
        } else if key.is_name("Set") {
            Some(&self.setter)
        } else {
            None
        }
    }
}

impl ScriptObject for Property {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    /// Exposes the accessors as members `Get` and `Set`.
    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        let Some(slot) = args.first().and_then(|name| self.accessor_slot(name)) else {
            return Ok(Invoked::NotHandled);
        };
        match (flags.kind(), args) {
            (kind, [_, value]) if kind == InvokeFlags::SET => {
                let old = slot.replace(value.as_object().cloned());
                drop(old);
                Ok(Invoked::Handled(value.clone()))
            }
            (kind, [_]) if kind.is_get() => Ok(Invoked::Handled(
                slot.borrow().clone().map_or_else(Value::default, Value::Object),
            )),
            _ => Ok(Invoked::NotHandled),
        }
    }

    fn type_name(&self) -> &'static str {
        "Property"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn teardown(&self) {
        let getter = self.getter.borrow_mut().take();
        let setter = self.setter.borrow_mut().take();
        drop(getter);
        drop(setter);
    }
}

//! The shared prototype root.
//!
//! Strings and numbers have no members of their own.  When a script reads
//! or calls a member on one, dispatch falls through to the per-thread
//! [`PrototypeRoot`], whose behaviour table can be extended with
//! [`PrototypeRoot::define`].  The root is never counted and never torn
//! down.

use std::any::Any;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject};
use crate::error::TesseraResult;
use crate::lifetime::{ObjectRef, RefCount};
use crate::objects::assoc_array::{AssociativeArray, BASE_KEY};
use crate::objects::key::Key;
use crate::objects::value::Value;

thread_local! {
    static ROOT: ObjectRef = ObjectRef::new(PrototypeRoot::new());
}

/// Returns the prototype root of the current thread.
pub fn prototype_root() -> ObjectRef {
    ROOT.with(ObjectRef::clone)
}

/// Process-lifetime object consulted by primitives.
#[derive(Debug)]
pub struct PrototypeRoot {
    behavior: AssociativeArray,
}

impl PrototypeRoot {
    fn new() -> Self {
        Self {
            behavior: AssociativeArray::new(),
        }
    }

    /// Installs `value` as member `name` of the current thread's root.
    pub fn define(name: &str, value: Value) -> TesseraResult<()> {
        let root = prototype_root();
        match root.downcast_ref::<PrototypeRoot>() {
            Some(this) => this.behavior.set(&Value::from(name), value),
            None => Ok(()),
        }
    }

    /// Removes member `name` from the current thread's root.
    pub fn undefine(name: &str) -> Option<Value> {
        let root = prototype_root();
        root.downcast_ref::<PrototypeRoot>()
            .and_then(|this| this.behavior.remove(&Value::from(name)))
    }
}

impl ScriptObject for PrototypeRoot {
    fn ref_count(&self) -> &RefCount {
        self.behavior.ref_count()
    }

    fn invoke(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        let receiver_is_object = this.is_object();
        if flags.is_set() && !receiver_is_object {
            return Ok(Invoked::NotHandled);
        }
        if !receiver_is_object
            && flags.is_get()
            && !flags.contains(InvokeFlags::META_FUNC)
            && let [name] = args
            && Key::from_value(name).is_name(BASE_KEY)
        {
            return Ok(Invoked::Handled(Value::Object(prototype_root())));
        }
        self.behavior
            .invoke(this, flags | InvokeFlags::META_OBJECT, args)
    }

    fn type_name(&self) -> &'static str {
        "PrototypeRoot"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn add_ref(&self) -> u32 {
        1
    }

    fn release(&self, _this: &ObjectRef) -> u32 {
        1
    }

    fn delete(&self, _this: &ObjectRef) -> bool {
        false
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        Some(self.behavior.pairs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{call_method, get_member, invoke_value, set_member};
    use crate::objects::function::NativeFunction;

    #[test]
    fn test_root_is_not_counted() {
        let root = prototype_root();
        let before = root.ref_count();
        let copies: Vec<_> = (0..5).map(|_| root.clone()).collect();
        assert_eq!(root.ref_count(), before);
        drop(copies);
        assert_eq!(root.release(), 1);
        assert!(!root.is_destroyed());
    }

    #[test]
    fn test_same_root_per_thread() {
        assert_eq!(prototype_root(), prototype_root());
    }

    #[test]
    fn test_primitive_base_is_root() {
        let got = get_member(&Value::from("text"), "base").unwrap();
        assert_eq!(got, Invoked::Handled(Value::Object(prototype_root())));
    }

    #[test]
    fn test_primitive_cannot_take_fields() {
        let got = set_member(&Value::Integer(3), "x", Value::Integer(1)).unwrap();
        assert_eq!(got, Invoked::NotHandled);
        assert_eq!(get_member(&Value::Integer(3), "x").unwrap(), Invoked::NotHandled);
    }

    #[test]
    fn test_defined_method_applies_to_primitives() {
        PrototypeRoot::define(
            "Twice",
            Value::Object(NativeFunction::create("Twice", |args| {
                Ok(Value::Integer(args[0].to_integer().unwrap_or(0) * 2))
            })),
        )
        .unwrap();
        let got = call_method(&Value::Integer(21), "Twice", &[]).unwrap();
        assert_eq!(got, Invoked::Handled(Value::Integer(42)));
        let via_string = call_method(&Value::from("4"), "twice", &[]).unwrap();
        assert_eq!(via_string, Invoked::Handled(Value::Integer(8)));
        PrototypeRoot::undefine("Twice");
        assert_eq!(
            call_method(&Value::Integer(1), "Twice", &[]).unwrap(),
            Invoked::NotHandled
        );
    }

    #[test]
    fn test_builtins_do_not_apply_to_primitives() {
        let got = invoke_value(&Value::from("s"), InvokeFlags::CALL, &[Value::from("Count")])
            .unwrap();
        assert_eq!(got, Invoked::NotHandled);
    }
}

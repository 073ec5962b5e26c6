//! The uniform member-access protocol.
//!
//! Every script object answers a single entry point,
//! [`ScriptObject::invoke`], with the receiver, a set of [`InvokeFlags`] and
//! an argument list.  `args[0]` names the member (or is the key), extra
//! arguments chain into nested lookups, and for a write the value is the last
//! argument.
//!
//! A lookup miss is not an error: objects answer [`Invoked::NotHandled`] so
//! that a caller can continue along the prototype chain.  Inside that chain
//! the [`InvokeFlags::META_OBJECT`] bit tells a prototype it is answering on
//! behalf of another receiver; [`InvokeFlags::META_FUNC`] asks for the raw
//! value of a member (used to find `__Get`, `__Set`, `__Call` and
//! `__Delete`).

pub mod builtin;

use std::any::Any;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::error::TesseraResult;
use crate::lifetime::{ObjectRef, RefCount, release_object};
use crate::objects::prototype_root::prototype_root;
use crate::objects::value::Value;

pub use builtin::Builtin;

/// Method name under which function objects accept calls.
pub const CALL_METHOD: &str = "Call";

bitflags! {
    /// Kind and mode of a member access.
    ///
    /// The kind is a GET when neither [`SET`][Self::SET] nor
    /// [`CALL`][Self::CALL] is present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvokeFlags: u32 {
        /// Write `args.last()` to the member.
        const SET = 0x0001;
        /// Call the member with the remaining arguments.
        const CALL = 0x0002;
        /// The receiver is not this object; this object is a prototype.
        const META_OBJECT = 0x0100;
        /// Return the raw value of a member without invoking it.
        const META_FUNC = 0x0200;
    }
}

impl InvokeFlags {
    /// A plain read.
    pub const GET: Self = Self::empty();

    /// Returns `true` for a read.
    #[inline]
    pub fn is_get(self) -> bool {
        !self.intersects(Self::SET.union(Self::CALL))
    }

    /// Returns `true` for a write.
    #[inline]
    pub fn is_set(self) -> bool {
        self.contains(Self::SET)
    }

    /// Returns `true` for a call.
    #[inline]
    pub fn is_call(self) -> bool {
        self.contains(Self::CALL)
    }

    /// Returns `true` when answering on behalf of another receiver.
    #[inline]
    pub fn is_meta(self) -> bool {
        self.contains(Self::META_OBJECT)
    }

    /// The access kind with the mode bits stripped.
    #[inline]
    pub fn kind(self) -> Self {
        self & Self::SET.union(Self::CALL)
    }

    /// Name of the meta-function that handles a miss of this kind.
    pub fn meta_function_name(self) -> &'static str {
        if self.is_call() {
            "__Call"
        } else if self.is_set() {
            "__Set"
        } else {
            "__Get"
        }
    }
}

/// Outcome of [`ScriptObject::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum Invoked {
    /// The access was handled and produced a value.
    Handled(Value),
    /// Nothing in this object (or its chain) answers to the member.
    NotHandled,
}

impl Invoked {
    /// Returns `true` if the access was handled.
    #[inline]
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// The produced value, if handled.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Handled(v) => Some(v),
            Self::NotHandled => None,
        }
    }

    /// The produced value, or the empty string if not handled.
    pub fn unwrap_or_empty(self) -> Value {
        self.into_value().unwrap_or_default()
    }
}

/// A reference-counted script object.
///
/// Implementors supply the count, the dispatch entry point and a type name.
/// The lifetime hooks have defaults that follow the standard protocol in
/// [`release_object`].
pub trait ScriptObject: Any {
    /// The object's holder count.
    fn ref_count(&self) -> &RefCount;

    /// Dispatches a member access.
    fn invoke(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked>;

    /// Short type name, used in diagnostics and inspection.
    fn type_name(&self) -> &'static str;

    /// Upcast used for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// The object's prototype, if it has one.
    fn prototype(&self) -> Option<ObjectRef> {
        None
    }

    /// Runs when the last holder is released.
    ///
    /// Returns `true` if the object was torn down.  Returning `false` keeps
    /// it alive; the hook must then have taken a new reference.
    fn delete(&self, _this: &ObjectRef) -> bool {
        self.teardown();
        true
    }

    /// Releases everything the object holds.
    fn teardown(&self) {}

    /// Adds a holder and returns the new count.
    fn add_ref(&self) -> u32 {
        self.ref_count().increment()
    }

    /// Drops a holder and returns the new count, tearing down at zero.
    fn release(&self, this: &ObjectRef) -> u32 {
        release_object(self, this)
    }

    /// Key/value pairs shown by [`inspect::dump`][crate::inspect::dump], or
    /// `None` if the object is opaque.
    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        None
    }
}

/// Dispatches a member access on any value.
///
/// Objects handle the access themselves.  Strings and numbers have no
/// members of their own, so the access goes to the prototype root with
/// [`InvokeFlags::META_OBJECT`] set.
pub fn invoke_value(receiver: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
    match receiver {
        Value::Object(obj) => obj.get().invoke(receiver, flags, args),
        _ => prototype_root()
            .get()
            .invoke(receiver, flags | InvokeFlags::META_OBJECT, args),
    }
}

/// Calls a function object with `args` (the first of which is the callee's
/// `this`).
pub fn call_function(func: &ObjectRef, args: &[Value]) -> TesseraResult<Invoked> {
    let mut full: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len() + 1);
    full.push(Value::from(CALL_METHOD));
    full.extend(args.iter().cloned());
    func.invoke(InvokeFlags::CALL, &full)
}

/// Calls a value as a function.  Non-objects are not callable.
pub fn call_value(func: &Value, args: &[Value]) -> TesseraResult<Invoked> {
    match func {
        Value::Object(obj) => call_function(obj, args),
        other => Err(crate::error::TesseraError::TypeError(format!(
            "value '{}' is not callable",
            other.to_text()
        ))),
    }
}

/// Reads `name` from `receiver`.
pub fn get_member(receiver: &Value, name: impl Into<Value>) -> TesseraResult<Invoked> {
    invoke_value(receiver, InvokeFlags::GET, &[name.into()])
}

/// Writes `value` to `name` on `receiver`.
pub fn set_member(receiver: &Value, name: impl Into<Value>, value: Value) -> TesseraResult<Invoked> {
    invoke_value(receiver, InvokeFlags::SET, &[name.into(), value])
}

/// Calls method `name` on `receiver`.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> TesseraResult<Invoked> {
    let mut full: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len() + 1);
    full.push(Value::from(name));
    full.extend(args.iter().cloned());
    invoke_value(receiver, InvokeFlags::CALL, &full)
}

/// Returns `true` if a method name addresses the function itself.
pub fn is_call_name(name: &Value) -> bool {
    match name {
        Value::String(s) => s.is_empty() || s.eq_ignore_ascii_case(CALL_METHOD),
        _ => false,
    }
}

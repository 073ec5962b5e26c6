//! Callable objects.
//!
//! This module provides two function flavours:
//!
//! * [`NativeFunction`] — a host callback implemented in Rust.  It answers
//!   calls to the method `Call` (or the empty name) and receives the caller's
//!   arguments with `this` first.
//!
//! * [`BoundFunc`] — a target object paired with a leading argument list.
//!   Calling it forwards the stored arguments, followed by the caller's, to
//!   the target with the stored invoke flags.  The first stored argument is
//!   the member name used on the target.

use std::any::Any;
use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::dispatch::{CALL_METHOD, InvokeFlags, Invoked, ScriptObject, is_call_name};
use crate::error::{TesseraError, TesseraResult};
use crate::lifetime::{ObjectRef, RefCount};
use crate::objects::key::Key;
use crate::objects::value::Value;

/// Signature of a host function: receives `[this, args...]`.
pub type NativeFn = fn(&[Value]) -> TesseraResult<Value>;

// ──────────────────────────────────────────────────────────────────────────────
// NativeFunction
// ──────────────────────────────────────────────────────────────────────────────

/// A script-callable wrapper around a [`NativeFn`].
pub struct NativeFunction {
    ref_count: RefCount,
    name: String,
    min_params: usize,
    func: NativeFn,
}

impl NativeFunction {
    /// Wraps `func` under `name`.
    pub fn new(name: impl Into<String>, func: NativeFn) -> Self {
        Self {
            ref_count: RefCount::new(),
            name: name.into(),
            min_params: 0,
            func,
        }
    }

    /// Wraps `func` and returns the creator's handle.
    pub fn create(name: impl Into<String>, func: NativeFn) -> ObjectRef {
        ObjectRef::new(Self::new(name, func))
    }

    /// Requires at least `min_params` arguments, counting `this`.
    pub fn with_min_params(mut self, min_params: usize) -> Self {
        self.min_params = min_params;
        self
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fewest arguments accepted, counting `this`.
    pub fn min_params(&self) -> usize {
        self.min_params
    }

    /// Calls the host function directly.
    pub fn call(&self, args: &[Value]) -> TesseraResult<Value> {
        if args.len() < self.min_params {
            return Err(TesseraError::TypeError(format!(
                "{}: expected at least {} parameters, got {}",
                self.name,
                self.min_params,
                args.len()
            )));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("min_params", &self.min_params)
            .finish()
    }
}

impl ScriptObject for NativeFunction {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Invoked::NotHandled);
        };
        if flags.is_call() {
            if is_call_name(name) {
                return Ok(Invoked::Handled(self.call(rest)?));
            }
            if Key::from_value(name).is_name("Bind")
                && let Some(func) = this.as_object()
            {
                return Ok(Invoked::Handled(Value::Object(BoundFunc::bind_function(
                    func.clone(),
                    rest.to_vec(),
                ))));
            }
            return Ok(Invoked::NotHandled);
        }
        if flags.is_get() && rest.is_empty() {
            let key = Key::from_value(name);
            if key.is_name("Name") {
                return Ok(Invoked::Handled(Value::from(self.name.as_str())));
            }
            if key.is_name("MinParams") {
                return Ok(Invoked::Handled(Value::from(self.min_params)));
            }
        }
        Ok(Invoked::NotHandled)
    }

    fn type_name(&self) -> &'static str {
        "Func"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// BoundFunc
// ──────────────────────────────────────────────────────────────────────────────

/// A target object with pre-bound leading arguments.
#[derive(Debug)]
pub struct BoundFunc {
    ref_count: RefCount,
    target: ObjectRef,
    bound: SmallVec<[Value; 4]>,
    flags: InvokeFlags,
}

impl BoundFunc {
    /// Binds `bound` (member name first) to `target`, to be invoked with
    /// `flags`.
    pub fn new(target: ObjectRef, bound: Vec<Value>, flags: InvokeFlags) -> Self {
        debug!(target = target.type_name(), bound = bound.len(), "bound function created");
        Self {
            ref_count: RefCount::new(),
            target,
            bound: SmallVec::from_vec(bound),
            flags,
        }
    }

    /// Binds `args` as the leading arguments of function `func`; the first
    /// of them becomes the callee's `this`.
    pub fn bind_function(func: ObjectRef, args: Vec<Value>) -> ObjectRef {
        let mut bound = Vec::with_capacity(args.len() + 1);
        bound.push(Value::from(CALL_METHOD));
        bound.extend(args);
        ObjectRef::new(Self::new(func, bound, InvokeFlags::CALL))
    }

    /// Binds a call of method `method` on `object` with leading `args`.
    pub fn bind_method(object: ObjectRef, method: &str, args: Vec<Value>) -> ObjectRef {
        let mut bound = Vec::with_capacity(args.len() + 1);
        bound.push(Value::from(method));
        bound.extend(args);
        ObjectRef::new(Self::new(object, bound, InvokeFlags::CALL))
    }

    /// The object calls are forwarded to.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// The stored leading arguments, member name first.
    pub fn bound_args(&self) -> &[Value] {
        &self.bound
    }

    /// Forwards a call with `args` appended to the bound arguments.
    pub fn call(&self, args: &[Value]) -> TesseraResult<Invoked> {
        let mut full: SmallVec<[Value; 8]> = SmallVec::with_capacity(self.bound.len() + args.len());
        full.extend(self.bound.iter().cloned());
        full.extend(args.iter().cloned());
        self.target.invoke(self.flags, &full)
    }
}

impl ScriptObject for BoundFunc {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        match args.split_first() {
            Some((name, rest)) if flags.is_call() && is_call_name(name) => self.call(rest),
            _ => Ok(Invoked::NotHandled),
        }
    }

    fn type_name(&self) -> &'static str {
        "BoundFunc"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Serialized access to a wrapped object.
//!
//! A [`CriticalObject`] holds a target and a reentrant lock.  Every access
//! through the wrapper takes the lock for its duration and forwards to the
//! target, so nested accesses from inside a handler on the same thread do
//! not deadlock.  Several wrappers may share one lock.

use std::any::Any;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject};
use crate::error::TesseraResult;
use crate::lifetime::{ObjectRef, RefCount};
use crate::objects::value::Value;

/// Shared reentrant lock used by critical wrappers.
pub type CriticalLock = Arc<ReentrantMutex<()>>;

/// A lock-guarded proxy for another object.
pub struct CriticalObject {
    ref_count: RefCount,
    object: ObjectRef,
    lock: CriticalLock,
}

impl CriticalObject {
    /// Wraps `object`, sharing `lock` if given or creating a fresh one.
    pub fn new(object: ObjectRef, lock: Option<CriticalLock>) -> Self {
        Self {
            ref_count: RefCount::new(),
            object,
            lock: lock.unwrap_or_default(),
        }
    }

    /// Wraps `object` and returns the creator's handle.
    pub fn create(object: ObjectRef, lock: Option<CriticalLock>) -> ObjectRef {
        ObjectRef::new(Self::new(object, lock))
    }

    /// The wrapped object.
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// The lock guarding the wrapped object.
    pub fn lock(&self) -> &CriticalLock {
        &self.lock
    }
}

impl std::fmt::Debug for CriticalObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalObject")
            .field("object", &self.object)
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

impl ScriptObject for CriticalObject {
    fn ref_count(&self) -> &RefCount {
        &self.ref_count
    }

    fn invoke(&self, _this: &Value, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        let _guard = self.lock.lock();
        self.object.invoke(flags, args)
    }

    fn type_name(&self) -> &'static str {
        "CriticalObject"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        let _guard = self.lock.lock();
        self.object.get().entries()
    }
}

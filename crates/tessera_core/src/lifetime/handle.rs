//! [`ObjectRef`]: a counted handle to a script object.

use std::fmt;
use std::rc::Rc;

use crate::dispatch::{InvokeFlags, Invoked, ScriptObject};
use crate::error::TesseraResult;
use crate::objects::value::Value;

/// A counted handle to a script object.
///
/// Cloning the handle calls the object's `add_ref`; dropping it calls
/// `release`.  The handle keeps the object's memory alive, while the
/// holder count decides when the object tears itself down, so a handle held
/// past teardown (only possible through over-release by a foreign caller)
/// observes an emptied, destroyed object instead of freed memory.
pub struct ObjectRef(Rc<dyn ScriptObject>);

impl ObjectRef {
    /// Wraps a freshly created object.
    ///
    /// The object's own count of one becomes this handle.
    pub fn new<T: ScriptObject>(object: T) -> Self {
        Self(Rc::new(object))
    }

    /// Identity of the object: equal for two handles to the same object.
    #[inline]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Returns `true` if both handles refer to the same object.
    #[inline]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id() == other.id()
    }

    /// Returns the object behind the handle.
    #[inline]
    pub fn get(&self) -> &dyn ScriptObject {
        &*self.0
    }

    /// Downcasts to a concrete object type.
    pub fn downcast_ref<T: ScriptObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the object is of type `T`.
    pub fn is<T: ScriptObject>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    /// Holder count reported by the object.
    pub fn ref_count(&self) -> u32 {
        self.0.ref_count().count()
    }

    /// Returns `true` once the object has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.0.ref_count().is_destroyed()
    }

    /// Short type name of the object.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Records an extra holder that is not represented by a handle.
    ///
    /// Meant for foreign callers; must be paired with [`ObjectRef::release`].
    pub fn add_ref(&self) -> u32 {
        self.0.add_ref()
    }

    /// Gives up a holder previously recorded with [`ObjectRef::add_ref`].
    pub fn release(&self) -> u32 {
        self.0.release(self)
    }

    /// Dispatches a member access with this object as the receiver.
    pub fn invoke(&self, flags: InvokeFlags, args: &[Value]) -> TesseraResult<Invoked> {
        let this = Value::Object(self.clone());
        self.0.invoke(&this, flags, args)
    }

    /// The object's prototype, if any.
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.prototype()
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        self.0.add_ref();
        Self(Rc::clone(&self.0))
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        let handle: &ObjectRef = self;
        handle.0.release(handle);
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.type_name(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::Cell;

    use super::*;
    use crate::lifetime::RefCount;

    struct Probe {
        ref_count: RefCount,
        deletes: Rc<Cell<u32>>,
    }

    impl ScriptObject for Probe {
        fn ref_count(&self) -> &RefCount {
            &self.ref_count
        }

        fn invoke(&self, _this: &Value, _flags: InvokeFlags, _args: &[Value]) -> TesseraResult<Invoked> {
            Ok(Invoked::NotHandled)
        }

        fn delete(&self, _this: &ObjectRef) -> bool {
            self.deletes.set(self.deletes.get() + 1);
            true
        }

        fn type_name(&self) -> &'static str {
            "Probe"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn probe() -> (ObjectRef, Rc<Cell<u32>>) {
        let deletes = Rc::new(Cell::new(0));
        let obj = ObjectRef::new(Probe {
            ref_count: RefCount::new(),
            deletes: Rc::clone(&deletes),
        });
        (obj, deletes)
    }

    #[test]
    fn test_new_handle_has_one_holder() {
        let (obj, _) = probe();
        assert_eq!(obj.ref_count(), 1);
    }

    #[test]
    fn test_clone_and_drop_track_holders() {
        let (obj, deletes) = probe();
        let second = obj.clone();
        assert_eq!(obj.ref_count(), 2);
        drop(second);
        assert_eq!(obj.ref_count(), 1);
        assert_eq!(deletes.get(), 0);
    }

    #[test]
    fn test_last_drop_runs_delete_once() {
        let (obj, deletes) = probe();
        let keep = obj.clone();
        drop(obj);
        assert_eq!(deletes.get(), 0);
        drop(keep);
        assert_eq!(deletes.get(), 1);
    }

    #[test]
    fn test_explicit_add_ref_release_pair() {
        let (obj, deletes) = probe();
        assert_eq!(obj.add_ref(), 2);
        assert_eq!(obj.release(), 1);
        assert_eq!(deletes.get(), 0);
        assert!(!obj.is_destroyed());
    }

    #[test]
    fn test_over_release_destroys_but_keeps_memory() {
        let (obj, deletes) = probe();
        assert_eq!(obj.release(), 0);
        assert!(obj.is_destroyed());
        assert_eq!(deletes.get(), 1);
        // Dropping the handle afterwards is a no-op release.
        drop(obj);
        assert_eq!(deletes.get(), 1);
    }

    #[test]
    fn test_identity_and_downcast() {
        let (a, _) = probe();
        let b = a.clone();
        let (c, _) = probe();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is::<Probe>());
        assert!(a.downcast_ref::<Probe>().is_some());
        assert!(format!("{a:?}").starts_with("Probe@"));
    }
}

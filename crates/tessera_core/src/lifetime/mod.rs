//! Reference-counted lifetime of script objects.
//!
//! Every script object carries a [`RefCount`] and is reached through an
//! [`ObjectRef`] handle.  Cloning a handle adds a holder; dropping one
//! releases it.  When the last holder lets go, the object's
//! [`delete`][crate::dispatch::ScriptObject::delete] hook runs and may veto
//! the teardown by taking a new reference.

pub mod handle;
pub mod ref_count;

pub use handle::ObjectRef;
pub use ref_count::{LifeState, RefCount, release_object};

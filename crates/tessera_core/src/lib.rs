//! `tessera_core` — the object runtime of the Tessera scripting language.
//!
//! # Crate layout
//!
//! - [`objects`] — values, associative arrays and the other script objects.
//! - [`dispatch`] — the GET / SET / CALL protocol every object answers.
//! - [`lifetime`] — reference counting and the [`ObjectRef`] handle.
//! - [`native`] — typed views over raw struct memory.
//! - [`inspect`] — paginated debug dumps.
//!
//! ```
//! use tessera_core::dispatch::{call_method, get_member};
//! use tessera_core::objects::{AssociativeArray, Value};
//!
//! let list = Value::Object(AssociativeArray::create());
//! call_method(&list, "Push", &[Value::from("a"), Value::from("b")]).unwrap();
//! assert_eq!(get_member(&list, 2).unwrap().unwrap_or_empty(), Value::from("b"));
//! ```

/// Grow-only buffers backing field storage and string values.
pub mod buffer;
/// Dispatch protocol, invocation flags and built-in method names.
pub mod dispatch;
/// Crate-wide error type.
pub mod error;
/// Debugger-facing textual dumps of object state.
pub mod inspect;
/// Reference counts, teardown and the owning object handle.
pub mod lifetime;
/// Struct definitions, native memory blocks and struct views.
pub mod native;
/// Script values and the object types built on them.
pub mod objects;

pub use dispatch::{InvokeFlags, Invoked, ScriptObject};
pub use error::{TesseraError, TesseraResult};
pub use lifetime::ObjectRef;
pub use objects::Value;

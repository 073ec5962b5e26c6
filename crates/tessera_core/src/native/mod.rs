//! Typed views over raw memory.
//!
//! * [`memory`] — bounds-checked byte blocks with stable addresses.
//! * [`descriptor`] — struct layouts parsed from a field list.
//! * [`struct_view`] — script objects that read and write a layout in place.

pub mod descriptor;
pub mod memory;
pub mod struct_view;

pub use descriptor::{FieldDescriptor, FieldType, ScalarKind, StructDefinition, TextEncoding};
pub use memory::MemoryBlock;
pub use struct_view::NativeStructView;

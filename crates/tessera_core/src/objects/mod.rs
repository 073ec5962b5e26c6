/// Associative arrays: ordered field storage with prototype delegation.
pub mod assoc_array;
/// Reentrant-lock wrapper serializing access to another object.
pub mod critical;
/// `Next`-style enumerators over arrays and struct views.
pub mod enumerator;
/// Typed field slots and the zone-ordered field store.
pub mod field;
/// Native functions and bound functions.
pub mod function;
/// Field keys, zones and case-insensitive key ordering.
pub mod key;
/// List operations over the integer-key zone of a field store.
pub mod list;
/// Accessor objects pairing a getter with a setter.
pub mod property;
/// The shared root prototype of primitive values.
pub mod prototype_root;
/// Script values and their conversions.
pub mod value;

pub use assoc_array::AssociativeArray;
pub use critical::CriticalObject;
pub use enumerator::{FieldEnumerator, ListEnumerator, StructEnumerator};
pub use function::{BoundFunc, NativeFunction};
pub use key::Key;
pub use property::Property;
pub use prototype_root::{PrototypeRoot, prototype_root};
pub use value::Value;

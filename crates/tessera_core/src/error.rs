//! Error types for the tessera object runtime.
//!
//! Lookup misses are not errors anywhere in this crate: `get` returns
//! `Option`, and dispatch reports [`Invoked::NotHandled`][crate::dispatch::Invoked]
//! so that a delegating caller can keep searching the prototype chain.

use thiserror::Error;

/// All errors that can be produced by the object runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TesseraError {
    /// A capacity-growth request could not be satisfied by the allocator.
    #[error("out of memory")]
    OutOfMemory,

    /// A value had the wrong kind for the requested operation.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A list operation referred to an integer key that does not exist.
    #[error("KeyError: {0}")]
    KeyError(String),

    /// An address did not resolve to a live memory block.
    #[error("invalid address 0x{0:x}")]
    InvalidAddress(u64),

    /// A struct field access fell outside the bound memory block.
    #[error("access of {size} bytes at offset {offset} exceeds block of {len} bytes")]
    OutOfBounds {
        /// Byte offset of the access within the block.
        offset: usize,
        /// Length of the block.
        len: usize,
        /// Size of the access in bytes.
        size: usize,
    },

    /// A struct view has no field with the given name.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A struct definition could not be parsed.
    #[error("bad struct definition: {0}")]
    DefinitionError(String),

    /// The object has already been torn down.
    #[error("object has been destroyed")]
    Destroyed,

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenient `Result` alias for fallible runtime operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

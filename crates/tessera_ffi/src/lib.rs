//! `tessera_ffi` — C-ABI surface for tessera objects.
//!
//! Foreign hosts hold tessera objects through the same add-reference /
//! release-reference pair a COM client would use, plus a handful of item
//! operations on associative arrays.
//!
//! # Design
//! A handle (`*mut TesseraHandle`) counts the references foreign code holds
//! and mirrors each of them on the object.  [`tessera_object_add_ref`] takes
//! one more; [`tessera_object_release`] gives one back, and releasing the
//! last one frees the handle.  The object itself is torn down once nothing
//! inside the runtime holds it either.  Objects are single-threaded: a
//! handle must only be used on the thread that created it.

use std::cell::Cell;
use std::ffi::{CStr, c_char};

use tessera_core::objects::{AssociativeArray, Value};
use tessera_core::ObjectRef;

/// An opaque handle holding foreign references to a tessera object.
pub struct TesseraHandle {
    object: ObjectRef,
    foreign_refs: Cell<u32>,
}

impl TesseraHandle {
    fn array(&self) -> Option<&AssociativeArray> {
        self.object.downcast_ref::<AssociativeArray>()
    }
}

/// Create an empty associative array.
///
/// The returned handle starts with a reference count of one and must be
/// released with [`tessera_object_release`].
#[unsafe(no_mangle)]
pub extern "C" fn tessera_array_create() -> *mut TesseraHandle {
    Box::into_raw(Box::new(TesseraHandle {
        object: AssociativeArray::create(),
        foreign_refs: Cell::new(1),
    }))
}

/// Add a reference.  Returns the number of references foreign code now
/// holds through `handle`, or 0 for a null handle.
///
/// # Safety
/// `handle` must be null or a live pointer returned by
/// [`tessera_array_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_object_add_ref(handle: *mut TesseraHandle) -> u32 {
    // SAFETY: caller guarantees `handle` is null or live.
    let Some(h) = (unsafe { handle.as_ref() }) else {
        return 0;
    };
    h.object.add_ref();
    let refs = h.foreign_refs.get().saturating_add(1);
    h.foreign_refs.set(refs);
    refs
}

/// Release a reference.  Returns the references foreign code still holds;
/// at 0 the handle has been freed and must not be used again.  The object
/// outlives the handle while the runtime still references it.
///
/// # Safety
/// `handle` must be null or a live pointer returned by
/// [`tessera_array_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_object_release(handle: *mut TesseraHandle) -> u32 {
    // SAFETY: caller guarantees `handle` is null or live.
    let Some(h) = (unsafe { handle.as_ref() }) else {
        return 0;
    };
    let refs = h.foreign_refs.get().saturating_sub(1);
    if refs > 0 {
        h.foreign_refs.set(refs);
        h.object.release();
        return refs;
    }
    // SAFETY: the pointer was created by `Box::into_raw` in
    // `tessera_array_create` and this was its last foreign reference.
    // Dropping the handle's `ObjectRef` gives its reference back.
    drop(unsafe { Box::from_raw(handle) });
    0
}

/// Append an integer after the highest integer key.  Returns the new key,
/// or 0 on failure.
///
/// # Safety
/// `handle` must be null or a live array handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_array_append_int(handle: *mut TesseraHandle, value: i64) -> i64 {
    // SAFETY: caller guarantees `handle` is null or live.
    let Some(array) = (unsafe { handle.as_ref() }).and_then(TesseraHandle::array) else {
        return 0;
    };
    array.append(Value::Integer(value)).unwrap_or(0)
}

/// Append a copy of a NUL-terminated UTF-8 string.  Returns the new key, or
/// 0 on failure (including invalid UTF-8).
///
/// # Safety
/// `handle` must be null or a live array handle; `text` must be null or a
/// valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_array_append_string(
    handle: *mut TesseraHandle,
    text: *const c_char,
) -> i64 {
    // SAFETY: caller guarantees `handle` is null or live.
    let Some(array) = (unsafe { handle.as_ref() }).and_then(TesseraHandle::array) else {
        return 0;
    };
    if text.is_null() {
        return 0;
    }
    // SAFETY: caller guarantees `text` is a valid NUL-terminated C string.
    let Ok(text) = unsafe { CStr::from_ptr(text) }.to_str() else {
        return 0;
    };
    array.append(Value::from(text)).unwrap_or(0)
}

/// Read integer key `index` into `*out`.  Returns `false` if the key is
/// missing or its value has no integer form.
///
/// # Safety
/// `handle` must be null or a live array handle; `out` must be null or
/// valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_array_get_int(
    handle: *mut TesseraHandle,
    index: i64,
    out: *mut i64,
) -> bool {
    // SAFETY: caller guarantees `handle` is null or live.
    let Some(array) = (unsafe { handle.as_ref() }).and_then(TesseraHandle::array) else {
        return false;
    };
    if out.is_null() {
        return false;
    }
    match array.get(&Value::Integer(index)).and_then(|v| v.to_integer()) {
        Some(n) => {
            // SAFETY: `out` is non-null and the caller guarantees it is writable.
            unsafe { *out = n };
            true
        }
        None => false,
    }
}

/// Number of fields in the array, or 0 for a null handle.
///
/// # Safety
/// `handle` must be null or a live array handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_array_count(handle: *mut TesseraHandle) -> usize {
    // SAFETY: caller guarantees `handle` is null or live.
    unsafe { handle.as_ref() }
        .and_then(TesseraHandle::array)
        .map_or(0, AssociativeArray::count)
}

/// Highest integer key, or 0 when the array has none.
///
/// # Safety
/// `handle` must be null or a live array handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_array_max_index(handle: *mut TesseraHandle) -> i64 {
    // SAFETY: caller guarantees `handle` is null or live.
    unsafe { handle.as_ref() }
        .and_then(TesseraHandle::array)
        .and_then(AssociativeArray::max_index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;

    #[test]
    fn test_create_and_release() {
        let h = tessera_array_create();
        assert!(!h.is_null());
        unsafe {
            assert_eq!(tessera_array_count(h), 0);
            assert_eq!(tessera_object_release(h), 0);
        }
    }

    #[test]
    fn test_add_ref_keeps_handle_alive() {
        let h = tessera_array_create();
        unsafe {
            assert_eq!(tessera_object_add_ref(h), 2);
            assert_eq!(tessera_object_release(h), 1);
            assert_eq!(tessera_array_append_int(h, 5), 1);
            assert_eq!(tessera_object_release(h), 0);
        }
    }

    #[test]
    fn test_last_release_frees_handle_while_runtime_holds_object() {
        let h = tessera_array_create();
        // SAFETY: `h` is live until the final release below.
        let inner = unsafe { (*h).object.clone() };
        assert_eq!(inner.ref_count(), 2);
        unsafe {
            assert_eq!(tessera_object_add_ref(h), 2);
            assert_eq!(inner.ref_count(), 3);
            assert_eq!(tessera_object_release(h), 1);
            assert_eq!(tessera_object_release(h), 0);
        }
        assert_eq!(inner.ref_count(), 1);
        assert!(!inner.is_destroyed());
    }

    #[test]
    fn test_append_and_read_back() {
        let h = tessera_array_create();
        let text = CString::new("hi").unwrap();
        unsafe {
            assert_eq!(tessera_array_append_int(h, 40), 1);
            assert_eq!(tessera_array_append_string(h, text.as_ptr()), 2);
            assert_eq!(tessera_array_append_int(h, -2), 3);
            assert_eq!(tessera_array_count(h), 3);
            assert_eq!(tessera_array_max_index(h), 3);

            let mut out = 0;
            assert!(tessera_array_get_int(h, 3, &mut out));
            assert_eq!(out, -2);
            assert!(!tessera_array_get_int(h, 2, &mut out));
            assert!(!tessera_array_get_int(h, 9, &mut out));
            tessera_object_release(h);
        }
    }

    #[test]
    fn test_null_handles_are_ignored() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(tessera_object_add_ref(null), 0);
            assert_eq!(tessera_object_release(null), 0);
            assert_eq!(tessera_array_count(null), 0);
            assert_eq!(tessera_array_max_index(null), 0);
            assert_eq!(tessera_array_append_int(null, 1), 0);
            assert!(!tessera_array_get_int(null, 1, std::ptr::null_mut()));
        }
    }
}

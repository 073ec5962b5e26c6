//! Holder counting and the release protocol.

use std::cell::Cell;

use tracing::trace;

use crate::dispatch::ScriptObject;
use crate::lifetime::ObjectRef;

/// Where an object is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    /// Normal operation.
    Live,
    /// The final release is running the object's `delete` hook.
    Finalizing,
    /// Teardown completed; the object must not be used again.
    Destroyed,
}

/// Holder count of a script object.
///
/// A fresh object starts with one holder: its creator.
#[derive(Debug)]
pub struct RefCount {
    count: Cell<u32>,
    state: Cell<LifeState>,
}

impl RefCount {
    /// Creates a count of one, in the [`LifeState::Live`] state.
    pub const fn new() -> Self {
        Self {
            count: Cell::new(1),
            state: Cell::new(LifeState::Live),
        }
    }

    /// Current number of holders.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.get()
    }

    /// Current lifetime state.
    #[inline]
    pub fn state(&self) -> LifeState {
        self.state.get()
    }

    /// Returns `true` once teardown has completed.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.state.get() == LifeState::Destroyed
    }

    /// Records one more holder and returns the new count.
    pub fn increment(&self) -> u32 {
        let next = self.count.get().saturating_add(1);
        self.count.set(next);
        next
    }

    /// Drops one holder and returns the new count.
    pub fn decrement(&self) -> u32 {
        let next = self.count.get().saturating_sub(1);
        self.count.set(next);
        next
    }

    fn set_state(&self, state: LifeState) {
        self.state.set(state);
    }

    fn mark_destroyed(&self) {
        self.count.set(0);
        self.state.set(LifeState::Destroyed);
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard release protocol shared by every counted object.
///
/// If `obj` is down to its last holder, the `delete` hook runs with the
/// count still at one.  A hook that returns `true` destroys the object and
/// the release reports `0`.  A hook that returns `false` has kept the object
/// alive (typically by storing a new reference) and the count is decremented
/// normally.  Releases that arrive while the hook runs only decrement, so a
/// temporary reference taken by the hook cannot start a second teardown.
pub fn release_object<T: ScriptObject + ?Sized>(obj: &T, this: &ObjectRef) -> u32 {
    let rc = obj.ref_count();
    match rc.state() {
        LifeState::Destroyed => return 0,
        LifeState::Finalizing => return rc.decrement(),
        LifeState::Live => {}
    }
    if rc.count() <= 1 {
        rc.set_state(LifeState::Finalizing);
        if obj.delete(this) {
            rc.mark_destroyed();
            trace!(type_name = obj.type_name(), "object destroyed");
            return 0;
        }
        rc.set_state(LifeState::Live);
        trace!(
            type_name = obj.type_name(),
            holders = rc.count(),
            "teardown vetoed"
        );
    }
    rc.decrement()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_count_is_one_and_live() {
        let rc = RefCount::new();
        assert_eq!(rc.count(), 1);
        assert_eq!(rc.state(), LifeState::Live);
        assert!(!rc.is_destroyed());
    }

    #[test]
    fn test_increment_and_decrement() {
        let rc = RefCount::new();
        assert_eq!(rc.increment(), 2);
        assert_eq!(rc.increment(), 3);
        assert_eq!(rc.decrement(), 2);
        assert_eq!(rc.count(), 2);
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let rc = RefCount::new();
        assert_eq!(rc.decrement(), 0);
        assert_eq!(rc.decrement(), 0);
    }

    #[test]
    fn test_mark_destroyed_zeroes_count() {
        let rc = RefCount::new();
        rc.increment();
        rc.mark_destroyed();
        assert_eq!(rc.count(), 0);
        assert!(rc.is_destroyed());
    }
}

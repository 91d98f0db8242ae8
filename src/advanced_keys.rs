//! Per-physical-key overlays that turn matrix edges into effective
//! presses/releases/deferred actions (SPEC_FULL.md §4.4).
//!
//! Grounded on `examples/original_source/include/advanced_keys.h` for the
//! state-struct shapes (`ak_state_tap_hold_t`, `ak_state_toggle_t`) and the
//! `ak_event_type_t` ordering this reuses for the DKS bitmap index.

use crate::config::limits::NUM_ADVANCED_KEYS;
use crate::config::schema::{
    AdvancedKey, AdvancedKeyPayload, DksAction, DynamicKeystroke, NullBind, NullBindBehavior,
    TapHold, Toggle,
};
use crate::deferred::{DeferredAction, DeferredActionKind, DeferredStack};

/// Matrix-edge event type. Ordered so non-`None`/`Hold` variants index
/// directly into a DKS action bitmap via [`Self::bitmap_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkEventType {
    None,
    Hold,
    Press,
    BottomOut,
    ReleaseFromBottomOut,
    Release,
}

impl AkEventType {
    /// Bit offset (0, 2, 4 or 6) of this event's 2-bit action in a DKS
    /// keycode slot's bitmap byte. Returns `None` for `None`/`Hold`, which
    /// never trigger a DKS transition.
    pub fn bitmap_index(self) -> Option<u8> {
        match self {
            AkEventType::Press => Some(0),
            AkEventType::BottomOut => Some(2),
            AkEventType::ReleaseFromBottomOut => Some(4),
            AkEventType::Release => Some(6),
            AkEventType::None | AkEventType::Hold => None,
        }
    }
}

/// One synthesized matrix-edge event for an advanced-key-bound physical key.
#[derive(Debug, Clone, Copy)]
pub struct AkEvent {
    pub event_type: AkEventType,
    pub key: u8,
    /// Underlying keycode from the layout. Only meaningful for Null-Bind.
    pub keycode: u8,
    pub ak_index: usize,
    /// Current key travel distance, used by Null-Bind's `Distance` behavior.
    pub distance: u8,
}

/// Which physical-key role triggered a Null-Bind event: the advanced key's
/// own `key`, or its payload's `secondary_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullBindHalf {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapHoldStage {
    None,
    Tap,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleStage {
    None,
    Toggle,
    Normal,
}

#[derive(Debug, Clone, Copy)]
struct NullBindRuntime {
    keycodes: [u8; 2],
    is_pressed: [bool; 2],
    distances: [u8; 2],
}

impl Default for NullBindRuntime {
    fn default() -> Self {
        Self {
            keycodes: [0, 0],
            is_pressed: [false, false],
            distances: [0, 0],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DksRuntime {
    held: [bool; 4],
}

#[derive(Debug, Clone, Copy)]
struct TapHoldRuntime {
    since_ms: u32,
    stage: TapHoldStage,
}

impl Default for TapHoldRuntime {
    fn default() -> Self {
        Self {
            since_ms: 0,
            stage: TapHoldStage::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ToggleRuntime {
    since_ms: u32,
    stage: ToggleStage,
    is_toggled: bool,
}

impl Default for ToggleRuntime {
    fn default() -> Self {
        Self {
            since_ms: 0,
            stage: ToggleStage::None,
            is_toggled: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Runtime {
    None,
    NullBind(NullBindRuntime),
    Dks(DksRuntime),
    TapHold(TapHoldRuntime),
    Toggle(ToggleRuntime),
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::None
    }
}

/// The injection path advanced keys use to register/unregister keycodes
/// without going through layer re-resolution. Implemented by `Layout`.
pub trait KeycodeRegistrar {
    fn register(&mut self, key: u8, keycode: u8);
    fn unregister(&mut self, key: u8, keycode: u8);
}

/// Owns the runtime state for every advanced-key slot in the active profile.
pub struct AdvancedKeys {
    runtimes: [Runtime; NUM_ADVANCED_KEYS],
}

impl AdvancedKeys {
    pub fn new() -> Self {
        Self {
            runtimes: [Runtime::None; NUM_ADVANCED_KEYS],
        }
    }

    /// Unregister any held keycode across every slot, then zero all state.
    /// Must run before a profile change so no AK state survives the
    /// boundary.
    pub fn clear(&mut self, bindings: &[AdvancedKey; NUM_ADVANCED_KEYS], registrar: &mut impl KeycodeRegistrar) {
        for (index, runtime) in self.runtimes.iter_mut().enumerate() {
            let ak = &bindings[index];
            match (*runtime, &ak.payload) {
                (Runtime::TapHold(r), AdvancedKeyPayload::TapHold(th)) => match r.stage {
                    TapHoldStage::Hold => registrar.unregister(ak.key, th.hold_keycode),
                    TapHoldStage::Tap => registrar.unregister(ak.key, th.tap_keycode),
                    TapHoldStage::None => {}
                },
                (Runtime::Toggle(r), AdvancedKeyPayload::Toggle(t)) => {
                    if r.is_toggled || r.stage != ToggleStage::None {
                        registrar.unregister(ak.key, t.keycode);
                    }
                }
                (Runtime::NullBind(r), AdvancedKeyPayload::NullBind(nb)) => {
                    if r.is_pressed[0] {
                        registrar.unregister(ak.key, r.keycodes[0]);
                    }
                    if r.is_pressed[1] {
                        registrar.unregister(nb.secondary_key, r.keycodes[1]);
                    }
                }
                _ => {}
            }
            *runtime = Runtime::None;
        }
    }

    /// Process one synthesized matrix-edge event for `half` of a Null-Bind,
    /// or the sole physical key of any other advanced-key kind.
    pub fn process(
        &mut self,
        ak: &AdvancedKey,
        event: AkEvent,
        half: NullBindHalf,
        now_ms: u32,
        has_other_press: bool,
        registrar: &mut impl KeycodeRegistrar,
        deferred: &mut DeferredStack,
    ) {
        match &ak.payload {
            AdvancedKeyPayload::None => {}
            AdvancedKeyPayload::NullBind(nb) => {
                self.process_null_bind(event.ak_index, ak, nb, event, half, registrar)
            }
            AdvancedKeyPayload::DynamicKeystroke(dks) => {
                self.process_dks(event.ak_index, ak, dks, event, registrar, deferred)
            }
            AdvancedKeyPayload::TapHold(th) => {
                self.process_tap_hold(event.ak_index, ak, th, event, now_ms, registrar, deferred)
            }
            AdvancedKeyPayload::Toggle(t) => {
                self.process_toggle(event.ak_index, ak, t, event, now_ms, registrar)
            }
        }
        let _ = has_other_press;
    }

    fn process_null_bind(
        &mut self,
        index: usize,
        ak: &AdvancedKey,
        nb: &NullBind,
        event: AkEvent,
        half: NullBindHalf,
        registrar: &mut impl KeycodeRegistrar,
    ) {
        let slot = match half {
            NullBindHalf::Primary => 0,
            NullBindHalf::Secondary => 1,
        };
        let mut runtime = match self.runtimes[index] {
            Runtime::NullBind(r) => r,
            _ => NullBindRuntime::default(),
        };

        let physical_key_of = |s: usize| if s == 0 { ak.key } else { nb.secondary_key };

        if event.event_type == AkEventType::Release || event.event_type == AkEventType::ReleaseFromBottomOut {
            if runtime.is_pressed[slot] {
                registrar.unregister(physical_key_of(slot), runtime.keycodes[slot]);
            }
            runtime.is_pressed[slot] = false;
            runtime.distances[slot] = 0;
            self.runtimes[index] = Runtime::NullBind(runtime);
            return;
        }
        if event.event_type == AkEventType::None {
            self.runtimes[index] = Runtime::NullBind(runtime);
            return;
        }

        if event.event_type == AkEventType::Press {
            runtime.keycodes[slot] = event.keycode;
        }
        runtime.distances[slot] = event.distance;

        let other = 1 - slot;
        let both_bound = runtime.keycodes[0] != 0 && runtime.keycodes[1] != 0;
        let both_down = runtime.distances[0] > 0 && runtime.distances[1] > 0;

        if nb.bottom_out_point > 0
            && both_bound
            && runtime.distances[0] >= nb.bottom_out_point
            && runtime.distances[1] >= nb.bottom_out_point
        {
            for s in 0..2 {
                if !runtime.is_pressed[s] {
                    registrar.register(physical_key_of(s), runtime.keycodes[s]);
                    runtime.is_pressed[s] = true;
                }
            }
            self.runtimes[index] = Runtime::NullBind(runtime);
            return;
        }

        let behavior = NullBindBehavior::try_from(nb.behavior).unwrap_or(NullBindBehavior::Last);
        let desired: Option<usize> = match behavior {
            NullBindBehavior::Distance if both_bound && both_down => {
                if runtime.distances[0] == runtime.distances[1] {
                    Some(slot)
                } else if runtime.distances[0] > runtime.distances[1] {
                    Some(0)
                } else {
                    Some(1)
                }
            }
            _ if event.event_type != AkEventType::Press => {
                self.runtimes[index] = Runtime::NullBind(runtime);
                return;
            }
            NullBindBehavior::Last => Some(slot),
            NullBindBehavior::Primary => Some(0),
            NullBindBehavior::Secondary => Some(1),
            NullBindBehavior::Neutral => None,
            NullBindBehavior::Distance => Some(slot),
        };

        match desired {
            Some(winner) => {
                let loser = 1 - winner;
                if runtime.is_pressed[loser] {
                    registrar.unregister(physical_key_of(loser), runtime.keycodes[loser]);
                    runtime.is_pressed[loser] = false;
                }
                if !runtime.is_pressed[winner] {
                    registrar.register(physical_key_of(winner), runtime.keycodes[winner]);
                    runtime.is_pressed[winner] = true;
                }
            }
            None => {
                for s in 0..2 {
                    if runtime.is_pressed[s] {
                        registrar.unregister(physical_key_of(s), runtime.keycodes[s]);
                        runtime.is_pressed[s] = false;
                    }
                }
            }
        }

        self.runtimes[index] = Runtime::NullBind(runtime);
    }

    fn process_dks(
        &mut self,
        index: usize,
        ak: &AdvancedKey,
        dks: &DynamicKeystroke,
        event: AkEvent,
        registrar: &mut impl KeycodeRegistrar,
        deferred: &mut DeferredStack,
    ) {
        let bit_offset = match event.event_type.bitmap_index() {
            Some(b) => b,
            None => return,
        };
        let mut runtime = match self.runtimes[index] {
            Runtime::Dks(r) => r,
            _ => DksRuntime::default(),
        };

        for slot in 0..4 {
            let keycode = dks.keycodes[slot];
            if keycode == 0 {
                continue;
            }
            match dks.action(slot, bit_offset) {
                DksAction::Hold => {}
                DksAction::Press => {
                    if runtime.held[slot] {
                        registrar.unregister(ak.key, keycode);
                    }
                    let _ = deferred.push(DeferredAction {
                        kind: DeferredActionKind::Press,
                        key: ak.key,
                        keycode,
                    });
                    runtime.held[slot] = true;
                }
                DksAction::Release => {
                    if runtime.held[slot] {
                        registrar.unregister(ak.key, keycode);
                    }
                    runtime.held[slot] = false;
                }
                DksAction::Tap => {
                    if runtime.held[slot] {
                        registrar.unregister(ak.key, keycode);
                    }
                    let _ = deferred.push(DeferredAction {
                        kind: DeferredActionKind::Tap,
                        key: ak.key,
                        keycode,
                    });
                    runtime.held[slot] = false;
                }
            }
        }

        self.runtimes[index] = Runtime::Dks(runtime);
    }

    fn process_tap_hold(
        &mut self,
        index: usize,
        ak: &AdvancedKey,
        th: &TapHold,
        event: AkEvent,
        now_ms: u32,
        registrar: &mut impl KeycodeRegistrar,
        deferred: &mut DeferredStack,
    ) {
        let mut runtime = match self.runtimes[index] {
            Runtime::TapHold(r) => r,
            _ => TapHoldRuntime::default(),
        };

        match event.event_type {
            AkEventType::Press => {
                runtime.since_ms = now_ms;
                runtime.stage = TapHoldStage::Tap;
            }
            AkEventType::Release => match runtime.stage {
                TapHoldStage::Tap => {
                    let _ = deferred.push(DeferredAction {
                        kind: DeferredActionKind::Release,
                        key: ak.key,
                        keycode: th.tap_keycode,
                    });
                    registrar.register(ak.key, th.tap_keycode);
                    runtime.stage = TapHoldStage::None;
                }
                TapHoldStage::Hold => {
                    registrar.unregister(ak.key, th.hold_keycode);
                    runtime.stage = TapHoldStage::None;
                }
                TapHoldStage::None => {}
            },
            _ => {}
        }

        self.runtimes[index] = Runtime::TapHold(runtime);
    }

    /// Advance time-based advanced keys. `has_non_tap_hold_press` is true if
    /// any key outside a Tap-Hold binding was pressed this tick.
    pub fn tick(
        &mut self,
        bindings: &[AdvancedKey; NUM_ADVANCED_KEYS],
        now_ms: u32,
        has_non_tap_hold_press: bool,
        registrar: &mut impl KeycodeRegistrar,
    ) {
        for (index, runtime) in self.runtimes.iter_mut().enumerate() {
            let ak = &bindings[index];
            match (runtime, &ak.payload) {
                (Runtime::TapHold(r), AdvancedKeyPayload::TapHold(th)) => {
                    if r.stage == TapHoldStage::Tap {
                        let elapsed = now_ms.wrapping_sub(r.since_ms);
                        let term = th.tapping_term_ms as u32;
                        if (th.hold_on_other_key_press && has_non_tap_hold_press) || elapsed >= term
                        {
                            registrar.register(ak.key, th.hold_keycode);
                            r.stage = TapHoldStage::Hold;
                        }
                    }
                }
                (Runtime::Toggle(r), AdvancedKeyPayload::Toggle(t)) => {
                    if r.stage == ToggleStage::Toggle {
                        let elapsed = now_ms.wrapping_sub(r.since_ms);
                        if elapsed >= t.tapping_term_ms as u32 {
                            r.stage = ToggleStage::Normal;
                            r.is_toggled = false;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn process_toggle(
        &mut self,
        index: usize,
        ak: &AdvancedKey,
        t: &Toggle,
        event: AkEvent,
        now_ms: u32,
        registrar: &mut impl KeycodeRegistrar,
    ) {
        let mut runtime = match self.runtimes[index] {
            Runtime::Toggle(r) => r,
            _ => ToggleRuntime::default(),
        };

        match event.event_type {
            AkEventType::Press => {
                registrar.register(ak.key, t.keycode);
                runtime.is_toggled = !runtime.is_toggled;
                if runtime.is_toggled {
                    runtime.since_ms = now_ms;
                    runtime.stage = ToggleStage::Toggle;
                } else {
                    runtime.stage = ToggleStage::None;
                }
            }
            AkEventType::Release => {
                if !runtime.is_toggled {
                    registrar.unregister(ak.key, t.keycode);
                }
            }
            _ => {}
        }

        self.runtimes[index] = Runtime::Toggle(runtime);
    }
}

impl Default for AdvancedKeys {
    fn default() -> Self {
        Self::new()
    }
}

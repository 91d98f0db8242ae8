//! Translates (physical key, current layer mask) into keycodes and side
//! effects (SPEC_FULL.md §4.6).
//!
//! Grounded on `examples/original_source/lib/app/layout.c` for the
//! layer-mask/`current_layer` model (`layer_mask`, `default_layer_num`,
//! `get_current_layer`'s `31 - clz` rule) and `layout_process_magic_keycode`'s
//! four-way magic dispatch.

use crate::advanced_keys::KeycodeRegistrar;
use crate::board::BoardControl;
use crate::config::keycodes::KeycodeKind;
use crate::config::limits::{NUM_KEYS, NUM_LAYERS, NUM_PROFILES};

/// The HID-composer surface `Layout` drives directly from resolved
/// keycodes. Implemented by [`crate::hid::HidComposer`].
pub trait HidSink {
    fn add_keycode(&mut self, kc: u8);
    fn remove_keycode(&mut self, kc: u8);
}

/// Side effect requested by a magic keycode or profile keycode, returned
/// to the caller (the main loop) since `Layout` doesn't own `ConfigStore`
/// or `Matrix`. `EnterBootloader`/`Reset` are exceptions: those dispatch
/// immediately through `BoardControl` and never return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutAction {
    None,
    FactoryReset,
    Recalibrate,
    SetProfile(u8),
}

/// Layer/profile resolution state. Owns no keymap data itself — every
/// resolution call is handed the active profile's keymap by the caller, so
/// `Layout` stays a pure state machine over layer/lock bits.
pub struct Layout {
    layer_mask: u16,
    default_layer: u8,
    disabled_keys: [bool; NUM_KEYS],
    last_non_default_profile: u8,
}

impl Layout {
    pub fn new() -> Self {
        Self {
            layer_mask: 0,
            default_layer: 0,
            disabled_keys: [false; NUM_KEYS],
            last_non_default_profile: 0,
        }
    }

    pub fn current_layer(&self) -> u8 {
        if self.layer_mask == 0 {
            self.default_layer
        } else {
            31 - self.layer_mask.leading_zeros() as u8
        }
    }

    fn layer_on(&mut self, layer: u8) {
        self.layer_mask |= 1 << layer;
    }

    fn layer_off(&mut self, layer: u8) {
        self.layer_mask &= !(1 << layer);
    }

    /// Resolve the keycode a press on `key` should use: the first active
    /// layer from `current_layer` down to 0 whose keymap entry isn't
    /// `TRANSPARENT`, falling back to the default layer's entry.
    pub fn resolve(&self, keymap: &[[u8; NUM_KEYS]; NUM_LAYERS], key: usize) -> u8 {
        let current = self.current_layer();
        let mut layer = current as i16;
        while layer >= 0 {
            let l = layer as u8;
            let active = (self.layer_mask & (1 << l)) != 0 || l == self.default_layer;
            if active && keymap[l as usize][key] != crate::config::keycodes::TRANSPARENT {
                return keymap[l as usize][key];
            }
            layer -= 1;
        }
        keymap[self.default_layer as usize][key]
    }

    /// Process a press on physical `key`, already resolved to `keycode` by
    /// [`Self::resolve`]. `current_profile` is the active profile index,
    /// needed for `PROFILE_NEXT`'s wraparound. Dispatches into `hid`/`board`
    /// or returns a [`LayoutAction`] for the caller to apply.
    pub fn process_press(
        &mut self,
        key: usize,
        keycode: u8,
        current_profile: u8,
        hid: &mut impl HidSink,
        board: &mut impl BoardControl,
    ) -> LayoutAction {
        if self.disabled_keys[key] {
            return LayoutAction::None;
        }

        match KeycodeKind::classify(keycode) {
            KeycodeKind::Keyboard(_)
            | KeycodeKind::Modifier(_)
            | KeycodeKind::System(_)
            | KeycodeKind::Consumer(_)
            | KeycodeKind::Mouse(_) => {
                hid.add_keycode(keycode);
                LayoutAction::None
            }
            KeycodeKind::MomentaryLayer(layer) => {
                self.layer_on(layer);
                LayoutAction::None
            }
            KeycodeKind::Profile(profile) => LayoutAction::SetProfile(profile),
            KeycodeKind::KeyLock => {
                self.disabled_keys[key] ^= true;
                LayoutAction::None
            }
            KeycodeKind::LayerLock => {
                let current = self.current_layer();
                self.default_layer = if current == self.default_layer { 0 } else { current };
                LayoutAction::None
            }
            KeycodeKind::ProfileSwap => LayoutAction::SetProfile(self.last_non_default_profile),
            KeycodeKind::ProfileNext => {
                let next = (current_profile + 1) % NUM_PROFILES as u8;
                LayoutAction::SetProfile(next)
            }
            KeycodeKind::Boot | KeycodeKind::MagicBootloader => board.enter_bootloader(),
            KeycodeKind::MagicReboot => board.reset(),
            KeycodeKind::MagicFactoryReset => LayoutAction::FactoryReset,
            KeycodeKind::MagicRecalibrate => LayoutAction::Recalibrate,
            KeycodeKind::None | KeycodeKind::Transparent | KeycodeKind::Unknown => LayoutAction::None,
        }
    }

    /// Mirror of [`Self::process_press`] for a release; magic/profile/lock
    /// keycodes are press-only.
    pub fn process_release(&mut self, key: usize, keycode: u8, hid: &mut impl HidSink) {
        if self.disabled_keys[key] {
            return;
        }
        match KeycodeKind::classify(keycode) {
            KeycodeKind::Keyboard(_)
            | KeycodeKind::Modifier(_)
            | KeycodeKind::System(_)
            | KeycodeKind::Consumer(_)
            | KeycodeKind::Mouse(_) => hid.remove_keycode(keycode),
            KeycodeKind::MomentaryLayer(layer) => self.layer_off(layer),
            _ => {}
        }
    }

    /// Remember which profile was active before switching away from it, for
    /// `PROFILE_SWAP`.
    pub fn note_profile_change(&mut self, previous_profile: u8) {
        self.last_non_default_profile = previous_profile;
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter so `AdvancedKeys`' generic `(key, keycode)` injection path can
/// drive a `HidSink` directly, bypassing layer re-resolution.
pub struct HidRegistrar<'a, H: HidSink> {
    pub hid: &'a mut H,
}

impl<'a, H: HidSink> KeycodeRegistrar for HidRegistrar<'a, H> {
    fn register(&mut self, _key: u8, keycode: u8) {
        self.hid.add_keycode(keycode);
    }

    fn unregister(&mut self, _key: u8, keycode: u8) {
        self.hid.remove_keycode(keycode);
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::config::keycodes;
    use std::vec::Vec;

    #[derive(Default)]
    struct FakeHid {
        added: Vec<u8>,
        removed: Vec<u8>,
    }

    impl HidSink for FakeHid {
        fn add_keycode(&mut self, kc: u8) {
            self.added.push(kc);
        }
        fn remove_keycode(&mut self, kc: u8) {
            self.removed.push(kc);
        }
    }

    struct FakeBoard;
    impl BoardControl for FakeBoard {
        fn enter_bootloader(&mut self) -> ! {
            unreachable!()
        }
        fn reset(&mut self) -> ! {
            unreachable!()
        }
        fn critical_section<R>(&mut self, f: impl FnOnce() -> R) -> R {
            f()
        }
        fn fatal_error(&mut self, _reason: &str) -> ! {
            unreachable!()
        }
    }

    fn make_keymap() -> [[u8; NUM_KEYS]; NUM_LAYERS] {
        let mut keymap = [[keycodes::TRANSPARENT; NUM_KEYS]; NUM_LAYERS];
        keymap[0] = [keycodes::NO; NUM_KEYS];
        keymap
    }

    #[test]
    fn resolves_transparent_down_to_default_layer() {
        let mut keymap = make_keymap();
        keymap[0][3] = keycodes::KEYBOARD_MIN;
        let layout = Layout::new();
        assert_eq!(layout.resolve(&keymap, 3), keycodes::KEYBOARD_MIN);
    }

    #[test]
    fn momentary_layer_press_then_release_restores_default() {
        let mut keymap = make_keymap();
        keymap[1][5] = keycodes::KEYBOARD_MIN + 1;
        let mut layout = Layout::new();
        let mut hid = FakeHid::default();
        let mut board = FakeBoard;

        let layer_kc = keycodes::LAYER_MIN + 1;
        layout.process_press(0, layer_kc, 0, &mut hid, &mut board);
        assert_eq!(layout.current_layer(), 1);
        assert_eq!(layout.resolve(&keymap, 5), keycodes::KEYBOARD_MIN + 1);

        layout.process_release(0, layer_kc, &mut hid);
        assert_eq!(layout.current_layer(), 0);
    }

    #[test]
    fn keyboard_keycode_drives_hid_sink() {
        let mut layout = Layout::new();
        let mut hid = FakeHid::default();
        let mut board = FakeBoard;
        layout.process_press(2, keycodes::KEYBOARD_MIN, 0, &mut hid, &mut board);
        assert_eq!(hid.added, std::vec![keycodes::KEYBOARD_MIN]);
        layout.process_release(2, keycodes::KEYBOARD_MIN, &mut hid);
        assert_eq!(hid.removed, std::vec![keycodes::KEYBOARD_MIN]);
    }

    #[test]
    fn profile_keycode_returns_set_profile_action() {
        let mut layout = Layout::new();
        let mut hid = FakeHid::default();
        let mut board = FakeBoard;
        let action = layout.process_press(0, keycodes::PROFILE_MIN + 2, 0, &mut hid, &mut board);
        assert_eq!(action, LayoutAction::SetProfile(2));
    }

    #[test]
    fn profile_next_wraps_to_zero_from_last_profile() {
        let mut layout = Layout::new();
        let mut hid = FakeHid::default();
        let mut board = FakeBoard;
        let action = layout.process_press(0, keycodes::PROFILE_NEXT, (NUM_PROFILES - 1) as u8, &mut hid, &mut board);
        assert_eq!(action, LayoutAction::SetProfile(0));
    }

    #[test]
    fn key_lock_toggles_disabled_state_on_the_pressed_key() {
        let mut layout = Layout::new();
        let mut hid = FakeHid::default();
        let mut board = FakeBoard;
        // Pressing a key bound to KEY_LOCK toggles that same key's own
        // disabled bit; a disabled key then ignores further presses,
        // including a second KEY_LOCK press, until toggled back from a
        // state where the top-of-function disabled check doesn't apply.
        layout.process_press(7, keycodes::KEY_LOCK, 0, &mut hid, &mut board);
        assert!(layout.disabled_keys[7]);
        layout.process_press(7, keycodes::KEYBOARD_MIN, 0, &mut hid, &mut board);
        assert!(hid.added.is_empty());
    }
}

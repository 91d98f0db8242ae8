//! Core runtime for a Hall-effect analog mechanical keyboard (SPEC_FULL.md
//! §2): the per-tick pipeline that turns filtered ADC samples into USB HID
//! and XInput reports, plus the raw-HID command protocol that configures it.
//!
//! Boards wire up one [`Core`] over their own [`board::Flash`]/[`board::Timer`]/
//! [`board::BoardControl`]/[`board::UsbTransport`] implementations, feed ADC
//! samples in from interrupt context via [`Core::store_adc`], and call
//! [`Core::tick`] once per scan cycle from the main loop. Raw-HID OUT buffers
//! go to [`Core::handle_command`].
#![no_std]

pub mod advanced_keys;
pub mod board;
pub mod command;
pub mod config;
pub mod deferred;
pub mod hid;
pub mod layout;
pub mod matrix;
pub mod wear_level;
pub mod xinput;

use advanced_keys::{AdvancedKeys, AkEvent, AkEventType, NullBindHalf};
use board::{BoardControl, Flash, Timer, UsbHidError, UsbTransport};
use command::{CommandProto, RAW_HID_EP_SIZE};
use config::limits::{NUM_ADVANCED_KEYS, NUM_KEYS, NUM_PROFILES};
use config::schema::{AdvancedKey, AdvancedKeyPayload, Profile};
use config::ConfigStore;
use deferred::{DeferredAction, DeferredActionKind, DeferredStack};
use hid::HidComposer;
use layout::{HidRegistrar, HidSink, Layout, LayoutAction};
use matrix::Matrix;
use xinput::XInput;

/// Find the advanced-key slot (if any) bound to physical `key` on `layer`,
/// and which Null-Bind half it plays (irrelevant for every other kind).
/// Mirrors [`Layout::resolve`]'s "current layer only" model: an advanced key
/// binds to exactly one layer, it is never walked down like a transparent
/// keymap entry.
fn find_binding(
    bindings: &[AdvancedKey; NUM_ADVANCED_KEYS],
    layer: u8,
    key: usize,
) -> Option<(usize, NullBindHalf)> {
    let key = key as u8;
    for (index, ak) in bindings.iter().enumerate() {
        if ak.layer != layer || matches!(ak.payload, AdvancedKeyPayload::None) {
            continue;
        }
        if ak.key == key {
            return Some((index, NullBindHalf::Primary));
        }
        if let AdvancedKeyPayload::NullBind(nb) = ak.payload {
            if nb.secondary_key == key {
                return Some((index, NullBindHalf::Secondary));
            }
        }
    }
    None
}

/// The bottom-out threshold an advanced key's own payload cares about, or 0
/// for kinds that never synthesize `BottomOut`/`ReleaseFromBottomOut`.
fn ak_bottom_out_point(payload: &AdvancedKeyPayload) -> u8 {
    match payload {
        AdvancedKeyPayload::NullBind(nb) => nb.bottom_out_point,
        AdvancedKeyPayload::DynamicKeystroke(dks) => dks.bottom_out_point,
        AdvancedKeyPayload::TapHold(_) | AdvancedKeyPayload::Toggle(_) | AdvancedKeyPayload::None => 0,
    }
}

/// Owns the whole runtime: persistent store, sensor pipeline, advanced-key
/// engine, layer resolver, HID/XInput composers and the deferred-action
/// stack. `F` is the board's flash part, `L` the wear-leveled log area size
/// (see [`ConfigStore`]).
pub struct Core<F, const L: usize>
where
    F: Flash,
{
    pub config: ConfigStore<F, L>,
    matrix: Matrix,
    advanced_keys: AdvancedKeys,
    layout: Layout,
    hid: HidComposer,
    xinput: XInput,
    deferred: DeferredStack,
    /// Keycode resolved at press time for each non-advanced-key physical
    /// key, replayed at release so a mid-hold layer change can't desync
    /// press/release (same rule [`Layout::process_press`]/`process_release`
    /// already rely on for momentary-layer keys).
    pressed_keycode: [u8; NUM_KEYS],
    prev_pressed: [bool; NUM_KEYS],
    prev_bottomed: [bool; NUM_KEYS],
}

impl<F, const L: usize> Core<F, L>
where
    F: Flash,
{
    pub fn new(flash: F) -> Self {
        Self {
            config: ConfigStore::new(flash),
            matrix: Matrix::new(0, 1024),
            advanced_keys: AdvancedKeys::new(),
            layout: Layout::new(),
            hid: HidComposer::new(),
            xinput: XInput::new(),
            deferred: DeferredStack::new(),
            pressed_keycode: [0; NUM_KEYS],
            prev_pressed: [false; NUM_KEYS],
            prev_bottomed: [false; NUM_KEYS],
        }
    }

    /// Load the persisted configuration (or write factory defaults on first
    /// boot / a corrupt image) and re-seed the sensor pipeline from its
    /// calibration hint. Call once after construction, before the first
    /// [`Self::tick`].
    pub fn init(&mut self, board: &mut impl BoardControl) {
        self.config.init();
        let cfg = self.config.load_or_init(board);
        self.matrix = Matrix::new(
            cfg.calibration.initial_rest_value,
            cfg.calibration.initial_bottom_out_threshold,
        );
    }

    /// Forward one ADC sample from interrupt context. Thin wrapper so boards
    /// don't need to reach into [`Self`]'s private `matrix` field.
    pub fn store_adc<B: BoardControl>(&mut self, board: &mut B, key: usize, raw: u16) {
        self.matrix.store_adc(board, key, raw);
    }

    /// Run one full scan tick: matrix pipeline, advanced keys, layout,
    /// XInput, then chain-send whatever HID reports changed.
    pub fn tick<T, B, U>(&mut self, timer: &T, board: &mut B, transport: &mut U) -> Result<(), UsbHidError>
    where
        T: Timer,
        B: BoardControl,
        U: UsbTransport,
    {
        let profile_idx = self.config.current_profile() as usize;
        let profile = self.config.read_profile(profile_idx).unwrap_or_default();

        self.matrix.scan(timer, &profile.actuation_map);

        let current_layer = self.layout.current_layer();
        let now_ms = timer.now_ms().0;
        let mut has_non_tap_hold_press = false;
        let mut pending_action = LayoutAction::None;

        for key in 0..NUM_KEYS {
            let (is_pressed, distance) = {
                let state = self.matrix.key(key);
                (state.is_pressed(), state.distance())
            };

            if let Some((ak_index, half)) = find_binding(&profile.advanced_keys, current_layer, key) {
                let ak = profile.advanced_keys[ak_index];
                let bottom_out_point = ak_bottom_out_point(&ak.payload);
                let is_bottomed = bottom_out_point > 0 && self.matrix.key(key).is_bottomed_out(bottom_out_point);
                let was_pressed = self.prev_pressed[key];
                let was_bottomed = self.prev_bottomed[key];

                // Release takes priority over a same-tick bottom-out edge; a
                // fresh press takes priority over a same-tick bottom-out
                // (the rare full-slam-in-one-sample case degrades to a plain
                // Press, with BottomOut following on the next tick).
                let event_type = if !is_pressed && was_pressed {
                    AkEventType::Release
                } else if is_pressed && !was_pressed {
                    AkEventType::Press
                } else if is_pressed && is_bottomed && !was_bottomed {
                    AkEventType::BottomOut
                } else if is_pressed && !is_bottomed && was_bottomed {
                    AkEventType::ReleaseFromBottomOut
                } else if is_pressed {
                    AkEventType::Hold
                } else {
                    AkEventType::None
                };

                self.prev_pressed[key] = is_pressed;
                self.prev_bottomed[key] = is_bottomed;

                if matches!(ak.payload, AdvancedKeyPayload::DynamicKeystroke(_)) {
                    self.matrix.set_rapid_trigger_disabled(key, event_type != AkEventType::None);
                }

                // Only Null-Bind cares about the underlying layout keycode;
                // everything else carries its own keycode(s) in its payload.
                let keycode = if matches!(ak.payload, AdvancedKeyPayload::NullBind(_)) {
                    self.layout.resolve(&profile.keymap, key)
                } else {
                    0
                };

                if event_type == AkEventType::Press && !matches!(ak.payload, AdvancedKeyPayload::TapHold(_)) {
                    has_non_tap_hold_press = true;
                }

                let event = AkEvent {
                    event_type,
                    key: key as u8,
                    keycode,
                    ak_index,
                    distance,
                };
                let mut registrar = HidRegistrar { hid: &mut self.hid };
                self.advanced_keys
                    .process(&ak, event, half, now_ms, false, &mut registrar, &mut self.deferred);
            } else {
                let was_pressed = self.prev_pressed[key];
                if is_pressed && !was_pressed {
                    let keycode = self.layout.resolve(&profile.keymap, key);
                    self.pressed_keycode[key] = keycode;
                    has_non_tap_hold_press = true;
                    let action = self
                        .layout
                        .process_press(key, keycode, profile_idx as u8, &mut self.hid, board);
                    if action != LayoutAction::None {
                        pending_action = action;
                    }
                } else if !is_pressed && was_pressed {
                    let keycode = self.pressed_keycode[key];
                    self.layout.process_release(key, keycode, &mut self.hid);
                }
                self.prev_pressed[key] = is_pressed;
            }

            self.xinput.process(key, profile.gamepad_buttons[key], is_pressed, distance);
        }

        {
            let mut registrar = HidRegistrar { hid: &mut self.hid };
            self.advanced_keys
                .tick(&profile.advanced_keys, now_ms, has_non_tap_hold_press, &mut registrar);
        }

        self.apply_layout_action(pending_action, &profile, timer, board);

        self.xinput.task(&profile.gamepad_options, transport)?;

        // `send_reports` drains the deferred stack itself when no report
        // changed; its `exec` can't also hold `&mut self.hid` (that's
        // already the receiver), so it stages resolved actions here and
        // they're applied to `hid` right after, taking effect on the next
        // `send_reports` call rather than this one.
        let mut pending_exec: heapless::Vec<DeferredAction, { deferred::CAPACITY }> = heapless::Vec::new();
        self.hid.send_reports(transport, &mut self.deferred, |action| {
            let _ = pending_exec.push(action);
        })?;
        for action in pending_exec {
            match action.kind {
                DeferredActionKind::Press => self.hid.add_keycode(action.keycode),
                DeferredActionKind::Release => self.hid.remove_keycode(action.keycode),
                DeferredActionKind::Tap => {}
            }
        }

        Ok(())
    }

    /// Decode and run one raw-HID command buffer.
    pub fn handle_command<T: Timer, B: BoardControl>(
        &mut self,
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        timer: &T,
        board: &mut B,
    ) {
        CommandProto::handle(in_buf, out_buf, &mut self.config, &mut self.matrix, timer, board);
    }

    fn apply_layout_action<T: Timer>(
        &mut self,
        action: LayoutAction,
        profile: &Profile,
        timer: &T,
        board: &mut impl BoardControl,
    ) {
        match action {
            LayoutAction::None => {}
            LayoutAction::FactoryReset => {
                let _ = self.config.reset(board);
            }
            LayoutAction::Recalibrate => self.matrix.recalibrate(timer),
            LayoutAction::SetProfile(new_profile) => self.switch_profile(new_profile as usize, profile, board),
        }
    }

    /// Switch the active profile and reset every volatile, per-profile
    /// structure (SPEC_FULL.md §3, §4.4): unregister any still-held
    /// advanced-key keycode, then zero the layer mask, HID/XInput staging
    /// reports and the deferred stack so nothing from the old profile's
    /// keymap survives the boundary.
    fn switch_profile(&mut self, new_profile: usize, old_profile: &Profile, board: &mut impl BoardControl) {
        if new_profile >= NUM_PROFILES {
            return;
        }
        let previous = self.config.current_profile();
        if self.config.set_current_profile(new_profile, board).is_err() {
            return;
        }

        {
            let mut registrar = HidRegistrar { hid: &mut self.hid };
            self.advanced_keys.clear(&old_profile.advanced_keys, &mut registrar);
        }

        self.layout = Layout::new();
        self.layout.note_profile_change(previous);
        self.hid = HidComposer::new();
        self.xinput = XInput::new();
        self.deferred = DeferredStack::new();
        self.prev_pressed = [false; NUM_KEYS];
        self.prev_bottomed = [false; NUM_KEYS];
        for key in 0..NUM_KEYS {
            self.matrix.set_rapid_trigger_disabled(key, false);
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::config::schema::{GamepadButton, TapHold, Toggle};
    use board::ReportKind;
    use embedded_time::duration::Milliseconds;
    use std::cell::Cell;
    use std::vec::Vec;

    struct FakeFlash {
        words: Vec<u32>,
        sector_words: usize,
    }

    impl FakeFlash {
        fn new(total_words: usize, sector_words: usize) -> Self {
            Self {
                words: std::vec![0xFFFF_FFFFu32; total_words],
                sector_words,
            }
        }
    }

    impl Flash for FakeFlash {
        fn size(&self) -> usize {
            self.words.len() * 4
        }
        fn read_word(&self, word_addr: usize) -> u32 {
            self.words[word_addr / 4]
        }
        fn write_word(&mut self, word_addr: usize, value: u32) -> bool {
            let idx = word_addr / 4;
            self.words[idx] &= value;
            true
        }
        fn erase_sector(&mut self, word_addr: usize) -> bool {
            let idx = word_addr / 4;
            let start = (idx / self.sector_words) * self.sector_words;
            for w in &mut self.words[start..start + self.sector_words] {
                *w = 0xFFFF_FFFF;
            }
            true
        }
        fn sector_size(&self) -> usize {
            self.sector_words * 4
        }
    }

    struct FakeTimer {
        ms: Cell<u32>,
    }

    impl Timer for FakeTimer {
        fn now_ms(&self) -> Milliseconds<u32> {
            Milliseconds(self.ms.get())
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

    struct FakeTransport {
        reports: Vec<(ReportKind, Vec<u8>)>,
        xinput: Vec<[u8; 20]>,
        ready: bool,
    }

    impl Default for FakeTransport {
        fn default() -> Self {
            Self {
                reports: Vec::new(),
                xinput: Vec::new(),
                ready: true,
            }
        }
    }

    impl UsbTransport for FakeTransport {
        fn send_report(&mut self, kind: ReportKind, data: &[u8]) -> Result<(), UsbHidError> {
            self.reports.push((kind, data.to_vec()));
            Ok(())
        }
        fn send_xinput_report(&mut self, data: &[u8; 20]) -> Result<(), UsbHidError> {
            self.xinput.push(*data);
            Ok(())
        }
        fn send_raw_hid(&mut self, _data: &[u8; 64]) -> Result<(), UsbHidError> {
            Ok(())
        }
        fn is_ready(&self, _kind: ReportKind) -> bool {
            self.ready
        }
        fn remote_wakeup(&mut self) {}
    }

    const LOG_SIZE: usize = 4096;

    fn new_core() -> Core<FakeFlash, LOG_SIZE> {
        let total_words = (config::VIRTUAL_SIZE + LOG_SIZE) / 4 + 64;
        let flash = FakeFlash::new(total_words, 64);
        let mut core = Core::<FakeFlash, LOG_SIZE>::new(flash);
        let mut board = FakeBoard;
        core.init(&mut board);
        core
    }

    fn past_calibration() -> FakeTimer {
        FakeTimer { ms: Cell::new(matrix::CALIBRATION_DURATION_MS + 1) }
    }

    #[test]
    fn plain_key_press_sends_keyboard_report() {
        let mut core = new_core();
        let mut board = FakeBoard;
        let mut keymap = [[config::keycodes::TRANSPARENT; NUM_KEYS]; config::limits::NUM_LAYERS];
        keymap[0][0] = config::keycodes::KEYBOARD_MIN;
        core.config.set_keymap(0, 0, &keymap[0], &mut board).unwrap();

        let timer = past_calibration();
        let mut transport = FakeTransport::default();

        let mut actuation_bytes = config::schema::Actuation { actuation_point: 128, ..Default::default() };
        actuation_bytes.rt_down = 0;
        core.config.set_actuation(0, 0, actuation_bytes, &mut board).unwrap();

        core.store_adc(&mut board, 0, 2024);
        for _ in 0..3 {
            core.tick(&timer, &mut board, &mut transport).unwrap();
        }

        assert!(transport.reports.iter().any(|(kind, _)| *kind == ReportKind::Keyboard));
    }

    #[test]
    fn gamepad_button_key_drives_xinput_report() {
        let mut core = new_core();
        let mut board = FakeBoard;
        core.config
            .set_gamepad_buttons_range(0, 0, &[GamepadButton::A.into()], &mut board)
            .unwrap();
        let mut actuation = config::schema::Actuation { actuation_point: 128, ..Default::default() };
        actuation.rt_down = 0;
        core.config.set_actuation(0, 0, actuation, &mut board).unwrap();

        let timer = past_calibration();
        let mut transport = FakeTransport::default();

        core.store_adc(&mut board, 0, 2024);
        for _ in 0..3 {
            core.tick(&timer, &mut board, &mut transport).unwrap();
        }

        assert!(!transport.xinput.is_empty());
    }

    #[test]
    fn tap_hold_key_taps_on_quick_release() {
        let mut core = new_core();
        let mut board = FakeBoard;
        core.config
            .set_advanced_key(
                0,
                0,
                AdvancedKey {
                    layer: 0,
                    key: 7,
                    payload: AdvancedKeyPayload::TapHold(TapHold {
                        tap_keycode: config::keycodes::KEYBOARD_MIN,
                        hold_keycode: config::keycodes::MODIFIER_MIN,
                        tapping_term_ms: 200,
                        hold_on_other_key_press: false,
                    }),
                },
                &mut board,
            )
            .unwrap();
        let mut actuation = config::schema::Actuation { actuation_point: 128, ..Default::default() };
        actuation.rt_down = 0;
        core.config.set_actuation(0, 7, actuation, &mut board).unwrap();

        let timer = past_calibration();
        let mut transport = FakeTransport::default();

        core.store_adc(&mut board, 7, 2024);
        core.tick(&timer, &mut board, &mut transport).unwrap();
        core.store_adc(&mut board, 7, 0);
        core.tick(&timer, &mut board, &mut transport).unwrap();
        core.tick(&timer, &mut board, &mut transport).unwrap();

        assert!(transport.reports.iter().any(|(kind, _)| *kind == ReportKind::Keyboard));
    }

    #[test]
    fn set_profile_keycode_switches_and_clears_advanced_key_state() {
        let mut core = new_core();
        let mut board = FakeBoard;
        let mut keymap0 = [config::keycodes::TRANSPARENT; NUM_KEYS];
        keymap0[0] = config::keycodes::PROFILE_MIN + 1;
        core.config.set_keymap(0, 0, &keymap0, &mut board).unwrap();
        core.config
            .set_advanced_key(
                0,
                0,
                AdvancedKey {
                    layer: 0,
                    key: 9,
                    payload: AdvancedKeyPayload::Toggle(Toggle { keycode: config::keycodes::KEYBOARD_MIN, tapping_term_ms: 500 }),
                },
                &mut board,
            )
            .unwrap();
        let mut actuation = config::schema::Actuation { actuation_point: 128, ..Default::default() };
        actuation.rt_down = 0;
        core.config.set_actuation(0, 0, actuation, &mut board).unwrap();
        core.config.set_actuation(0, 9, actuation, &mut board).unwrap();

        let timer = past_calibration();
        let mut transport = FakeTransport::default();

        core.store_adc(&mut board, 9, 2024);
        core.tick(&timer, &mut board, &mut transport).unwrap();

        core.store_adc(&mut board, 0, 2024);
        core.tick(&timer, &mut board, &mut transport).unwrap();

        assert_eq!(core.config.current_profile(), 1);
    }

    #[test]
    fn command_handle_reports_firmware_version() {
        let mut core = new_core();
        let timer = past_calibration();
        let mut board = FakeBoard;
        let mut out = [0u8; RAW_HID_EP_SIZE];
        core.handle_command(&[0], &mut out, &timer, &mut board);
        assert_eq!(out[0], 0);
    }
}

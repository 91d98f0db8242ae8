//! Builds and chain-sends the four HID reports (SPEC_FULL.md §4.7).
//!
//! Grounded on the teacher's `src/device/keyboard.rs` for the hybrid
//! NKRO+6KRO accumulation idiom (`BootKeyboardReport::new`'s FIFO-with-
//! rollover loop, generalized here to a persistent staging report mutated
//! incrementally by `add_keycode`/`remove_keycode` instead of rebuilt every
//! tick from a key set) and on `src/device/consumer.rs`/`mouse.rs` for the
//! other report shapes.

pub mod reports;

use crate::board::{ReportKind, UsbHidError, UsbTransport};
use crate::config::keycodes::{self, KeycodeKind};
use crate::deferred::DeferredStack;
use crate::layout::HidSink;
use reports::{ConsumerReport, KeyboardReport, MouseReport, SystemReport};

/// Bit position of a `GamepadButton`-unrelated mouse button keycode, in
/// `keycodes::MOUSE_MIN..=MOUSE_MAX` order.
fn mouse_button_bit(kc: u8) -> u8 {
    kc - keycodes::MOUSE_MIN
}

/// Staging state for all four reports plus the "last report actually sent"
/// snapshots used for change detection.
pub struct HidComposer {
    keyboard: KeyboardReport,
    system: SystemReport,
    consumer: ConsumerReport,
    mouse: MouseReport,
    sent_keyboard: KeyboardReport,
    sent_system: SystemReport,
    sent_consumer: ConsumerReport,
    sent_mouse: MouseReport,
    /// Which kind a chained send is waiting to hear `on_report_complete` for.
    pending: Option<ReportKind>,
}

impl HidComposer {
    pub fn new() -> Self {
        Self {
            keyboard: KeyboardReport::default(),
            system: SystemReport { report_id: 1, code: 0 },
            consumer: ConsumerReport { report_id: 2, code: 0 },
            mouse: MouseReport { report_id: 3, ..MouseReport::default() },
            sent_keyboard: KeyboardReport::default(),
            sent_system: SystemReport { report_id: 1, code: 0 },
            sent_consumer: ConsumerReport { report_id: 2, code: 0 },
            sent_mouse: MouseReport { report_id: 3, ..MouseReport::default() },
            pending: None,
        }
    }

    fn set_keyboard_bit(&mut self, hid_usage: u8, value: bool) {
        let byte = hid_usage as usize / 8;
        let bit = hid_usage % 8;
        if byte >= self.keyboard.bitmap.len() {
            return;
        }
        if value {
            self.keyboard.bitmap[byte] |= 1 << bit;
        } else {
            self.keyboard.bitmap[byte] &= !(1 << bit);
        }
    }

    fn push_six_key(&mut self, hid_usage: u8) {
        if self.keyboard.keycodes.contains(&hid_usage) {
            return;
        }
        if let Some(slot) = self.keyboard.keycodes.iter_mut().find(|k| **k == 0) {
            *slot = hid_usage;
        } else {
            self.keyboard.keycodes.rotate_left(1);
            *self.keyboard.keycodes.last_mut().unwrap() = hid_usage;
        }
    }

    fn remove_six_key(&mut self, hid_usage: u8) {
        if let Some(slot) = self.keyboard.keycodes.iter_mut().find(|k| **k == hid_usage) {
            *slot = 0;
        }
    }

    fn set_mouse_button(&mut self, kc: u8, value: bool) {
        let bit = mouse_button_bit(kc);
        if value {
            self.mouse.buttons |= 1 << bit;
        } else {
            self.mouse.buttons &= !(1 << bit);
        }
    }

    /// Chain-send staging reports in `Keyboard < System < Consumer < Mouse`
    /// order. Sends the first changed report and records it as `pending`;
    /// subsequent calls (from the transport's `on_report_complete`) resume
    /// from there. When no report changed, runs `deferred.drain()` instead.
    pub fn send_reports(
        &mut self,
        transport: &mut impl UsbTransport,
        deferred: &mut DeferredStack,
        exec: impl FnMut(crate::deferred::DeferredAction),
    ) -> Result<(), UsbHidError> {
        let start = self.pending.map(|k| k.next().unwrap_or(ReportKind::Keyboard)).unwrap_or(ReportKind::Keyboard);
        let mut kind = Some(start);
        while let Some(k) = kind {
            if self.changed(k) && transport.is_ready(k) {
                self.send_one(transport, k)?;
                self.mark_sent(k);
                self.pending = Some(k);
                return Ok(());
            }
            kind = k.next();
        }
        self.pending = None;
        deferred.drain(exec);
        Ok(())
    }

    fn changed(&self, kind: ReportKind) -> bool {
        match kind {
            ReportKind::Keyboard => self.keyboard != self.sent_keyboard,
            ReportKind::System => self.system != self.sent_system,
            ReportKind::Consumer => self.consumer != self.sent_consumer,
            ReportKind::Mouse => self.mouse != self.sent_mouse,
        }
    }

    fn mark_sent(&mut self, kind: ReportKind) {
        match kind {
            ReportKind::Keyboard => self.sent_keyboard = self.keyboard,
            ReportKind::System => self.sent_system = self.system,
            ReportKind::Consumer => self.sent_consumer = self.consumer,
            ReportKind::Mouse => self.sent_mouse = self.mouse,
        }
    }

    fn send_one(&self, transport: &mut impl UsbTransport, kind: ReportKind) -> Result<(), UsbHidError> {
        use packed_struct::PackedStruct;
        match kind {
            ReportKind::Keyboard => transport.send_report(kind, &self.keyboard.pack().unwrap()),
            ReportKind::System => transport.send_report(kind, &self.system.pack().unwrap()),
            ReportKind::Consumer => transport.send_report(kind, &self.consumer.pack().unwrap()),
            ReportKind::Mouse => transport.send_report(kind, &self.mouse.pack().unwrap()),
        }
    }
}

impl Default for HidComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl HidSink for HidComposer {
    fn add_keycode(&mut self, kc: u8) {
        match KeycodeKind::classify(kc) {
            KeycodeKind::Keyboard(kc) => {
                let usage = keycodes::keyboard_to_hid_usage(kc);
                self.set_keyboard_bit(usage, true);
                self.push_six_key(usage);
            }
            KeycodeKind::Modifier(kc) => {
                self.keyboard.modifiers |= 1 << keycodes::modifier_bit(kc);
            }
            KeycodeKind::System(kc) => self.system.code = kc as u16,
            KeycodeKind::Consumer(kc) => self.consumer.code = kc as u16,
            KeycodeKind::Mouse(kc) => self.set_mouse_button(kc, true),
            _ => {}
        }
    }

    fn remove_keycode(&mut self, kc: u8) {
        match KeycodeKind::classify(kc) {
            KeycodeKind::Keyboard(kc) => {
                let usage = keycodes::keyboard_to_hid_usage(kc);
                self.set_keyboard_bit(usage, false);
                self.remove_six_key(usage);
            }
            KeycodeKind::Modifier(kc) => {
                self.keyboard.modifiers &= !(1 << keycodes::modifier_bit(kc));
            }
            KeycodeKind::System(kc) => {
                if self.system.code == kc as u16 {
                    self.system.code = 0;
                }
            }
            KeycodeKind::Consumer(kc) => {
                if self.consumer.code == kc as u16 {
                    self.consumer.code = 0;
                }
            }
            KeycodeKind::Mouse(kc) => self.set_mouse_button(kc, false),
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::board::UsbHidError as Err;
    use std::vec::Vec;

    struct FakeTransport {
        sent: Vec<(ReportKind, Vec<u8>)>,
        ready: bool,
    }

    impl UsbTransport for FakeTransport {
        fn send_report(&mut self, kind: ReportKind, data: &[u8]) -> Result<(), Err> {
            self.sent.push((kind, data.to_vec()));
            Ok(())
        }
        fn send_xinput_report(&mut self, _data: &[u8; 20]) -> Result<(), Err> {
            Ok(())
        }
        fn send_raw_hid(&mut self, _data: &[u8; 64]) -> Result<(), Err> {
            Ok(())
        }
        fn is_ready(&self, _kind: ReportKind) -> bool {
            self.ready
        }
        fn remote_wakeup(&mut self) {}
    }

    #[test]
    fn add_then_remove_keycode_restores_prior_reports() {
        let mut hid = HidComposer::new();
        let before = (hid.keyboard, hid.system, hid.consumer, hid.mouse);
        hid.add_keycode(keycodes::KEYBOARD_MIN);
        hid.remove_keycode(keycodes::KEYBOARD_MIN);
        let after = (hid.keyboard, hid.system, hid.consumer, hid.mouse);
        assert_eq!(before, after);
    }

    #[test]
    fn send_reports_sends_keyboard_first_when_changed() {
        let mut hid = HidComposer::new();
        hid.add_keycode(keycodes::KEYBOARD_MIN);
        let mut transport = FakeTransport { sent: Vec::new(), ready: true };
        let mut deferred = DeferredStack::new();
        hid.send_reports(&mut transport, &mut deferred, |_| {}).unwrap();
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].0, ReportKind::Keyboard);
    }

    #[test]
    fn send_reports_drains_deferred_when_nothing_changed() {
        let mut hid = HidComposer::new();
        let mut transport = FakeTransport { sent: Vec::new(), ready: true };
        let mut deferred = DeferredStack::new();
        deferred.push(crate::deferred::DeferredAction {
            kind: crate::deferred::DeferredActionKind::Press,
            key: 1,
            keycode: 2,
        });
        let mut ran = false;
        hid.send_reports(&mut transport, &mut deferred, |_| ran = true).unwrap();
        assert!(transport.sent.is_empty());
        assert!(ran);
    }

    #[test]
    fn six_key_buffer_drops_oldest_when_full() {
        let mut hid = HidComposer::new();
        for i in 0..7u8 {
            hid.add_keycode(keycodes::KEYBOARD_MIN + i);
        }
        let usage0 = keycodes::keyboard_to_hid_usage(keycodes::KEYBOARD_MIN);
        assert!(!hid.keyboard.keycodes.contains(&usage0));
        // the bitmap still reflects every held key, dropped or not.
        assert!(hid.keyboard.bitmap[usage0 as usize / 8] & (1 << (usage0 % 8)) != 0);
    }
}

//! XInput gamepad report assembly (SPEC_FULL.md §4.8).
//!
//! Translates `examples/original_source/src/xinput.c`'s `xinput_process`/
//! `xinput_task` (per-tick max-accumulation into `analog_states`, the
//! 4-point piecewise-linear curve, `square_to_circular`/`usqrt`-based
//! circular joystick shaping) into the same per-tick accumulate-then-shape
//! pipeline, using a plain integer `isqrt` in place of the original's
//! `lib/usqrt.h` (no `libm` in this dependency stack).

use packed_struct::prelude::*;

use crate::board::{UsbHidError, UsbTransport};
use crate::config::limits::NUM_KEYS;
use crate::config::schema::{GamepadButton, GamepadOptions};

/// 20-byte XInput report, exact layout per SPEC_FULL.md §6.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "20")]
pub struct XInputReport {
    #[packed_field]
    pub report_id: u8,
    #[packed_field]
    pub report_size: u8,
    #[packed_field]
    pub buttons: u16,
    #[packed_field]
    pub lz: u8,
    #[packed_field]
    pub rz: u8,
    #[packed_field]
    pub joysticks: [i16; 4],
    #[packed_field]
    pub reserved: [u8; 6],
}

fn button_bit(button: GamepadButton) -> Option<u16> {
    match button {
        GamepadButton::Up => Some(0),
        GamepadButton::Down => Some(1),
        GamepadButton::Left => Some(2),
        GamepadButton::Right => Some(3),
        GamepadButton::Start => Some(4),
        GamepadButton::Back => Some(5),
        GamepadButton::Ls => Some(6),
        GamepadButton::Rs => Some(7),
        GamepadButton::Lb => Some(8),
        GamepadButton::Rb => Some(9),
        GamepadButton::Home => Some(10),
        GamepadButton::A => Some(12),
        GamepadButton::B => Some(13),
        GamepadButton::X => Some(14),
        GamepadButton::Y => Some(15),
        _ => None,
    }
}

/// Index into `analog_state` for an analog `GamepadButton`, matching the
/// original's `ANALOG_STATE(button) = analog_states[button - GP_BUTTON_LS_UP]`.
fn analog_index(button: GamepadButton) -> Option<usize> {
    button.is_analog().then(|| analog_pair_index(button))
}

const AXIS_LS_X: (usize, usize) = (analog_pair_index(GamepadButton::LsLeft), analog_pair_index(GamepadButton::LsRight));
const AXIS_LS_Y: (usize, usize) = (analog_pair_index(GamepadButton::LsDown), analog_pair_index(GamepadButton::LsUp));
const AXIS_RS_X: (usize, usize) = (analog_pair_index(GamepadButton::RsLeft), analog_pair_index(GamepadButton::RsRight));
const AXIS_RS_Y: (usize, usize) = (analog_pair_index(GamepadButton::RsDown), analog_pair_index(GamepadButton::RsUp));
const JOYSTICK_AXES: [(usize, usize); 4] = [AXIS_LS_X, AXIS_LS_Y, AXIS_RS_X, AXIS_RS_Y];

const fn analog_pair_index(button: GamepadButton) -> usize {
    (button as u8 - GamepadButton::LsUp as u8) as usize
}

/// Bit-by-bit integer square root (no `libm` in the dependency stack).
fn isqrt(value: u32) -> u32 {
    let mut result = 0u32;
    let mut bit = 1u32 << 30;
    let mut n = value;
    while bit > n {
        bit >>= 2;
    }
    while bit != 0 {
        if n >= result + bit {
            n -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

fn square_to_circular(x: u8, y: u8) -> u8 {
    let y = y as u32;
    let inner = 255 * 255 - ((y * y) >> 1);
    ((x as u32 * isqrt(inner)) / 255) as u8
}

/// Apply the per-profile 4-point curve. Returns `(value, in_end_deadzone)`.
fn apply_analog_curve(value: u8, curve: &[[u8; 2]; 4]) -> (u8, bool) {
    if value > curve[3][0] {
        return (255, true);
    }
    if value <= curve[0][0] {
        return (0, false);
    }
    let mut i = 0;
    while i < 3 && (curve[i + 1][0] as u32) < value as u32 {
        i += 1;
    }
    let (x1, y1) = (curve[i][0] as i32, curve[i][1] as i32);
    let (x2, y2) = (curve[i + 1][0] as i32, curve[i + 1][1] as i32);
    if x2 == x1 {
        return (y1 as u8, false);
    }
    let out = y1 + (y2 - y1) * (value as i32 - x1) / (x2 - x1);
    (out as u8, false)
}

/// Per-tick digital/analog accumulation plus the shaped 20-byte report.
pub struct XInput {
    report: XInputReport,
    sent: XInputReport,
    key_pressed: [bool; NUM_KEYS],
    analog_state: [u16; 10],
}

impl XInput {
    pub fn new() -> Self {
        Self {
            report: XInputReport { report_id: 0, report_size: 20, ..XInputReport::default() },
            sent: XInputReport { report_id: 0, report_size: 20, ..XInputReport::default() },
            key_pressed: [false; NUM_KEYS],
            analog_state: [0; 10],
        }
    }

    /// Called per key per scan tick, mirroring `xinput_process`.
    pub fn process(&mut self, key: usize, button: GamepadButton, is_pressed: bool, distance: u8) {
        if button == GamepadButton::None {
            return;
        }
        if let Some(bit) = button_bit(button) {
            let was_pressed = self.key_pressed[key];
            if is_pressed && !was_pressed {
                self.report.buttons |= 1 << bit;
            } else if !is_pressed && was_pressed {
                self.report.buttons &= !(1 << bit);
            }
            self.key_pressed[key] = is_pressed;
        } else if let Some(idx) = analog_index(button) {
            self.analog_state[idx] = self.analog_state[idx].max(distance as u16);
        }
    }

    /// Called once per scan tick after every key has been processed,
    /// mirroring `xinput_task`.
    pub fn task(
        &mut self,
        options: &GamepadOptions,
        transport: &mut impl UsbTransport,
    ) -> Result<(), UsbHidError> {
        let (lz, _) = apply_analog_curve(self.analog_state[analog_pair_index(GamepadButton::Lt)].min(255) as u8, &options.analog_curve);
        let (rz, _) = apply_analog_curve(self.analog_state[analog_pair_index(GamepadButton::Rt)].min(255) as u8, &options.analog_curve);
        self.report.lz = lz;
        self.report.rz = rz;

        let mut magnitudes = [0u8; 4];
        let mut positive_dominant = [false; 4];
        for (i, (neg, pos)) in JOYSTICK_AXES.iter().enumerate() {
            let neg_v = self.analog_state[*neg];
            let pos_v = self.analog_state[*pos];
            magnitudes[i] = if options.snappy_joystick {
                neg_v.max(pos_v).min(255) as u8
            } else {
                (pos_v as i32 - neg_v as i32).unsigned_abs().min(255) as u8
            };
            positive_dominant[i] = pos_v > neg_v;
        }

        let mut axes = [0u8; 4];
        for pair in 0..2 {
            let (x_in, y_in) = (magnitudes[pair * 2], magnitudes[pair * 2 + 1]);
            let (x_out, y_out) = if !options.square_joystick {
                shape_circular(x_in, y_in, &options.analog_curve)
            } else {
                shape_square(x_in, y_in, &options.analog_curve)
            };
            axes[pair * 2] = x_out;
            axes[pair * 2 + 1] = y_out;
        }

        for (i, value) in axes.iter().enumerate() {
            let magnitude = (*value as i32) << 7;
            self.report.joysticks[i] = if positive_dominant[i] { magnitude as i16 } else { -(magnitude as i16) };
        }

        if self.report != self.sent {
            let bytes = self.report.pack().unwrap();
            transport.send_xinput_report(&bytes)?;
            self.sent = self.report;
        }

        self.analog_state = [0; 10];
        Ok(())
    }
}

impl Default for XInput {
    fn default() -> Self {
        Self::new()
    }
}

fn shape_circular(x: u8, y: u8, curve: &[[u8; 2]; 4]) -> (u8, u8) {
    let cx = square_to_circular(x, y);
    let cy = square_to_circular(y, x);
    let magnitude = isqrt(cx as u32 * cx as u32 + cy as u32 * cy as u32);
    if magnitude == 0 {
        return (0, 0);
    }
    let (new_magnitude, in_end_deadzone) = apply_analog_curve(magnitude.min(255) as u8, curve);
    if in_end_deadzone {
        return if cx != 0 && cy != 0 {
            (180, 180)
        } else {
            (if cx == 0 { 0 } else { 255 }, if cy == 0 { 0 } else { 255 })
        };
    }
    let scaled_x = (cx as u32 * new_magnitude as u32) / magnitude;
    let scaled_y = (cy as u32 * new_magnitude as u32) / magnitude;
    (scaled_x as u8, scaled_y as u8)
}

fn shape_square(x: u8, y: u8, curve: &[[u8; 2]; 4]) -> (u8, u8) {
    let (x, y) = (x as u32, y as u32);
    let magnitude = isqrt(x * x + y * y);
    if magnitude == 0 {
        return (0, 0);
    }
    let max_x = if x > y { 255 } else { x * 255 / y.max(1) };
    let max_y = if y > x { 255 } else { y * 255 / x.max(1) };
    let max_magnitude = isqrt(max_x * max_x + max_y * max_y).max(1);
    let normalized = (magnitude * 255 / max_magnitude).min(255) as u8;
    let (new_magnitude, in_end_deadzone) = apply_analog_curve(normalized, curve);
    if in_end_deadzone {
        return (if x == 0 { 0 } else { 255 }, if y == 0 { 0 } else { 255 });
    }
    let scaled_x = (max_x * new_magnitude as u32) / 255;
    let scaled_y = (max_y * new_magnitude as u32) / 255;
    (scaled_x as u8, scaled_y as u8)
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::board::ReportKind;
    use std::vec::Vec;

    struct FakeTransport {
        sent: Vec<[u8; 20]>,
    }

    impl UsbTransport for FakeTransport {
        fn send_report(&mut self, _kind: ReportKind, _data: &[u8]) -> Result<(), UsbHidError> {
            Ok(())
        }
        fn send_xinput_report(&mut self, data: &[u8; 20]) -> Result<(), UsbHidError> {
            self.sent.push(*data);
            Ok(())
        }
        fn send_raw_hid(&mut self, _data: &[u8; 64]) -> Result<(), UsbHidError> {
            Ok(())
        }
        fn is_ready(&self, _kind: ReportKind) -> bool {
            true
        }
        fn remote_wakeup(&mut self) {}
    }

    #[test]
    fn isqrt_matches_known_values() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(255 * 255), 255);
        assert_eq!(isqrt(1000), 31);
    }

    #[test]
    fn digital_button_press_sets_bitmask() {
        let mut xinput = XInput::new();
        xinput.process(0, GamepadButton::A, true, 0);
        let bit = button_bit(GamepadButton::A).unwrap();
        assert_eq!(xinput.report.buttons & (1 << bit), 1 << bit);
        xinput.process(0, GamepadButton::A, false, 0);
        assert_eq!(xinput.report.buttons & (1 << bit), 0);
    }

    #[test]
    fn analog_button_accumulates_max_per_tick() {
        let mut xinput = XInput::new();
        xinput.process(0, GamepadButton::Lt, true, 100);
        xinput.process(1, GamepadButton::Lt, true, 50);
        assert_eq!(xinput.analog_state[analog_pair_index(GamepadButton::Lt)], 100);
    }

    #[test]
    fn task_sends_only_on_change() {
        let mut xinput = XInput::new();
        let options = GamepadOptions::default();
        let mut transport = FakeTransport { sent: Vec::new() };
        xinput.task(&options, &mut transport).unwrap();
        assert!(transport.sent.is_empty(), "identical report should not resend");

        xinput.process(0, GamepadButton::A, true, 0);
        xinput.task(&options, &mut transport).unwrap();
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn trigger_curve_applies_identity_default() {
        let mut xinput = XInput::new();
        let options = GamepadOptions::default();
        xinput.process(0, GamepadButton::Rt, true, 170);
        let mut transport = FakeTransport { sent: Vec::new() };
        xinput.task(&options, &mut transport).unwrap();
        assert_eq!(xinput.report.rz, 170);
    }
}

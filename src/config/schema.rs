//! Persistent configuration schema (SPEC_FULL.md §3), grounded in
//! `examples/original_source/include/common.h`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::limits::{NUM_ADVANCED_KEYS, NUM_KEYS, NUM_LAYERS};

/// Per-key actuation/Rapid-Trigger configuration. On-wire size: 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actuation {
    pub actuation_point: u8,
    pub rt_down: u8,
    pub rt_up: u8,
    pub continuous: bool,
}

impl Actuation {
    pub const WIRE_SIZE: usize = 4;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        [
            self.actuation_point,
            self.rt_down,
            self.rt_up,
            self.continuous as u8,
        ]
    }

    pub fn from_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        Self {
            actuation_point: b[0],
            rt_down: b[1],
            rt_up: b[2],
            continuous: b[3] != 0,
        }
    }

    /// Effective Rapid Trigger release threshold (`rt_up == 0` means
    /// "use `rt_down`").
    pub fn effective_rt_up(self) -> u8 {
        if self.rt_up == 0 {
            self.rt_down
        } else {
            self.rt_up
        }
    }

    pub fn rapid_trigger_enabled(self) -> bool {
        self.rt_down > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum NullBindBehavior {
    Last = 0,
    Primary = 1,
    Secondary = 2,
    Neutral = 3,
    Distance = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullBind {
    pub secondary_key: u8,
    pub behavior: u8,
    pub bottom_out_point: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DksAction {
    Hold = 0,
    Press = 1,
    Release = 2,
    Tap = 3,
}

impl DksAction {
    pub fn from_bits(bits: u8) -> Self {
        Self::try_from(bits & 0x3).unwrap_or(DksAction::Hold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DynamicKeystroke {
    pub keycodes: [u8; 4],
    /// Per keycode, 2 bits per event kind: press(0..2), bottom-out(2..4),
    /// release-from-bottom-out(4..6), release(6..8).
    pub bitmap: [u8; 4],
    pub bottom_out_point: u8,
}

impl DynamicKeystroke {
    /// Action for keycode slot `slot` at event-kind bit offset `event_bit_offset`
    /// (0, 2, 4 or 6).
    pub fn action(&self, slot: usize, event_bit_offset: u8) -> DksAction {
        DksAction::from_bits(self.bitmap[slot] >> event_bit_offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TapHold {
    pub tap_keycode: u8,
    pub hold_keycode: u8,
    pub tapping_term_ms: u16,
    pub hold_on_other_key_press: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggle {
    pub keycode: u8,
    pub tapping_term_ms: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancedKeyPayload {
    None,
    NullBind(NullBind),
    DynamicKeystroke(DynamicKeystroke),
    TapHold(TapHold),
    Toggle(Toggle),
}

impl Default for AdvancedKeyPayload {
    fn default() -> Self {
        AdvancedKeyPayload::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AdvancedKeyKind {
    None = 0,
    NullBind = 1,
    DynamicKeystroke = 2,
    TapHold = 3,
    Toggle = 4,
}

/// A single advanced-key binding. On-wire size: 12 bytes (3-byte header +
/// 9-byte payload slot, zero-padded for variants smaller than the widest
/// one, `DynamicKeystroke`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvancedKey {
    pub layer: u8,
    pub key: u8,
    pub payload: AdvancedKeyPayload,
}

impl AdvancedKey {
    pub const WIRE_SIZE: usize = 12;
    const PAYLOAD_SIZE: usize = 9;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0] = self.layer;
        out[1] = self.key;
        let mut payload = [0u8; Self::PAYLOAD_SIZE];
        let kind = match self.payload {
            AdvancedKeyPayload::None => AdvancedKeyKind::None,
            AdvancedKeyPayload::NullBind(nb) => {
                payload[0] = nb.secondary_key;
                payload[1] = nb.behavior;
                payload[2] = nb.bottom_out_point;
                AdvancedKeyKind::NullBind
            }
            AdvancedKeyPayload::DynamicKeystroke(dks) => {
                payload[0..4].copy_from_slice(&dks.keycodes);
                payload[4..8].copy_from_slice(&dks.bitmap);
                payload[8] = dks.bottom_out_point;
                AdvancedKeyKind::DynamicKeystroke
            }
            AdvancedKeyPayload::TapHold(th) => {
                payload[0] = th.tap_keycode;
                payload[1] = th.hold_keycode;
                payload[2..4].copy_from_slice(&th.tapping_term_ms.to_le_bytes());
                payload[4] = th.hold_on_other_key_press as u8;
                AdvancedKeyKind::TapHold
            }
            AdvancedKeyPayload::Toggle(t) => {
                payload[0] = t.keycode;
                payload[1..3].copy_from_slice(&t.tapping_term_ms.to_le_bytes());
                AdvancedKeyKind::Toggle
            }
        };
        out[2] = kind.into();
        out[3..].copy_from_slice(&payload);
        out
    }

    pub fn from_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        let layer = b[0];
        let key = b[1];
        let payload_bytes = &b[3..];
        let payload = match AdvancedKeyKind::try_from(b[2]).unwrap_or(AdvancedKeyKind::None) {
            AdvancedKeyKind::None => AdvancedKeyPayload::None,
            AdvancedKeyKind::NullBind => AdvancedKeyPayload::NullBind(NullBind {
                secondary_key: payload_bytes[0],
                behavior: payload_bytes[1],
                bottom_out_point: payload_bytes[2],
            }),
            AdvancedKeyKind::DynamicKeystroke => {
                let mut keycodes = [0u8; 4];
                keycodes.copy_from_slice(&payload_bytes[0..4]);
                let mut bitmap = [0u8; 4];
                bitmap.copy_from_slice(&payload_bytes[4..8]);
                AdvancedKeyPayload::DynamicKeystroke(DynamicKeystroke {
                    keycodes,
                    bitmap,
                    bottom_out_point: payload_bytes[8],
                })
            }
            AdvancedKeyKind::TapHold => AdvancedKeyPayload::TapHold(TapHold {
                tap_keycode: payload_bytes[0],
                hold_keycode: payload_bytes[1],
                tapping_term_ms: u16::from_le_bytes([payload_bytes[2], payload_bytes[3]]),
                hold_on_other_key_press: payload_bytes[4] != 0,
            }),
            AdvancedKeyKind::Toggle => AdvancedKeyPayload::Toggle(Toggle {
                keycode: payload_bytes[0],
                tapping_term_ms: u16::from_le_bytes([payload_bytes[1], payload_bytes[2]]),
            }),
        };
        Self { layer, key, payload }
    }
}

/// Per-key gamepad binding (SPEC_FULL.md §3); matches
/// `examples/original_source/include/common.h`'s `gamepad_button_t` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Default)]
#[repr(u8)]
pub enum GamepadButton {
    #[default]
    None = 0,
    A = 1,
    B = 2,
    X = 3,
    Y = 4,
    Up = 5,
    Down = 6,
    Left = 7,
    Right = 8,
    Start = 9,
    Back = 10,
    Home = 11,
    Ls = 12,
    Rs = 13,
    Lb = 14,
    Rb = 15,
    LsUp = 16,
    LsDown = 17,
    LsLeft = 18,
    LsRight = 19,
    RsUp = 20,
    RsDown = 21,
    RsLeft = 22,
    RsRight = 23,
    Lt = 24,
    Rt = 25,
}

impl GamepadButton {
    pub fn is_analog(self) -> bool {
        matches!(
            self,
            GamepadButton::LsUp
                | GamepadButton::LsDown
                | GamepadButton::LsLeft
                | GamepadButton::LsRight
                | GamepadButton::RsUp
                | GamepadButton::RsDown
                | GamepadButton::RsLeft
                | GamepadButton::RsRight
                | GamepadButton::Lt
                | GamepadButton::Rt
        )
    }

    pub fn is_digital(self) -> bool {
        !matches!(self, GamepadButton::None) && !self.is_analog()
    }
}

/// Per-profile gamepad analog response shaping (SPEC_FULL.md §3/§4.8).
/// On-wire size: 9 bytes (4x `(x, y)` curve points + 1 flags byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamepadOptions {
    pub analog_curve: [[u8; 2]; 4],
    pub keyboard_enabled: bool,
    pub gamepad_override: bool,
    pub square_joystick: bool,
    pub snappy_joystick: bool,
}

impl Default for GamepadOptions {
    fn default() -> Self {
        Self {
            analog_curve: [[0, 0], [85, 85], [170, 170], [255, 255]],
            keyboard_enabled: true,
            gamepad_override: false,
            square_joystick: false,
            snappy_joystick: false,
        }
    }
}

impl GamepadOptions {
    pub const WIRE_SIZE: usize = 9;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        for (i, p) in self.analog_curve.iter().enumerate() {
            out[i * 2] = p[0];
            out[i * 2 + 1] = p[1];
        }
        let mut flags = 0u8;
        flags |= self.keyboard_enabled as u8;
        flags |= (self.gamepad_override as u8) << 1;
        flags |= (self.square_joystick as u8) << 2;
        flags |= (self.snappy_joystick as u8) << 3;
        out[8] = flags;
        out
    }

    pub fn from_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        let mut analog_curve = [[0u8; 2]; 4];
        for i in 0..4 {
            analog_curve[i] = [b[i * 2], b[i * 2 + 1]];
        }
        let flags = b[8];
        Self {
            analog_curve,
            keyboard_enabled: flags & 0x1 != 0,
            gamepad_override: flags & 0x2 != 0,
            square_joystick: flags & 0x4 != 0,
            snappy_joystick: flags & 0x8 != 0,
        }
    }
}

/// Board-wide flags that apply regardless of the active profile. The
/// original firmware keeps these in a separate `eeconfig_options_t`
/// (`COMMAND_GET_OPTIONS`/`COMMAND_SET_OPTIONS`), distinct from the
/// per-profile `gamepad_options_t` this crate already models as
/// [`GamepadOptions`]; its exact field layout wasn't present in the
/// retrieved sources, so this carries the one flag the raw-HID protocol
/// and SPEC_FULL.md §4.9 actually require a global home for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalOptions {
    pub raw_hid_enabled: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            raw_hid_enabled: true,
        }
    }
}

impl GlobalOptions {
    pub const WIRE_SIZE: usize = 1;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        [self.raw_hid_enabled as u8]
    }

    pub fn from_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        Self {
            raw_hid_enabled: b[0] & 0x1 != 0,
        }
    }
}

/// Initial ADC calibration hint (SPEC_FULL.md §3), used to seed
/// `Matrix::KeyState` before any samples have arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub initial_rest_value: u16,
    pub initial_bottom_out_threshold: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            initial_rest_value: 0,
            initial_bottom_out_threshold: 1024,
        }
    }
}

impl Calibration {
    pub const WIRE_SIZE: usize = 4;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..2].copy_from_slice(&self.initial_rest_value.to_le_bytes());
        out[2..4].copy_from_slice(&self.initial_bottom_out_threshold.to_le_bytes());
        out
    }

    pub fn from_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        Self {
            initial_rest_value: u16::from_le_bytes([b[0], b[1]]),
            initial_bottom_out_threshold: u16::from_le_bytes([b[2], b[3]]),
        }
    }
}

/// One full configuration profile (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub keymap: [[u8; NUM_KEYS]; NUM_LAYERS],
    pub actuation_map: [Actuation; NUM_KEYS],
    pub advanced_keys: [AdvancedKey; NUM_ADVANCED_KEYS],
    pub tick_rate: u8,
    pub gamepad_buttons: [GamepadButton; NUM_KEYS],
    pub gamepad_options: GamepadOptions,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            keymap: [[super::keycodes::TRANSPARENT; NUM_KEYS]; NUM_LAYERS],
            actuation_map: [Actuation {
                actuation_point: 128,
                ..Default::default()
            }; NUM_KEYS],
            advanced_keys: [AdvancedKey::default(); NUM_ADVANCED_KEYS],
            tick_rate: 1,
            gamepad_buttons: [GamepadButton::None; NUM_KEYS],
            gamepad_options: GamepadOptions::default(),
        }
    }
}

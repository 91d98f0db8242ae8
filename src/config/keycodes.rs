//! Keycode ranges (SPEC_FULL.md §3). A keycode is a bare `u8`; this module
//! only classifies which range a value falls into and converts keyboard-page
//! values to HID usages. See `examples/original_source/include/keycodes.h`
//! for the reference numbering this preserves.

/// `KC_NO`: no-op keycode.
pub const NO: u8 = 0x00;
/// `KC_TRANSPARENT`: "fall through to the next layer down" marker.
pub const TRANSPARENT: u8 = 0x01;

pub const KEYBOARD_MIN: u8 = 0x02;
pub const KEYBOARD_MAX: u8 = 0x7A;
pub const MODIFIER_MIN: u8 = 0x7B;
pub const MODIFIER_MAX: u8 = 0x82;
pub const SYSTEM_MIN: u8 = 0x83;
pub const SYSTEM_MAX: u8 = 0x85;
pub const CONSUMER_MIN: u8 = 0x86;
pub const CONSUMER_MAX: u8 = 0x9A;
pub const MOUSE_MIN: u8 = 0x9B;
pub const MOUSE_MAX: u8 = 0x9F;
pub const LAYER_MIN: u8 = 0xC0;
pub const LAYER_MAX: u8 = 0xC7;
pub const PROFILE_MIN: u8 = 0xC8;
pub const PROFILE_MAX: u8 = 0xCF;

pub const KEY_LOCK: u8 = 0xD0;
pub const LAYER_LOCK: u8 = 0xD1;
pub const PROFILE_SWAP: u8 = 0xD2;
pub const PROFILE_NEXT: u8 = 0xD3;
pub const BOOT: u8 = 0xD4;

pub const MAGIC_BOOTLOADER: u8 = 0xD5;
pub const MAGIC_REBOOT: u8 = 0xD6;
pub const MAGIC_FACTORY_RESET: u8 = 0xD7;
pub const MAGIC_RECALIBRATE: u8 = 0xD8;

/// Which range a keycode falls into, used by `Layout` to decide how to
/// handle a resolved keycode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeycodeKind {
    None,
    Transparent,
    /// Goes into the keyboard bitmap/6KRO buffer.
    Keyboard(u8),
    /// Sets/clears a bit in `modifiers`.
    Modifier(u8),
    System(u8),
    Consumer(u8),
    Mouse(u8),
    /// `kc & 7` is the layer index.
    MomentaryLayer(u8),
    /// `kc & 7` is the profile index.
    Profile(u8),
    KeyLock,
    LayerLock,
    ProfileSwap,
    ProfileNext,
    Boot,
    MagicBootloader,
    MagicReboot,
    MagicFactoryReset,
    MagicRecalibrate,
    /// Value outside every known range.
    Unknown,
}

impl KeycodeKind {
    pub fn classify(kc: u8) -> Self {
        match kc {
            NO => KeycodeKind::None,
            TRANSPARENT => KeycodeKind::Transparent,
            KEYBOARD_MIN..=KEYBOARD_MAX => KeycodeKind::Keyboard(kc),
            MODIFIER_MIN..=MODIFIER_MAX => KeycodeKind::Modifier(kc),
            SYSTEM_MIN..=SYSTEM_MAX => KeycodeKind::System(kc),
            CONSUMER_MIN..=CONSUMER_MAX => KeycodeKind::Consumer(kc),
            MOUSE_MIN..=MOUSE_MAX => KeycodeKind::Mouse(kc),
            LAYER_MIN..=LAYER_MAX => KeycodeKind::MomentaryLayer(kc & 0x7),
            PROFILE_MIN..=PROFILE_MAX => KeycodeKind::Profile(kc & 0x7),
            KEY_LOCK => KeycodeKind::KeyLock,
            LAYER_LOCK => KeycodeKind::LayerLock,
            PROFILE_SWAP => KeycodeKind::ProfileSwap,
            PROFILE_NEXT => KeycodeKind::ProfileNext,
            BOOT => KeycodeKind::Boot,
            MAGIC_BOOTLOADER => KeycodeKind::MagicBootloader,
            MAGIC_REBOOT => KeycodeKind::MagicReboot,
            MAGIC_FACTORY_RESET => KeycodeKind::MagicFactoryReset,
            MAGIC_RECALIBRATE => KeycodeKind::MagicRecalibrate,
            _ => KeycodeKind::Unknown,
        }
    }

    pub fn is_hid(self) -> bool {
        matches!(
            self,
            KeycodeKind::Keyboard(_)
                | KeycodeKind::Modifier(_)
                | KeycodeKind::System(_)
                | KeycodeKind::Consumer(_)
                | KeycodeKind::Mouse(_)
        )
    }
}

/// Convert a `Keyboard`-range keycode to its HID usage-page-0x07 usage id.
///
/// `KEYBOARD_MIN` (0x02) maps to usage `0x04` (`KC_A`'s conventional usage),
/// i.e. a fixed offset. Out-of-range input returns `0` (`HID_KEY_NONE`).
pub fn keyboard_to_hid_usage(kc: u8) -> u8 {
    if (KEYBOARD_MIN..=KEYBOARD_MAX).contains(&kc) {
        kc - KEYBOARD_MIN + 0x04
    } else {
        0
    }
}

/// Convert a `Modifier`-range keycode to its bit position (0..=7) in the HID
/// keyboard report's modifier byte, matching the standard
/// `LeftCtrl..=RightGui` ordering (usages `0xE0..=0xE7`).
pub fn modifier_bit(kc: u8) -> u8 {
    kc - MODIFIER_MIN
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_every_named_range() {
        assert_eq!(KeycodeKind::classify(NO), KeycodeKind::None);
        assert_eq!(KeycodeKind::classify(TRANSPARENT), KeycodeKind::Transparent);
        assert_eq!(KeycodeKind::classify(0x10), KeycodeKind::Keyboard(0x10));
        assert_eq!(KeycodeKind::classify(MODIFIER_MIN), KeycodeKind::Modifier(MODIFIER_MIN));
        assert_eq!(KeycodeKind::classify(0xC2), KeycodeKind::MomentaryLayer(2));
        assert_eq!(KeycodeKind::classify(0xCA), KeycodeKind::Profile(2));
        assert_eq!(KeycodeKind::classify(KEY_LOCK), KeycodeKind::KeyLock);
        assert_eq!(KeycodeKind::classify(MAGIC_RECALIBRATE), KeycodeKind::MagicRecalibrate);
        assert_eq!(KeycodeKind::classify(0xFF), KeycodeKind::Unknown);
    }

    #[test]
    fn keyboard_usage_offset() {
        assert_eq!(keyboard_to_hid_usage(KEYBOARD_MIN), 0x04);
        assert_eq!(keyboard_to_hid_usage(KEYBOARD_MAX), 0x04 + (KEYBOARD_MAX - KEYBOARD_MIN));
        assert_eq!(keyboard_to_hid_usage(NO), 0);
    }
}

//! Wire-format HID reports (SPEC_FULL.md §4.7, §6).
//!
//! Shaped like the teacher's `src/device/keyboard.rs` (`BootKeyboardReport`/
//! `NKROBootKeyboardReport`) and `src/device/consumer.rs`
//! (`MultipleConsumerReport`): plain `packed_struct` structs with an explicit
//! byte size, no report ID for the keyboard interface and a leading ID byte
//! for the others (`Generic HID` interface, §6).

use packed_struct::prelude::*;

/// Hybrid NKRO+6KRO keyboard report, no report ID, exactly 28 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "28")]
pub struct KeyboardReport {
    #[packed_field]
    pub modifiers: u8,
    #[packed_field]
    pub reserved: u8,
    #[packed_field]
    pub keycodes: [u8; 6],
    #[packed_field]
    pub bitmap: [u8; 20],
}

/// Report descriptor for [`KeyboardReport`]: the teacher's
/// `NKRO_BOOT_KEYBOARD_REPORT_DESCRIPTOR` widened from a 136-bit/17-byte
/// bitmap to the 160-bit/20-byte one this report carries (usage range
/// 0x00..=0x9F instead of 0x00..=0x87).
#[rustfmt::skip]
pub const KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,                     // Usage Page (Generic Desktop),
    0x09, 0x06,                     // Usage (Keyboard),
    0xA1, 0x01,                     // Collection (Application),
    0x75, 0x01,                     //   Report Size (1),
    0x95, 0x08,                     //   Report Count (8),
    0x05, 0x07,                     //   Usage Page (Key Codes),
    0x19, 0xE0,                     //   Usage Minimum (224),
    0x29, 0xE7,                     //   Usage Maximum (231),
    0x15, 0x00,                     //   Logical Minimum (0),
    0x25, 0x01,                     //   Logical Maximum (1),
    0x81, 0x02,                     //   Input (Data, Variable, Absolute), ;Modifier byte
    0x75, 0x38,                     //   Report Size (0x38),
    0x95, 0x01,                     //   Report Count (1),
    0x81, 0x01,                     //   Input (Constant), ;Reserved byte
    0x95, 0x06,                     //   Report Count (6),
    0x75, 0x08,                     //   Report Size (8),
    0x15, 0x00,                     //   Logical Minimum (0),
    0x26, 0xFF, 0x00,               //   Logical Maximum (255),
    0x05, 0x07,                     //   Usage Page (Key Codes),
    0x19, 0x00,                     //   Usage Minimum (0),
    0x2A, 0xFF, 0x00,               //   Usage Maximum (255),
    0x81, 0x00,                     //   Input (Data, Array), ;6KRO fallback
    0x95, 0xA0,                     //   Report Count (160),
    0x75, 0x01,                     //   Report Size (1),
    0x15, 0x00,                     //   Logical Minimum (0),
    0x25, 0x01,                     //   Logical Maximum (1),
    0x05, 0x07,                     //   Usage Page (Key Codes),
    0x19, 0x00,                     //   Usage Minimum (0),
    0x29, 0x9F,                     //   Usage Maximum (159),
    0x81, 0x02,                     //   Input (Data, Variable, Absolute), ;NKRO bitmap
    0xC0,                           // End Collection
];

impl usbd_hid::descriptor::SerializedDescriptor for KeyboardReport {
    fn desc() -> &'static [u8] {
        KEYBOARD_REPORT_DESCRIPTOR
    }
}

impl serde::ser::Serialize for KeyboardReport {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeTuple;
        let mut s = serializer.serialize_tuple(2 + 6 + 20)?;
        s.serialize_element(&self.modifiers)?;
        s.serialize_element(&self.reserved)?;
        for k in &self.keycodes {
            s.serialize_element(k)?;
        }
        for b in &self.bitmap {
            s.serialize_element(b)?;
        }
        s.end()
    }
}

impl usbd_hid::descriptor::AsInputReport for KeyboardReport {}

/// Four-code consumer-control report, report ID 2.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "3")]
pub struct ConsumerReport {
    #[packed_field]
    pub report_id: u8,
    #[packed_field]
    pub code: u16,
}

/// System control report, report ID 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "3")]
pub struct SystemReport {
    #[packed_field]
    pub report_id: u8,
    #[packed_field]
    pub code: u16,
}

/// Standard wheel-mouse shape, report ID 3: buttons, relative X/Y, wheel,
/// pan. Modeled on the teacher's `WheelMouseReport`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "5")]
pub struct MouseReport {
    #[packed_field]
    pub report_id: u8,
    #[packed_field]
    pub buttons: u8,
    #[packed_field]
    pub x: i8,
    #[packed_field]
    pub y: i8,
    #[packed_field]
    pub wheel: i8,
}

//! Raw-HID command/response protocol (SPEC_FULL.md §4.9, §6).
//!
//! Grounded on `examples/original_source/include/commands.h` for the exact
//! `command_id_t` values and payload shapes, and `src/commands.c`'s
//! `command_process` for the validate-then-echo dispatch: a command either
//! succeeds and the reply echoes `command_id`, or it fails validation and
//! the reply carries [`COMMAND_UNKNOWN`] instead. `REBOOT`/`BOOTLOADER`
//! divert straight into [`BoardControl`] and never return.

use num_enum::TryFromPrimitive;

use crate::board::{BoardControl, Flash, Timer};
use crate::config::limits::{NUM_ADVANCED_KEYS, NUM_KEYS, NUM_LAYERS};
use crate::config::schema::{Actuation, AdvancedKey, Calibration, GamepadOptions, GlobalOptions};
use crate::config::ConfigStore;
use crate::matrix::Matrix;

/// Size of the raw-HID endpoint in both directions.
pub const RAW_HID_EP_SIZE: usize = 64;

/// Reply value for a rejected or unrecognised command.
pub const COMMAND_UNKNOWN: u8 = 255;

const fn parse_decimal(s: &str) -> u8 {
    let bytes = s.as_bytes();
    let mut value: u8 = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0');
        i += 1;
    }
    value
}

const FIRMWARE_VERSION_MAJOR: u8 = parse_decimal(env!("CARGO_PKG_VERSION_MAJOR"));
const FIRMWARE_VERSION_MINOR: u8 = parse_decimal(env!("CARGO_PKG_VERSION_MINOR"));
const FIRMWARE_VERSION_PATCH: u8 = parse_decimal(env!("CARGO_PKG_VERSION_PATCH"));
const FIRMWARE_VERSION: u16 = ((FIRMWARE_VERSION_MAJOR as u16) << 8) | FIRMWARE_VERSION_MINOR as u16;

/// Build-info blob handed out page by page through `GET_METADATA`.
#[derive(serde::Serialize)]
struct Metadata {
    major: u8,
    minor: u8,
    patch: u8,
}

/// Serializes [`Metadata`] with `ssmarshal` and returns the filled buffer
/// plus how many bytes of it are meaningful; the rest stays zero-padded.
fn metadata_blob() -> ([u8; 59], u32) {
    let mut buf = [0u8; 59];
    let m = Metadata {
        major: FIRMWARE_VERSION_MAJOR,
        minor: FIRMWARE_VERSION_MINOR,
        patch: FIRMWARE_VERSION_PATCH,
    };
    let len = ssmarshal::serialize(&mut buf, &m).unwrap_or(0);
    (buf, len as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum CommandId {
    FirmwareVersion = 0,
    Reboot = 1,
    Bootloader = 2,
    FactoryReset = 3,
    Recalibrate = 4,
    AnalogInfo = 5,
    GetCalibration = 6,
    SetCalibration = 7,
    GetProfile = 8,
    GetOptions = 9,
    SetOptions = 10,
    ResetProfile = 11,
    DuplicateProfile = 12,
    GetMetadata = 13,
    GetKeymap = 128,
    SetKeymap = 129,
    GetActuationMap = 130,
    SetActuationMap = 131,
    GetAdvancedKeys = 132,
    SetAdvancedKeys = 133,
    GetTickRate = 134,
    SetTickRate = 135,
    GetGamepadButtons = 136,
    SetGamepadButtons = 137,
    GetGamepadOptions = 138,
    SetGamepadOptions = 139,
}

fn u8_at(buf: &[u8], i: usize) -> Option<u8> {
    buf.get(i).copied()
}

fn u32_at(buf: &[u8], i: usize) -> Option<u32> {
    let b = buf.get(i..i + 4)?;
    Some(u32::from_le_bytes(b.try_into().unwrap()))
}

/// Dispatches raw-HID command buffers against the persistent store, the
/// sensor pipeline and the board.
pub struct CommandProto;

impl CommandProto {
    /// Decode `in_buf`, run the command, and fill `out_buf` with the reply.
    /// `in_buf` may be shorter than `RAW_HID_EP_SIZE`; it is never indexed
    /// out of bounds. `REBOOT`/`BOOTLOADER` divert into `board` and never
    /// return to the caller.
    pub fn handle<F, const L: usize>(
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &mut ConfigStore<F, L>,
        matrix: &mut Matrix,
        timer: &impl Timer,
        board: &mut impl BoardControl,
    ) where
        F: Flash,
    {
        out_buf.fill(0);
        let Some(command_byte) = u8_at(in_buf, 0) else {
            log::debug!("command: empty buffer");
            out_buf[0] = COMMAND_UNKNOWN;
            return;
        };
        let Ok(id) = CommandId::try_from(command_byte) else {
            log::debug!("command: unknown command id {}", command_byte);
            out_buf[0] = COMMAND_UNKNOWN;
            return;
        };
        let success = Self::dispatch(id, in_buf, out_buf, config, matrix, timer, board);
        if !success {
            log::debug!("command: rejected {:?}", id);
        }
        out_buf[0] = if success { command_byte } else { COMMAND_UNKNOWN };
    }

    fn dispatch<F, const L: usize>(
        id: CommandId,
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &mut ConfigStore<F, L>,
        matrix: &mut Matrix,
        timer: &impl Timer,
        board: &mut impl BoardControl,
    ) -> bool
    where
        F: Flash,
    {
        match id {
            CommandId::FirmwareVersion => {
                out_buf[1..3].copy_from_slice(&FIRMWARE_VERSION.to_le_bytes());
                true
            }
            CommandId::Reboot => board.reset(),
            CommandId::Bootloader => board.enter_bootloader(),
            CommandId::FactoryReset => {
                config.reset(board);
                true
            }
            CommandId::Recalibrate => {
                matrix.recalibrate(timer);
                true
            }
            CommandId::AnalogInfo => Self::analog_info(in_buf, out_buf, matrix),
            CommandId::GetCalibration => {
                out_buf[1..1 + Calibration::WIRE_SIZE].copy_from_slice(&config.calibration().to_bytes());
                true
            }
            CommandId::SetCalibration => {
                let Some(bytes) = in_buf.get(1..1 + Calibration::WIRE_SIZE) else {
                    return false;
                };
                config
                    .set_calibration(Calibration::from_bytes(bytes.try_into().unwrap()), board)
                    .is_ok()
            }
            CommandId::GetProfile => {
                out_buf[1] = config.current_profile();
                true
            }
            CommandId::GetOptions => {
                out_buf[1] = config.global_options().to_bytes()[0];
                true
            }
            CommandId::SetOptions => {
                let Some(byte) = u8_at(in_buf, 1) else {
                    return false;
                };
                config
                    .set_global_options(GlobalOptions::from_bytes([byte]), board)
                    .is_ok()
            }
            CommandId::ResetProfile => {
                let Some(profile) = u8_at(in_buf, 1) else {
                    return false;
                };
                config.reset_profile(profile as usize, board).is_ok()
            }
            CommandId::DuplicateProfile => {
                let (Some(profile), Some(src)) = (u8_at(in_buf, 1), u8_at(in_buf, 2)) else {
                    return false;
                };
                config
                    .duplicate_profile(profile as usize, src as usize, board)
                    .is_ok()
            }
            CommandId::GetMetadata => {
                let Some(offset) = u32_at(in_buf, 1) else {
                    return false;
                };
                let (blob, len) = metadata_blob();
                out_buf[1..5].copy_from_slice(&len.to_le_bytes());
                let start = offset as usize;
                for (i, slot) in out_buf[5..5 + blob.len()].iter_mut().enumerate() {
                    *slot = blob.get(start + i).copied().unwrap_or(0);
                }
                true
            }
            CommandId::GetKeymap => Self::get_keymap(in_buf, out_buf, config),
            CommandId::SetKeymap => Self::set_keymap(in_buf, config, board),
            CommandId::GetActuationMap => Self::get_actuation_map(in_buf, out_buf, config),
            CommandId::SetActuationMap => Self::set_actuation_map(in_buf, config, board),
            CommandId::GetAdvancedKeys => Self::get_advanced_keys(in_buf, out_buf, config),
            CommandId::SetAdvancedKeys => Self::set_advanced_keys(in_buf, config, board),
            CommandId::GetTickRate => {
                let Some(profile) = u8_at(in_buf, 1) else {
                    return false;
                };
                let Ok(p) = config.read_profile(profile as usize) else {
                    return false;
                };
                out_buf[1] = p.tick_rate;
                true
            }
            CommandId::SetTickRate => {
                let (Some(profile), Some(tick_rate)) = (u8_at(in_buf, 1), u8_at(in_buf, 2)) else {
                    return false;
                };
                config.set_tick_rate(profile as usize, tick_rate, board).is_ok()
            }
            CommandId::GetGamepadButtons => Self::get_gamepad_buttons(in_buf, out_buf, config),
            CommandId::SetGamepadButtons => Self::set_gamepad_buttons(in_buf, config, board),
            CommandId::GetGamepadOptions => {
                let Some(profile) = u8_at(in_buf, 1) else {
                    return false;
                };
                let Ok(p) = config.read_profile(profile as usize) else {
                    return false;
                };
                out_buf[1..1 + GamepadOptions::WIRE_SIZE].copy_from_slice(&p.gamepad_options.to_bytes());
                true
            }
            CommandId::SetGamepadOptions => {
                let Some(profile) = u8_at(in_buf, 1) else {
                    return false;
                };
                let Some(bytes) = in_buf.get(2..2 + GamepadOptions::WIRE_SIZE) else {
                    return false;
                };
                config
                    .set_gamepad_options(
                        profile as usize,
                        GamepadOptions::from_bytes(bytes.try_into().unwrap()),
                        board,
                    )
                    .is_ok()
            }
        }
    }

    fn analog_info(in_buf: &[u8], out_buf: &mut [u8; RAW_HID_EP_SIZE], matrix: &Matrix) -> bool {
        const PAGE: usize = 21;
        let Some(offset) = u8_at(in_buf, 1) else {
            return false;
        };
        let start = offset as usize * PAGE;
        if start >= NUM_KEYS {
            return false;
        }
        for i in 0..PAGE {
            let key = start + i;
            if key >= NUM_KEYS {
                break;
            }
            let state = matrix.key(key);
            let entry = &mut out_buf[1 + i * 3..1 + i * 3 + 3];
            entry[0..2].copy_from_slice(&state.adc_filtered().to_le_bytes());
            entry[2] = state.distance();
        }
        true
    }

    fn get_keymap<F, const L: usize>(
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &ConfigStore<F, L>,
    ) -> bool
    where
        F: Flash,
    {
        const PAGE: usize = 63;
        let (Some(profile), Some(layer), Some(offset)) = (u8_at(in_buf, 1), u8_at(in_buf, 2), u8_at(in_buf, 3))
        else {
            return false;
        };
        if layer as usize >= NUM_LAYERS {
            return false;
        }
        let start = offset as usize * PAGE;
        if start >= NUM_KEYS {
            return false;
        }
        let Ok(p) = config.read_profile(profile as usize) else {
            return false;
        };
        let layer_map = &p.keymap[layer as usize];
        let end = (start + PAGE).min(NUM_KEYS);
        out_buf[1..1 + (end - start)].copy_from_slice(&layer_map[start..end]);
        true
    }

    fn set_keymap<F, const L: usize>(
        in_buf: &[u8],
        config: &mut ConfigStore<F, L>,
        board: &mut impl BoardControl,
    ) -> bool
    where
        F: Flash,
    {
        const CAPACITY: usize = 59;
        let (Some(profile), Some(layer), Some(start), Some(len)) = (
            u8_at(in_buf, 1),
            u8_at(in_buf, 2),
            u8_at(in_buf, 3),
            u8_at(in_buf, 4),
        ) else {
            return false;
        };
        let len = len as usize;
        if len > CAPACITY {
            return false;
        }
        let Some(bytes) = in_buf.get(5..5 + len) else {
            return false;
        };
        config
            .set_keymap_range(profile as usize, layer as usize, start as usize, bytes, board)
            .is_ok()
    }

    fn get_actuation_map<F, const L: usize>(
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &ConfigStore<F, L>,
    ) -> bool
    where
        F: Flash,
    {
        const PAGE: usize = 15;
        let (Some(profile), Some(offset)) = (u8_at(in_buf, 1), u8_at(in_buf, 2)) else {
            return false;
        };
        let start = offset as usize * PAGE;
        if start >= NUM_KEYS {
            return false;
        }
        let Ok(p) = config.read_profile(profile as usize) else {
            return false;
        };
        let end = (start + PAGE).min(NUM_KEYS);
        for (i, a) in p.actuation_map[start..end].iter().enumerate() {
            let off = 1 + i * Actuation::WIRE_SIZE;
            out_buf[off..off + Actuation::WIRE_SIZE].copy_from_slice(&a.to_bytes());
        }
        true
    }

    fn set_actuation_map<F, const L: usize>(
        in_buf: &[u8],
        config: &mut ConfigStore<F, L>,
        board: &mut impl BoardControl,
    ) -> bool
    where
        F: Flash,
    {
        const CAPACITY: usize = 15;
        let (Some(profile), Some(start), Some(len)) = (u8_at(in_buf, 1), u8_at(in_buf, 2), u8_at(in_buf, 3)) else {
            return false;
        };
        let len = len as usize;
        if len > CAPACITY {
            return false;
        }
        let Some(bytes) = in_buf.get(4..4 + len * Actuation::WIRE_SIZE) else {
            return false;
        };
        let mut actuations = [Actuation::default(); CAPACITY];
        for (i, slot) in actuations.iter_mut().take(len).enumerate() {
            let chunk = &bytes[i * Actuation::WIRE_SIZE..(i + 1) * Actuation::WIRE_SIZE];
            *slot = Actuation::from_bytes(chunk.try_into().unwrap());
        }
        config
            .set_actuation_range(profile as usize, start as usize, &actuations[..len], board)
            .is_ok()
    }

    fn get_advanced_keys<F, const L: usize>(
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &ConfigStore<F, L>,
    ) -> bool
    where
        F: Flash,
    {
        const PAGE: usize = 5;
        let (Some(profile), Some(offset)) = (u8_at(in_buf, 1), u8_at(in_buf, 2)) else {
            return false;
        };
        let start = offset as usize * PAGE;
        if start >= NUM_ADVANCED_KEYS {
            return false;
        }
        let Ok(p) = config.read_profile(profile as usize) else {
            return false;
        };
        let end = (start + PAGE).min(NUM_ADVANCED_KEYS);
        for (i, ak) in p.advanced_keys[start..end].iter().enumerate() {
            let off = 1 + i * AdvancedKey::WIRE_SIZE;
            out_buf[off..off + AdvancedKey::WIRE_SIZE].copy_from_slice(&ak.to_bytes());
        }
        true
    }

    fn set_advanced_keys<F, const L: usize>(
        in_buf: &[u8],
        config: &mut ConfigStore<F, L>,
        board: &mut impl BoardControl,
    ) -> bool
    where
        F: Flash,
    {
        const CAPACITY: usize = 5;
        let (Some(profile), Some(start), Some(len)) = (u8_at(in_buf, 1), u8_at(in_buf, 2), u8_at(in_buf, 3)) else {
            return false;
        };
        let len = len as usize;
        if len > CAPACITY {
            return false;
        }
        let Some(bytes) = in_buf.get(4..4 + len * AdvancedKey::WIRE_SIZE) else {
            return false;
        };
        let mut keys = [AdvancedKey::default(); CAPACITY];
        for (i, slot) in keys.iter_mut().take(len).enumerate() {
            let chunk = &bytes[i * AdvancedKey::WIRE_SIZE..(i + 1) * AdvancedKey::WIRE_SIZE];
            *slot = AdvancedKey::from_bytes(chunk.try_into().unwrap());
        }
        config
            .set_advanced_keys_range(profile as usize, start as usize, &keys[..len], board)
            .is_ok()
    }

    fn get_gamepad_buttons<F, const L: usize>(
        in_buf: &[u8],
        out_buf: &mut [u8; RAW_HID_EP_SIZE],
        config: &ConfigStore<F, L>,
    ) -> bool
    where
        F: Flash,
    {
        const PAGE: usize = 63;
        let (Some(profile), Some(offset)) = (u8_at(in_buf, 1), u8_at(in_buf, 2)) else {
            return false;
        };
        let start = offset as usize * PAGE;
        if start >= NUM_KEYS {
            return false;
        }
        let Ok(p) = config.read_profile(profile as usize) else {
            return false;
        };
        let end = (start + PAGE).min(NUM_KEYS);
        for (i, b) in p.gamepad_buttons[start..end].iter().enumerate() {
            out_buf[1 + i] = (*b).into();
        }
        true
    }

    fn set_gamepad_buttons<F, const L: usize>(
        in_buf: &[u8],
        config: &mut ConfigStore<F, L>,
        board: &mut impl BoardControl,
    ) -> bool
    where
        F: Flash,
    {
        const CAPACITY: usize = 60;
        let (Some(profile), Some(start), Some(len)) = (u8_at(in_buf, 1), u8_at(in_buf, 2), u8_at(in_buf, 3)) else {
            return false;
        };
        let len = len as usize;
        if len > CAPACITY {
            return false;
        }
        let Some(bytes) = in_buf.get(4..4 + len) else {
            return false;
        };
        config
            .set_gamepad_buttons_range(profile as usize, start as usize, bytes, board)
            .is_ok()
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use super::*;
    use embedded_time::duration::Milliseconds;

    struct FakeFlash {
        words: Vec<u32>,
        sector_words: usize,
    }

    impl FakeFlash {
        fn new(total_words: usize, sector_words: usize) -> Self {
            Self {
                words: vec![0xFFFF_FFFFu32; total_words],
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
            self.words[word_addr / 4] &= value;
            true
        }
        fn erase_sector(&mut self, word_addr: usize) -> bool {
            let sector_start = (word_addr / 4) / self.sector_words * self.sector_words;
            for w in &mut self.words[sector_start..sector_start + self.sector_words] {
                *w = 0xFFFF_FFFF;
            }
            true
        }
        fn sector_size(&self) -> usize {
            self.sector_words * 4
        }
    }

    struct FakeTimer;
    impl Timer for FakeTimer {
        fn now_ms(&self) -> Milliseconds<u32> {
            Milliseconds(0)
        }
    }

    struct FakeBoard;
    impl BoardControl for FakeBoard {
        fn enter_bootloader(&mut self) -> ! {
            panic!("bootloader entry requested")
        }
        fn reset(&mut self) -> ! {
            panic!("reset requested")
        }
        fn critical_section<R>(&mut self, f: impl FnOnce() -> R) -> R {
            f()
        }
        fn fatal_error(&mut self, reason: &str) -> ! {
            panic!("fatal: {}", reason)
        }
    }

    const LOG_SIZE: usize = 4096;

    fn new_store() -> (ConfigStore<FakeFlash, LOG_SIZE>, FakeTimer, FakeBoard, Matrix) {
        let total_words = (crate::config::VIRTUAL_SIZE + LOG_SIZE) / 4 + 64;
        let flash = FakeFlash::new(total_words, 64);
        let mut store = ConfigStore::<FakeFlash, LOG_SIZE>::new(flash);
        store.init();
        let mut board = FakeBoard;
        store.load_or_init(&mut board);
        (store, FakeTimer, board, Matrix::new(0, 1024))
    }

    #[test]
    fn unknown_command_id_is_rejected() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&[254], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], COMMAND_UNKNOWN);
    }

    #[test]
    fn empty_buffer_is_rejected_without_panicking() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&[], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], COMMAND_UNKNOWN);
    }

    #[test]
    fn firmware_version_echoes_command_id() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&[0], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn get_profile_reports_current_profile() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        store.set_current_profile(2, &mut board).unwrap();
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&[8], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 8);
        assert_eq!(out[1], 2);
    }

    #[test]
    fn set_keymap_then_get_keymap_round_trips() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut set_buf = [0u8; RAW_HID_EP_SIZE];
        set_buf[0] = 129; // SET_KEYMAP
        set_buf[1] = 0; // profile
        set_buf[2] = 0; // layer
        set_buf[3] = 0; // start
        set_buf[4] = 3; // len
        set_buf[5..8].copy_from_slice(&[0x04, 0x05, 0x06]);
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&set_buf, &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 129);

        let get_buf = [128u8, 0, 0, 0]; // GET_KEYMAP profile=0 layer=0 offset=0
        CommandProto::handle(&get_buf, &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 128);
        assert_eq!(&out[1..4], &[0x04, 0x05, 0x06]);
    }

    #[test]
    fn set_keymap_rejects_oversized_range() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut buf = [0u8; RAW_HID_EP_SIZE];
        buf[0] = 129;
        buf[1] = 0;
        buf[2] = 0;
        buf[3] = (NUM_KEYS - 1) as u8; // start
        buf[4] = 2; // len, start+len > NUM_KEYS
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&buf, &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], COMMAND_UNKNOWN);
    }

    #[test]
    fn analog_info_rejects_out_of_range_offset() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let page = (NUM_KEYS / 21 + 1) as u8;
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&[5, page], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], COMMAND_UNKNOWN);
    }

    #[test]
    fn get_metadata_reports_firmware_version_bytes() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut out = [0u8; RAW_HID_EP_SIZE];
        let buf = [13u8, 0, 0, 0, 0]; // GET_METADATA offset=0
        CommandProto::handle(&buf, &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 13);
        let len = u32::from_le_bytes(out[1..5].try_into().unwrap());
        assert!(len > 0);
        assert_eq!(out[5], FIRMWARE_VERSION_MAJOR);
    }

    #[test]
    fn duplicate_profile_copies_keymap() {
        let (mut store, timer, mut board, mut matrix) = new_store();
        let mut set_buf = [0u8; RAW_HID_EP_SIZE];
        set_buf[0] = 129;
        set_buf[1] = 0;
        set_buf[4] = 1;
        set_buf[5] = 0x42;
        let mut out = [0u8; RAW_HID_EP_SIZE];
        CommandProto::handle(&set_buf, &mut out, &mut store, &mut matrix, &timer, &mut board);

        CommandProto::handle(&[12, 1, 0], &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[0], 12);

        let get_buf = [128u8, 1, 0, 0];
        CommandProto::handle(&get_buf, &mut out, &mut store, &mut matrix, &timer, &mut board);
        assert_eq!(out[1], 0x42);
    }
}

//! Append-log + consolidation over a flash-like block device.
//!
//! Exposes a byte-addressable virtual region of `V` bytes backed by a
//! `Flash` of `V + L` bytes: `[0, V/4)` words hold the consolidated image,
//! word `V/4` holds its CRC32, and `[V/4 + 1, (V+L)/4)` is an append-only
//! log of small writes. See `examples/original_source/include/wear_leveling.h`
//! for the reference layout this mirrors.

use crc::{Crc, CRC_32_ISO_HDLC};
use log::{debug, error, warn};

use crate::board::{BoardControl, Flash};

/// Value an erased (never-written) flash word reads back as.
pub const FLASH_EMPTY_VAL: u32 = 0xFFFF_FFFF;

/// Maximum payload bytes a single log entry can carry.
pub const MAX_BYTES_PER_ENTRY: usize = 6;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A wear-leveled virtual region of `V` bytes over a log area of `L` bytes.
///
/// `V` and `L` must both be multiples of 4; `V <= 8192`. The backing `Flash`
/// must expose at least `V + L` bytes.
pub struct WearLevel<F, const V: usize, const L: usize> {
    flash: F,
    cache: [u8; V],
    /// Index (relative to the log area's first word) of the next free log
    /// word slot.
    log_cursor: usize,
}

impl<F, const V: usize, const L: usize> WearLevel<F, V, L>
where
    F: Flash,
{
    const IMAGE_WORDS: usize = V / 4;
    const CRC_WORD: usize = Self::IMAGE_WORDS;
    const LOG_START_WORD: usize = Self::IMAGE_WORDS + 1;
    const TOTAL_WORDS: usize = (V + L) / 4;

    /// Construct a new instance. Call [`Self::init`] before any read/write.
    pub fn new(flash: F) -> Self {
        assert!(V % 4 == 0, "virtual region size must be word-aligned");
        assert!(L % 4 == 0, "log area size must be word-aligned");
        assert!(V <= 8192, "virtual region size must be at most 8192 bytes");
        Self {
            flash,
            cache: [0u8; V],
            log_cursor: 0,
        }
    }

    /// Read the consolidated image, verify its CRC, and replay the log onto
    /// the in-RAM cache. Idempotent.
    pub fn init(&mut self) {
        for w in 0..Self::IMAGE_WORDS {
            let word = self.flash.read_word(w * 4);
            self.cache[w * 4..w * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }

        let stored_crc = self.flash.read_word(Self::CRC_WORD * 4);
        let actual_crc = CRC.checksum(&self.cache);
        if stored_crc != actual_crc {
            warn!("wear_level: image CRC mismatch, clearing cache and consolidating");
            self.cache = [0u8; V];
            self.consolidate_force();
            return;
        }

        self.replay_log();
    }

    fn replay_log(&mut self) {
        let mut idx = 0usize;
        while Self::LOG_START_WORD + idx < Self::TOTAL_WORDS {
            let word0 = self.flash.read_word((Self::LOG_START_WORD + idx) * 4);
            if word0 == FLASH_EMPTY_VAL {
                break;
            }
            let addr = (word0 & 0x1FFF) as usize;
            let len = ((word0 >> 13) & 0x7) as usize;
            let mut data = [0u8; MAX_BYTES_PER_ENTRY];
            data[0] = ((word0 >> 16) & 0xFF) as u8;
            data[1] = ((word0 >> 24) & 0xFF) as u8;
            let mut words_used = 1;
            if len > 2 {
                if Self::LOG_START_WORD + idx + 1 >= Self::TOTAL_WORDS {
                    break;
                }
                let word1 = self.flash.read_word((Self::LOG_START_WORD + idx + 1) * 4);
                let bytes1 = word1.to_le_bytes();
                for i in 0..(len - 2).min(4) {
                    data[2 + i] = bytes1[i];
                }
                words_used = 2;
            }
            if addr + len <= V {
                self.cache[addr..addr + len].copy_from_slice(&data[..len]);
            }
            idx += words_used;
        }
        self.log_cursor = idx;
    }

    /// Return the last-committed byte image. Infallible given
    /// `addr + buf.len() <= V`.
    pub fn read(&self, addr: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.cache[addr..addr + buf.len()]);
    }

    /// Persist `data` at `addr` such that a subsequent `read` observes it.
    /// May internally consolidate. A log append that still fails after a
    /// forced consolidation is unrecoverable and halts via
    /// `board.fatal_error`.
    pub fn write(&mut self, addr: usize, data: &[u8], board: &mut impl BoardControl) -> bool {
        debug_assert!(addr + data.len() <= V);

        let existing = &self.cache[addr..addr + data.len()];
        let mut head = 0;
        while head < data.len() && data[head] == existing[head] {
            head += 1;
        }
        let mut tail = data.len();
        while tail > head && data[tail - 1] == existing[tail - 1] {
            tail -= 1;
        }
        if head >= tail {
            return true;
        }

        let residue_addr = addr + head;
        let residue = &data[head..tail];
        self.cache[residue_addr..residue_addr + residue.len()].copy_from_slice(residue);

        let mut offset = 0;
        while offset < residue.len() {
            let chunk_len = (residue.len() - offset).min(MAX_BYTES_PER_ENTRY);
            let chunk = &residue[offset..offset + chunk_len];
            if !self.append_log_entry(residue_addr + offset, chunk) {
                warn!("wear_level: log append failed, forcing consolidation");
                self.consolidate_force();
                if !self.append_log_entry(residue_addr + offset, chunk) {
                    error!("wear_level: log append failed again after consolidation, halting");
                    board.fatal_error("wear_level: unrecoverable flash write failure");
                }
            }
            offset += chunk_len;
        }
        true
    }

    fn append_log_entry(&mut self, addr: usize, data: &[u8]) -> bool {
        let len = data.len();
        let words_needed = if len > 2 { 2 } else { 1 };
        if Self::LOG_START_WORD + self.log_cursor + words_needed > Self::TOTAL_WORDS {
            if !self.consolidate() {
                return false;
            }
        }

        let mut word0 = (addr as u32 & 0x1FFF) | ((len as u32 & 0x7) << 13);
        word0 |= (*data.first().unwrap_or(&0) as u32) << 16;
        word0 |= (*data.get(1).unwrap_or(&0) as u32) << 24;

        let word_idx = Self::LOG_START_WORD + self.log_cursor;
        if !self.flash.write_word(word_idx * 4, word0) {
            return false;
        }
        self.log_cursor += 1;

        if len > 2 {
            let mut rest = [0u8; 4];
            for i in 0..(len - 2) {
                rest[i] = data[2 + i];
            }
            let word1 = u32::from_le_bytes(rest);
            let word_idx = Self::LOG_START_WORD + self.log_cursor;
            if !self.flash.write_word(word_idx * 4, word1) {
                return false;
            }
            self.log_cursor += 1;
        }
        true
    }

    /// Reset the virtual region to the flash-empty value and consolidate.
    pub fn erase(&mut self) -> bool {
        self.cache = [0xFFu8; V];
        self.consolidate_force()
    }

    /// Consolidate if the log area is full; otherwise a no-op that returns
    /// `true`. Used internally when an append would overrun the log.
    fn consolidate(&mut self) -> bool {
        debug!("wear_level: consolidating (log full)");
        self.consolidate_force()
    }

    /// Unconditionally erase all owned sectors, rewrite the consolidated
    /// image and its CRC, and reset the log cursor.
    fn consolidate_force(&mut self) -> bool {
        let sector = self.flash.sector_size().max(4);
        let total_bytes = Self::TOTAL_WORDS * 4;
        let mut offset = 0;
        while offset < total_bytes {
            if !self.flash.erase_sector(offset) {
                return false;
            }
            offset += sector;
        }

        for w in 0..Self::IMAGE_WORDS {
            let word = u32::from_le_bytes(self.cache[w * 4..w * 4 + 4].try_into().unwrap());
            if !self.flash.write_word(w * 4, word) {
                return false;
            }
        }
        let crc = CRC.checksum(&self.cache);
        if !self.flash.write_word(Self::CRC_WORD * 4, crc) {
            return false;
        }
        self.log_cursor = 0;
        true
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use std::vec;
    use std::vec::Vec;

    struct FakeFlash {
        words: Vec<u32>,
        sector_words: usize,
    }

    impl FakeFlash {
        fn new(total_words: usize, sector_words: usize) -> Self {
            Self {
                words: vec![FLASH_EMPTY_VAL; total_words],
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
            // Flash writes can only clear bits, matching real NOR flash.
            let idx = word_addr / 4;
            self.words[idx] &= value;
            true
        }

        fn erase_sector(&mut self, word_addr: usize) -> bool {
            let idx = word_addr / 4;
            let start = (idx / self.sector_words) * self.sector_words;
            for w in &mut self.words[start..start + self.sector_words] {
                *w = FLASH_EMPTY_VAL;
            }
            true
        }

        fn sector_size(&self) -> usize {
            self.sector_words * 4
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
        fn fatal_error(&mut self, reason: &str) -> ! {
            panic!("fatal: {}", reason)
        }
    }

    const V: usize = 64;
    const L: usize = 256;

    fn new_wl() -> WearLevel<FakeFlash, V, L> {
        let flash = FakeFlash::new((V + L) / 4, 16);
        let mut wl = WearLevel::<FakeFlash, V, L>::new(flash);
        wl.init();
        wl
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        assert!(wl.write(10, &[0xAA], &mut board));
        let mut buf = [0u8; 1];
        wl.read(10, &mut buf);
        assert_eq!(buf, [0xAA]);
    }

    #[test]
    fn power_cycle_replays_log() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        assert!(wl.write(10, &[0xAA], &mut board));

        // Simulate a power cycle: rebuild a WearLevel over the same flash
        // contents (moved out, since our fake has no separate persistence).
        let flash = core::mem::replace(&mut wl.flash, FakeFlash::new(0, 1));
        let mut wl2 = WearLevel::<FakeFlash, V, L>::new(flash);
        wl2.init();

        let mut buf = [0u8; 1];
        wl2.read(10, &mut buf);
        assert_eq!(buf, [0xAA]);
        assert_eq!(wl2.log_cursor, 1);
    }

    #[test]
    fn idempotent_write_does_not_grow_log() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        assert!(wl.write(10, &[0xAA], &mut board));
        let cursor_after_first = wl.log_cursor;
        assert!(wl.write(10, &[0xAA], &mut board));
        assert_eq!(wl.log_cursor, cursor_after_first);
    }

    #[test]
    fn multi_byte_write_uses_two_words_when_needed() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        assert!(wl.write(0, &[1, 2, 3, 4, 5, 6], &mut board));
        let mut buf = [0u8; 6];
        wl.read(0, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
        assert_eq!(wl.log_cursor, 2);
    }

    #[test]
    fn consolidation_resets_log_cursor() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        // Fill the log area with small writes until it forces a consolidate.
        for i in 0..100u8 {
            assert!(wl.write((i as usize) % (V - 1), &[i], &mut board));
        }
        // Cursor should be small again (consolidation happened at some point).
        assert!(wl.log_cursor < (L / 4));
    }

    #[test]
    fn head_tail_trim_skips_unchanged_bytes() {
        let mut wl = new_wl();
        let mut board = FakeBoard;
        assert!(wl.write(0, &[0, 0, 0, 0], &mut board));
        let before = wl.log_cursor;
        // Writing the same all-zero bytes back should trim to an empty
        // residue and not append anything.
        assert!(wl.write(0, &[0, 0, 0, 0], &mut board));
        assert_eq!(wl.log_cursor, before);
    }

    #[test]
    fn double_append_failure_after_consolidation_halts_board() {
        struct FailingFlash {
            inner: FakeFlash,
            fail_writes_from: usize,
        }
        impl Flash for FailingFlash {
            fn size(&self) -> usize {
                self.inner.size()
            }
            fn read_word(&self, word_addr: usize) -> u32 {
                self.inner.read_word(word_addr)
            }
            fn write_word(&mut self, word_addr: usize, value: u32) -> bool {
                if word_addr / 4 >= self.fail_writes_from {
                    return false;
                }
                self.inner.write_word(word_addr, value)
            }
            fn erase_sector(&mut self, word_addr: usize) -> bool {
                self.inner.erase_sector(word_addr)
            }
            fn sector_size(&self) -> usize {
                self.inner.sector_size()
            }
        }

        struct RecordingBoard {
            halted: bool,
        }
        impl BoardControl for RecordingBoard {
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
                self.halted = true;
                panic!("halted")
            }
        }

        // Log area word range starts at `WearLevel::<FailingFlash, V, L>::LOG_START_WORD`;
        // fail every write from there on so both the initial append and the
        // post-consolidation retry fail.
        let log_start = WearLevel::<FailingFlash, V, L>::LOG_START_WORD;
        let flash = FailingFlash {
            inner: FakeFlash::new((V + L) / 4, 16),
            fail_writes_from: log_start,
        };
        let mut wl = WearLevel::<FailingFlash, V, L>::new(flash);
        wl.init();
        let mut board = RecordingBoard { halted: false };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            wl.write(10, &[0xAA], &mut board)
        }));
        assert!(result.is_err());
        assert!(board.halted);
    }
}

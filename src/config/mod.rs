//! Persistent configuration store (SPEC_FULL.md §4.2), layered over
//! [`WearLevel`](crate::wear_level::WearLevel).
//!
//! Grounded on `examples/original_source/include/eeconfig.h`: the magic
//! markers, the version field and migration table, and the typed
//! partial-range setter shape all mirror that header.

pub mod keycodes;
pub mod limits;
pub mod schema;

use delegate::delegate;

use crate::board::{BoardControl, Flash};
use crate::wear_level::WearLevel;
use limits::{NUM_ADVANCED_KEYS, NUM_KEYS, NUM_LAYERS, NUM_PROFILES};
use schema::{Actuation, AdvancedKey, Calibration, GamepadButton, GamepadOptions, GlobalOptions, Profile};

/// Magic value written at the start of the configuration image. Chosen to
/// spell "BIL\n" in ASCII when read little-endian, matching the reference's
/// convention of a human-recognizable magic.
pub const MAGIC_START: u32 = 0x0A42_494C;
/// Magic value written at the end of the configuration image.
pub const MAGIC_END: u32 = 0x0A4B_4D48;

/// Current on-flash schema version. Bump and extend [`migrate`] whenever
/// [`Configuration`]'s layout changes.
pub const CURRENT_VERSION: u8 = 1;

/// Root configuration image (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub version: u8,
    pub calibration: Calibration,
    pub current_profile: u8,
    pub last_non_default_profile: u8,
    pub global_options: GlobalOptions,
    pub profiles: [Profile; NUM_PROFILES],
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            calibration: Calibration::default(),
            current_profile: 0,
            last_non_default_profile: 0,
            global_options: GlobalOptions::default(),
            profiles: [Profile::default(); NUM_PROFILES],
        }
    }
}

/// Errors returned by [`ConfigStore`]'s typed setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `profile`/`layer`/`key`/`advanced key` index out of bounds.
    IndexOutOfRange,
    /// The underlying [`WearLevel`] write failed (flash write/erase error).
    FlashWrite,
}

/// Byte offsets of [`Configuration`]'s fields within the wear-leveled
/// virtual region, in declaration order. Each profile is a fixed-size
/// block; offsets within a profile are further broken down by
/// [`ConfigStore::profile_offset`] and friends.
mod layout {
    use super::*;

    pub const MAGIC_START: usize = 0;
    pub const VERSION: usize = 4;
    pub const CALIBRATION: usize = 5;
    pub const CURRENT_PROFILE: usize = CALIBRATION + Calibration::WIRE_SIZE;
    pub const LAST_NON_DEFAULT_PROFILE: usize = CURRENT_PROFILE + 1;
    pub const GLOBAL_OPTIONS: usize = LAST_NON_DEFAULT_PROFILE + 1;
    pub const PROFILES: usize = GLOBAL_OPTIONS + GlobalOptions::WIRE_SIZE;

    pub const KEYMAP_SIZE: usize = NUM_LAYERS * NUM_KEYS;
    pub const ACTUATION_SIZE: usize = NUM_KEYS * Actuation::WIRE_SIZE;
    pub const ADVANCED_KEYS_SIZE: usize = NUM_ADVANCED_KEYS * AdvancedKey::WIRE_SIZE;
    pub const GAMEPAD_BUTTONS_SIZE: usize = NUM_KEYS;
    pub const PROFILE_SIZE: usize = KEYMAP_SIZE
        + ACTUATION_SIZE
        + ADVANCED_KEYS_SIZE
        + 1 // tick_rate
        + GAMEPAD_BUTTONS_SIZE
        + GamepadOptions::WIRE_SIZE;

    pub const MAGIC_END: usize = PROFILES + NUM_PROFILES * PROFILE_SIZE;
    pub const TOTAL: usize = MAGIC_END + 4;
}

/// Size in bytes of the virtual region a [`ConfigStore`] needs from its
/// backing [`WearLevel`].
pub const VIRTUAL_SIZE: usize = layout::TOTAL;

/// Versioned, wear-leveled configuration store.
///
/// `L` is the log area size in bytes handed to the inner [`WearLevel`];
/// boards pick it based on available flash and desired write endurance.
pub struct ConfigStore<F, const L: usize>
where
    F: Flash,
{
    wl: WearLevel<F, VIRTUAL_SIZE, L>,
}

impl<F, const L: usize> ConfigStore<F, L>
where
    F: Flash,
{
    delegate! {
        to self.wl {
            /// Reload the in-RAM cache from flash (see [`WearLevel::init`]).
            pub fn init(&mut self);
        }
    }

    pub fn new(flash: F) -> Self {
        Self {
            wl: WearLevel::new(flash),
        }
    }

    fn profile_offset(profile: usize) -> usize {
        layout::PROFILES + profile * layout::PROFILE_SIZE
    }

    fn keymap_offset(profile: usize, layer: usize) -> usize {
        Self::profile_offset(profile) + layer * NUM_KEYS
    }

    fn actuation_offset(profile: usize) -> usize {
        Self::profile_offset(profile) + layout::KEYMAP_SIZE
    }

    fn advanced_keys_offset(profile: usize) -> usize {
        Self::actuation_offset(profile) + layout::ACTUATION_SIZE
    }

    fn tick_rate_offset(profile: usize) -> usize {
        Self::advanced_keys_offset(profile) + layout::ADVANCED_KEYS_SIZE
    }

    fn gamepad_buttons_offset(profile: usize) -> usize {
        Self::tick_rate_offset(profile) + 1
    }

    fn gamepad_options_offset(profile: usize) -> usize {
        Self::gamepad_buttons_offset(profile) + layout::GAMEPAD_BUTTONS_SIZE
    }

    fn check_profile(profile: usize) -> Result<(), ConfigError> {
        if profile < NUM_PROFILES {
            Ok(())
        } else {
            Err(ConfigError::IndexOutOfRange)
        }
    }

    /// Validate the magics and [`CURRENT_VERSION`] against the loaded image,
    /// running [`migrate`] if the stored version is older, and
    /// [`Self::reset`] if the magics don't match at all (first boot or a
    /// corrupted image).
    pub fn load_or_init(&mut self, board: &mut impl BoardControl) -> Configuration {
        let mut start = [0u8; 4];
        self.wl.read(layout::MAGIC_START, &mut start);
        let mut end = [0u8; 4];
        self.wl.read(layout::MAGIC_END, &mut end);

        if u32::from_le_bytes(start) != MAGIC_START || u32::from_le_bytes(end) != MAGIC_END {
            let cfg = Configuration::default();
            self.write_full(&cfg, board);
            return cfg;
        }

        let mut version_byte = [0u8; 1];
        self.wl.read(layout::VERSION, &mut version_byte);
        let stored_version = version_byte[0];
        if stored_version < CURRENT_VERSION {
            migrate(self, stored_version, board);
        }

        self.read_full()
    }

    fn read_full(&self) -> Configuration {
        let mut version_byte = [0u8; 1];
        self.wl.read(layout::VERSION, &mut version_byte);

        let mut calibration_bytes = [0u8; Calibration::WIRE_SIZE];
        self.wl.read(layout::CALIBRATION, &mut calibration_bytes);

        let mut current_profile = [0u8; 1];
        self.wl.read(layout::CURRENT_PROFILE, &mut current_profile);

        let mut last_non_default = [0u8; 1];
        self.wl
            .read(layout::LAST_NON_DEFAULT_PROFILE, &mut last_non_default);

        let mut global_options_bytes = [0u8; GlobalOptions::WIRE_SIZE];
        self.wl
            .read(layout::GLOBAL_OPTIONS, &mut global_options_bytes);

        let mut profiles = [Profile::default(); NUM_PROFILES];
        for (i, profile) in profiles.iter_mut().enumerate() {
            *profile = self.read_profile_raw(i);
        }

        Configuration {
            version: version_byte[0],
            calibration: Calibration::from_bytes(calibration_bytes),
            current_profile: current_profile[0],
            last_non_default_profile: last_non_default[0],
            global_options: GlobalOptions::from_bytes(global_options_bytes),
            profiles,
        }
    }

    fn read_profile_raw(&self, profile: usize) -> Profile {
        let mut p = Profile::default();
        for layer in 0..NUM_LAYERS {
            self.wl
                .read(Self::keymap_offset(profile, layer), &mut p.keymap[layer]);
        }
        let mut actuation_bytes = [0u8; NUM_KEYS * Actuation::WIRE_SIZE];
        self.wl
            .read(Self::actuation_offset(profile), &mut actuation_bytes);
        for (i, slot) in p.actuation_map.iter_mut().enumerate() {
            let b: [u8; Actuation::WIRE_SIZE] = actuation_bytes
                [i * Actuation::WIRE_SIZE..(i + 1) * Actuation::WIRE_SIZE]
                .try_into()
                .unwrap();
            *slot = Actuation::from_bytes(b);
        }
        let mut ak_bytes = [0u8; NUM_ADVANCED_KEYS * AdvancedKey::WIRE_SIZE];
        self.wl
            .read(Self::advanced_keys_offset(profile), &mut ak_bytes);
        for (i, slot) in p.advanced_keys.iter_mut().enumerate() {
            let b: [u8; AdvancedKey::WIRE_SIZE] = ak_bytes
                [i * AdvancedKey::WIRE_SIZE..(i + 1) * AdvancedKey::WIRE_SIZE]
                .try_into()
                .unwrap();
            *slot = AdvancedKey::from_bytes(b);
        }
        let mut tick_rate = [0u8; 1];
        self.wl.read(Self::tick_rate_offset(profile), &mut tick_rate);
        p.tick_rate = tick_rate[0];

        let mut gamepad_buttons = [0u8; NUM_KEYS];
        self.wl
            .read(Self::gamepad_buttons_offset(profile), &mut gamepad_buttons);
        for (i, slot) in p.gamepad_buttons.iter_mut().enumerate() {
            *slot = GamepadButton::try_from(gamepad_buttons[i]).unwrap_or_default();
        }

        let mut options_bytes = [0u8; GamepadOptions::WIRE_SIZE];
        self.wl
            .read(Self::gamepad_options_offset(profile), &mut options_bytes);
        p.gamepad_options = GamepadOptions::from_bytes(options_bytes);

        p
    }

    fn write_full(&mut self, cfg: &Configuration, board: &mut impl BoardControl) -> bool {
        let mut ok = self
            .wl
            .write(layout::MAGIC_START, &MAGIC_START.to_le_bytes(), board);
        ok &= self.wl.write(layout::VERSION, &[cfg.version], board);
        ok &= self
            .wl
            .write(layout::CALIBRATION, &cfg.calibration.to_bytes(), board);
        ok &= self
            .wl
            .write(layout::CURRENT_PROFILE, &[cfg.current_profile], board);
        ok &= self.wl.write(
            layout::LAST_NON_DEFAULT_PROFILE,
            &[cfg.last_non_default_profile],
            board,
        );
        ok &= self
            .wl
            .write(layout::GLOBAL_OPTIONS, &cfg.global_options.to_bytes(), board);
        for (i, profile) in cfg.profiles.iter().enumerate() {
            ok &= self.write_profile_raw(i, profile, board);
        }
        ok &= self.wl.write(layout::MAGIC_END, &MAGIC_END.to_le_bytes(), board);
        ok
    }

    fn write_profile_raw(&mut self, profile: usize, p: &Profile, board: &mut impl BoardControl) -> bool {
        let mut ok = true;
        for layer in 0..NUM_LAYERS {
            ok &= self
                .wl
                .write(Self::keymap_offset(profile, layer), &p.keymap[layer], board);
        }
        let mut actuation_bytes = [0u8; NUM_KEYS * Actuation::WIRE_SIZE];
        for (i, a) in p.actuation_map.iter().enumerate() {
            actuation_bytes[i * Actuation::WIRE_SIZE..(i + 1) * Actuation::WIRE_SIZE]
                .copy_from_slice(&a.to_bytes());
        }
        ok &= self
            .wl
            .write(Self::actuation_offset(profile), &actuation_bytes, board);

        let mut ak_bytes = [0u8; NUM_ADVANCED_KEYS * AdvancedKey::WIRE_SIZE];
        for (i, ak) in p.advanced_keys.iter().enumerate() {
            ak_bytes[i * AdvancedKey::WIRE_SIZE..(i + 1) * AdvancedKey::WIRE_SIZE]
                .copy_from_slice(&ak.to_bytes());
        }
        ok &= self
            .wl
            .write(Self::advanced_keys_offset(profile), &ak_bytes, board);

        ok &= self
            .wl
            .write(Self::tick_rate_offset(profile), &[p.tick_rate], board);

        let mut gamepad_buttons = [0u8; NUM_KEYS];
        for (i, b) in p.gamepad_buttons.iter().enumerate() {
            gamepad_buttons[i] = (*b).into();
        }
        ok &= self
            .wl
            .write(Self::gamepad_buttons_offset(profile), &gamepad_buttons, board);

        ok &= self.wl.write(
            Self::gamepad_options_offset(profile),
            &p.gamepad_options.to_bytes(),
            board,
        );
        ok
    }

    /// Reset the whole store to [`Configuration::default`] and persist it.
    pub fn reset(&mut self, board: &mut impl BoardControl) -> Configuration {
        let cfg = Configuration::default();
        self.write_full(&cfg, board);
        cfg
    }

    /// Replace one layer's keymap for `profile`.
    pub fn set_keymap(
        &mut self,
        profile: usize,
        layer: usize,
        keymap: &[u8; NUM_KEYS],
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if layer >= NUM_LAYERS {
            return Err(ConfigError::IndexOutOfRange);
        }
        if self.wl.write(Self::keymap_offset(profile, layer), keymap, board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Replace one key's actuation settings for `profile`.
    pub fn set_actuation(
        &mut self,
        profile: usize,
        key: usize,
        actuation: Actuation,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if key >= NUM_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let addr = Self::actuation_offset(profile) + key * Actuation::WIRE_SIZE;
        if self.wl.write(addr, &actuation.to_bytes(), board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Replace one advanced-key slot for `profile`.
    pub fn set_advanced_key(
        &mut self,
        profile: usize,
        index: usize,
        ak: AdvancedKey,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if index >= NUM_ADVANCED_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let addr = Self::advanced_keys_offset(profile) + index * AdvancedKey::WIRE_SIZE;
        if self.wl.write(addr, &ak.to_bytes(), board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Replace `profile`'s gamepad options.
    pub fn set_gamepad_options(
        &mut self,
        profile: usize,
        options: GamepadOptions,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if self
            .wl
            .write(Self::gamepad_options_offset(profile), &options.to_bytes(), board)
        {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Switch the active profile index.
    pub fn set_current_profile(
        &mut self,
        profile: usize,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if self.wl.write(layout::CURRENT_PROFILE, &[profile as u8], board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Persist a new calibration hint.
    pub fn set_calibration(
        &mut self,
        calibration: Calibration,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        if self
            .wl
            .write(layout::CALIBRATION, &calibration.to_bytes(), board)
        {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Read back one profile, validated. Used by the raw-HID `GET_*` family,
    /// which report a whole profile's sub-range rather than going through
    /// [`Configuration`].
    pub fn read_profile(&self, profile: usize) -> Result<Profile, ConfigError> {
        Self::check_profile(profile)?;
        Ok(self.read_profile_raw(profile))
    }

    /// Currently active profile index, as stored (not yet validated against
    /// `NUM_PROFILES`; it was validated when written).
    pub fn current_profile(&self) -> u8 {
        let mut b = [0u8; 1];
        self.wl.read(layout::CURRENT_PROFILE, &mut b);
        b[0]
    }

    /// The persisted calibration hint.
    pub fn calibration(&self) -> Calibration {
        let mut bytes = [0u8; Calibration::WIRE_SIZE];
        self.wl.read(layout::CALIBRATION, &mut bytes);
        Calibration::from_bytes(bytes)
    }

    /// Board-wide flags (`COMMAND_GET_OPTIONS`).
    pub fn global_options(&self) -> GlobalOptions {
        let mut bytes = [0u8; GlobalOptions::WIRE_SIZE];
        self.wl.read(layout::GLOBAL_OPTIONS, &mut bytes);
        GlobalOptions::from_bytes(bytes)
    }

    /// Replace the board-wide flags (`COMMAND_SET_OPTIONS`).
    pub fn set_global_options(
        &mut self,
        options: GlobalOptions,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        if self
            .wl
            .write(layout::GLOBAL_OPTIONS, &options.to_bytes(), board)
        {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Overwrite `bytes.len()` consecutive keys of one layer, starting at
    /// `start`. Used by `SET_KEYMAP`'s partial-range semantics.
    pub fn set_keymap_range(
        &mut self,
        profile: usize,
        layer: usize,
        start: usize,
        bytes: &[u8],
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if layer >= NUM_LAYERS || start + bytes.len() > NUM_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let addr = Self::keymap_offset(profile, layer) + start;
        if self.wl.write(addr, bytes, board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Overwrite a contiguous range of per-key actuation settings.
    pub fn set_actuation_range(
        &mut self,
        profile: usize,
        start: usize,
        actuations: &[Actuation],
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if start + actuations.len() > NUM_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let mut ok = true;
        for (i, a) in actuations.iter().enumerate() {
            let addr = Self::actuation_offset(profile) + (start + i) * Actuation::WIRE_SIZE;
            ok &= self.wl.write(addr, &a.to_bytes(), board);
        }
        if ok {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Overwrite a contiguous range of advanced-key slots.
    pub fn set_advanced_keys_range(
        &mut self,
        profile: usize,
        start: usize,
        keys: &[AdvancedKey],
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if start + keys.len() > NUM_ADVANCED_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let mut ok = true;
        for (i, ak) in keys.iter().enumerate() {
            let addr = Self::advanced_keys_offset(profile) + (start + i) * AdvancedKey::WIRE_SIZE;
            ok &= self.wl.write(addr, &ak.to_bytes(), board);
        }
        if ok {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Replace `profile`'s tick rate.
    pub fn set_tick_rate(
        &mut self,
        profile: usize,
        tick_rate: u8,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if self
            .wl
            .write(Self::tick_rate_offset(profile), &[tick_rate], board)
        {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Overwrite a contiguous range of per-key gamepad button bindings.
    pub fn set_gamepad_buttons_range(
        &mut self,
        profile: usize,
        start: usize,
        bytes: &[u8],
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if start + bytes.len() > NUM_KEYS {
            return Err(ConfigError::IndexOutOfRange);
        }
        let addr = Self::gamepad_buttons_offset(profile) + start;
        if self.wl.write(addr, bytes, board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Reset a single profile to [`Profile::default`], leaving every other
    /// profile and the rest of the store untouched.
    pub fn reset_profile(
        &mut self,
        profile: usize,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(profile)?;
        if self.write_profile_raw(profile, &Profile::default(), board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }

    /// Copy `src`'s whole persisted profile into `dest`.
    pub fn duplicate_profile(
        &mut self,
        dest: usize,
        src: usize,
        board: &mut impl BoardControl,
    ) -> Result<(), ConfigError> {
        Self::check_profile(dest)?;
        Self::check_profile(src)?;
        let p = self.read_profile_raw(src);
        if self.write_profile_raw(dest, &p, board) {
            Ok(())
        } else {
            Err(ConfigError::FlashWrite)
        }
    }
}

/// Bring an image written by an older schema version up to
/// [`CURRENT_VERSION`]. No migrations exist yet since this is the first
/// shipped schema; future bumps append a match arm per version step.
fn migrate<F, const L: usize>(store: &mut ConfigStore<F, L>, from_version: u8, board: &mut impl BoardControl)
where
    F: Flash,
{
    log::info!("config: migrating schema from version {} to {}", from_version, CURRENT_VERSION);
    let _ = store.wl.write(layout::VERSION, &[CURRENT_VERSION], board);
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

    const LOG_SIZE: usize = 4096;

    fn new_store() -> ConfigStore<FakeFlash, LOG_SIZE> {
        let total_words = (VIRTUAL_SIZE + LOG_SIZE) / 4 + 64;
        let flash = FakeFlash::new(total_words, 64);
        let mut store = ConfigStore::<FakeFlash, LOG_SIZE>::new(flash);
        store.init();
        store
    }

    #[test]
    fn first_boot_initializes_defaults() {
        let mut store = new_store();
        let mut board = FakeBoard;
        let cfg = store.load_or_init(&mut board);
        assert_eq!(cfg.version, CURRENT_VERSION);
        assert_eq!(cfg.current_profile, 0);
    }

    #[test]
    fn set_keymap_round_trips() {
        let mut store = new_store();
        let mut board = FakeBoard;
        store.load_or_init(&mut board);
        let mut keymap = [keycodes::NO; NUM_KEYS];
        keymap[3] = keycodes::KEYBOARD_MIN;
        store.set_keymap(0, 0, &keymap, &mut board).unwrap();
        let cfg = store.read_full();
        assert_eq!(cfg.profiles[0].keymap[0][3], keycodes::KEYBOARD_MIN);
    }

    #[test]
    fn out_of_range_profile_rejected() {
        let mut store = new_store();
        let mut board = FakeBoard;
        store.load_or_init(&mut board);
        let keymap = [keycodes::NO; NUM_KEYS];
        assert_eq!(
            store.set_keymap(NUM_PROFILES, 0, &keymap, &mut board),
            Err(ConfigError::IndexOutOfRange)
        );
    }

    #[test]
    fn reset_restores_defaults_after_mutation() {
        let mut store = new_store();
        let mut board = FakeBoard;
        store.load_or_init(&mut board);
        store.set_current_profile(2, &mut board).unwrap();
        assert_eq!(store.read_full().current_profile, 2);
        let cfg = store.reset(&mut board);
        assert_eq!(cfg.current_profile, 0);
    }

    #[test]
    fn advanced_key_round_trips() {
        let mut store = new_store();
        let mut board = FakeBoard;
        store.load_or_init(&mut board);
        let ak = AdvancedKey {
            layer: 0,
            key: 5,
            payload: schema::AdvancedKeyPayload::TapHold(schema::TapHold {
                tap_keycode: 0x10,
                hold_keycode: 0x7B,
                tapping_term_ms: 200,
                hold_on_other_key_press: true,
            }),
        };
        store.set_advanced_key(0, 0, ak, &mut board).unwrap();
        let cfg = store.read_full();
        assert_eq!(cfg.profiles[0].advanced_keys[0], ak);
    }
}

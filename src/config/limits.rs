//! Compile-time board sizing. The reference firmware fixes these per-board
//! via `#define`s in a board `config.h` with `_Static_assert` bounds checks
//! (`examples/original_source/include/common.h`); this crate does the same
//! thing as plain `const`s so every sized array in the crate is a stack/static
//! array, never a heap allocation.

/// Number of configuration profiles. Bounds from the reference: `1..=8`.
pub const NUM_PROFILES: usize = 4;
/// Number of keymap layers. Bounds from the reference: `1..=8`.
pub const NUM_LAYERS: usize = 4;
/// Number of physical keys. Bounds from the reference: `1..=256`. 80 is a
/// generic analog-keyboard-sized board (not taken from any single reference
/// board; picked here since the original leaves `NUM_KEYS` undefined at this
/// layer and requires each board to supply it).
pub const NUM_KEYS: usize = 80;
/// Maximum number of advanced keys bound per profile. Bounds from the
/// reference: `1..=64`.
pub const NUM_ADVANCED_KEYS: usize = 32;

const _: () = assert!(NUM_PROFILES >= 1 && NUM_PROFILES <= 8);
const _: () = assert!(NUM_LAYERS >= 1 && NUM_LAYERS <= 8);
const _: () = assert!(NUM_KEYS >= 1 && NUM_KEYS <= 256);
const _: () = assert!(NUM_ADVANCED_KEYS >= 1 && NUM_ADVANCED_KEYS <= 64);

//! Capability interfaces the core is generic over.
//!
//! Boards supply concrete implementations of these traits; tests supply fakes.
//! None of them assume anything about the physical USB stack, flash part, or
//! MCU beyond what the core actually touches.

use embedded_time::duration::Milliseconds;
use usb_device::UsbError;

/// Raw ADC sample sink, called from interrupt context.
///
/// Implementations own the actual peripheral; the core only ever calls
/// [`Matrix::store_adc`](crate::matrix::Matrix::store_adc), which in turn
/// writes through whatever guard `critical_section` provides.
pub trait AdcSink {
    /// Number of physical keys this sink can report samples for.
    fn num_keys(&self) -> usize;
}

/// A flash-like block device backing [`WearLevel`](crate::wear_level::WearLevel).
///
/// Addresses and lengths are in bytes; `read`/`write` operate on whole `u32`
/// words to match the wear-log's word-oriented layout. Implementations are
/// expected to be infallible for `read` (flash reads never fail) and to
/// report write/erase failures rather than panic.
pub trait Flash {
    /// Total size of the region this device exposes, in bytes. Must be a
    /// multiple of 4 and at least `V + L` (virtual region + log area).
    fn size(&self) -> usize;

    /// Read one `u32` word at a 4-byte-aligned byte offset.
    fn read_word(&self, word_addr: usize) -> u32;

    /// Write one `u32` word at a 4-byte-aligned byte offset. Returns `false`
    /// on failure (the word is left in an implementation-defined state).
    fn write_word(&mut self, word_addr: usize, value: u32) -> bool;

    /// Erase a whole sector containing `word_addr`, returning all words in
    /// it to [`FLASH_EMPTY_VAL`](crate::wear_level::FLASH_EMPTY_VAL). Returns
    /// `false` on failure.
    fn erase_sector(&mut self, word_addr: usize) -> bool;

    /// Sector size in bytes, used to decide erase granularity during
    /// consolidation.
    fn sector_size(&self) -> usize;
}

/// Monotonic time source used for calibration windows and advanced-key
/// timers (`tapping_term`, `since`).
pub trait Timer {
    /// Milliseconds elapsed since an arbitrary but fixed epoch (usually
    /// boot). Must be monotonically non-decreasing.
    fn now_ms(&self) -> Milliseconds<u32>;
}

/// Kind of HID report produced by [`HidComposer`](crate::hid::HidComposer),
/// in fixed send priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportKind {
    Keyboard,
    System,
    Consumer,
    Mouse,
}

impl ReportKind {
    pub const fn next(self) -> Option<Self> {
        match self {
            ReportKind::Keyboard => Some(ReportKind::System),
            ReportKind::System => Some(ReportKind::Consumer),
            ReportKind::Consumer => Some(ReportKind::Mouse),
            ReportKind::Mouse => None,
        }
    }
}

/// Errors surfaced by [`UsbTransport`] operations.
#[derive(Debug)]
pub enum UsbHidError {
    WouldBlock,
    UsbError(UsbError),
}

impl From<UsbError> for UsbHidError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::WouldBlock => Self::WouldBlock,
            _ => Self::UsbError(e),
        }
    }
}

/// The opaque USB transport the core sends reports through and receives
/// raw-HID/vendor traffic from. Descriptor layout, enumeration and endpoint
/// scheduling are the board's problem; this is the entire surface the core
/// needs.
pub trait UsbTransport {
    /// Send a fixed-size report on the endpoint identified by `kind`.
    /// Returns `Err(UsbHidError::WouldBlock)` if the endpoint isn't ready.
    fn send_report(&mut self, kind: ReportKind, data: &[u8]) -> Result<(), UsbHidError>;

    /// Send the 20-byte XInput report on its dedicated interrupt endpoint.
    fn send_xinput_report(&mut self, data: &[u8; 20]) -> Result<(), UsbHidError>;

    /// Send a 64-byte raw-HID reply.
    fn send_raw_hid(&mut self, data: &[u8; 64]) -> Result<(), UsbHidError>;

    /// Whether `kind`'s endpoint can currently accept a new report.
    fn is_ready(&self, kind: ReportKind) -> bool;

    /// Request the host wake a suspended bus (remote wakeup).
    fn remote_wakeup(&mut self);
}

/// Board-level primitives that don't fit any of the above: resets, error
/// escalation, and the ISR-vs-main critical section used to guard
/// `adc_filtered`.
pub trait BoardControl {
    /// Enter the board's DFU/bootloader mode. Does not return.
    fn enter_bootloader(&mut self) -> !;

    /// Perform a full system reset. Does not return.
    fn reset(&mut self) -> !;

    /// Run `f` with interrupts affecting `AdcSink`/`Matrix::store_adc`
    /// masked, guarding the 16-bit `adc_filtered` store on targets without
    /// native atomicity.
    fn critical_section<R>(&mut self, f: impl FnOnce() -> R) -> R;

    /// Unrecoverable error: log and halt. Does not return.
    fn fatal_error(&mut self, reason: &str) -> !;
}

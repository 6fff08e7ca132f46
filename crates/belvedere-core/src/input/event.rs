// Belvedere Input Layer - Report Processing
// Keycode extraction and "is this keycode interesting" classification

use crate::config::Config;

/// Base of the vendor-specific keycode band (QMK's `SAFE_RANGE`)
pub const VENDOR_KEYCODE_BASE: u16 = 0x7700;

/// End (exclusive) of the vendor-specific keycode band
pub const VENDOR_KEYCODE_END: u16 = 0x7800;

/// Where the keycode lives inside a raw input report
///
/// The layout is device specific and not negotiated from the report
/// descriptor; devices with numbered reports need an offset of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportLayout {
    /// Byte offset of the single-byte keycode field
    pub keycode_offset: usize,
}

impl ReportLayout {
    pub fn new(keycode_offset: usize) -> Self {
        Self { keycode_offset }
    }

    /// Extract the keycode from a report, if the report is long enough
    pub fn keycode(&self, report: &[u8]) -> Option<u16> {
        report.get(self.keycode_offset).map(|&b| u16::from(b))
    }
}

/// Classification of an observed keycode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Falls in the vendor band once remapped; always interesting
    Vendor { remapped: u16 },
    /// Listed in `monitored_keycodes`
    Monitored,
    /// Neither; the event is discarded
    Ignored,
}

impl KeyClass {
    pub fn is_interesting(self) -> bool {
        !matches!(self, KeyClass::Ignored)
    }
}

/// Remap a raw keycode into the vendor band, if it lands inside it
pub fn vendor_keycode(keycode: u16) -> Option<u16> {
    let remapped = u32::from(VENDOR_KEYCODE_BASE) + u32::from(keycode);
    if remapped < u32::from(VENDOR_KEYCODE_END) {
        Some(remapped as u16)
    } else {
        None
    }
}

/// Decide whether `keycode` is interesting under `config`
pub fn classify(keycode: u16, config: &Config) -> KeyClass {
    if let Some(remapped) = vendor_keycode(keycode) {
        return KeyClass::Vendor { remapped };
    }
    if config.is_monitored(keycode) {
        KeyClass::Monitored
    } else {
        KeyClass::Ignored
    }
}

// Belvedere Input Layer
// HID device access, device matching and keycode classification

mod device;
mod event;
mod filter;
#[cfg(feature = "hidapi")]
pub mod hidapi_backend;
pub mod mock;

pub use device::{DeviceDescriptor, HidBackend, HidDevice, HidError};
pub use event::{
    classify, vendor_keycode, KeyClass, ReportLayout, VENDOR_KEYCODE_BASE, VENDOR_KEYCODE_END,
};
pub use filter::{find_first_match, matches_profile, profile_for};

#[cfg(feature = "hidapi")]
pub use hidapi_backend::{HidApiBackend, HidApiDevice};
pub use mock::{MockHidBackend, MockHidDevice};

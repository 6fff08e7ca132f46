// Belvedere Input Layer - HID Devices
// Capability traits over the host HID transport

use std::ffi::CString;
use std::fmt;

/// Errors reported by a HID backend
#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[error("HID backend error: {0}")]
    Backend(String),

    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Read failed: {0}")]
    Read(String),
}

/// An attached HID device as seen by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// Platform path used to open the device
    pub path: CString,
    /// Product string, when the device reports one
    pub product_name: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16, path: CString) -> Self {
        Self {
            vendor_id,
            product_id,
            path,
            product_name: None,
        }
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    /// Path as displayable text
    pub fn path_lossy(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}/{:04x} {} ({})",
            self.vendor_id,
            self.product_id,
            self.product_name.as_deref().unwrap_or("Unknown"),
            self.path.to_string_lossy()
        )
    }
}

/// An open device handle. Dropping the handle closes it.
pub trait HidDevice {
    /// Read one input report into `buf`
    ///
    /// A `timeout_ms` of 0 never blocks; `Ok(0)` means no report was pending.
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, HidError>;
}

/// Host HID capability: enumerate attached devices and open them
pub trait HidBackend {
    type Device: HidDevice;

    /// List currently attached devices
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, HidError>;

    /// Open an enumerated device
    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Device, HidError>;
}

// Belvedere Input Layer - hidapi Backend
// HID access through the platform hidapi library

use hidapi::HidApi;

use super::device::{DeviceDescriptor, HidBackend, HidDevice, HidError};

/// [`HidBackend`] over `hidapi`
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    /// Initialise the hidapi library
    pub fn new() -> Result<Self, HidError> {
        let api = HidApi::new().map_err(|e| HidError::Backend(e.to_string()))?;
        Ok(Self { api })
    }
}

impl HidBackend for HidApiBackend {
    type Device = HidApiDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, HidError> {
        // The device list is a snapshot taken at the last refresh
        self.api
            .refresh_devices()
            .map_err(|e| HidError::Backend(e.to_string()))?;

        Ok(self
            .api
            .device_list()
            .map(|info| {
                let descriptor = DeviceDescriptor::new(
                    info.vendor_id(),
                    info.product_id(),
                    info.path().to_owned(),
                );
                match info.product_string() {
                    Some(name) => descriptor.with_product_name(name),
                    None => descriptor,
                }
            })
            .collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<HidApiDevice, HidError> {
        let device = self
            .api
            .open_path(&descriptor.path)
            .map_err(|e| HidError::Open {
                path: descriptor.path_lossy(),
                reason: e.to_string(),
            })?;
        Ok(HidApiDevice { device })
    }
}

/// An open hidapi device handle
pub struct HidApiDevice {
    device: hidapi::HidDevice,
}

impl HidDevice for HidApiDevice {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, HidError> {
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| HidError::Read(e.to_string()))
    }
}

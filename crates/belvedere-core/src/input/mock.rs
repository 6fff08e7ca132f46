// Belvedere Input Layer - Mock Backend
// Scriptable in-memory HID bus for tests without hardware

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::CString;
use std::rc::Rc;

use super::device::{DeviceDescriptor, HidBackend, HidDevice, HidError};

#[derive(Debug)]
struct MockEntry {
    descriptor: DeviceDescriptor,
    reports: VecDeque<Vec<u8>>,
    fail_open: bool,
    fail_reads: bool,
}

#[derive(Debug, Default)]
struct MockBus {
    attached: Vec<MockEntry>,
    next_path: usize,
    next_handle: u64,
    open_handles: Vec<u64>,
    enumerate_calls: usize,
    fail_enumerate: bool,
}

impl MockBus {
    fn entry_mut(&mut self, vendor_id: u16, product_id: u16) -> Option<&mut MockEntry> {
        self.attached.iter_mut().find(|e| {
            e.descriptor.vendor_id == vendor_id && e.descriptor.product_id == product_id
        })
    }
}

/// An in-memory [`HidBackend`]
///
/// Clones share one bus, so a test can keep a clone to plug devices in,
/// queue reports and count open handles after handing the backend over.
#[derive(Debug, Clone, Default)]
pub struct MockHidBackend {
    bus: Rc<RefCell<MockBus>>,
}

impl MockHidBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device and return its path
    pub fn attach(&self, vendor_id: u16, product_id: u16) -> CString {
        self.attach_entry(vendor_id, product_id, false)
    }

    /// Attach a device that enumerates but refuses to open
    pub fn attach_unopenable(&self, vendor_id: u16, product_id: u16) -> CString {
        self.attach_entry(vendor_id, product_id, true)
    }

    fn attach_entry(&self, vendor_id: u16, product_id: u16, fail_open: bool) -> CString {
        let mut bus = self.bus.borrow_mut();
        let path = CString::new(format!("mock:{}", bus.next_path)).unwrap_or_default();
        bus.next_path += 1;
        bus.attached.push(MockEntry {
            descriptor: DeviceDescriptor::new(vendor_id, product_id, path.clone()),
            reports: VecDeque::new(),
            fail_open,
            fail_reads: false,
        });
        path
    }

    /// Unplug every device with this identity
    pub fn detach(&self, vendor_id: u16, product_id: u16) {
        self.bus.borrow_mut().attached.retain(|e| {
            !(e.descriptor.vendor_id == vendor_id && e.descriptor.product_id == product_id)
        });
    }

    /// Queue an input report on the first device with this identity
    pub fn push_report(&self, vendor_id: u16, product_id: u16, report: &[u8]) {
        if let Some(entry) = self.bus.borrow_mut().entry_mut(vendor_id, product_id) {
            entry.reports.push_back(report.to_vec());
        }
    }

    /// Make reads from the first device with this identity fail
    pub fn fail_reads(&self, vendor_id: u16, product_id: u16, fail: bool) {
        if let Some(entry) = self.bus.borrow_mut().entry_mut(vendor_id, product_id) {
            entry.fail_reads = fail;
        }
    }

    /// Make enumeration fail
    pub fn fail_enumerate(&self, fail: bool) {
        self.bus.borrow_mut().fail_enumerate = fail;
    }

    /// Number of handles currently open
    pub fn open_handle_count(&self) -> usize {
        self.bus.borrow().open_handles.len()
    }

    /// Number of enumerations performed so far
    pub fn enumerate_calls(&self) -> usize {
        self.bus.borrow().enumerate_calls
    }
}

impl HidBackend for MockHidBackend {
    type Device = MockHidDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, HidError> {
        let mut bus = self.bus.borrow_mut();
        bus.enumerate_calls += 1;
        if bus.fail_enumerate {
            return Err(HidError::Backend("enumeration failed".to_string()));
        }
        Ok(bus.attached.iter().map(|e| e.descriptor.clone()).collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<MockHidDevice, HidError> {
        let mut bus = self.bus.borrow_mut();
        let entry = bus
            .attached
            .iter()
            .find(|e| e.descriptor.path == descriptor.path)
            .ok_or_else(|| HidError::Open {
                path: descriptor.path_lossy(),
                reason: "no such device".to_string(),
            })?;
        if entry.fail_open {
            return Err(HidError::Open {
                path: descriptor.path_lossy(),
                reason: "permission denied".to_string(),
            });
        }

        let handle_id = bus.next_handle;
        bus.next_handle += 1;
        bus.open_handles.push(handle_id);

        Ok(MockHidDevice {
            bus: Rc::clone(&self.bus),
            path: descriptor.path.clone(),
            handle_id,
        })
    }
}

/// A handle opened from [`MockHidBackend`]
#[derive(Debug)]
pub struct MockHidDevice {
    bus: Rc<RefCell<MockBus>>,
    path: CString,
    handle_id: u64,
}

impl MockHidDevice {
    /// Unique id of this handle; reopening a device yields a new id
    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }
}

impl HidDevice for MockHidDevice {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, HidError> {
        let mut bus = self.bus.borrow_mut();
        let entry = bus
            .attached
            .iter_mut()
            .find(|e| e.descriptor.path == self.path)
            .ok_or_else(|| HidError::Read("device disconnected".to_string()))?;

        if entry.fail_reads {
            return Err(HidError::Read("I/O error".to_string()));
        }

        match entry.reports.pop_front() {
            Some(report) => {
                let len = report.len().min(buf.len());
                buf[..len].copy_from_slice(&report[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}

impl Drop for MockHidDevice {
    fn drop(&mut self) {
        let id = self.handle_id;
        self.bus.borrow_mut().open_handles.retain(|&h| h != id);
    }
}

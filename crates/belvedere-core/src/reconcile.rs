// Belvedere Device Reconciler
// Matches configured device identities against attached HID devices

use smallvec::SmallVec;

use crate::config::Config;
use crate::input::{find_first_match, HidBackend};

/// Ceiling on simultaneously open device handles
pub const MAX_OPEN_DEVICES: usize = 16;

/// An open handle for a configured device identity
#[derive(Debug)]
pub struct OpenDevice<D> {
    pub vendor_id: u16,
    pub product_id: u16,
    pub handle: D,
}

/// Bounded set of open devices
///
/// Insertion past [`MAX_OPEN_DEVICES`] is rejected, never truncated silently.
#[derive(Debug)]
pub struct DeviceSet<D> {
    devices: SmallVec<[OpenDevice<D>; MAX_OPEN_DEVICES]>,
}

impl<D> DeviceSet<D> {
    pub fn new() -> Self {
        Self {
            devices: SmallVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.devices.len() >= MAX_OPEN_DEVICES
    }

    /// Add a device, handing it back if the set is full
    pub fn try_push(&mut self, device: OpenDevice<D>) -> Result<(), OpenDevice<D>> {
        if self.is_full() {
            return Err(device);
        }
        self.devices.push(device);
        Ok(())
    }

    /// Close every handle
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpenDevice<D>> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpenDevice<D>> {
        self.devices.iter_mut()
    }

    /// (vendor, product) identities in open order
    pub fn identities(&self) -> Vec<(u16, u16)> {
        self.devices
            .iter()
            .map(|d| (d.vendor_id, d.product_id))
            .collect()
    }
}

impl<D> Default for DeviceSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the HID backend and the set of open devices
pub struct DeviceReconciler<B: HidBackend> {
    backend: B,
    open: DeviceSet<B::Device>,
}

impl<B: HidBackend> DeviceReconciler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            open: DeviceSet::new(),
        }
    }

    pub fn devices(&self) -> &DeviceSet<B::Device> {
        &self.open
    }

    pub fn devices_mut(&mut self) -> &mut DeviceSet<B::Device> {
        &mut self.open
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Rebuild the open-device set for `config`
    ///
    /// Every open handle is closed first, even for devices that are still
    /// attached. Each profile then gets a fresh enumeration and the first
    /// attached device with its identity is opened. Enumeration and open
    /// failures skip the profile until the next reconcile.
    pub fn reconcile(&mut self, config: &Config) -> &DeviceSet<B::Device> {
        let closed = self.open.len();
        self.open.clear();
        if closed > 0 {
            log::debug!("Closed {} device handle(s)", closed);
        }

        for profile in &config.devices {
            if self.open.is_full() {
                log::warn!(
                    "Open device limit of {} reached, skipping remaining profiles",
                    MAX_OPEN_DEVICES
                );
                break;
            }

            let attached = match self.backend.enumerate() {
                Ok(attached) => attached,
                Err(e) => {
                    log::warn!(
                        "Enumeration failed for {:04x}/{:04x}: {}",
                        profile.vendor_id,
                        profile.product_id,
                        e
                    );
                    continue;
                }
            };

            let Some(descriptor) = find_first_match(&attached, profile) else {
                log::debug!(
                    "Device {:04x}/{:04x} not attached",
                    profile.vendor_id,
                    profile.product_id
                );
                continue;
            };

            match self.backend.open(descriptor) {
                Ok(handle) => {
                    log::info!("Opened device {}", descriptor);
                    let device = OpenDevice {
                        vendor_id: profile.vendor_id,
                        product_id: profile.product_id,
                        handle,
                    };
                    if self.open.try_push(device).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        log::debug!(
            "Reconciled {} of {} configured device(s)",
            self.open.len(),
            config.devices.len()
        );
        &self.open
    }

    /// Close every open handle
    pub fn close_all(&mut self) {
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceProfile;
    use crate::input::{MockHidBackend, MockHidDevice};

    fn config(source: &str) -> Config {
        Config::from_text(source)
    }

    fn handle_ids(set: &DeviceSet<MockHidDevice>) -> Vec<u64> {
        set.iter().map(|d| d.handle.handle_id()).collect()
    }

    #[test]
    fn test_device_set_rejects_past_capacity() {
        let mut set = DeviceSet::new();
        for i in 0..MAX_OPEN_DEVICES {
            assert!(set
                .try_push(OpenDevice {
                    vendor_id: i as u16,
                    product_id: 0,
                    handle: (),
                })
                .is_ok());
        }
        assert!(set.is_full());
        let rejected = set
            .try_push(OpenDevice {
                vendor_id: 99,
                product_id: 0,
                handle: (),
            })
            .unwrap_err();
        assert_eq!(rejected.vendor_id, 99);
        assert_eq!(set.len(), MAX_OPEN_DEVICES);
    }

    #[test]
    fn test_reconcile_opens_attached_profiles_in_config_order() {
        let backend = MockHidBackend::new();
        backend.attach(0x0483, 0x5740);
        backend.attach(0x5043, 0x54a3);

        let mut reconciler = DeviceReconciler::new(backend.clone());
        let cfg = config("[5043/54a3]\n1 = +caps\n[0483/5740]\n2 = -num\n");
        let set = reconciler.reconcile(&cfg);

        assert_eq!(set.identities(), vec![(0x5043, 0x54a3), (0x0483, 0x5740)]);
        assert_eq!(backend.open_handle_count(), 2);
        // One enumeration per profile
        assert_eq!(backend.enumerate_calls(), 2);
    }

    #[test]
    fn test_reconcile_stops_at_open_device_limit() {
        let backend = MockHidBackend::new();
        let mut cfg = Config::default();
        // Built directly; the parser caps profiles well below the limit
        for i in 1..=20u16 {
            backend.attach(i, i);
            cfg.devices.push(DeviceProfile {
                vendor_id: i,
                product_id: i,
                target: String::new(),
                bindings: Vec::new(),
            });
        }

        let mut reconciler = DeviceReconciler::new(backend.clone());
        let set = reconciler.reconcile(&cfg);

        assert_eq!(set.len(), MAX_OPEN_DEVICES);
        let expected: Vec<(u16, u16)> = (1..=16u16).map(|i| (i, i)).collect();
        assert_eq!(set.identities(), expected);
        assert_eq!(backend.open_handle_count(), MAX_OPEN_DEVICES);
        assert_eq!(backend.enumerate_calls(), MAX_OPEN_DEVICES);
    }

    #[test]
    fn test_reconcile_skips_missing_and_unopenable() {
        let backend = MockHidBackend::new();
        backend.attach_unopenable(0x1111, 0x0001);
        backend.attach(0x3333, 0x0003);

        let mut reconciler = DeviceReconciler::new(backend.clone());
        let cfg = config("[1111/1]\n[2222/2]\n[3333/3]\n");
        let set = reconciler.reconcile(&cfg);

        assert_eq!(set.identities(), vec![(0x3333, 0x0003)]);
    }

    #[test]
    fn test_reconcile_survives_enumeration_failure() {
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        backend.fail_enumerate(true);

        let mut reconciler = DeviceReconciler::new(backend.clone());
        let cfg = config("[1/1]\n");
        assert!(reconciler.reconcile(&cfg).is_empty());

        backend.fail_enumerate(false);
        assert_eq!(reconciler.reconcile(&cfg).identities(), vec![(1, 1)]);
    }

    #[test]
    fn test_reconcile_closes_and_reopens_everything() {
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        backend.attach(2, 2);

        let mut reconciler = DeviceReconciler::new(backend.clone());
        let cfg = config("[1/1]\n[2/2]\n");

        let first_ids = handle_ids(reconciler.reconcile(&cfg));
        let first_members = reconciler.devices().identities();
        let second_ids = handle_ids(reconciler.reconcile(&cfg));
        let second_members = reconciler.devices().identities();

        assert_eq!(first_members, second_members);
        assert!(first_ids.iter().all(|id| !second_ids.contains(id)));
        assert_eq!(backend.open_handle_count(), 2);
    }

    #[test]
    fn test_reconcile_drops_removed_profiles_and_unplugged_devices() {
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        backend.attach(2, 2);

        let mut reconciler = DeviceReconciler::new(backend.clone());
        reconciler.reconcile(&config("[1/1]\n[2/2]\n"));
        assert_eq!(backend.open_handle_count(), 2);

        backend.detach(2, 2);
        let set = reconciler.reconcile(&config("[2/2]\n"));
        assert!(set.is_empty());
        assert_eq!(backend.open_handle_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        let mut reconciler = DeviceReconciler::new(backend.clone());
        reconciler.reconcile(&config("[1/1]\n"));

        reconciler.close_all();
        assert!(reconciler.devices().is_empty());
        assert_eq!(backend.open_handle_count(), 0);
    }
}

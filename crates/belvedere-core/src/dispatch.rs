// Belvedere Event Dispatch
// Polls open devices and turns observed keycodes into LED commands

use crate::config::Config;
use crate::exec::CommandExecutor;
use crate::input::{classify, HidDevice, KeyClass, ReportLayout};
use crate::reconcile::DeviceSet;
use crate::resolver::{resolve, Command};

/// Size of the buffer a single input report is read into
pub const REPORT_BUFFER_SIZE: usize = 64;

/// What happened to one observed keycode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Neither monitored nor in the vendor band
    Ignored,
    /// Interesting, but no binding on this device
    Unmapped,
    /// A command was handed to the executor
    Executed(Command),
}

/// Per-tick device poller
#[derive(Debug)]
pub struct Dispatcher {
    layout: ReportLayout,
    buf: [u8; REPORT_BUFFER_SIZE],
}

impl Dispatcher {
    pub fn new(layout: ReportLayout) -> Self {
        Self {
            layout,
            buf: [0; REPORT_BUFFER_SIZE],
        }
    }

    pub fn layout(&self) -> ReportLayout {
        self.layout
    }

    /// Read at most one report from every open device and act on it
    ///
    /// Reads use a zero timeout. A failed read counts as "no data" for this
    /// tick. Returns the number of commands executed.
    pub fn tick<D, E>(&mut self, config: &Config, devices: &mut DeviceSet<D>, executor: &mut E) -> usize
    where
        D: HidDevice,
        E: CommandExecutor + ?Sized,
    {
        executor.reap();

        let mut executed = 0;
        for device in devices.iter_mut() {
            let len = match device.handle.read_timeout(&mut self.buf, 0) {
                Ok(len) => len,
                Err(e) => {
                    log::debug!(
                        "Read from {:04x}/{:04x} failed: {}",
                        device.vendor_id,
                        device.product_id,
                        e
                    );
                    continue;
                }
            };
            if len == 0 {
                continue;
            }

            let Some(keycode) = self.layout.keycode(&self.buf[..len]) else {
                continue;
            };
            log::debug!(
                "Keycode {:#06x} from {:04x}/{:04x}",
                keycode,
                device.vendor_id,
                device.product_id
            );

            let outcome = handle_keycode(
                config,
                device.vendor_id,
                device.product_id,
                keycode,
                &mut *executor,
            );
            if matches!(outcome, DispatchOutcome::Executed(_)) {
                executed += 1;
            }
        }
        executed
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ReportLayout::default())
    }
}

/// Run the decision pipeline for one observed keycode
///
/// Vendor-band keycodes try the remapped code first and fall back to the low
/// byte of the raw code. Monitored keycodes resolve by their low byte.
pub fn handle_keycode<E>(
    config: &Config,
    vendor_id: u16,
    product_id: u16,
    keycode: u16,
    executor: &mut E,
) -> DispatchOutcome
where
    E: CommandExecutor + ?Sized,
{
    let class = classify(keycode, config);
    let raw = u16::from(keycode as u8);

    let command = match class {
        KeyClass::Ignored => {
            log::debug!("Keycode {:#06x} is not monitored", keycode);
            return DispatchOutcome::Ignored;
        }
        KeyClass::Vendor { remapped } => resolve(config, vendor_id, product_id, remapped)
            .or_else(|| resolve(config, vendor_id, product_id, raw)),
        KeyClass::Monitored => resolve(config, vendor_id, product_id, raw),
    };

    match command {
        Some(command) => {
            if let Err(e) = executor.execute(&command) {
                log::warn!("Failed to execute '{}': {}", command, e);
            }
            DispatchOutcome::Executed(command)
        }
        None => {
            log::debug!(
                "No binding for keycode {:#06x} on {:04x}/{:04x}",
                keycode,
                vendor_id,
                product_id
            );
            DispatchOutcome::Unmapped
        }
    }
}

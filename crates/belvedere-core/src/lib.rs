// Belvedere Core Library
// HID key-press to LED command daemon

pub mod config;
pub mod dispatch;
pub mod event;
pub mod exec;
pub mod input;
pub mod ipc;
pub mod reconcile;
pub mod reload;
pub mod resolver;

pub use config::{
    Config, ConfigError, ConfigIncomplete, ConfigLocator, DeviceProfile, KeyBinding, LedMode,
};
pub use dispatch::{handle_keycode, DispatchOutcome, Dispatcher};
pub use event::{Daemon, DaemonEvent, DaemonOptions, EventLoopError, EventLoopResult};
pub use exec::{CommandExecutor, RecordingExecutor, ShellExecutor};
pub use input::{
    classify, DeviceDescriptor, HidBackend, HidDevice, HidError, KeyClass, MockHidBackend,
    ReportLayout,
};
#[cfg(feature = "hidapi")]
pub use input::HidApiBackend;
pub use ipc::{send_command, ControlCommand, ControlResponse, ControlServer, IpcError};
pub use reconcile::{DeviceReconciler, DeviceSet, OpenDevice, MAX_OPEN_DEVICES};
pub use reload::{ReloadCoordinator, ReloadError, ReloadSummary, ReloadTrigger};
pub use resolver::{resolve, Command};

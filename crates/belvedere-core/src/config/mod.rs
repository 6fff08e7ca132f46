// Belvedere Config
// Declarative device -> binding -> command configuration

pub mod locate;
pub mod parser;

pub use locate::{ConfigLocator, SYSTEM_CONFIG_PATH};
pub use parser::{
    parse_keycode, Config, ConfigError, ConfigIncomplete, DeviceProfile, KeyBinding, LedMode,
    DEFAULT_SETLEDS_PATH, MAX_BINDINGS, MAX_DEVICES, MAX_MONITORED_KEYCODES,
};

// Belvedere Config Parser
// Parses the line-oriented device/binding configuration

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

/// LED-toggle executable used when `[general]` has no `setleds` entry
pub const DEFAULT_SETLEDS_PATH: &str = "/usr/local/bin/setleds";

/// Maximum number of device sections kept from a source
pub const MAX_DEVICES: usize = 10;

/// Maximum number of bindings kept per device section
pub const MAX_BINDINGS: usize = 5;

/// Maximum number of entries in `monitored_keycodes`
pub const MAX_MONITORED_KEYCODES: usize = 5;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration file found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("incomplete configuration: {0}")]
    Incomplete(#[from] ConfigIncomplete),
}

/// Sanity failures of a configuration that parsed but cannot drive the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIncomplete {
    #[error("monitored_keycodes are not defined in the configuration file")]
    NoMonitoredKeycodes,

    #[error("no devices are defined in the configuration file")]
    NoDevices,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a binding drives its LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedMode {
    /// `^`
    Toggle,
    /// `+`
    On,
    /// `-`
    Off,
}

impl LedMode {
    /// Parse a mode character
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '^' => Some(LedMode::Toggle),
            '+' => Some(LedMode::On),
            '-' => Some(LedMode::Off),
            _ => None,
        }
    }

    /// The mode character as written in the config file and passed to the executable
    pub fn as_char(self) -> char {
        match self {
            LedMode::Toggle => '^',
            LedMode::On => '+',
            LedMode::Off => '-',
        }
    }
}

impl fmt::Display for LedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A single keycode -> LED action binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub keycode: u16,
    pub led: String,
    pub mode: LedMode,
}

/// Bindings for one (vendor, product) device identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Target-name hint. Informational only, never matched at runtime.
    pub target: String,
    pub bindings: Vec<KeyBinding>,
}

impl DeviceProfile {
    fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            target: String::new(),
            bindings: Vec::new(),
        }
    }

    /// Whether this profile describes the given device identity
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

/// An immutable configuration snapshot
///
/// A reload builds a new `Config`; a committed one is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Executable invoked to change LED state
    pub led_executable: String,
    /// Device profiles in source order
    pub devices: Vec<DeviceProfile>,
    /// Keycodes that are interesting outside the vendor range, in source order
    pub monitored_keycodes: IndexSet<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            led_executable: DEFAULT_SETLEDS_PATH.to_string(),
            devices: Vec::new(),
            monitored_keycodes: IndexSet::new(),
        }
    }
}

/// Section the parser is currently inside
enum Section {
    None,
    General,
    Device(usize),
}

/// Line-by-line accumulator behind [`Config::parse`] and [`Config::from_text`]
struct ConfigBuilder {
    config: Config,
    section: Section,
    setleds: Option<String>,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            section: Section::None,
            setleds: None,
        }
    }

    fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        if line.starts_with('[') {
            self.section = self.open_section(line);
            return;
        }

        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let key = key.trim();
        let value = value.trim();

        match self.section {
            Section::None => {}
            Section::General => {
                if key.eq_ignore_ascii_case("setleds") {
                    self.setleds = Some(value.to_string());
                } else if key.eq_ignore_ascii_case("monitored_keycodes") {
                    self.parse_monitored_keycodes(value);
                }
            }
            Section::Device(index) => {
                let profile = &mut self.config.devices[index];
                if key.eq_ignore_ascii_case("target") {
                    profile.target = value.to_string();
                } else {
                    parse_binding(profile, key, value);
                }
            }
        }
    }

    fn open_section(&mut self, header: &str) -> Section {
        if header.eq_ignore_ascii_case("[general]") {
            return Section::General;
        }

        let Some((vendor_id, product_id)) = parse_device_header(header) else {
            log::debug!("Ignoring unrecognised section: {}", header);
            return Section::None;
        };

        let devices = &mut self.config.devices;
        if devices.len() >= MAX_DEVICES {
            log::warn!(
                "Ignoring device section {} beyond the limit of {} devices",
                header,
                MAX_DEVICES
            );
            return Section::None;
        }

        devices.push(DeviceProfile::new(vendor_id, product_id));
        Section::Device(devices.len() - 1)
    }

    fn parse_monitored_keycodes(&mut self, value: &str) {
        let monitored = &mut self.config.monitored_keycodes;
        for token in value.split(',').map(str::trim) {
            if monitored.len() >= MAX_MONITORED_KEYCODES {
                log::warn!(
                    "Ignoring monitored keycodes beyond the limit of {}",
                    MAX_MONITORED_KEYCODES
                );
                break;
            }

            match parse_keycode(token) {
                Some(keycode) => {
                    log::debug!("Parsed monitored keycode: 0x{:04x} ({})", keycode, keycode);
                    monitored.insert(keycode);
                }
                None => log::error!(
                    "Invalid keycode '{}' in monitored_keycodes. Must be between 0 and 0xFFFF.",
                    token
                ),
            }
        }
    }

    fn finish(self) -> Config {
        let mut config = self.config;
        config.led_executable = match self.setleds {
            Some(path) if !path.is_empty() => path,
            _ => DEFAULT_SETLEDS_PATH.to_string(),
        };

        for (i, device) in config.devices.iter().enumerate() {
            log::debug!(
                "Device {}: VID=0x{:04x}, PID=0x{:04x}, target='{}'",
                i,
                device.vendor_id,
                device.product_id,
                device.target
            );
            for (j, binding) in device.bindings.iter().enumerate() {
                log::debug!(
                    "  Binding {}: keycode=0x{:04x}, led={}, mode={}",
                    j,
                    binding.keycode,
                    binding.led,
                    binding.mode
                );
            }
        }

        config
    }
}

impl Config {
    /// Parse a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading configuration from: {}", path.display());

        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_error)?;
        Self::parse(BufReader::new(file)).map_err(io_error)
    }

    /// Parse configuration text. Unrecognised lines are ignored.
    pub fn from_text(content: &str) -> Self {
        let mut builder = ConfigBuilder::new();
        for line in content.lines() {
            builder.feed(line);
        }
        builder.finish()
    }

    /// Parse configuration from a reader
    ///
    /// Only I/O failures (including invalid UTF-8) are errors; malformed
    /// lines are skipped.
    pub fn parse<R: BufRead>(source: R) -> std::io::Result<Self> {
        let mut builder = ConfigBuilder::new();
        for line in source.lines() {
            builder.feed(&line?);
        }
        Ok(builder.finish())
    }

    /// Check the minimal requirements for running the daemon
    pub fn validate(&self) -> Result<(), ConfigIncomplete> {
        if self.monitored_keycodes.is_empty() {
            return Err(ConfigIncomplete::NoMonitoredKeycodes);
        }
        if self.devices.is_empty() {
            return Err(ConfigIncomplete::NoDevices);
        }
        Ok(())
    }

    /// Whether `keycode` is in the monitored allowlist
    pub fn is_monitored(&self, keycode: u16) -> bool {
        self.monitored_keycodes.contains(&keycode)
    }

    /// Total number of bindings across all profiles
    pub fn binding_count(&self) -> usize {
        self.devices.iter().map(|d| d.bindings.len()).sum()
    }
}

fn parse_binding(profile: &mut DeviceProfile, key: &str, value: &str) {
    // Mode character followed by at least one LED name character
    let mut chars = value.chars();
    let Some(mode_char) = chars.next() else {
        return;
    };
    let led = chars.as_str();
    if led.is_empty() {
        return;
    }

    let Some(keycode) = parse_keycode(key) else {
        log::debug!("Ignoring line with non-numeric key: {}", key);
        return;
    };

    let Some(mode) = LedMode::from_char(mode_char) else {
        log::warn!(
            "Ignoring binding {} = {}: unknown mode '{}' (expected ^, + or -)",
            key,
            value,
            mode_char
        );
        return;
    };

    if profile.bindings.len() >= MAX_BINDINGS {
        log::warn!(
            "Ignoring binding {} for {:04x}/{:04x}: limit of {} bindings reached",
            key,
            profile.vendor_id,
            profile.product_id,
            MAX_BINDINGS
        );
        return;
    }

    profile.bindings.push(KeyBinding {
        keycode,
        led: led.to_string(),
        mode,
    });
}

/// Parse a decimal or `0x`-prefixed hexadecimal keycode in `[0, 0xFFFF]`
pub fn parse_keycode(s: &str) -> Option<u16> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u16>().ok()
    }
}

/// Parse a hexadecimal id, with or without `0x`
fn parse_hex_id(s: &str) -> Option<u16> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).ok()
}

/// Parse a `[<vendor>/<product>]` section header
fn parse_device_header(header: &str) -> Option<(u16, u16)> {
    let inner = header.strip_prefix('[')?.strip_suffix(']')?;
    let (vendor, product) = inner.split_once('/')?;
    Some((parse_hex_id(vendor)?, parse_hex_id(product)?))
}

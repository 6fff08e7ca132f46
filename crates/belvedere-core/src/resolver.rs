// Belvedere Key Binding Resolver
// Maps (vendor, product, keycode) to the LED command to run

use std::fmt;

use crate::config::Config;

/// A shell command line built from a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.0
    }
}

/// Resolve the command bound to `keycode` on the given device
///
/// Only the first profile matching the (vendor, product) pair is consulted,
/// and within it the first binding for `keycode`. The command is
/// `<led_executable> <mode><led>` with no quoting.
pub fn resolve(config: &Config, vendor_id: u16, product_id: u16, keycode: u16) -> Option<Command> {
    let profile = config
        .devices
        .iter()
        .find(|profile| profile.matches(vendor_id, product_id))?;

    let binding = profile.bindings.iter().find(|b| b.keycode == keycode)?;

    Some(Command(format!(
        "{} {}{}",
        config.led_executable, binding.mode, binding.led
    )))
}

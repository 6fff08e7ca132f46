// Belvedere Command Execution
// Runs resolved LED commands without waiting on them

use std::io;
use std::process::{Child, Command as Process, Stdio};

use crate::resolver::Command;

/// Shell used to interpret command lines
const SHELL: &str = "/bin/sh";

/// Executes resolved commands
pub trait CommandExecutor {
    /// Start `command`. Must not wait for it to finish.
    fn execute(&mut self, command: &Command) -> io::Result<()>;

    /// Collect finished processes, if the executor tracks any
    fn reap(&mut self) {}
}

/// Spawns each command through `/bin/sh -c`
///
/// Children are kept until they exit and are reaped on a later call to
/// [`CommandExecutor::reap`], so finished processes do not linger as zombies.
#[derive(Debug, Default)]
pub struct ShellExecutor {
    children: Vec<Child>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spawned processes not yet reaped
    pub fn running(&self) -> usize {
        self.children.len()
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&mut self, command: &Command) -> io::Result<()> {
        log::debug!("Executing: {}", command);
        let child = Process::new(SHELL)
            .arg("-c")
            .arg(command.as_str())
            .stdin(Stdio::null())
            .spawn()?;
        self.children.push(child);
        Ok(())
    }

    fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(e) => {
                log::warn!("Failed to poll command {}: {}", child.id(), e);
                false
            }
        });
    }
}

/// Records commands instead of running them
#[derive(Debug, Default, Clone)]
pub struct RecordingExecutor {
    pub commands: Vec<Command>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded command lines in execution order
    pub fn lines(&self) -> Vec<&str> {
        self.commands.iter().map(Command::as_str).collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&mut self, command: &Command) -> io::Result<()> {
        self.commands.push(command.clone());
        Ok(())
    }
}

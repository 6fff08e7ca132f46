// Belvedere Event Loop
// Single-threaded loop multiplexing device polling, config watch, signals and control requests

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::dispatch::Dispatcher;
use crate::exec::CommandExecutor;
use crate::input::{HidBackend, ReportLayout};
use crate::ipc::{ControlCommand, ControlResponse, ControlServer, DEFAULT_SOCKET_PATH};
use crate::reload::{ReloadCoordinator, ReloadTrigger};

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

/// Errors that can occur in the event loop
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("Failed to register signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

/// Runtime knobs of the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Device polling cadence
    pub poll_interval: Duration,
    /// Configuration file watch cadence
    pub watch_interval: Duration,
    /// Byte offset of the keycode inside an input report
    pub keycode_offset: usize,
    /// Control socket location
    pub socket_path: PathBuf,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            watch_interval: Duration::from_secs(1),
            keycode_offset: 0,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// Everything the loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    PollDevices,
    WatchConfig,
    Reload(ReloadTrigger),
    Control,
    Shutdown,
}

/// A periodic timer producing one event
#[derive(Debug)]
struct Interval {
    event: DaemonEvent,
    period: Duration,
    deadline: Instant,
}

impl Interval {
    fn new(event: DaemonEvent, period: Duration, now: Instant) -> Self {
        Self {
            event,
            period,
            deadline: now + period,
        }
    }

    /// Whether the timer fired at `now`; missed periods are skipped, not replayed
    fn fire(&mut self, now: Instant) -> bool {
        if now < self.deadline {
            return false;
        }
        self.deadline += self.period;
        if self.deadline <= now {
            self.deadline = now + self.period;
        }
        true
    }
}

/// The belvedere daemon
///
/// Owns the reload coordinator, the dispatcher and the executor. All state
/// changes happen inside [`Daemon::handle_event`], one event at a time, so a
/// reload is never observed halfway by a dispatch tick.
pub struct Daemon<B: HidBackend, E: CommandExecutor> {
    coordinator: ReloadCoordinator<B>,
    dispatcher: Dispatcher,
    executor: E,
    control: Option<ControlServer>,
    signals: Option<Signals>,
    options: DaemonOptions,
}

impl<B: HidBackend, E: CommandExecutor> Daemon<B, E> {
    pub fn new(coordinator: ReloadCoordinator<B>, executor: E, options: DaemonOptions) -> Self {
        Self {
            coordinator,
            dispatcher: Dispatcher::new(ReportLayout::new(options.keycode_offset)),
            executor,
            control: None,
            signals: None,
            options,
        }
    }

    /// Serve control requests from `server`
    pub fn with_control(mut self, server: ControlServer) -> Self {
        self.control = Some(server);
        self
    }

    /// Listen for SIGHUP (reload) and SIGINT/SIGTERM (shutdown)
    pub fn attach_signals(&mut self) -> EventLoopResult<()> {
        let signals = Signals::new([SIGHUP, SIGINT, SIGTERM]).map_err(EventLoopError::Signals)?;
        self.signals = Some(signals);
        Ok(())
    }

    pub fn coordinator(&self) -> &ReloadCoordinator<B> {
        &self.coordinator
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn options(&self) -> &DaemonOptions {
        &self.options
    }

    /// React to one event
    pub fn handle_event(&mut self, event: DaemonEvent) -> ControlFlow<()> {
        match event {
            DaemonEvent::PollDevices => {
                let (config, devices) = self.coordinator.split_mut();
                self.dispatcher.tick(config, devices, &mut self.executor);
            }
            DaemonEvent::WatchConfig => {
                // Failures are logged by the coordinator; prior state stays
                let _ = self.coordinator.check_source();
            }
            DaemonEvent::Reload(trigger) => {
                let _ = self.coordinator.reload(trigger);
            }
            DaemonEvent::Control => {
                if let Some(server) = self.control.as_mut() {
                    let coordinator = &mut self.coordinator;
                    server.poll(|command| respond(&mut *coordinator, command));
                }
            }
            DaemonEvent::Shutdown => {
                log::info!("Shutting down");
                self.coordinator.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Signals received since the last call, as events
    fn signal_events(&mut self) -> Vec<DaemonEvent> {
        let Some(signals) = self.signals.as_mut() else {
            return Vec::new();
        };
        signals
            .pending()
            .filter_map(|signal| match signal {
                SIGHUP => Some(DaemonEvent::Reload(ReloadTrigger::Signal)),
                SIGINT | SIGTERM => Some(DaemonEvent::Shutdown),
                _ => None,
            })
            .collect()
    }

    /// Run until a shutdown signal arrives
    pub fn run(&mut self) {
        let now = Instant::now();
        let mut timers = [
            Interval::new(DaemonEvent::PollDevices, self.options.poll_interval, now),
            Interval::new(DaemonEvent::WatchConfig, self.options.watch_interval, now),
        ];
        log::info!(
            "Polling {} device(s) every {:?}",
            self.coordinator.devices().len(),
            self.options.poll_interval
        );

        loop {
            for event in self.signal_events() {
                if self.handle_event(event).is_break() {
                    return;
                }
            }

            let now = Instant::now();
            for timer in timers.iter_mut() {
                if timer.fire(now) && self.handle_event(timer.event).is_break() {
                    return;
                }
            }

            if self.control.is_some() {
                let _ = self.handle_event(DaemonEvent::Control);
            }

            if let Some(deadline) = timers.iter().map(|t| t.deadline).min() {
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
        }
    }
}

/// Answer one control request
fn respond<B: HidBackend>(
    coordinator: &mut ReloadCoordinator<B>,
    command: ControlCommand,
) -> ControlResponse {
    match command {
        ControlCommand::Status => {
            let summary = coordinator.summary();
            ControlResponse::ok(format!(
                "Belvedere is running with {} configured device(s), {} open",
                summary.devices_configured, summary.devices_open
            ))
        }
        ControlCommand::Reload => match coordinator.reload(ReloadTrigger::Control) {
            Ok(_) => ControlResponse::ok("Configuration reloaded"),
            Err(_) => ControlResponse::error("Failed to reload configuration"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLocator;
    use crate::exec::RecordingExecutor;
    use crate::input::MockHidBackend;
    use std::fs;

    const CONFIG: &str = "[general]\nmonitored_keycodes = 3\n[1/1]\n3 = +caps\n";

    fn daemon(
        dir: &tempfile::TempDir,
        backend: &MockHidBackend,
    ) -> Daemon<MockHidBackend, RecordingExecutor> {
        let path = dir.path().join("config");
        fs::write(&path, CONFIG).unwrap();
        let coordinator =
            ReloadCoordinator::start(ConfigLocator::explicit(path), backend.clone()).unwrap();
        Daemon::new(coordinator, RecordingExecutor::new(), DaemonOptions::default())
    }

    #[test]
    fn test_default_options() {
        let options = DaemonOptions::default();
        assert_eq!(options.poll_interval, Duration::from_millis(10));
        assert_eq!(options.watch_interval, Duration::from_secs(1));
        assert_eq!(options.keycode_offset, 0);
        assert_eq!(options.socket_path, PathBuf::from("/tmp/belvedere.sock"));
    }

    #[test]
    fn test_interval_skips_missed_periods() {
        let start = Instant::now();
        let mut timer = Interval::new(DaemonEvent::PollDevices, Duration::from_millis(10), start);
        assert!(!timer.fire(start));
        assert!(timer.fire(start + Duration::from_millis(10)));
        assert!(!timer.fire(start + Duration::from_millis(15)));
        assert!(timer.fire(start + Duration::from_millis(100)));
        assert_eq!(timer.deadline, start + Duration::from_millis(110));
    }

    #[test]
    fn test_poll_event_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        let mut daemon = daemon(&dir, &backend);

        backend.push_report(1, 1, &[3]);
        assert!(daemon.handle_event(DaemonEvent::PollDevices).is_continue());
        assert_eq!(daemon.executor().commands.len(), 1);
    }

    #[test]
    fn test_control_status_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        let mut daemon = daemon(&dir, &backend);

        let status = respond(&mut daemon.coordinator, ControlCommand::Status);
        assert_eq!(
            status,
            ControlResponse::ok("Belvedere is running with 1 configured device(s), 1 open")
        );

        let reload = respond(&mut daemon.coordinator, ControlCommand::Reload);
        assert_eq!(reload, ControlResponse::ok("Configuration reloaded"));

        fs::write(dir.path().join("config"), "garbage\n").unwrap();
        let reload = respond(&mut daemon.coordinator, ControlCommand::Reload);
        assert_eq!(reload, ControlResponse::error("Failed to reload configuration"));
        assert_eq!(daemon.coordinator().summary().devices_open, 1);
    }

    #[test]
    fn test_shutdown_closes_devices() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockHidBackend::new();
        backend.attach(1, 1);
        let mut daemon = daemon(&dir, &backend);
        assert_eq!(backend.open_handle_count(), 1);

        assert!(daemon.handle_event(DaemonEvent::Shutdown).is_break());
        assert_eq!(backend.open_handle_count(), 0);
    }
}

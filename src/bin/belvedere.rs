// Belvedere CLI
// Runs the HID key-press to LED command daemon and its one-shot modes

#![cfg_attr(not(feature = "daemon"), allow(dead_code))]

#[cfg(feature = "daemon")]
use std::path::PathBuf;
#[cfg(feature = "daemon")]
use std::process::ExitCode;
#[cfg(feature = "daemon")]
use std::time::Duration;

#[cfg(feature = "daemon")]
use anyhow::Context;
#[cfg(feature = "daemon")]
use clap::Parser;

#[cfg(feature = "daemon")]
use belvedere_core::config::{Config, ConfigLocator};
#[cfg(feature = "daemon")]
use belvedere_core::event::{Daemon, DaemonOptions};
#[cfg(feature = "daemon")]
use belvedere_core::exec::ShellExecutor;
#[cfg(feature = "daemon")]
use belvedere_core::input::{profile_for, HidApiBackend, HidBackend};
#[cfg(feature = "daemon")]
use belvedere_core::ipc::{send_command, ControlServer, DEFAULT_SOCKET_PATH};
#[cfg(feature = "daemon")]
use belvedere_core::reload::ReloadCoordinator;

/// HID key-press to LED command daemon
#[cfg(feature = "daemon")]
#[derive(Parser, Debug)]
#[command(name = "belvedere")]
#[command(version)]
#[command(about = "Runs LED commands when bound keys are pressed on HID devices", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Load the configuration, open devices and exit
    #[arg(long)]
    reload: bool,

    /// Configuration file (default: XDG/home/system search path)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// List attached HID devices
    #[arg(long)]
    list_devices: bool,

    /// Send a command (status, reload) to the running daemon
    #[arg(long, value_name = "CMD")]
    control: Option<String>,

    /// Control socket path
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Device polling interval
    #[arg(long, value_name = "MS", default_value_t = 10)]
    poll_interval_ms: u64,

    /// Configuration file watch interval
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    watch_interval_ms: u64,

    /// Byte offset of the keycode inside an input report
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    keycode_offset: usize,
}

#[cfg(feature = "daemon")]
impl Args {
    fn daemon_options(&self) -> DaemonOptions {
        DaemonOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            watch_interval: Duration::from_millis(self.watch_interval_ms.max(1)),
            keycode_offset: self.keycode_offset,
            socket_path: self.socket.clone(),
        }
    }
}

/// Main application state
#[cfg(feature = "daemon")]
struct Application {
    args: Args,
}

#[cfg(feature = "daemon")]
impl Application {
    fn new(args: Args) -> Self {
        Self { args }
    }

    fn locator(&self) -> ConfigLocator {
        ConfigLocator::from_env(self.args.config.clone())
    }

    /// Send one control request and print the reply
    fn control(&self, command: &str) -> anyhow::Result<ExitCode> {
        let response = send_command(&self.args.socket, command)
            .context("Is the belvedere daemon running?")?;
        if response.ok {
            println!("{}", response.message);
            Ok(ExitCode::SUCCESS)
        } else {
            eprintln!("{}", response.message);
            Ok(ExitCode::FAILURE)
        }
    }

    /// Validate configuration and print what it declares
    fn check_config(&self) -> anyhow::Result<ExitCode> {
        let path = self.locator().locate()?;
        let config = Config::load(&path)?;
        if let Err(e) = config.validate() {
            eprintln!("{}: {}", path.display(), e);
            return Ok(ExitCode::FAILURE);
        }

        println!("Configuration is valid: {}", path.display());
        println!("  setleds = {}", config.led_executable);
        let keycodes: Vec<String> = config
            .monitored_keycodes
            .iter()
            .map(|k| format!("{:#06x}", k))
            .collect();
        println!("  monitored_keycodes = {}", keycodes.join(", "));
        for device in &config.devices {
            println!(
                "  [{:04x}/{:04x}] target = {} ({} binding(s))",
                device.vendor_id,
                device.product_id,
                device.target,
                device.bindings.len()
            );
            for binding in &device.bindings {
                println!("    {:#06x} = {}{}", binding.keycode, binding.mode, binding.led);
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    /// List attached HID devices, marking configured ones
    fn list_devices(&self) -> anyhow::Result<ExitCode> {
        let mut backend = HidApiBackend::new().context("Failed to initialise hidapi")?;
        let devices = backend.enumerate()?;

        // The listing is still useful without a configuration
        let config = self
            .locator()
            .locate()
            .ok()
            .and_then(|path| Config::load(path).ok());

        println!("Found {} HID device(s):", devices.len());
        for device in &devices {
            match config.as_ref().and_then(|c| profile_for(c, device)) {
                Some(profile) => println!("  {} [configured, target = {}]", device, profile.target),
                None => println!("  {}", device),
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    /// Load configuration and open devices once
    fn reload_once(&self) -> ExitCode {
        let result = HidApiBackend::new()
            .map_err(anyhow::Error::from)
            .and_then(|backend| Ok(ReloadCoordinator::start(self.locator(), backend)?));
        match result {
            Ok(_) => {
                println!("Configuration reloaded successfully.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("{:#}", e);
                eprintln!("Failed to reload configuration.");
                ExitCode::FAILURE
            }
        }
    }

    /// Run the daemon until SIGINT/SIGTERM
    fn run(&self) -> anyhow::Result<ExitCode> {
        let options = self.args.daemon_options();
        let backend = HidApiBackend::new().context("Failed to initialise hidapi")?;
        let coordinator = ReloadCoordinator::start(self.locator(), backend)
            .context("Failed to load configuration")?;

        let mut daemon = Daemon::new(coordinator, ShellExecutor::new(), options.clone());
        match ControlServer::bind(&options.socket_path) {
            Ok(server) => daemon = daemon.with_control(server),
            Err(e) => log::warn!("Control channel disabled: {}", e),
        }
        daemon
            .attach_signals()
            .context("Failed to set up signal handling")?;

        daemon.run();
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(feature = "daemon")]
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

#[cfg(feature = "daemon")]
fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let app = Application::new(args);

    if let Some(command) = app.args.control.as_deref() {
        return app.control(command);
    }
    if app.args.list_devices {
        return app.list_devices();
    }
    if app.args.check_config {
        return app.check_config();
    }
    if app.args.reload {
        return Ok(app.reload_once());
    }

    app.run()
}

// Stub for when the daemon feature is not enabled
#[cfg(not(feature = "daemon"))]
fn main() {
    eprintln!("Error: belvedere binary requires the 'daemon' feature to be enabled.");
    eprintln!("Please build with: cargo build --release --features daemon --bin belvedere");
    std::process::exit(1);
}

// Belvedere Reload Coordinator
// Owns the committed configuration and open devices, and swaps them on reload

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use strum_macros::Display;

use crate::config::{Config, ConfigError, ConfigLocator};
use crate::input::HidBackend;
use crate::reconcile::{DeviceReconciler, DeviceSet};

/// What asked for a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReloadTrigger {
    Startup,
    FileWatch,
    Signal,
    Control,
}

/// Reload errors
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of a committed load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub devices_configured: usize,
    pub devices_open: usize,
}

/// The file the committed configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchedSource {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl WatchedSource {
    fn observe(path: PathBuf) -> Self {
        let modified = modified_time(&path);
        Self { path, modified }
    }

    /// Whether `other` is a newer source than `self`
    fn is_superseded_by(&self, other: &WatchedSource) -> bool {
        if self.path != other.path {
            return true;
        }
        match (self.modified, other.modified) {
            (Some(old), Some(new)) => new > old,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A validated configuration ready to commit
struct Loaded {
    source: WatchedSource,
    config: Config,
}

/// Coordinates configuration loads and device reconciliation
///
/// The configuration and the open-device set only change together, inside
/// [`ReloadCoordinator::reload`]. A failed load leaves both untouched.
pub struct ReloadCoordinator<B: HidBackend> {
    locator: ConfigLocator,
    config: Arc<Config>,
    reconciler: DeviceReconciler<B>,
    watched: WatchedSource,
}

impl<B: HidBackend> ReloadCoordinator<B> {
    /// Load the initial configuration and open its devices
    ///
    /// Failure here is fatal to the daemon.
    pub fn start(locator: ConfigLocator, backend: B) -> Result<Self, ReloadError> {
        let Loaded { source, config } = load_validated(&locator)?;
        let mut coordinator = Self {
            locator,
            config: Arc::new(config),
            reconciler: DeviceReconciler::new(backend),
            watched: source,
        };
        coordinator.reconciler.reconcile(&coordinator.config);

        let summary = coordinator.summary();
        log::info!(
            "Configuration loaded from {} ({}): {} device(s) configured, {} open",
            coordinator.watched.path.display(),
            ReloadTrigger::Startup,
            summary.devices_configured,
            summary.devices_open
        );
        Ok(coordinator)
    }

    /// The committed configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn devices(&self) -> &DeviceSet<B::Device> {
        self.reconciler.devices()
    }

    /// Committed configuration and open devices, for one dispatch tick
    pub fn split_mut(&mut self) -> (&Config, &mut DeviceSet<B::Device>) {
        (&*self.config, self.reconciler.devices_mut())
    }

    /// Path of the committed configuration file
    pub fn source_path(&self) -> &Path {
        &self.watched.path
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.reconciler.backend_mut()
    }

    pub fn summary(&self) -> ReloadSummary {
        ReloadSummary {
            devices_configured: self.config.devices.len(),
            devices_open: self.reconciler.devices().len(),
        }
    }

    /// Re-read the configuration and reconcile devices unconditionally
    pub fn reload(&mut self, trigger: ReloadTrigger) -> Result<ReloadSummary, ReloadError> {
        log::debug!("Reloading configuration ({})", trigger);

        let Loaded { source, config } = match load_validated(&self.locator) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("Failed to reload configuration ({}): {}", trigger, e);
                return Err(e);
            }
        };

        self.config = Arc::new(config);
        self.watched = source;
        self.reconciler.reconcile(&self.config);

        let summary = self.summary();
        log::info!(
            "Configuration reloaded from {} ({}): {} device(s) configured, {} open",
            self.watched.path.display(),
            trigger,
            summary.devices_configured,
            summary.devices_open
        );
        Ok(summary)
    }

    /// Reload if the configuration source changed since the last check
    ///
    /// A change is a newer modification time on the committed file, or a
    /// different file winning the search. The observation is recorded before
    /// reloading, so a broken file is not re-parsed until it changes again.
    pub fn check_source(&mut self) -> Option<Result<ReloadSummary, ReloadError>> {
        let path = self.locator.locate().ok()?;
        let observed = WatchedSource::observe(path);
        if !self.watched.is_superseded_by(&observed) {
            return None;
        }

        log::debug!("Configuration source changed: {}", observed.path.display());
        self.watched = observed;
        Some(self.reload(ReloadTrigger::FileWatch))
    }

    /// Close every open device
    pub fn shutdown(&mut self) {
        self.reconciler.close_all();
    }
}

/// Locate, parse and sanity-check the configuration
fn load_validated(locator: &ConfigLocator) -> Result<Loaded, ReloadError> {
    let path = locator.locate()?;
    // Taken before parsing so an edit racing the read is seen next check
    let source = WatchedSource::observe(path);
    let config = Config::load(&source.path)?;
    config.validate().map_err(ConfigError::from)?;
    Ok(Loaded { source, config })
}

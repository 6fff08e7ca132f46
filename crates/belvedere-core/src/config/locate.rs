// Belvedere Config Locator
// Resolves which configuration file a load reads

use std::path::{Path, PathBuf};

use super::parser::ConfigError;

/// Directory name under the XDG/home config roots
const APP_DIR: &str = "belvedere";

/// System-wide fallback
pub const SYSTEM_CONFIG_PATH: &str = "/etc/belvedere/config";

/// Resolves the configuration source
///
/// An explicit path always wins. Otherwise the candidates are tried in order:
/// `$XDG_CONFIG_HOME/belvedere/config`, `$HOME/.config/belvedere/config`,
/// `/etc/belvedere/config`. The first existing file is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocator {
    explicit: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    system: PathBuf,
}

impl ConfigLocator {
    /// Build a locator from the process environment
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self::from_lookup(
            explicit,
            std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
            dirs::home_dir(),
        )
    }

    /// Build a locator from looked-up roots; empty roots count as unset
    fn from_lookup(
        explicit: Option<PathBuf>,
        xdg_config_home: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> Self {
        let xdg_config_home = xdg_config_home.filter(|p| !p.as_os_str().is_empty());
        let home = home.filter(|p| !p.as_os_str().is_empty());

        if explicit.is_none() && home.is_none() {
            log::error!("Failed to retrieve HOME directory");
        }

        Self {
            explicit,
            xdg_config_home,
            home,
            system: PathBuf::from(SYSTEM_CONFIG_PATH),
        }
    }

    /// Whether the home directory could not be determined
    pub fn home_missing(&self) -> bool {
        self.home.is_none()
    }

    /// Build a locator with every root given explicitly
    pub fn with_roots(
        xdg_config_home: Option<PathBuf>,
        home: Option<PathBuf>,
        system: impl Into<PathBuf>,
    ) -> Self {
        Self {
            explicit: None,
            xdg_config_home,
            home,
            system: system.into(),
        }
    }

    /// Locator that always answers with `path`
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: Some(path.into()),
            xdg_config_home: None,
            home: None,
            system: PathBuf::from(SYSTEM_CONFIG_PATH),
        }
    }

    /// Candidate paths in priority order
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.explicit {
            return vec![path.clone()];
        }

        let mut candidates = Vec::with_capacity(3);
        if let Some(xdg) = &self.xdg_config_home {
            candidates.push(xdg.join(APP_DIR).join("config"));
        }
        if let Some(home) = &self.home {
            candidates.push(home.join(".config").join(APP_DIR).join("config"));
        }
        candidates.push(self.system.clone());
        candidates
    }

    /// Find the configuration file to read
    pub fn locate(&self) -> Result<PathBuf, ConfigError> {
        let candidates = self.candidates();
        match candidates.iter().find(|p| is_file(p)) {
            Some(path) => Ok(path.clone()),
            None => Err(ConfigError::NotFound {
                searched: candidates,
            }),
        }
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[general]\n").unwrap();
        path
    }

    #[test]
    fn test_xdg_wins_over_home_and_system() {
        let xdg = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        let xdg_config = write_config(xdg.path(), "belvedere/config");
        write_config(home.path(), ".config/belvedere/config");
        let system_config = write_config(system.path(), "config");

        let locator = ConfigLocator::with_roots(
            Some(xdg.path().to_path_buf()),
            Some(home.path().to_path_buf()),
            system_config,
        );
        assert_eq!(locator.locate().unwrap(), xdg_config);
    }

    #[test]
    fn test_home_used_when_xdg_missing() {
        let xdg = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let home_config = write_config(home.path(), ".config/belvedere/config");

        let locator = ConfigLocator::with_roots(
            Some(xdg.path().to_path_buf()),
            Some(home.path().to_path_buf()),
            "/nonexistent/belvedere/config",
        );
        assert_eq!(locator.locate().unwrap(), home_config);
    }

    #[test]
    fn test_system_fallback() {
        let system = tempfile::tempdir().unwrap();
        let system_config = write_config(system.path(), "config");

        let locator = ConfigLocator::with_roots(None, None, system_config.clone());
        assert_eq!(locator.locate().unwrap(), system_config);
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let home = tempfile::tempdir().unwrap();
        let locator = ConfigLocator::with_roots(
            None,
            Some(home.path().to_path_buf()),
            "/nonexistent/belvedere/config",
        );

        match locator.locate() {
            Err(ConfigError::NotFound { searched }) => {
                assert_eq!(searched.len(), 2);
                assert_eq!(searched[0], home.path().join(".config/belvedere/config"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_home_falls_back_to_system() {
        let locator = ConfigLocator::from_lookup(None, None, None);
        assert!(locator.home_missing());
        assert_eq!(
            locator.candidates(),
            vec![PathBuf::from(SYSTEM_CONFIG_PATH)]
        );

        // An empty HOME is the same as none
        let locator = ConfigLocator::from_lookup(None, Some(PathBuf::new()), Some(PathBuf::new()));
        assert!(locator.home_missing());
        assert_eq!(locator.candidates().len(), 1);
    }

    #[test]
    fn test_missing_home_with_explicit_path() {
        let locator = ConfigLocator::from_lookup(Some(PathBuf::from("/tmp/explicit.conf")), None, None);
        assert!(locator.home_missing());
        assert_eq!(locator.candidates(), vec![PathBuf::from("/tmp/explicit.conf")]);
    }

    #[test]
    fn test_explicit_path_skips_search() {
        let locator = ConfigLocator::explicit("/nonexistent/explicit.conf");
        assert_eq!(
            locator.candidates(),
            vec![PathBuf::from("/nonexistent/explicit.conf")]
        );
        assert!(matches!(locator.locate(), Err(ConfigError::NotFound { .. })));
    }
}

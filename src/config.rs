//! User configuration loaded from `~/.config/agent-beacon/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BeaconError, Result};
use crate::records::SessionDir;
use crate::registry::RegistrySettings;
use crate::status::Thresholds;

/// Overrides the session directory from the environment
pub const SESSION_DIR_ENV: &str = "AGENT_BEACON_DIR";

const MIN_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session_dir: Option<PathBuf>,
    /// Executable name searched for on a terminal when no pid is known
    pub agent_process_name: String,
    pub refresh_interval_ms: u64,
    pub liveness_interval_ms: u64,
    /// Deadline for every external command (`ps`, `git`, `tmux`)
    pub process_timeout_ms: u64,
    pub watch_debounce_ms: u64,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_dir: None,
            agent_process_name: "claude".to_string(),
            refresh_interval_ms: 2000,
            liveness_interval_ms: 7000,
            process_timeout_ms: 2000,
            watch_debounce_ms: 150,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    /// Load the user config, falling back to defaults when the file is
    /// missing, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        if let Some(dir) = std::env::var_os(SESSION_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.session_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("agent-beacon").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BeaconError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| BeaconError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn session_dir(&self) -> SessionDir {
        SessionDir::new(
            self.session_dir
                .clone()
                .unwrap_or_else(SessionDir::default_root),
        )
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms.max(1))
    }

    /// Intervals are clamped so a typo cannot turn the worker into a busy loop.
    pub fn registry_settings(&self) -> RegistrySettings {
        let refresh = self.refresh_interval_ms.max(MIN_INTERVAL_MS);
        RegistrySettings {
            thresholds: self.thresholds,
            refresh_interval: Duration::from_millis(refresh),
            liveness_interval: Duration::from_millis(self.liveness_interval_ms.max(refresh)),
            watch_debounce: Duration::from_millis(self.watch_debounce_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_match_registry_defaults() {
        assert_eq!(Config::default().registry_settings(), RegistrySettings::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
session_dir = "/tmp/beacon"
refresh_interval_ms = 1000

[thresholds]
cleanup = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session_dir().root(), Path::new("/tmp/beacon"));
        assert_eq!(config.refresh_interval_ms, 1000);
        assert_eq!(config.liveness_interval_ms, 7000);
        assert_eq!(config.agent_process_name, "claude");
        assert_eq!(config.thresholds.cleanup, Duration::from_secs(60));
        assert_eq!(config.thresholds.think_stale, Duration::from_secs(12));
    }

    #[test]
    fn test_intervals_clamped() {
        let config = Config {
            refresh_interval_ms: 0,
            liveness_interval_ms: 10,
            ..Config::default()
        };
        let settings = config.registry_settings();
        assert_eq!(settings.refresh_interval, Duration::from_millis(MIN_INTERVAL_MS));
        assert_eq!(settings.liveness_interval, Duration::from_millis(MIN_INTERVAL_MS));
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "refresh_interval_ms = \"fast\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, BeaconError::ConfigParse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}

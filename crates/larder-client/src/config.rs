//! RON-backed client configuration.
//!
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```ron
//! (
//!     coordinator: (mutation_timeout_ms: 15000, rebalance_on_exhaustion: true),
//!     sync: (initial_backoff_ms: 1000, max_backoff_ms: 30000, max_attempts: None, jitter: 0.2),
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_BACKOFF_JITTER, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF,
    DEFAULT_MUTATION_TIMEOUT,
};

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LarderConfig {
    pub coordinator: CoordinatorConfig,
    pub sync: SyncConfig,
}

/// Optimistic mutation coordinator settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub mutation_timeout_ms: u64,
    /// Renumber the destination group when a move runs out of key room.
    pub rebalance_on_exhaustion: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mutation_timeout_ms: DEFAULT_MUTATION_TIMEOUT.as_millis() as u64,
            rebalance_on_exhaustion: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}

/// Sync channel reconnect settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub jitter: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF.as_millis() as u64,
            max_backoff_ms: DEFAULT_MAX_BACKOFF.as_millis() as u64,
            max_attempts: None,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl LarderConfig {
    /// `<config dir>/larder/larder.ron`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("larder").join(CONFIG_FILE_NAME))
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Load `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LarderConfig::default();
        assert_eq!(config.coordinator.mutation_timeout(), Duration::from_secs(15));
        assert!(config.coordinator.rebalance_on_exhaustion);
        assert_eq!(config.sync.max_attempts, None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = LarderConfig::from_ron_str("(coordinator: (mutation_timeout_ms: 250))").unwrap();
        assert_eq!(config.coordinator.mutation_timeout(), Duration::from_millis(250));
        assert!(config.coordinator.rebalance_on_exhaustion);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = LarderConfig::from_ron_str("(coordinator: oops").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.ron");

        let mut config = LarderConfig::default();
        config.sync.max_attempts = Some(5);
        config.coordinator.rebalance_on_exhaustion = false;
        std::fs::write(&path, config.to_ron_string().unwrap()).unwrap();

        assert_eq!(LarderConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ron");
        assert_eq!(LarderConfig::load_or_default(&path).unwrap(), LarderConfig::default());
        assert!(matches!(LarderConfig::load(&path), Err(ConfigError::Io { .. })));
    }
}

//! # Configuration
//!
//! Runtime knobs for the stores, loaded with [`confique`].
//!
//! This is *not* the user-facing application settings (those live in
//! [`crate::settings`] and are edited through the UI). These are deployment
//! parameters: where data lives and how often it is flushed.
//!
//! ## Resolution Order
//!
//! 1. **Environment variables**: `PEERVAULT_DATA_DIR`, `PEERVAULT_AUTOSAVE_INTERVAL_SECS`, ...
//! 2. **Config file**: an optional `peervault.toml` passed to [`VaultConfig::load`].
//! 3. **Compiled defaults**: via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `data_dir` | OS data dir (via `directories`) | Where collection, settings and backup files live |
//! | `autosave_interval_secs` | `300` | Period of the background flush |
//! | `retention_days` | `30` | Age after which nodes, peers and transfers are evicted |

use crate::error::{Result, VaultError};
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "peervault.toml";
pub const DEFAULT_AUTOSAVE_SECS: u64 = 300;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Directory holding the collection files, settings and backups.
    /// When absent, the OS data directory for the app is used.
    #[config(env = "PEERVAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds between background flushes.
    #[config(default = 300, env = "PEERVAULT_AUTOSAVE_INTERVAL_SECS")]
    pub autosave_interval_secs: u64,

    /// Records older than this many days are removed by cleanup.
    #[config(default = 30, env = "PEERVAULT_RETENTION_DAYS")]
    pub retention_days: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            autosave_interval_secs: DEFAULT_AUTOSAVE_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl VaultConfig {
    /// Load from the environment, then `file` (if given and present), then defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = VaultConfig::builder().env();
        if let Some(file) = file {
            builder = builder.file(file);
        }
        builder.load().map_err(VaultError::Config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// The configured data directory, or the platform default.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("com", "peervault", "peervault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| VaultError::Store("Could not determine data directory".to_string()))
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.autosave_interval(), Duration::from_secs(300));
        assert_eq!(config.retention(), chrono::Duration::days(30));
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let config = VaultConfig::default().with_data_dir("/tmp/vault");
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/vault"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &file,
            "autosave_interval_secs = 60\nretention_days = 7\ndata_dir = \"/srv/vault\"\n",
        )
        .unwrap();

        let config = VaultConfig::load(Some(&file)).unwrap();
        assert_eq!(config.autosave_interval_secs, 60);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/vault")));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = VaultConfig {
            autosave_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.autosave_interval(), Duration::from_secs(1));
    }
}

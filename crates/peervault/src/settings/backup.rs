//! Settings backup files: naming, envelope format, listing and rotation.
//!
//! Backups live in one directory and are named after the instant they were taken:
//!
//! ```text
//! backups/
//! ├── settings-backup-2026-10-19T08-30-00-000Z.json
//! └── settings-backup-2026-10-19T08-30-00-000Z_001.json   // same instant, second backup
//! ```
//!
//! Files are written once and never modified. Rotation keeps the newest `maxBackupFiles` by
//! modification time; files with equal times are ordered by name, which sorts chronologically.
//!
//! Backup and export files share one envelope. Files from older versions hold the bare
//! settings object, which [`payload_from`] also accepts.

use crate::error::{Result, VaultError};
use crate::settings::schema::Settings;
use crate::store::{FsBackend, StorageBackend};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BACKUP_PREFIX: &str = "settings-backup-";
pub const BACKUP_EXTENSION: &str = ".json";
pub const ENVELOPE_VERSION: u32 = 1;

/// Settings plus the metadata describing where and when they were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub app_version: String,
    pub settings: Map<String, Value>,
}

impl Envelope {
    fn new(settings: &Settings) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            created_at: None,
            exported_at: None,
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            settings: settings.to_map(),
        }
    }

    pub fn backup(settings: &Settings, now: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(now),
            ..Self::new(settings)
        }
    }

    pub fn export(settings: &Settings, now: DateTime<Utc>) -> Self {
        Self {
            exported_at: Some(now),
            ..Self::new(settings)
        }
    }
}

/// One backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}{}{}", BACKUP_PREFIX, stamp, BACKUP_EXTENSION)
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXTENSION)
}

/// First free path for a backup taken at `now`.
fn unique_backup_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let base = backup_file_name(now);
    let candidate = dir.join(&base);
    if !candidate.exists() {
        return candidate;
    }
    let stem = base.trim_end_matches(BACKUP_EXTENSION);
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{:03}{}", stem, n, BACKUP_EXTENSION));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Write `envelope` to `path` as pretty JSON, replacing the file atomically.
pub fn write_envelope(path: &Path, envelope: &Envelope) -> Result<()> {
    let content = serde_json::to_string_pretty(envelope).map_err(VaultError::Serialization)?;
    FsBackend::new(path).write(&content)
}

/// Write a new backup of `settings` into `dir`.
pub fn write_backup(dir: &Path, settings: &Settings, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(VaultError::Io)?;
    let path = unique_backup_path(dir, now);
    write_envelope(&path, &Envelope::backup(settings, now))?;
    info!("Settings backup written to {}", path.display());
    Ok(path)
}

/// Backups in `dir`, newest first. A missing directory has no backups.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupInfo>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(VaultError::Io(e)),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(VaultError::Io)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_backup_name(&file_name) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping backup {}: {}", file_name, e);
                continue;
            }
        };
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        backups.push(BackupInfo {
            path: entry.path(),
            file_name,
            modified,
            size: metadata.len(),
        });
    }

    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    Ok(backups)
}

/// Delete every backup beyond the `keep` newest. Returns the removed paths.
pub fn rotate(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for stale in list_backups(dir)?.into_iter().skip(keep) {
        match fs::remove_file(&stale.path) {
            Ok(()) => {
                debug!("Removed old backup {}", stale.file_name);
                removed.push(stale.path);
            }
            Err(e) => warn!("Could not remove old backup {}: {}", stale.path.display(), e),
        }
    }
    if !removed.is_empty() {
        info!("Rotated {} old settings backup(s)", removed.len());
    }
    Ok(removed)
}

/// The settings object inside a backup or export document.
pub fn payload_from(value: Value) -> Result<Map<String, Value>> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(VaultError::InvalidImport(format!(
                "expected a JSON object, got {}",
                crate::cache::json_kind(&other)
            )))
        }
    };

    match map.remove("settings") {
        Some(Value::Object(settings)) => Ok(settings),
        // Not an envelope: a bare settings object from an older version
        Some(other) => {
            map.insert("settings".to_string(), other);
            Ok(map)
        }
        None => Ok(map),
    }
}

/// Read and parse the settings object stored at `path`.
pub fn read_payload(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(VaultError::Io)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| VaultError::InvalidImport(format!("{}: {}", path.display(), e)))?;
    payload_from(value)
}

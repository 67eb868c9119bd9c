use crate::cache::{stored_pairs, Document, DurableCache, LoadOutcome};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::settings::backup::{self, BackupInfo, Envelope};
use crate::settings::hooks;
use crate::settings::schema::{
    defaults, Category, Reconciled, SettingKey, SettingMetadata, Settings,
};
use crate::settings::validate::{self, ValidationReport};
use crate::store::{FsBackend, StorageBackend};
use crate::task::PeriodicTask;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const SETTINGS_FILE: &str = "settings.json";
pub const BACKUP_DIR: &str = "backups";

impl Document for Settings {
    fn from_stored(value: Value) -> Result<Self> {
        let (settings, outcome) = Settings::reconcile(defaults(), stored_pairs(value)?);
        if !outcome.rejected.is_empty() {
            warn!(
                "{} stored setting(s) were invalid and reset to defaults",
                outcome.rejected.len()
            );
        }
        Ok(settings)
    }

    fn fallback() -> Self {
        defaults().clone()
    }

    fn persist_fallback() -> bool {
        true
    }

    fn entry_count(&self) -> usize {
        SettingKey::ALL.len()
    }
}

/// Outcome of restoring or importing a settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub source: PathBuf,
    #[serde(flatten)]
    pub keys: Reconciled,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.keys.rejected.is_empty()
    }
}

/// State shared with the backup scheduler thread.
struct Shared<B: StorageBackend> {
    cache: DurableCache<Settings, B>,
    backup_dir: PathBuf,
}

impl<B: StorageBackend> Shared<B> {
    fn create_backup(&self) -> Result<PathBuf> {
        let settings = self.cache.read(Settings::clone);
        let path = backup::write_backup(&self.backup_dir, &settings, Utc::now())?;
        if let Err(e) = backup::rotate(&self.backup_dir, settings.max_backup_files as usize) {
            warn!("Backup rotation failed: {}", e);
        }
        Ok(path)
    }
}

/// The user's application settings, validated and persisted, with rotating backups.
pub struct SettingsStore<B: StorageBackend = FsBackend> {
    shared: Arc<Shared<B>>,
    scheduler: Mutex<Option<PeriodicTask>>,
    scheduler_requested: AtomicBool,
    shut_down: AtomicBool,
}

impl SettingsStore<FsBackend> {
    /// Open `settings.json` under the configured data directory, backups alongside, and start
    /// the backup scheduler.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let store = Self::with_backend(
            FsBackend::new(data_dir.join(SETTINGS_FILE)),
            data_dir.join(BACKUP_DIR),
        );
        store.start_backup_scheduler()?;
        info!("Settings store opened at {}", data_dir.display());
        Ok(store)
    }
}

impl<B: StorageBackend> SettingsStore<B> {
    /// Build a store over an arbitrary backend. The backup scheduler is not started.
    pub fn with_backend(backend: B, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache: DurableCache::open("settings", backend),
                backup_dir: backup_dir.into(),
            }),
            scheduler: Mutex::new(None),
            scheduler_requested: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        self.shared.cache.load_outcome()
    }

    pub fn backup_dir(&self) -> &Path {
        &self.shared.backup_dir
    }

    // --- Reads ---

    /// Current value of `key`, or `None` if it is not a setting.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = key.parse::<SettingKey>().ok()?;
        Some(self.shared.cache.read(|s| s.value(key)))
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Typed copy of the live settings.
    pub fn settings(&self) -> Settings {
        self.shared.cache.read(Settings::clone)
    }

    pub fn get_all(&self) -> Map<String, Value> {
        self.shared.cache.read(Settings::to_map)
    }

    /// Values of the settings in `category`, in display order.
    pub fn settings_by_category(&self, category: &str) -> Result<Vec<(SettingKey, Value)>> {
        let category: Category = category.parse()?;
        Ok(self.shared.cache.read(|s| {
            category
                .keys()
                .iter()
                .map(|key| (*key, s.value(*key)))
                .collect()
        }))
    }

    pub fn settings_schema(&self) -> Vec<SettingMetadata> {
        SettingKey::ALL
            .into_iter()
            .map(|key| SettingMetadata::for_key(key, defaults()))
            .collect()
    }

    pub fn setting_metadata(&self, key: &str) -> Result<SettingMetadata> {
        let key: SettingKey = key.parse()?;
        Ok(SettingMetadata::for_key(key, defaults()))
    }

    pub fn validation_report(&self) -> ValidationReport {
        self.shared.cache.read(validate::validate_all)
    }

    // --- Writes ---

    /// Validate and store one setting, then save.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let key: SettingKey = key.parse()?;
        validate::validate(key, &value)?;
        self.apply(|current| {
            let mut next = current.clone();
            next.assign(key, &value)?;
            Ok((next, ()))
        })
    }

    /// Store several settings at once. If any key is unknown or invalid nothing is applied.
    pub fn set_multiple(&self, values: Map<String, Value>) -> Result<()> {
        let mut checked = Vec::with_capacity(values.len());
        for (name, value) in values {
            let key: SettingKey = name.parse()?;
            validate::validate(key, &value)?;
            checked.push((key, value));
        }

        self.apply(|current| {
            let mut next = current.clone();
            for (key, value) in &checked {
                next.assign(*key, value)?;
            }
            Ok((next, ()))
        })
    }

    pub fn reset_to_defaults(&self) -> Result<()> {
        self.apply(|_| Ok((defaults().clone(), ())))?;
        info!("Settings reset to defaults");
        Ok(())
    }

    pub fn reset_category(&self, category: &str) -> Result<()> {
        let category: Category = category.parse()?;
        self.apply(|current| {
            let mut next = current.clone();
            for key in category.keys() {
                next.assign(*key, &defaults().value(*key))?;
            }
            Ok((next, ()))
        })?;
        info!("Settings category '{}' reset to defaults", category);
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.shared.cache.save()
    }

    /// Swap in the settings `change` derives from the current ones, run hooks, then save.
    ///
    /// The new state is visible even if the save fails. A running backup scheduler picks up
    /// changes to `autoBackup` and `backupInterval`.
    fn apply<T>(&self, change: impl FnOnce(&Settings) -> Result<(Settings, T)>) -> Result<T> {
        let (old, new, out) = self.shared.cache.write(|current| {
            let (next, out) = change(current)?;
            let old = std::mem::replace(current, next);
            Ok::<_, VaultError>((old, current.clone(), out))
        })?;

        hooks::run_changed(&old, &new);
        self.shared.cache.save()?;

        let reschedule = new
            .changed_keys(&old)
            .iter()
            .any(|k| matches!(k, SettingKey::AutoBackup | SettingKey::BackupInterval));
        if reschedule && self.scheduler_requested.load(Ordering::SeqCst) {
            self.start_backup_scheduler()?;
        }
        Ok(out)
    }

    // --- Backups ---

    /// Snapshot the current settings into a new backup file, then rotate old ones.
    pub fn create_backup(&self) -> Result<PathBuf> {
        self.shared.create_backup()
    }

    pub fn available_backups(&self) -> Result<Vec<BackupInfo>> {
        backup::list_backups(&self.shared.backup_dir)
    }

    /// Delete backups beyond `maxBackupFiles`, oldest first.
    pub fn cleanup_old_backups(&self) -> Result<Vec<PathBuf>> {
        let keep = self.shared.cache.read(|s| s.max_backup_files as usize);
        backup::rotate(&self.shared.backup_dir, keep)
    }

    /// Replace the settings with the contents of a backup, layered over the defaults.
    pub fn restore_from_backup(&self, path: &Path) -> Result<RestoreReport> {
        let payload = backup::read_payload(path)?;
        let (restored, keys) = Settings::reconcile(defaults(), payload);
        self.apply(|_| Ok((restored, ())))?;
        info!(
            "Restored settings from {} ({} applied, {} rejected)",
            path.display(),
            keys.applied.len(),
            keys.rejected.len()
        );
        Ok(RestoreReport {
            source: path.to_path_buf(),
            keys,
        })
    }

    pub fn export_settings(&self, path: &Path) -> Result<()> {
        let envelope = Envelope::export(&self.settings(), Utc::now());
        backup::write_envelope(path, &envelope)?;
        info!("Settings exported to {}", path.display());
        Ok(())
    }

    /// Merge the settings in `path` over the current ones. Invalid keys are skipped.
    pub fn import_settings(&self, path: &Path) -> Result<RestoreReport> {
        let payload = backup::read_payload(path)?;
        let keys = self.apply(|current| Ok(Settings::reconcile(current, payload)))?;
        info!(
            "Imported settings from {} ({} applied, {} rejected)",
            path.display(),
            keys.applied.len(),
            keys.rejected.len()
        );
        Ok(RestoreReport {
            source: path.to_path_buf(),
            keys,
        })
    }

    // --- Scheduler ---

    /// Start periodic backups per `autoBackup` and `backupInterval`.
    ///
    /// Returns whether a scheduler is running afterwards. Later changes to either setting
    /// restart or stop it.
    pub fn start_backup_scheduler(&self) -> Result<bool> {
        self.scheduler_requested.store(true, Ordering::SeqCst);
        let (enabled, hours) = self
            .shared
            .cache
            .read(|s| (s.auto_backup, s.backup_interval));

        if !enabled {
            self.stop_backup_scheduler();
            info!("Automatic backups are disabled");
            return Ok(false);
        }

        self.schedule_backups_every(Duration::from_secs(u64::from(hours.max(1)) * 3600))?;
        Ok(true)
    }

    /// Run a backup every `interval`, whatever the settings say.
    pub fn schedule_backups_every(&self, interval: Duration) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let task = PeriodicTask::spawn("backup", interval, move || {
            if let Err(e) = shared.create_backup() {
                error!("Scheduled settings backup failed: {}", e);
            }
        })?;

        if let Some(mut previous) = self.scheduler.lock().replace(task) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_backup_scheduler(&self) {
        if let Some(mut task) = self.scheduler.lock().take() {
            task.stop();
        }
    }

    pub fn backup_scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Stop the scheduler and save one final time.
    pub fn shutdown(&self) -> Result<()> {
        self.scheduler_requested.store(false, Ordering::SeqCst);
        self.stop_backup_scheduler();
        self.shut_down.store(true, Ordering::SeqCst);
        self.save()
    }
}

impl<B: StorageBackend> Drop for SettingsStore<B> {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            if let Err(e) = self.shutdown() {
                error!("Final settings save on drop failed: {}", e);
            }
        }
    }
}

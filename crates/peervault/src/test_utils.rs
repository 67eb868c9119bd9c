use crate::config::VaultConfig;
use crate::entity::EntityStore;
use crate::model::CollectionKind;
use crate::settings::SettingsStore;
use crate::store::MemBackend;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestEnv {
    // We keep _temp_dir to ensure the directory is not dropped until the test is done
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: VaultConfig,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let config = VaultConfig::default().with_data_dir(root.clone());
        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    /// Entity store on the temp dir, autosave running with the default interval.
    pub fn entity_store(&self) -> EntityStore {
        EntityStore::open(&self.config).expect("failed to open entity store")
    }

    /// Settings store on the temp dir, backup scheduler started as `open` does.
    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::open(&self.config).expect("failed to open settings store")
    }

    /// Entity store over in-memory backends, one per collection, without autosave.
    pub fn mem_entity_store(&self) -> EntityStore<MemBackend> {
        EntityStore::with_backends(&self.config, self.root.clone(), |kind: CollectionKind| {
            MemBackend::named(kind.as_str())
        })
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(crate::settings::store::BACKUP_DIR)
    }
}

//! # Entity Store
//!
//! Five independent [`DurableCache`]s, one per [`CollectionKind`], behind a typed accessor API
//! the networking layer calls into.
//!
//! ## Writes
//!
//! Every `save_*` / `set_*` call stamps the record's timestamps with the current time and
//! replaces whatever was stored under the key. There is no field-level merge; callers that want
//! to update one field read, modify and write back (see [`EntityStore::touch_peer`]).
//!
//! ## Persistence
//!
//! - **Autosave**: [`EntityStore::open`] starts a background task that saves every collection
//!   each `autosave_interval_secs`, whether or not anything changed.
//! - **Explicit**: [`EntityStore::save`] for a durability point right now.
//! - **Shutdown**: [`EntityStore::shutdown`] stops autosave and saves once more. Dropping a store
//!   that was not shut down does the same on a best-effort basis.
//!
//! Collections are saved as a parallel batch. Each save has its own error boundary: one failing
//! file never stops the others, and every outcome lands in the returned [`SaveReport`].
//!
//! ## Cleanup
//!
//! [`EntityStore::cleanup_old_records`] evicts nodes, peers and transfers whose age marker is
//! older than the retention window (30 days by default). Files and config never expire.

use crate::cache::{Document, DurableCache, LoadOutcome, Persist};
use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::model::{
    CollectionKind, ConfigEntry, FileInfo, Keyed, NodeInfo, PeerInfo, Record, TransferRecord,
};
use crate::store::{Collection, FsBackend, StorageBackend};
use crate::task::PeriodicTask;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One failed collection save.
#[derive(Debug)]
pub struct SaveFailure {
    pub collection: CollectionKind,
    pub error: VaultError,
}

/// Outcome of saving every collection.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: Vec<CollectionKind>,
    pub failures: Vec<SaveFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse into a single result, naming every collection that failed.
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let detail = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.collection, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        Err(VaultError::Store(format!("Failed to save {}", detail)))
    }
}

/// Records removed by one cleanup pass, per collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub nodes: usize,
    pub peers: usize,
    pub transfers: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.nodes + self.peers + self.transfers
    }
}

/// Snapshot of every collection, as produced by export and consumed by import.
///
/// On import, a collection left as `None` is not touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<HashMap<String, NodeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<HashMap<String, FileInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<HashMap<String, PeerInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, ConfigEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfers: Option<HashMap<String, TransferRecord>>,
}

/// Record counts per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub nodes: usize,
    pub files: usize,
    pub peers: usize,
    pub config: usize,
    pub transfers: usize,
    pub data_dir: PathBuf,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        self.nodes + self.files + self.peers + self.config + self.transfers
    }
}

type Cache<R, B> = DurableCache<Collection<R>, B>;

struct Collections<B: StorageBackend> {
    nodes: Cache<NodeInfo, B>,
    files: Cache<FileInfo, B>,
    peers: Cache<PeerInfo, B>,
    config: Cache<ConfigEntry, B>,
    transfers: Cache<TransferRecord, B>,
}

impl<B: StorageBackend> Collections<B> {
    fn open(mut backend_for: impl FnMut(CollectionKind) -> B) -> Self {
        Self {
            nodes: DurableCache::open("nodes", backend_for(CollectionKind::Nodes)),
            files: DurableCache::open("files", backend_for(CollectionKind::Files)),
            peers: DurableCache::open("peers", backend_for(CollectionKind::Peers)),
            config: DurableCache::open("config", backend_for(CollectionKind::Config)),
            transfers: DurableCache::open("transfers", backend_for(CollectionKind::Transfers)),
        }
    }

    fn each(&self) -> [(CollectionKind, &dyn Persist); 5] {
        [
            (CollectionKind::Nodes, &self.nodes as &dyn Persist),
            (CollectionKind::Files, &self.files as &dyn Persist),
            (CollectionKind::Peers, &self.peers as &dyn Persist),
            (CollectionKind::Config, &self.config as &dyn Persist),
            (CollectionKind::Transfers, &self.transfers as &dyn Persist),
        ]
    }

    fn save_all(&self) -> SaveReport {
        let outcomes: Vec<(CollectionKind, Result<()>)> = self
            .each()
            .par_iter()
            .map(|(kind, cache)| (*kind, cache.save()))
            .collect();

        let mut report = SaveReport::default();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(()) => report.saved.push(kind),
                Err(e) => {
                    error!("Failed to save {}: {}", kind, e);
                    report.failures.push(SaveFailure {
                        collection: kind,
                        error: e,
                    });
                }
            }
        }
        report
    }

    fn load_outcome(&self, kind: CollectionKind) -> &LoadOutcome {
        match kind {
            CollectionKind::Nodes => self.nodes.load_outcome(),
            CollectionKind::Files => self.files.load_outcome(),
            CollectionKind::Peers => self.peers.load_outcome(),
            CollectionKind::Config => self.config.load_outcome(),
            CollectionKind::Transfers => self.transfers.load_outcome(),
        }
    }
}

fn put<R: Record, B: StorageBackend>(cache: &Cache<R, B>, id: &str, record: R) -> R {
    let now = Utc::now();
    cache.write(|c| c.put(id, record, now))
}

fn get<R: Record, B: StorageBackend>(cache: &Cache<R, B>, id: &str) -> Option<R> {
    cache.read(|c| c.get(id).cloned())
}

fn all<R: Record, B: StorageBackend>(cache: &Cache<R, B>) -> Vec<Keyed<R>> {
    cache.read(|c| c.keyed())
}

fn remove<R: Record, B: StorageBackend>(cache: &Cache<R, B>, id: &str) -> bool {
    cache.write(|c| c.remove(id))
}

fn replace<R: Record, B: StorageBackend>(cache: &Cache<R, B>, collection: Option<Collection<R>>) {
    if let Some(collection) = collection {
        cache.replace(collection);
    }
}

/// Parse one section of an import file. Records inside it are read the same way a stored
/// collection is, so an odd record never rejects the section.
fn import_section<R: Record>(
    sections: &mut Map<String, Value>,
    kind: CollectionKind,
    path: &Path,
) -> Result<Option<Collection<R>>> {
    match sections.remove(kind.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => Collection::from_stored(raw).map(Some).map_err(|e| {
            VaultError::InvalidImport(format!("{}: '{}' section: {}", path.display(), kind, e))
        }),
    }
}

pub struct EntityStore<B: StorageBackend = FsBackend> {
    collections: Arc<Collections<B>>,
    autosave: Mutex<Option<PeriodicTask>>,
    retention: chrono::Duration,
    data_dir: PathBuf,
    shut_down: AtomicBool,
}

impl EntityStore<FsBackend> {
    /// Open the five collection files under the configured data directory and start autosave.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        if let Err(e) = fs::create_dir_all(&data_dir) {
            // Not fatal: saves create the directory again and report their own failures.
            warn!("Could not create data dir {}: {}", data_dir.display(), e);
        }

        let dir = data_dir.clone();
        let store = Self::with_backends(config, data_dir, |kind| {
            FsBackend::new(dir.join(kind.file_name()))
        });
        store.start_autosave(config.autosave_interval())?;
        info!("Entity store opened at {}", store.data_dir.display());
        Ok(store)
    }
}

impl<B: StorageBackend> EntityStore<B> {
    /// Build a store over arbitrary backends. Autosave is not started.
    pub fn with_backends(
        config: &VaultConfig,
        data_dir: impl Into<PathBuf>,
        backend_for: impl FnMut(CollectionKind) -> B,
    ) -> Self {
        Self {
            collections: Arc::new(Collections::open(backend_for)),
            autosave: Mutex::new(None),
            retention: config.retention(),
            data_dir: data_dir.into(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Start (or restart) the periodic flush.
    pub fn start_autosave(&self, interval: Duration) -> Result<()> {
        let collections = Arc::clone(&self.collections);
        let task = PeriodicTask::spawn("autosave", interval, move || {
            let report = collections.save_all();
            if !report.is_clean() {
                warn!(
                    "Autosave finished with {} failed collection(s)",
                    report.failures.len()
                );
            }
        })?;

        let mut slot = self.autosave.lock();
        if let Some(mut previous) = slot.replace(task) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_autosave(&self) {
        if let Some(mut task) = self.autosave.lock().take() {
            task.stop();
        }
    }

    pub fn autosave_running(&self) -> bool {
        self.autosave
            .lock()
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// How each collection's initial load went.
    pub fn load_outcome(&self, kind: CollectionKind) -> &LoadOutcome {
        self.collections.load_outcome(kind)
    }

    /// Save every collection now.
    pub fn save(&self) -> SaveReport {
        self.collections.save_all()
    }

    /// Stop autosave and save one final time.
    pub fn shutdown(&self) -> SaveReport {
        self.stop_autosave();
        self.shut_down.store(true, Ordering::SeqCst);
        let report = self.save();
        info!(
            "Entity store shut down ({} saved, {} failed)",
            report.saved.len(),
            report.failures.len()
        );
        report
    }

    // --- Nodes ---

    pub fn save_node_info(&self, id: &str, node: NodeInfo) -> NodeInfo {
        put(&self.collections.nodes, id, node)
    }

    pub fn get_node_info(&self, id: &str) -> Option<NodeInfo> {
        get(&self.collections.nodes, id)
    }

    pub fn get_all_nodes(&self) -> Vec<Keyed<NodeInfo>> {
        all(&self.collections.nodes)
    }

    pub fn remove_node(&self, id: &str) -> bool {
        remove(&self.collections.nodes, id)
    }

    // --- Files ---

    pub fn save_file_info(&self, id: &str, file: FileInfo) -> FileInfo {
        put(&self.collections.files, id, file)
    }

    pub fn get_file_info(&self, id: &str) -> Option<FileInfo> {
        get(&self.collections.files, id)
    }

    pub fn get_all_files(&self) -> Vec<Keyed<FileInfo>> {
        all(&self.collections.files)
    }

    pub fn remove_file(&self, id: &str) -> bool {
        remove(&self.collections.files, id)
    }

    /// Files whose name contains `query`, ignoring case.
    pub fn search_files(&self, query: &str) -> Vec<Keyed<FileInfo>> {
        self.collections
            .files
            .read(|c| c.keyed_where(|file| file.matches(query)))
    }

    // --- Peers ---

    pub fn save_peer_info(&self, id: &str, peer: PeerInfo) -> PeerInfo {
        put(&self.collections.peers, id, peer)
    }

    pub fn get_peer_info(&self, id: &str) -> Option<PeerInfo> {
        get(&self.collections.peers, id)
    }

    pub fn get_all_peers(&self) -> Vec<Keyed<PeerInfo>> {
        all(&self.collections.peers)
    }

    pub fn remove_peer(&self, id: &str) -> bool {
        remove(&self.collections.peers, id)
    }

    /// Refresh a known peer's `lastSeen`, keeping its other fields. Returns false if unknown.
    pub fn touch_peer(&self, id: &str) -> bool {
        let now = Utc::now();
        self.collections.peers.write(|c| match c.get(id).cloned() {
            Some(peer) => {
                c.put(id, peer, now);
                true
            }
            None => false,
        })
    }

    // --- Config ---

    pub fn set_config(&self, key: &str, value: Value) -> ConfigEntry {
        put(&self.collections.config, key, ConfigEntry::new(value))
    }

    pub fn get_config(&self, key: &str) -> Option<Value> {
        get(&self.collections.config, key).map(|entry| entry.value)
    }

    pub fn get_all_config(&self) -> Vec<Keyed<ConfigEntry>> {
        all(&self.collections.config)
    }

    pub fn remove_config(&self, key: &str) -> bool {
        remove(&self.collections.config, key)
    }

    // --- Transfers ---

    pub fn save_transfer(&self, id: &str, transfer: TransferRecord) -> TransferRecord {
        put(&self.collections.transfers, id, transfer)
    }

    pub fn get_transfer(&self, id: &str) -> Option<TransferRecord> {
        get(&self.collections.transfers, id)
    }

    pub fn get_all_transfers(&self) -> Vec<Keyed<TransferRecord>> {
        all(&self.collections.transfers)
    }

    pub fn remove_transfer(&self, id: &str) -> bool {
        remove(&self.collections.transfers, id)
    }

    /// The `limit` most recently recorded transfers, newest first.
    pub fn get_recent_transfers(&self, limit: usize) -> Vec<Keyed<TransferRecord>> {
        let mut transfers = self.get_all_transfers();
        // None sorts before Some, so reversing puts unstamped records last
        transfers.sort_by(|a, b| b.record.recorded_at.cmp(&a.record.recorded_at));
        transfers.truncate(limit);
        transfers
    }

    // --- Maintenance ---

    /// Evict expired nodes, peers and transfers relative to now.
    pub fn cleanup_old_records(&self) -> CleanupReport {
        self.cleanup_old_records_at(Utc::now())
    }

    /// Evict expired records relative to `now`.
    pub fn cleanup_old_records_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let cutoff = now - self.retention;
        let report = CleanupReport {
            nodes: self
                .collections
                .nodes
                .write(|c| c.evict_older_than(cutoff)),
            peers: self
                .collections
                .peers
                .write(|c| c.evict_older_than(cutoff)),
            transfers: self
                .collections
                .transfers
                .write(|c| c.evict_older_than(cutoff)),
        };
        if report.total() > 0 {
            info!(
                "Cleanup removed {} node(s), {} peer(s), {} transfer(s)",
                report.nodes, report.peers, report.transfers
            );
        }
        report
    }

    pub fn export_data(&self) -> ExportBundle {
        let c = &self.collections;
        ExportBundle {
            exported_at: Some(Utc::now()),
            nodes: Some(c.nodes.read(|c| c.records().clone())),
            files: Some(c.files.read(|c| c.records().clone())),
            peers: Some(c.peers.read(|c| c.records().clone())),
            config: Some(c.config.read(|c| c.records().clone())),
            transfers: Some(c.transfers.read(|c| c.records().clone())),
        }
    }

    /// Replace every collection present in `bundle`, then save everything immediately.
    pub fn import_data(&self, bundle: ExportBundle) -> Result<()> {
        let c = &self.collections;
        replace(&c.nodes, bundle.nodes.map(Collection::from_records));
        replace(&c.files, bundle.files.map(Collection::from_records));
        replace(&c.peers, bundle.peers.map(Collection::from_records));
        replace(&c.config, bundle.config.map(Collection::from_records));
        replace(&c.transfers, bundle.transfers.map(Collection::from_records));
        self.save().into_result()
    }

    /// Write every collection to `path` as pretty JSON, in the shape of [`ExportBundle`].
    ///
    /// Unlike [`Self::export_data`] this includes stored entries that did not parse as records.
    pub fn export_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(VaultError::Io)?;
            }
        }
        let mut bundle = Map::new();
        bundle.insert("exportedAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        for (kind, collection) in self.collections.each() {
            bundle.insert(kind.as_str().to_string(), collection.snapshot()?);
        }
        let content = serde_json::to_string_pretty(&Value::Object(bundle))
            .map_err(VaultError::Serialization)?;
        fs::write(path, content).map_err(VaultError::Io)?;
        Ok(())
    }

    /// Read a bundle written by [`Self::export_to_file`] and import it.
    ///
    /// Every section is parsed before any collection is replaced. A section that is not a
    /// collection fails the whole import; records that do not parse are carried over as stored.
    pub fn import_from_file(&self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(VaultError::Io)?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| VaultError::InvalidImport(format!("{}: {}", path.display(), e)))?;
        let mut sections = match raw {
            Value::Object(sections) => sections,
            _ => {
                return Err(VaultError::InvalidImport(format!(
                    "{}: expected a JSON object",
                    path.display()
                )))
            }
        };

        let nodes = import_section(&mut sections, CollectionKind::Nodes, path)?;
        let files = import_section(&mut sections, CollectionKind::Files, path)?;
        let peers = import_section(&mut sections, CollectionKind::Peers, path)?;
        let config = import_section(&mut sections, CollectionKind::Config, path)?;
        let transfers = import_section(&mut sections, CollectionKind::Transfers, path)?;

        let c = &self.collections;
        replace(&c.nodes, nodes);
        replace(&c.files, files);
        replace(&c.peers, peers);
        replace(&c.config, config);
        replace(&c.transfers, transfers);
        self.save().into_result()
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.collections;
        StoreStats {
            nodes: c.nodes.read(|c| c.len()),
            files: c.files.read(|c| c.len()),
            peers: c.peers.read(|c| c.len()),
            config: c.config.read(|c| c.len()),
            transfers: c.transfers.read(|c| c.len()),
            data_dir: self.data_dir.clone(),
        }
    }
}

impl<B: StorageBackend> Drop for EntityStore<B> {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            let report = self.shutdown();
            if !report.is_clean() {
                error!("Final save on drop left {} collection(s) unsaved", report.failures.len());
            }
        }
    }
}

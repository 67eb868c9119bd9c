//! Settings schema: the fixed key set, their defaults, categories and display metadata.
//!
//! [`SettingKey`] enumerates every key; [`Settings`] holds one typed value per key. The
//! conversions between the two views (JSON map and struct) are total over [`SettingKey::ALL`],
//! so a key added to the enum without a field, a category or a spec does not compile.

use crate::error::{Result, VaultError};
use crate::settings::validate::{self, Rule};
use directories::{BaseDirs, UserDirs};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// Named groups of settings, as shown in the settings UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Download,
    Window,
    Network,
    Privacy,
    Performance,
    Backup,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Download,
        Category::Window,
        Category::Network,
        Category::Privacy,
        Category::Performance,
        Category::Backup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Download => "download",
            Category::Window => "window",
            Category::Network => "network",
            Category::Privacy => "privacy",
            Category::Performance => "performance",
            Category::Backup => "backup",
        }
    }

    /// Keys in this category, in display order.
    pub fn keys(&self) -> &'static [SettingKey] {
        use SettingKey::*;
        match self {
            Category::Download => &[
                DownloadPath,
                AutoAcceptFiles,
                OpenFolderOnComplete,
                MaxConcurrentTransfers,
            ],
            Category::Window => &[
                WindowWidth,
                WindowHeight,
                MinimizeToTray,
                StartMinimized,
                Theme,
                Language,
            ],
            Category::Network => &[
                ListenPort,
                MaxConnections,
                ConnectionTimeout,
                EnableDht,
                EnableLocalDiscovery,
                ProxyUrl,
            ],
            Category::Privacy => &[
                DeviceName,
                ShareDeviceName,
                AllowUnknownPeers,
                KeepTransferHistory,
            ],
            Category::Performance => &[
                ChunkSize,
                UploadLimit,
                DownloadLimit,
                HardwareAcceleration,
            ],
            Category::Backup => &[AutoBackup, BackupInterval, MaxBackupFiles],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| VaultError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    DownloadPath,
    AutoAcceptFiles,
    OpenFolderOnComplete,
    MaxConcurrentTransfers,
    WindowWidth,
    WindowHeight,
    MinimizeToTray,
    StartMinimized,
    Theme,
    Language,
    ListenPort,
    MaxConnections,
    ConnectionTimeout,
    EnableDht,
    EnableLocalDiscovery,
    ProxyUrl,
    DeviceName,
    ShareDeviceName,
    AllowUnknownPeers,
    KeepTransferHistory,
    ChunkSize,
    UploadLimit,
    DownloadLimit,
    HardwareAcceleration,
    AutoBackup,
    BackupInterval,
    MaxBackupFiles,
}

impl SettingKey {
    pub const ALL: [SettingKey; 27] = [
        SettingKey::DownloadPath,
        SettingKey::AutoAcceptFiles,
        SettingKey::OpenFolderOnComplete,
        SettingKey::MaxConcurrentTransfers,
        SettingKey::WindowWidth,
        SettingKey::WindowHeight,
        SettingKey::MinimizeToTray,
        SettingKey::StartMinimized,
        SettingKey::Theme,
        SettingKey::Language,
        SettingKey::ListenPort,
        SettingKey::MaxConnections,
        SettingKey::ConnectionTimeout,
        SettingKey::EnableDht,
        SettingKey::EnableLocalDiscovery,
        SettingKey::ProxyUrl,
        SettingKey::DeviceName,
        SettingKey::ShareDeviceName,
        SettingKey::AllowUnknownPeers,
        SettingKey::KeepTransferHistory,
        SettingKey::ChunkSize,
        SettingKey::UploadLimit,
        SettingKey::DownloadLimit,
        SettingKey::HardwareAcceleration,
        SettingKey::AutoBackup,
        SettingKey::BackupInterval,
        SettingKey::MaxBackupFiles,
    ];

    /// The key as it appears in the settings file and the public API.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::DownloadPath => "downloadPath",
            SettingKey::AutoAcceptFiles => "autoAcceptFiles",
            SettingKey::OpenFolderOnComplete => "openFolderOnComplete",
            SettingKey::MaxConcurrentTransfers => "maxConcurrentTransfers",
            SettingKey::WindowWidth => "windowWidth",
            SettingKey::WindowHeight => "windowHeight",
            SettingKey::MinimizeToTray => "minimizeToTray",
            SettingKey::StartMinimized => "startMinimized",
            SettingKey::Theme => "theme",
            SettingKey::Language => "language",
            SettingKey::ListenPort => "listenPort",
            SettingKey::MaxConnections => "maxConnections",
            SettingKey::ConnectionTimeout => "connectionTimeout",
            SettingKey::EnableDht => "enableDht",
            SettingKey::EnableLocalDiscovery => "enableLocalDiscovery",
            SettingKey::ProxyUrl => "proxyUrl",
            SettingKey::DeviceName => "deviceName",
            SettingKey::ShareDeviceName => "shareDeviceName",
            SettingKey::AllowUnknownPeers => "allowUnknownPeers",
            SettingKey::KeepTransferHistory => "keepTransferHistory",
            SettingKey::ChunkSize => "chunkSize",
            SettingKey::UploadLimit => "uploadLimit",
            SettingKey::DownloadLimit => "downloadLimit",
            SettingKey::HardwareAcceleration => "hardwareAcceleration",
            SettingKey::AutoBackup => "autoBackup",
            SettingKey::BackupInterval => "backupInterval",
            SettingKey::MaxBackupFiles => "maxBackupFiles",
        }
    }

    pub fn category(&self) -> Category {
        use SettingKey::*;
        match self {
            DownloadPath | AutoAcceptFiles | OpenFolderOnComplete | MaxConcurrentTransfers => {
                Category::Download
            }
            WindowWidth | WindowHeight | MinimizeToTray | StartMinimized | Theme | Language => {
                Category::Window
            }
            ListenPort | MaxConnections | ConnectionTimeout | EnableDht | EnableLocalDiscovery
            | ProxyUrl => Category::Network,
            DeviceName | ShareDeviceName | AllowUnknownPeers | KeepTransferHistory => {
                Category::Privacy
            }
            ChunkSize | UploadLimit | DownloadLimit | HardwareAcceleration => {
                Category::Performance
            }
            AutoBackup | BackupInterval | MaxBackupFiles => Category::Backup,
        }
    }

    /// Display metadata for this key.
    pub fn spec(&self) -> SettingSpec {
        use DisplayKind::*;
        match self {
            SettingKey::DownloadPath => SettingSpec::new("Download folder", Path)
                .described("Where received files are written"),
            SettingKey::AutoAcceptFiles => SettingSpec::new("Accept files automatically", Toggle)
                .described("Accept incoming transfers from known peers without asking"),
            SettingKey::OpenFolderOnComplete => {
                SettingSpec::new("Open folder when done", Toggle)
            }
            SettingKey::MaxConcurrentTransfers => {
                SettingSpec::new("Concurrent transfers", Number)
            }
            SettingKey::WindowWidth => SettingSpec::new("Window width", Number).unit("px"),
            SettingKey::WindowHeight => SettingSpec::new("Window height", Number).unit("px"),
            SettingKey::MinimizeToTray => SettingSpec::new("Minimize to tray", Toggle),
            SettingKey::StartMinimized => SettingSpec::new("Start minimized", Toggle),
            SettingKey::Theme => SettingSpec::new("Theme", Choice),
            SettingKey::Language => SettingSpec::new("Language", Choice),
            SettingKey::ListenPort => SettingSpec::new("Listen port", Number)
                .described("TCP port for incoming peer connections"),
            SettingKey::MaxConnections => SettingSpec::new("Maximum connections", Number),
            SettingKey::ConnectionTimeout => {
                SettingSpec::new("Connection timeout", Number).unit("s")
            }
            SettingKey::EnableDht => SettingSpec::new("Use DHT", Toggle)
                .described("Find peers through the distributed hash table"),
            SettingKey::EnableLocalDiscovery => SettingSpec::new("Local discovery", Toggle)
                .described("Find peers on the local network"),
            SettingKey::ProxyUrl => SettingSpec::new("Proxy URL", Text)
                .described("Leave empty to connect directly"),
            SettingKey::DeviceName => SettingSpec::new("Device name", Text),
            SettingKey::ShareDeviceName => SettingSpec::new("Share device name", Toggle),
            SettingKey::AllowUnknownPeers => SettingSpec::new("Allow unknown peers", Toggle)
                .described("Accept connections from peers not seen before"),
            SettingKey::KeepTransferHistory => {
                SettingSpec::new("Keep transfer history", Toggle)
            }
            SettingKey::ChunkSize => SettingSpec::new("Chunk size", Number).unit("KiB"),
            SettingKey::UploadLimit => SettingSpec::new("Upload limit", Number)
                .unit("KiB/s")
                .described("0 means unlimited"),
            SettingKey::DownloadLimit => SettingSpec::new("Download limit", Number)
                .unit("KiB/s")
                .described("0 means unlimited"),
            SettingKey::HardwareAcceleration => {
                SettingSpec::new("Hardware acceleration", Toggle)
            }
            SettingKey::AutoBackup => SettingSpec::new("Automatic backups", Toggle),
            SettingKey::BackupInterval => {
                SettingSpec::new("Backup interval", Number).unit("h")
            }
            SettingKey::MaxBackupFiles => SettingSpec::new("Backups to keep", Number),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SettingKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| VaultError::UnknownSetting(s.to_string()))
    }
}

/// How a setting is presented for editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Toggle,
    Number,
    Choice,
    Text,
    Path,
}

/// Static display metadata for one setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSpec {
    pub label: &'static str,
    pub kind: DisplayKind,
    pub description: Option<&'static str>,
    pub unit: Option<&'static str>,
}

impl SettingSpec {
    const fn new(label: &'static str, kind: DisplayKind) -> Self {
        Self {
            label,
            kind,
            description: None,
            unit: None,
        }
    }

    const fn described(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Everything known about one setting: identity, presentation, constraint and default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingMetadata {
    pub key: &'static str,
    pub category: Category,
    pub label: &'static str,
    pub kind: DisplayKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    pub rule: Rule,
    pub default: Value,
}

impl SettingMetadata {
    pub fn for_key(key: SettingKey, defaults: &Settings) -> Self {
        let spec = key.spec();
        Self {
            key: key.as_str(),
            category: key.category(),
            label: spec.label,
            kind: spec.kind,
            description: spec.description,
            unit: spec.unit,
            rule: validate::rule_for(key),
            default: defaults.value(key),
        }
    }
}

/// A key from untrusted input that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub key: String,
    pub reason: String,
}

/// What happened to each key of an incoming settings map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    /// Known keys whose value passed validation.
    pub applied: Vec<SettingKey>,
    /// Known keys whose value failed validation; the base value was kept.
    pub rejected: Vec<Rejection>,
    /// Keys that are not settings at all.
    pub unknown: Vec<String>,
}

/// The live application settings, one typed field per [`SettingKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub download_path: String,
    pub auto_accept_files: bool,
    pub open_folder_on_complete: bool,
    pub max_concurrent_transfers: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub minimize_to_tray: bool,
    pub start_minimized: bool,
    pub theme: String,
    pub language: String,
    pub listen_port: u16,
    pub max_connections: u32,
    pub connection_timeout: u32,
    pub enable_dht: bool,
    pub enable_local_discovery: bool,
    pub proxy_url: String,
    pub device_name: String,
    pub share_device_name: bool,
    pub allow_unknown_peers: bool,
    pub keep_transfer_history: bool,
    pub chunk_size: u32,
    pub upload_limit: u64,
    pub download_limit: u64,
    pub hardware_acceleration: bool,
    pub auto_backup: bool,
    pub backup_interval: u32,
    pub max_backup_files: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_path().to_string_lossy().into_owned(),
            auto_accept_files: false,
            open_folder_on_complete: true,
            max_concurrent_transfers: 3,
            window_width: 1200,
            window_height: 800,
            minimize_to_tray: true,
            start_minimized: false,
            theme: "system".to_string(),
            language: "en".to_string(),
            listen_port: 6881,
            max_connections: 50,
            connection_timeout: 30,
            enable_dht: true,
            enable_local_discovery: true,
            proxy_url: String::new(),
            device_name: default_device_name(),
            share_device_name: true,
            allow_unknown_peers: false,
            keep_transfer_history: true,
            chunk_size: 256,
            upload_limit: 0,
            download_limit: 0,
            hardware_acceleration: true,
            auto_backup: true,
            backup_interval: 24,
            max_backup_files: 5,
        }
    }
}

static DEFAULTS: Lazy<Settings> = Lazy::new(Settings::default);

/// The default settings, computed once per process.
pub fn defaults() -> &'static Settings {
    &DEFAULTS
}

fn default_download_path() -> PathBuf {
    if let Some(dir) = UserDirs::new().and_then(|dirs| dirs.download_dir().map(PathBuf::from)) {
        return dir;
    }
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join("Downloads"),
        None => PathBuf::from("Downloads"),
    }
}

fn default_device_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "My Device".to_string())
}

impl Settings {
    /// Current value of `key` as JSON.
    pub fn value(&self, key: SettingKey) -> Value {
        match key {
            SettingKey::DownloadPath => json!(self.download_path),
            SettingKey::AutoAcceptFiles => json!(self.auto_accept_files),
            SettingKey::OpenFolderOnComplete => json!(self.open_folder_on_complete),
            SettingKey::MaxConcurrentTransfers => json!(self.max_concurrent_transfers),
            SettingKey::WindowWidth => json!(self.window_width),
            SettingKey::WindowHeight => json!(self.window_height),
            SettingKey::MinimizeToTray => json!(self.minimize_to_tray),
            SettingKey::StartMinimized => json!(self.start_minimized),
            SettingKey::Theme => json!(self.theme),
            SettingKey::Language => json!(self.language),
            SettingKey::ListenPort => json!(self.listen_port),
            SettingKey::MaxConnections => json!(self.max_connections),
            SettingKey::ConnectionTimeout => json!(self.connection_timeout),
            SettingKey::EnableDht => json!(self.enable_dht),
            SettingKey::EnableLocalDiscovery => json!(self.enable_local_discovery),
            SettingKey::ProxyUrl => json!(self.proxy_url),
            SettingKey::DeviceName => json!(self.device_name),
            SettingKey::ShareDeviceName => json!(self.share_device_name),
            SettingKey::AllowUnknownPeers => json!(self.allow_unknown_peers),
            SettingKey::KeepTransferHistory => json!(self.keep_transfer_history),
            SettingKey::ChunkSize => json!(self.chunk_size),
            SettingKey::UploadLimit => json!(self.upload_limit),
            SettingKey::DownloadLimit => json!(self.download_limit),
            SettingKey::HardwareAcceleration => json!(self.hardware_acceleration),
            SettingKey::AutoBackup => json!(self.auto_backup),
            SettingKey::BackupInterval => json!(self.backup_interval),
            SettingKey::MaxBackupFiles => json!(self.max_backup_files),
        }
    }

    /// Store a value that already passed [`validate::validate`] for `key`.
    ///
    /// Fails only when the JSON type does not fit the field.
    pub fn assign(&mut self, key: SettingKey, value: &Value) -> Result<()> {
        match key {
            SettingKey::DownloadPath => self.download_path = text(key, value)?,
            SettingKey::AutoAcceptFiles => self.auto_accept_files = flag(key, value)?,
            SettingKey::OpenFolderOnComplete => self.open_folder_on_complete = flag(key, value)?,
            SettingKey::MaxConcurrentTransfers => {
                self.max_concurrent_transfers = number(key, value)?
            }
            SettingKey::WindowWidth => self.window_width = number(key, value)?,
            SettingKey::WindowHeight => self.window_height = number(key, value)?,
            SettingKey::MinimizeToTray => self.minimize_to_tray = flag(key, value)?,
            SettingKey::StartMinimized => self.start_minimized = flag(key, value)?,
            SettingKey::Theme => self.theme = text(key, value)?,
            SettingKey::Language => self.language = text(key, value)?,
            SettingKey::ListenPort => self.listen_port = number(key, value)?,
            SettingKey::MaxConnections => self.max_connections = number(key, value)?,
            SettingKey::ConnectionTimeout => self.connection_timeout = number(key, value)?,
            SettingKey::EnableDht => self.enable_dht = flag(key, value)?,
            SettingKey::EnableLocalDiscovery => self.enable_local_discovery = flag(key, value)?,
            SettingKey::ProxyUrl => self.proxy_url = text(key, value)?,
            SettingKey::DeviceName => self.device_name = text(key, value)?,
            SettingKey::ShareDeviceName => self.share_device_name = flag(key, value)?,
            SettingKey::AllowUnknownPeers => self.allow_unknown_peers = flag(key, value)?,
            SettingKey::KeepTransferHistory => self.keep_transfer_history = flag(key, value)?,
            SettingKey::ChunkSize => self.chunk_size = number(key, value)?,
            SettingKey::UploadLimit => self.upload_limit = number(key, value)?,
            SettingKey::DownloadLimit => self.download_limit = number(key, value)?,
            SettingKey::HardwareAcceleration => self.hardware_acceleration = flag(key, value)?,
            SettingKey::AutoBackup => self.auto_backup = flag(key, value)?,
            SettingKey::BackupInterval => self.backup_interval = number(key, value)?,
            SettingKey::MaxBackupFiles => self.max_backup_files = number(key, value)?,
        }
        Ok(())
    }

    /// All settings as a JSON object. Keys come out sorted by name, as does `settings.json`.
    pub fn to_map(&self) -> Map<String, Value> {
        SettingKey::ALL
            .iter()
            .map(|key| (key.as_str().to_string(), self.value(*key)))
            .collect()
    }

    /// Layer `incoming` over `base`.
    ///
    /// Unknown keys are dropped. Known keys are validated one by one; a failing key keeps its
    /// value from `base` and is listed in [`Reconciled::rejected`].
    pub fn reconcile(base: &Settings, incoming: Map<String, Value>) -> (Settings, Reconciled) {
        let mut merged = base.clone();
        let mut outcome = Reconciled::default();

        for (name, value) in incoming {
            let key = match name.parse::<SettingKey>() {
                Ok(key) => key,
                Err(_) => {
                    debug!("Ignoring unknown setting '{}'", name);
                    outcome.unknown.push(name);
                    continue;
                }
            };

            match validate::validate(key, &value).and_then(|()| merged.assign(key, &value)) {
                Ok(()) => outcome.applied.push(key),
                Err(e) => {
                    warn!("Dropping setting '{}': {}", name, e);
                    outcome.rejected.push(Rejection {
                        key: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcome.applied.sort();
        (merged, outcome)
    }

    /// Keys whose value differs between `self` and `other`.
    pub fn changed_keys(&self, other: &Settings) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|key| self.value(*key) != other.value(*key))
            .collect()
    }
}

fn flag(key: SettingKey, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| VaultError::validation(key.as_str(), "must be a boolean"))
}

fn text(key: SettingKey, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VaultError::validation(key.as_str(), "must be a string"))
}

fn number<T: TryFrom<u64>>(key: SettingKey, value: &Value) -> Result<T> {
    value
        .as_u64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| VaultError::validation(key.as_str(), "must be a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_map_has_every_key_sorted() {
        let keys: Vec<String> = Settings::default().to_map().keys().cloned().collect();
        assert_eq!(keys.len(), SettingKey::ALL.len());
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_every_key_has_one_category() {
        let mut seen: Vec<SettingKey> = Category::ALL
            .iter()
            .flat_map(|c| c.keys().iter().copied())
            .collect();
        seen.sort();
        let mut all = SettingKey::ALL.to_vec();
        all.sort();
        assert_eq!(seen, all);

        for category in Category::ALL {
            for key in category.keys() {
                assert_eq!(key.category(), category);
            }
        }
    }

    #[test]
    fn test_key_names_match_serialized_fields() {
        let serialized = serde_json::to_value(Settings::default()).unwrap();
        let object = serialized.as_object().unwrap();
        assert_eq!(object.len(), SettingKey::ALL.len());
        for key in SettingKey::ALL {
            assert!(object.contains_key(key.as_str()), "missing {}", key);
        }
        assert_eq!(Value::Object(Settings::default().to_map()), serialized);
    }

    #[test]
    fn test_parse_key_and_category() {
        assert_eq!(
            "maxConnections".parse::<SettingKey>().unwrap(),
            SettingKey::MaxConnections
        );
        assert!(matches!(
            "nope".parse::<SettingKey>(),
            Err(VaultError::UnknownSetting(_))
        ));
        assert_eq!("privacy".parse::<Category>().unwrap(), Category::Privacy);
        assert!(matches!(
            "Privacy".parse::<Category>(),
            Err(VaultError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_defaults_pass_their_own_rules() {
        let defaults = Settings::default();
        for key in SettingKey::ALL {
            assert!(
                validate::validate(key, &defaults.value(key)).is_ok(),
                "default for {} is invalid",
                key
            );
        }
    }

    #[test]
    fn test_reconcile_merges_over_base() {
        let defaults = Settings::default();
        let mut incoming = Map::new();
        incoming.insert("theme".into(), json!("dark"));
        incoming.insert("listenPort".into(), json!(7000));

        let (merged, outcome) = Settings::reconcile(&defaults, incoming);

        assert_eq!(merged.theme, "dark");
        assert_eq!(merged.listen_port, 7000);
        assert_eq!(outcome.applied, vec![SettingKey::Theme, SettingKey::ListenPort]);
        assert_eq!(
            merged.changed_keys(&defaults),
            vec![SettingKey::Theme, SettingKey::ListenPort]
        );
    }

    #[test]
    fn test_reconcile_drops_unknown_and_invalid() {
        let defaults = Settings::default();
        let mut incoming = Map::new();
        incoming.insert("maxConnections".into(), json!(500));
        incoming.insert("enableDht".into(), json!("yes"));
        incoming.insert("favoriteColor".into(), json!("teal"));
        incoming.insert("chunkSize".into(), json!(512));

        let (merged, outcome) = Settings::reconcile(&defaults, incoming);

        assert_eq!(merged.max_connections, defaults.max_connections);
        assert_eq!(merged.enable_dht, defaults.enable_dht);
        assert_eq!(merged.chunk_size, 512);
        assert_eq!(outcome.unknown, vec!["favoriteColor".to_string()]);
        let mut rejected: Vec<&str> = outcome.rejected.iter().map(|r| r.key.as_str()).collect();
        rejected.sort();
        assert_eq!(rejected, vec!["enableDht", "maxConnections"]);
        assert!(!merged.to_map().contains_key("favoriteColor"));
    }

    #[test]
    fn test_metadata_carries_rule_and_default() {
        let defaults = Settings::default();
        let meta = SettingMetadata::for_key(SettingKey::ConnectionTimeout, &defaults);
        assert_eq!(meta.key, "connectionTimeout");
        assert_eq!(meta.category, Category::Network);
        assert_eq!(meta.unit, Some("s"));
        assert_eq!(meta.rule, Rule::IntRange { min: 5, max: 300 });
        assert_eq!(meta.default, json!(30));
    }
}

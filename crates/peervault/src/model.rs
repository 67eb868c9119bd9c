//! # Domain Model: Entity Records
//!
//! Records are what the networking layer hands to the [`EntityStore`](crate::entity::EntityStore)
//! for safekeeping. They are opaque to the store apart from a handful of fields it owns:
//!
//! - the **stamped** timestamps (`lastSeen`, `updatedAt`, `savedAt`, `recordedAt`),
//! - the **age marker** used by retention cleanup, which is one of the stamped timestamps.
//!
//! Everything else a caller puts on a record lives in the flattened `extra` map and is written
//! back exactly as it was read, whatever its JSON type. The typed helpers (`NodeInfo::port`,
//! `TransferRecord::status`, ...) only interpret `extra`; a value they do not understand reads as
//! `None` and stays on disk untouched.
//!
//! A stamped timestamp that is not an RFC 3339 string reads as `None` and is replaced by the
//! next write.
//!
//! ## Stamping
//!
//! Every write through the store calls [`Record::stamp`] with one instant. Stamped fields are
//! always overwritten, never kept from caller input, and all of them carry the same instant for
//! a given write.
//!
//! | Collection  | Record             | Stamped                   | Age marker   |
//! |-------------|--------------------|---------------------------|--------------|
//! | `nodes`     | [`NodeInfo`]       | `lastSeen`, `updatedAt`   | `lastSeen`   |
//! | `files`     | [`FileInfo`]       | `savedAt`, `updatedAt`    | none         |
//! | `peers`     | [`PeerInfo`]       | `lastSeen`, `updatedAt`   | `lastSeen`   |
//! | `config`    | [`ConfigEntry`]    | `updatedAt`               | none         |
//! | `transfers` | [`TransferRecord`] | `recordedAt`              | `recordedAt` |

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::Path;

/// A value kept in one entity collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Overwrite the store-managed timestamps with `now`.
    fn stamp(&mut self, now: DateTime<Utc>);

    /// Timestamp retention cleanup compares against. `None` means the record never expires.
    fn age_marker(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// A record together with the key it is stored under.
///
/// Serializes as the record's fields with `id` merged in. The store key wins over an `id` the
/// caller kept on the record; the record itself is not changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Keyed<R> {
    pub id: String,
    #[serde(flatten)]
    pub record: R,
}

impl<R: Serialize> Serialize for Keyed<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = match serde_json::to_value(&self.record).map_err(S::Error::custom)? {
            Value::Object(fields) => fields,
            other => return Err(S::Error::custom(format!("record is not an object: {}", other))),
        };
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.serialize(serializer)
    }
}

/// The five entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Nodes,
    Files,
    Peers,
    Config,
    Transfers,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Nodes,
        CollectionKind::Files,
        CollectionKind::Peers,
        CollectionKind::Config,
        CollectionKind::Transfers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Nodes => "nodes",
            CollectionKind::Files => "files",
            CollectionKind::Peers => "peers",
            CollectionKind::Config => "config",
            CollectionKind::Transfers => "transfers",
        }
    }

    /// File name of the collection inside the data directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads a stamped timestamp. Anything but an RFC 3339 string is treated as unset.
fn lenient_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}

/// Unsigned number stored either as a JSON number or a numeric string.
fn lenient_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Accessors over the caller-owned `extra` map, shared by every record with one.
macro_rules! caller_fields {
    ($($record:ty => [$($stamped:literal),+]),+ $(,)?) => {$(
        impl $record {
            /// A caller-owned field, exactly as stored.
            pub fn field(&self, name: &str) -> Option<&Value> {
                self.extra.get(name)
            }

            /// Set a caller-owned field. Store-managed timestamps cannot be set this way.
            pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
                let name = name.into();
                if ![$($stamped),+].contains(&name.as_str()) {
                    self.extra.insert(name, value.into());
                }
            }

            pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
                self.set_field(name, value);
                self
            }

            /// A caller-owned field, if it is a string.
            pub fn text_field(&self, name: &str) -> Option<&str> {
                self.extra.get(name).and_then(Value::as_str)
            }
        }
    )+};
}

caller_fields! {
    NodeInfo => ["lastSeen", "updatedAt"],
    FileInfo => ["savedAt", "updatedAt"],
    PeerInfo => ["lastSeen", "updatedAt"],
    ConfigEntry => ["value", "updatedAt"],
    TransferRecord => ["recordedAt"],
}

/// A known network node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default, deserialize_with = "lenient_time")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self::default().with_field("name", name.into())
    }

    pub fn with_address(self, address: impl Into<String>, port: u16) -> Self {
        self.with_field("address", address.into())
            .with_field("port", port)
    }

    pub fn name(&self) -> Option<&str> {
        self.text_field("name")
    }

    pub fn address(&self) -> Option<&str> {
        self.text_field("address")
    }

    /// Port as a number, accepting numeric strings.
    pub fn port(&self) -> Option<u16> {
        self.field("port")
            .and_then(lenient_u64)
            .and_then(|port| u16::try_from(port).ok())
    }
}

impl Record for NodeInfo {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
        self.updated_at = Some(now);
    }

    fn age_marker(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}

/// A file offered for sharing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default, deserialize_with = "lenient_time")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self::default().with_field("name", name.into())
    }

    pub fn with_size(self, size: u64) -> Self {
        self.with_field("size", size)
    }

    pub fn with_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.with_field("path", path)
    }

    pub fn name(&self) -> Option<&str> {
        self.text_field("name")
    }

    pub fn path(&self) -> Option<&str> {
        self.text_field("path")
    }

    pub fn size(&self) -> Option<u64> {
        self.field("size").and_then(lenient_u64)
    }

    /// Case-insensitive substring match on the file name. Files without a name never match.
    pub fn matches(&self, query: &str) -> bool {
        self.name()
            .map_or(false, |name| name.to_lowercase().contains(&query.to_lowercase()))
    }
}

impl Record for FileInfo {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.saved_at = Some(now);
        self.updated_at = Some(now);
    }
}

/// A peer we have exchanged data with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    #[serde(default, deserialize_with = "lenient_time")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PeerInfo {
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self::default().with_field("nodeId", node_id.into())
    }

    pub fn node_id(&self) -> Option<&str> {
        self.text_field("nodeId")
    }

    pub fn nickname(&self) -> Option<&str> {
        self.text_field("nickname")
    }
}

impl Record for PeerInfo {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
        self.updated_at = Some(now);
    }

    fn age_marker(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}

/// Arbitrary key/value configuration kept alongside the entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    #[serde(default)]
    pub value: Value,
    #[serde(default, deserialize_with = "lenient_time")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigEntry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }
}

impl Record for ConfigEntry {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "upload",
            TransferDirection::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Active => "active",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

/// One entry of the transfer history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    #[serde(default, deserialize_with = "lenient_time")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransferRecord {
    pub fn new(file_name: impl Into<String>, direction: TransferDirection) -> Self {
        Self::default()
            .with_field("fileName", file_name.into())
            .with_field("direction", direction.as_str())
    }

    pub fn with_status(self, status: TransferStatus) -> Self {
        self.with_field("status", status.as_str())
    }

    /// Node on the other end. Not checked against the `nodes` collection.
    pub fn with_node(self, node_id: impl Into<String>) -> Self {
        self.with_field("nodeId", node_id.into())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.text_field("fileName")
    }

    pub fn node_id(&self) -> Option<&str> {
        self.text_field("nodeId")
    }

    pub fn size(&self) -> Option<u64> {
        self.field("size").and_then(lenient_u64)
    }

    /// `None` when unset or not one of the known directions; the raw value is in [`Self::field`].
    pub fn direction(&self) -> Option<TransferDirection> {
        self.field("direction")
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    /// `None` when unset or not one of the known statuses; the raw value is in [`Self::field`].
    pub fn status(&self) -> Option<TransferStatus> {
        self.field("status")
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }
}

impl Record for TransferRecord {
    fn stamp(&mut self, now: DateTime<Utc>) {
        self.recorded_at = Some(now);
    }

    fn age_marker(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_overwrites_caller_timestamps() {
        let stale = Utc::now() - chrono::Duration::days(400);
        let mut node = NodeInfo {
            last_seen: Some(stale),
            updated_at: Some(stale),
            ..NodeInfo::named("n")
        };
        let now = Utc::now();
        node.stamp(now);
        assert_eq!(node.last_seen, Some(now));
        assert_eq!(node.updated_at, Some(now));
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = json!({
            "name": "relay-1",
            "capabilities": ["relay", "dht"],
            "lastSeen": "2026-01-02T03:04:05Z"
        });
        let node: NodeInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(node.name(), Some("relay-1"));
        assert_eq!(node.field("capabilities"), Some(&json!(["relay", "dht"])));

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["capabilities"], json!(["relay", "dht"]));
        assert_eq!(back["lastSeen"], json!("2026-01-02T03:04:05Z"));
    }

    #[test]
    fn test_caller_fields_of_any_type_are_kept_verbatim() {
        let raw = json!({
            "fileName": "a.iso",
            "status": "paused",
            "direction": 7,
            "size": "2048",
            "recordedAt": "2026-03-01T00:00:00Z"
        });
        let transfer: TransferRecord = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(transfer.status(), None);
        assert_eq!(transfer.direction(), None);
        assert_eq!(transfer.size(), Some(2048));
        assert_eq!(serde_json::to_value(&transfer).unwrap(), raw);
    }

    #[test]
    fn test_port_accepts_numeric_strings() {
        let node: NodeInfo = serde_json::from_value(json!({"port": "4001"})).unwrap();
        assert_eq!(node.port(), Some(4001));
        let node: NodeInfo = serde_json::from_value(json!({"port": 70000})).unwrap();
        assert_eq!(node.port(), None);
        assert_eq!(node.field("port"), Some(&json!(70000)));
    }

    #[test]
    fn test_unparseable_timestamp_reads_as_unset() {
        let peer: PeerInfo =
            serde_json::from_value(json!({"nodeId": "n1", "lastSeen": "yesterday-ish"})).unwrap();
        assert_eq!(peer.last_seen, None);
        assert_eq!(peer.node_id(), Some("n1"));
    }

    #[test]
    fn test_set_field_refuses_stamped_names() {
        let mut node = NodeInfo::named("n");
        node.set_field("lastSeen", "2020-01-01T00:00:00Z");
        assert!(node.field("lastSeen").is_none());
    }

    #[test]
    fn test_keyed_merges_id_into_record() {
        let keyed = Keyed {
            id: "f1".to_string(),
            record: FileInfo::new("movie.mkv").with_size(42),
        };
        let value = serde_json::to_value(&keyed).unwrap();
        assert_eq!(value["id"], "f1");
        assert_eq!(value["name"], "movie.mkv");
        assert_eq!(value["size"], 42);
    }

    #[test]
    fn test_keyed_store_key_wins_over_record_id() {
        let keyed = Keyed {
            id: "f1".to_string(),
            record: FileInfo::new("movie.mkv").with_field("id", "caller-id"),
        };
        let text = serde_json::to_string(&keyed).unwrap();
        assert_eq!(text.matches("\"id\"").count(), 1);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], "f1");
        assert_eq!(keyed.record.field("id"), Some(&json!("caller-id")));
    }

    #[test]
    fn test_file_matches_ignores_case() {
        let file = FileInfo::new("Holiday Photos.zip");
        assert!(file.matches("photos"));
        assert!(file.matches("HOLIDAY"));
        assert!(!file.matches("video"));
        assert!(!FileInfo::default().matches(""));
    }

    #[test]
    fn test_transfer_age_marker_is_recorded_at() {
        let mut transfer = TransferRecord::new("a.txt", TransferDirection::Upload);
        assert_eq!(transfer.age_marker(), None);
        assert_eq!(transfer.direction(), Some(TransferDirection::Upload));
        let now = Utc::now();
        transfer.stamp(now);
        assert_eq!(transfer.age_marker(), Some(now));
    }

    #[test]
    fn test_collection_file_names() {
        let names: Vec<String> = CollectionKind::ALL.iter().map(|k| k.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "nodes.json",
                "files.json",
                "peers.json",
                "config.json",
                "transfers.json"
            ]
        );
    }
}

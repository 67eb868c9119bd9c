use crate::cache::{stored_pairs, Document};
use crate::error::Result;
use crate::model::{Keyed, Record};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// One entity collection, keyed by record id.
///
/// Stored entries that do not parse as a record are kept as raw JSON and written back on every
/// save, so loading never loses data. They are invisible to reads until a write replaces them.
#[derive(Debug, Clone)]
pub struct Collection<R> {
    records: HashMap<String, R>,
    unreadable: HashMap<String, Value>,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            unreadable: HashMap::new(),
        }
    }
}

impl<R: Serialize> Serialize for Collection<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len() + self.unreadable.len()))?;
        for (id, record) in &self.records {
            map.serialize_entry(id, record)?;
        }
        for (id, raw) in &self.unreadable {
            map.serialize_entry(id, raw)?;
        }
        map.end()
    }
}

impl<R: Record> Collection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: HashMap<String, R>) -> Self {
        Self {
            records,
            unreadable: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    /// Stamp `record` with `now` and store it, replacing any previous record under `id`.
    pub fn put(&mut self, id: impl Into<String>, mut record: R, now: DateTime<Utc>) -> R {
        record.stamp(now);
        let id = id.into();
        self.unreadable.remove(&id);
        self.records.insert(id, record.clone());
        record
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed_raw = self.unreadable.remove(id).is_some();
        self.records.remove(id).is_some() || removed_raw
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keyed(&self) -> Vec<Keyed<R>> {
        self.records
            .iter()
            .map(|(id, record)| Keyed {
                id: id.clone(),
                record: record.clone(),
            })
            .collect()
    }

    pub fn keyed_where(&self, mut keep: impl FnMut(&R) -> bool) -> Vec<Keyed<R>> {
        self.records
            .iter()
            .filter(|(_, record)| keep(record))
            .map(|(id, record)| Keyed {
                id: id.clone(),
                record: record.clone(),
            })
            .collect()
    }

    pub fn records(&self) -> &HashMap<String, R> {
        &self.records
    }

    /// Ids of stored entries kept raw because they did not parse.
    pub fn unreadable_ids(&self) -> impl Iterator<Item = &str> {
        self.unreadable.keys().map(String::as_str)
    }

    /// Drop every record whose age marker is strictly before `cutoff`.
    /// Records without an age marker stay. Returns how many were removed.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.age_marker().map_or(true, |seen| seen >= cutoff));
        before - self.records.len()
    }
}

impl<R: Record> Document for Collection<R> {
    fn from_stored(value: Value) -> Result<Self> {
        let pairs = stored_pairs(value)?;
        let mut collection = Self::default();
        for (id, raw) in pairs {
            match serde_json::from_value::<R>(raw.clone()) {
                Ok(record) => {
                    collection.records.insert(id, record);
                }
                Err(e) => {
                    warn!("Keeping unreadable record '{}' as stored: {}", id, e);
                    collection.unreadable.insert(id, raw);
                }
            }
        }
        Ok(collection)
    }

    fn fallback() -> Self {
        Self::default()
    }

    fn entry_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeInfo, PeerInfo};
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_put_stamps_and_replaces() {
        let mut nodes = Collection::<NodeInfo>::new();
        let first = Utc::now() - Duration::seconds(10);
        nodes.put("n1", NodeInfo::named("old"), first);

        let now = Utc::now();
        let stored = nodes.put("n1", NodeInfo::default(), now);

        assert_eq!(nodes.len(), 1);
        assert_eq!(stored.last_seen, Some(now));
        // Full overwrite: the old name is gone
        assert_eq!(nodes.get("n1").unwrap().name(), None);
    }

    #[test]
    fn test_evict_boundary() {
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        let mut peers = Collection::<PeerInfo>::new();
        peers.put("old", PeerInfo::default(), now - Duration::days(31));
        peers.put("edge", PeerInfo::default(), cutoff);
        peers.put("fresh", PeerInfo::default(), now - Duration::days(29));
        let mut unstamped = Collection::<PeerInfo>::from_records(peers.records().clone());
        unstamped
            .records
            .insert("never-seen".to_string(), PeerInfo::default());

        let removed = unstamped.evict_older_than(cutoff);

        assert_eq!(removed, 1);
        assert!(unstamped.get("old").is_none());
        assert!(unstamped.get("edge").is_some());
        assert!(unstamped.get("fresh").is_some());
        assert!(unstamped.get("never-seen").is_some());
    }

    #[test]
    fn test_from_stored_keeps_unreadable_records() {
        let stored = json!({
            "good": {"name": "a", "lastSeen": "2026-01-01T00:00:00Z"},
            "odd": {"port": "4001", "lastSeen": "yesterday-ish"},
            "bare": 42
        });
        let nodes = Collection::<NodeInfo>::from_stored(stored).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes.get("odd").unwrap().port(), Some(4001));
        assert!(nodes.get("bare").is_none());
        assert_eq!(nodes.unreadable_ids().collect::<Vec<_>>(), vec!["bare"]);

        let written = serde_json::to_value(&nodes).unwrap();
        assert_eq!(written["bare"], json!(42));
        assert_eq!(written["odd"]["port"], json!("4001"));
    }

    #[test]
    fn test_put_and_remove_replace_unreadable_entries() {
        let stored = json!({"a": 1, "b": "two"});
        let mut nodes = Collection::<NodeInfo>::from_stored(stored).unwrap();

        nodes.put("a", NodeInfo::named("fixed"), Utc::now());
        assert!(nodes.remove("b"));

        let written = serde_json::to_value(&nodes).unwrap();
        assert_eq!(written["a"]["name"], "fixed");
        assert!(written.get("b").is_none());
        assert_eq!(nodes.unreadable_ids().count(), 0);
    }

    #[test]
    fn test_serializes_as_keyed_object() {
        let mut nodes = Collection::<NodeInfo>::new();
        nodes.put("n1", NodeInfo::named("x"), Utc::now());
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(value["n1"]["name"], "x");
        assert!(value["n1"]["lastSeen"].is_string());
    }
}

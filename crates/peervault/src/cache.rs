//! # Durable Cache
//!
//! The engine both stores are built on: an in-memory document that is the sole source of truth
//! while the process runs, mirrored to one JSON document through a [`StorageBackend`].
//!
//! ## Lifecycle
//!
//! 1. **Load** (once, on open): read and parse the backing document. A parse produces the
//!    document through [`Document::from_stored`]. Anything that goes wrong (missing file, I/O
//!    error, bad JSON, wrong shape) falls back to [`Document::fallback`]; load never fails.
//!    Documents that ask for it ([`Document::persist_fallback`]) write the fallback back right
//!    away so a valid file exists from then on.
//! 2. **Access**: callers read and mutate through [`DurableCache::read`] and
//!    [`DurableCache::write`]. The backing document is never re-read.
//! 3. **Save**: the whole document is serialized under the read lock, the lock is released, and
//!    only then is the string handed to the backend. Mutations made during the I/O land in the
//!    next save. Two overlapping saves each write a complete snapshot.
//!
//! ## Stored Shapes
//!
//! [`stored_pairs`] accepts the two shapes older versions wrote:
//!
//! ```text
//! { "key": { ... }, "other": { ... } }          // keyed object (current)
//! [ ["key", { ... }], ["other", { ... }] ]      // array of pairs (legacy)
//! ```

use crate::error::{Result, VaultError};
use crate::store::StorageBackend;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

/// The full in-memory state one cache keeps.
pub trait Document: Serialize + Send + Sync + Sized + 'static {
    /// Build the document from the parsed backing file.
    fn from_stored(value: Value) -> Result<Self>;

    /// State used when nothing usable is stored.
    fn fallback() -> Self;

    /// Whether the fallback state is written back immediately after a failed load.
    fn persist_fallback() -> bool {
        false
    }

    /// Number of entries, for logging and stats.
    fn entry_count(&self) -> usize;
}

/// How the initial load went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The backing document was read and parsed.
    Loaded { entries: usize },
    /// There was no backing document yet.
    Missing,
    /// The backing document was unusable; the fallback state is in use.
    Recovered { reason: String },
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// Something that can write its state out. Lets a store save heterogeneous caches as one batch.
pub trait Persist: Send + Sync {
    fn name(&self) -> &str;
    fn save(&self) -> Result<()>;
    /// The current state as it would be written.
    fn snapshot(&self) -> Result<Value>;
}

pub struct DurableCache<D: Document, B: StorageBackend> {
    name: String,
    backend: B,
    state: RwLock<D>,
    load_outcome: LoadOutcome,
}

impl<D: Document, B: StorageBackend> DurableCache<D, B> {
    /// Load the document from `backend`, falling back per [`Document`] on any failure.
    pub fn open(name: impl Into<String>, backend: B) -> Self {
        let name = name.into();
        let (document, load_outcome) = load_document::<D, B>(&name, &backend);

        let cache = Self {
            name,
            backend,
            state: RwLock::new(document),
            load_outcome,
        };

        if !cache.load_outcome.is_loaded() && D::persist_fallback() {
            if let Err(e) = cache.save() {
                warn!("Failed to persist defaults for '{}': {}", cache.name, e);
            }
        }

        cache
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn location(&self) -> PathBuf {
        self.backend.location()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `f` against the current state.
    pub fn read<T>(&self, f: impl FnOnce(&D) -> T) -> T {
        let state = self.state.read();
        f(&state)
    }

    /// Run `f` against the current state with write access.
    pub fn write<T>(&self, f: impl FnOnce(&mut D) -> T) -> T {
        let mut state = self.state.write();
        f(&mut state)
    }

    /// Replace the whole state.
    pub fn replace(&self, document: D) {
        *self.state.write() = document;
    }

    /// Serialize the current state. Holds the read lock only for the serialization.
    pub fn snapshot(&self) -> Result<String> {
        let state = self.state.read();
        serde_json::to_string_pretty(&*state).map_err(VaultError::Serialization)
    }

    pub fn save(&self) -> Result<()> {
        let contents = self.snapshot()?;
        self.backend.write(&contents)?;
        debug!(
            "Saved '{}' ({} entries) to {}",
            self.name,
            self.read(|d| d.entry_count()),
            self.backend.location().display()
        );
        Ok(())
    }
}

impl<D: Document, B: StorageBackend> Persist for DurableCache<D, B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self) -> Result<()> {
        DurableCache::save(self)
    }

    fn snapshot(&self) -> Result<Value> {
        self.read(|state| serde_json::to_value(state))
            .map_err(VaultError::Serialization)
    }
}

fn load_document<D: Document, B: StorageBackend>(name: &str, backend: &B) -> (D, LoadOutcome) {
    let raw = match backend.read() {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No stored data for '{}', starting fresh", name);
            return (D::fallback(), LoadOutcome::Missing);
        }
        Err(e) => {
            warn!("Failed to read '{}': {}; starting fresh", name, e);
            return (
                D::fallback(),
                LoadOutcome::Recovered {
                    reason: e.to_string(),
                },
            );
        }
    };

    let parsed = serde_json::from_str::<Value>(&raw)
        .map_err(VaultError::Serialization)
        .and_then(D::from_stored);

    match parsed {
        Ok(document) => {
            let entries = document.entry_count();
            debug!("Loaded '{}' with {} entries", name, entries);
            (document, LoadOutcome::Loaded { entries })
        }
        Err(e) => {
            warn!("Stored data for '{}' is unusable: {}; starting fresh", name, e);
            (
                D::fallback(),
                LoadOutcome::Recovered {
                    reason: e.to_string(),
                },
            )
        }
    }
}

/// Interpret a stored value as key/value pairs: a keyed object or an array of `[key, value]`.
pub fn stored_pairs(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(items) => {
            let mut map = Map::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        let mut pair = pair.into_iter();
                        let key = pair.next().unwrap_or(Value::Null);
                        let value = pair.next().unwrap_or(Value::Null);
                        let key = match key {
                            Value::String(key) => key,
                            other => {
                                return Err(VaultError::Store(format!(
                                    "pair key must be a string, got {}",
                                    other
                                )))
                            }
                        };
                        map.insert(key, value);
                    }
                    other => {
                        return Err(VaultError::Store(format!(
                            "expected a [key, value] pair, got {}",
                            other
                        )))
                    }
                }
            }
            Ok(map)
        }
        other => Err(VaultError::Store(format!(
            "expected an object or an array of pairs, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem_backend::MemBackend;
    use serde_json::json;

    /// A plain string map, enough to exercise the engine.
    #[derive(Debug, Default, Serialize)]
    #[serde(transparent)]
    struct Names(Map<String, Value>);

    impl Document for Names {
        fn from_stored(value: Value) -> Result<Self> {
            Ok(Names(stored_pairs(value)?))
        }

        fn fallback() -> Self {
            Names::default()
        }

        fn entry_count(&self) -> usize {
            self.0.len()
        }
    }

    /// Same as `Names` but insists on persisting its fallback.
    #[derive(Debug, Serialize)]
    #[serde(transparent)]
    struct Seeded(Map<String, Value>);

    impl Document for Seeded {
        fn from_stored(value: Value) -> Result<Self> {
            Ok(Seeded(stored_pairs(value)?))
        }

        fn fallback() -> Self {
            let mut map = Map::new();
            map.insert("seed".to_string(), json!(true));
            Seeded(map)
        }

        fn persist_fallback() -> bool {
            true
        }

        fn entry_count(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_missing_document_starts_empty() {
        let backend = MemBackend::new();
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend.clone());
        assert_eq!(cache.load_outcome(), &LoadOutcome::Missing);
        assert_eq!(cache.read(|d| d.entry_count()), 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_loads_keyed_object() {
        let backend = MemBackend::with_document(r#"{"a": 1, "b": 2}"#);
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert_eq!(cache.load_outcome(), &LoadOutcome::Loaded { entries: 2 });
        assert_eq!(cache.read(|d| d.0["b"].clone()), json!(2));
    }

    #[test]
    fn test_loads_array_of_pairs() {
        let backend = MemBackend::with_document(r#"[["a", {"x": 1}], ["b", {"x": 2}]]"#);
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert_eq!(cache.load_outcome(), &LoadOutcome::Loaded { entries: 2 });
        assert_eq!(cache.read(|d| d.0["a"]["x"].clone()), json!(1));
    }

    #[test]
    fn test_corrupt_document_recovers_empty() {
        let backend = MemBackend::with_document("{ not json");
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert!(matches!(
            cache.load_outcome(),
            LoadOutcome::Recovered { .. }
        ));
        assert_eq!(cache.read(|d| d.entry_count()), 0);
    }

    #[test]
    fn test_wrong_shape_recovers_empty() {
        let backend = MemBackend::with_document("42");
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        match cache.load_outcome() {
            LoadOutcome::Recovered { reason } => assert!(reason.contains("a number")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_read_error_recovers() {
        let backend = MemBackend::with_document(r#"{"a": 1}"#);
        backend.set_simulate_read_error(true);
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert!(!cache.load_outcome().is_loaded());
        assert_eq!(cache.read(|d| d.entry_count()), 0);
    }

    #[test]
    fn test_fallback_is_persisted_when_requested() {
        let backend = MemBackend::with_document("garbage");
        let _cache: DurableCache<Seeded, _> = DurableCache::open("seeded", backend.clone());
        assert_eq!(backend.write_count(), 1);
        let stored: Value = serde_json::from_str(&backend.document().unwrap()).unwrap();
        assert_eq!(stored, json!({"seed": true}));
    }

    #[test]
    fn test_save_writes_full_snapshot() {
        let backend = MemBackend::new();
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend.clone());
        cache.write(|d| {
            d.0.insert("k".to_string(), json!({"v": 1}));
        });
        cache.save().unwrap();

        let reopened: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert_eq!(reopened.read(|d| d.0["k"]["v"].clone()), json!(1));
    }

    #[test]
    fn test_save_failure_is_reported() {
        let backend = MemBackend::new();
        backend.set_simulate_write_error(true);
        let cache: DurableCache<Names, _> = DurableCache::open("names", backend);
        assert!(cache.save().is_err());
    }

    #[test]
    fn test_stored_pairs_rejects_bad_pairs() {
        assert!(stored_pairs(json!([["a", 1, 2]])).is_err());
        assert!(stored_pairs(json!([[1, "a"]])).is_err());
        assert!(stored_pairs(json!("nope")).is_err());
        assert_eq!(stored_pairs(json!([])).unwrap().len(), 0);
    }
}

use super::backend::StorageBackend;
use crate::error::{Result, VaultError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MemState {
    document: Mutex<Option<String>>,
    simulate_read_error: AtomicBool,
    simulate_write_error: AtomicBool,
    writes: AtomicUsize,
}

/// In-memory storage backend for testing.
///
/// Clones share the same document, so a test can keep a handle, drop the
/// store, and open a new store over the "same file".
#[derive(Clone, Default)]
pub struct MemBackend {
    name: String,
    state: Arc<MemState>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Backend pre-loaded with a raw document, e.g. a corrupt one.
    pub fn with_document(contents: impl Into<String>) -> Self {
        let backend = Self::new();
        *backend.state.document.lock() = Some(contents.into());
        backend
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.state
            .simulate_write_error
            .store(simulate, Ordering::SeqCst);
    }

    pub fn set_simulate_read_error(&self, simulate: bool) {
        self.state.simulate_read_error.store(simulate, Ordering::SeqCst);
    }

    /// Current raw document, if any.
    pub fn document(&self) -> Option<String> {
        self.state.document.lock().clone()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }
}

impl StorageBackend for MemBackend {
    fn read(&self) -> Result<Option<String>> {
        if self.state.simulate_read_error.load(Ordering::SeqCst) {
            return Err(VaultError::Store("Simulated read error".to_string()));
        }
        Ok(self.state.document.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        if self.state.simulate_write_error.load(Ordering::SeqCst) {
            return Err(VaultError::Store("Simulated write error".to_string()));
        }
        *self.state.document.lock() = Some(contents.to_string());
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from(format!("memory://{}", self.name))
    }
}

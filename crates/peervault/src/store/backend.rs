use crate::error::Result;
use std::path::PathBuf;

/// Abstract interface for raw document I/O.
/// This trait handles the "how" of storage (filesystem vs memory),
/// while [`DurableCache`](crate::cache::DurableCache) handles the "what"
/// (parsing, fallback, snapshotting).
///
/// One backend holds exactly one document; stores never share a backend.
pub trait StorageBackend: Send + Sync + 'static {
    /// Read the raw document.
    /// Returns Ok(None) if nothing has been stored yet.
    /// Returns Err only on actual I/O errors (permissions, disk failure).
    fn read(&self) -> Result<Option<String>>;

    /// Replace the stored document.
    /// MUST be atomic (e.g. write to tmp then rename) to avoid partial writes.
    fn write(&self, contents: &str) -> Result<()>;

    /// Where the document lives. For FsBackend this is the real path,
    /// for MemBackend a virtual one.
    fn location(&self) -> PathBuf;
}

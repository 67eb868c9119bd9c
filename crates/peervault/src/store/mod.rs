//! # Storage Layer
//!
//! Raw document I/O, kept apart from the caching logic in [`crate::cache`].
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: Production backend. One pretty-printed JSON file per document,
//!   replaced atomically (write to a temp file in the same directory, then rename).
//! - [`mem_backend::MemBackend`]: In-memory backend for tests, with switches to simulate read and
//!   write failures.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── nodes.json
//! ├── files.json
//! ├── peers.json
//! ├── config.json
//! ├── transfers.json
//! ├── settings.json
//! └── backups/
//!     └── settings-backup-2026-10-19T08-30-00-000Z.json
//! ```
//!
//! [`collection::Collection`] is the document type of the five entity files.

pub mod backend;
pub mod collection;
pub mod fs_backend;
pub mod mem_backend;

pub use backend::StorageBackend;
pub use collection::Collection;
pub use fs_backend::FsBackend;
pub use mem_backend::MemBackend;

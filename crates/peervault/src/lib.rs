//! # PeerVault Architecture
//!
//! PeerVault is the local persistence layer of a peer-to-peer file sharing desktop app. It keeps
//! what the app knows about the network (nodes, peers, shared files, transfer history) and the
//! user's settings, in plain JSON files under one data directory.
//!
//! There is no database. Each document is held in memory while the process runs and mirrored to
//! disk on a schedule, on request and at shutdown.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Stores (entity.rs, settings/)                              │
//! │  - Typed accessors the rest of the app calls                │
//! │  - Validation, cleanup, backups, import/export              │
//! │  - Own their background tasks (autosave, backup scheduler)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Durable Cache (cache.rs)                                   │
//! │  - One in-memory document behind a lock                     │
//! │  - Load once with fallback, save whole snapshots            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - StorageBackend trait: read / atomic write of one doc     │
//! │  - FsBackend (production), MemBackend (testing)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability
//!
//! The in-memory state is authoritative. Files are only read at startup, and a file that is
//! missing or corrupt never stops a store from opening: it starts empty (entities) or from the
//! defaults (settings) and reports that through a [`LoadOutcome`]. Writes replace files
//! atomically, so a crash mid-save leaves the previous version intact.
//!
//! Anything written between the last save and a crash is lost. Call `save()` after changes
//! that must not be.
//!
//! ## Failure Reporting
//!
//! Failures in background work are logged and never unwind into the app. Explicit calls return
//! their outcomes as values ([`SaveReport`], [`CleanupReport`], [`RestoreReport`],
//! [`LoadOutcome`]) and log them through `tracing`. The library does not install a subscriber.
//!
//! ## Testing Strategy
//!
//! 1. **Units**: every module carries its own tests, mostly against [`MemBackend`], which can
//!    simulate read and write failures.
//! 2. **Integration** (`tests/`): whole stores on a temporary directory via
//!    `test_utils::TestEnv` (enabled by the `test_utils` feature).
//!
//! ## Module Overview
//!
//! - [`entity`]: [`EntityStore`], the five entity collections
//! - [`settings`]: [`SettingsStore`], schema, validation and backups
//! - [`cache`]: [`DurableCache`] and the [`Document`](cache::Document) trait
//! - [`store`]: Storage backends and the entity collection document
//! - [`model`]: Entity record types
//! - [`task`]: Owned periodic background tasks
//! - [`config`]: Runtime configuration
//! - [`error`]: Error types

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod model;
pub mod settings;
pub mod store;
pub mod task;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use cache::{DurableCache, LoadOutcome};
pub use config::VaultConfig;
pub use entity::{CleanupReport, EntityStore, ExportBundle, SaveReport, StoreStats};
pub use error::{Result, VaultError};
pub use model::{
    CollectionKind, ConfigEntry, FileInfo, Keyed, NodeInfo, PeerInfo, TransferDirection,
    TransferRecord, TransferStatus,
};
pub use settings::{RestoreReport, SettingKey, Settings, SettingsStore};
pub use store::{FsBackend, MemBackend, StorageBackend};

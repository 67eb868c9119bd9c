//! # Settings Store
//!
//! User-facing application settings: a fixed, typed schema persisted as `settings.json`, with
//! validation on every write and a rotating set of backup files.
//!
//! ## Layout
//!
//! - [`schema`]: [`SettingKey`], the typed [`Settings`] struct, defaults, categories and display
//!   metadata.
//! - [`validate`]: the [`Rule`] each key must satisfy.
//! - `hooks`: side effects of changing a setting (creating the download folder).
//! - [`backup`]: backup file naming, the envelope format, listing and rotation.
//! - [`store`]: [`SettingsStore`], tying the above to a [`DurableCache`](crate::cache::DurableCache).
//!
//! ## Trusted and Untrusted Input
//!
//! Direct calls ([`SettingsStore::set`], [`SettingsStore::set_multiple`]) fail on the first
//! unknown key or invalid value and change nothing. Everything read from a file (the settings
//! file at startup, a backup, an import) is untrusted: unknown keys are ignored, invalid values
//! are dropped with a warning, and the rest is applied.
//!
//! | Source | Layered over |
//! |--------|--------------|
//! | `settings.json` at startup | defaults |
//! | [`SettingsStore::restore_from_backup`] | defaults |
//! | [`SettingsStore::import_settings`] | current settings |

pub mod backup;
pub(crate) mod hooks;
pub mod schema;
pub mod store;
pub mod validate;

pub use backup::{BackupInfo, Envelope};
pub use schema::{Category, DisplayKind, Rejection, SettingKey, SettingMetadata, Settings};
pub use store::{RestoreReport, SettingsStore};
pub use validate::{Rule, ValidationReport};

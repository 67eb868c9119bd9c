//! Side effects of changing a setting.
//!
//! Hooks run after the new value is in the cache and before it is saved. They are best effort:
//! a failing hook is logged and never undoes or blocks the change.

use crate::settings::schema::{SettingKey, Settings};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Run the hooks for every key that differs between `old` and `new`.
pub(crate) fn run_changed(old: &Settings, new: &Settings) {
    for key in new.changed_keys(old) {
        on_change(key, old, new);
    }
}

fn on_change(key: SettingKey, old: &Settings, new: &Settings) {
    if key == SettingKey::DownloadPath {
        debug!(
            "Download path changed from {} to {}",
            old.download_path, new.download_path
        );
        ensure_dir(Path::new(&new.download_path));
    }
}

fn ensure_dir(dir: &Path) {
    if dir.is_dir() {
        return;
    }
    match fs::create_dir_all(dir) {
        Ok(()) => debug!("Created download directory {}", dir.display()),
        Err(e) => warn!("Could not create download directory {}: {}", dir.display(), e),
    }
}

use super::backend::StorageBackend;
use crate::error::{Result, VaultError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Filesystem backend: one JSON file per document.
#[derive(Debug, Clone)]
pub struct FsBackend {
    path: PathBuf,
}

impl FsBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(VaultError::Io)?;
        }
        Ok(())
    }

    fn tmp_path(&self, dir: &Path) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        dir.join(format!(".{}-{}.tmp", stem, Uuid::new_v4()))
    }
}

impl StorageBackend for FsBackend {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.ensure_dir(&dir)?;

        // Atomic write
        let tmp_path = self.tmp_path(&dir);
        fs::write(&tmp_path, contents).map_err(VaultError::Io)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(VaultError::Io(e));
        }

        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

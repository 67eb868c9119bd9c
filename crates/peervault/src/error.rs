use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value for setting '{key}': {reason}")]
    Validation { key: String, reason: String },

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Unknown settings category: {0}")]
    UnknownCategory(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),

    #[error("Store error: {0}")]
    Store(String),
}

impl VaultError {
    pub fn validation(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by caller input rather than storage.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnknownSetting(_) | Self::UnknownCategory(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

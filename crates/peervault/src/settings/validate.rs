//! Per-key validation rules.
//!
//! Every write into the settings passes through [`validate`]. The rule for a key comes from
//! [`rule_for`], an exhaustive match, so each key has exactly one rule.

use crate::error::{Result, VaultError};
use crate::settings::schema::{Rejection, SettingKey, Settings};
use serde::Serialize;
use serde_json::Value;

pub const THEMES: &[&str] = &["system", "light", "dark"];
pub const LANGUAGES: &[&str] = &["en", "zh-CN", "ja", "de", "fr"];

/// Constraint a setting's value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Rule {
    /// Integer within `min..=max`.
    IntRange { min: i64, max: i64 },
    /// One of a fixed set of strings.
    OneOf { options: &'static [&'static str] },
    Boolean,
    /// String with at least one non-whitespace character.
    NonEmptyString,
    /// Any string, including the empty one.
    Text,
}

impl Rule {
    /// Check `value`, returning a human-readable reason on failure.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match *self {
            Rule::IntRange { min, max } => match value.as_i64() {
                Some(n) if (min..=max).contains(&n) => Ok(()),
                _ => Err(format!("must be an integer between {} and {}", min, max)),
            },
            Rule::OneOf { options } => match value.as_str() {
                Some(s) if options.contains(&s) => Ok(()),
                _ => Err(format!("must be one of {}", options.join(", "))),
            },
            Rule::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("must be a boolean".to_string()),
            },
            Rule::NonEmptyString => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("must be a non-empty string".to_string()),
            },
            Rule::Text => match value {
                Value::String(_) => Ok(()),
                _ => Err("must be a string".to_string()),
            },
        }
    }
}

pub fn rule_for(key: SettingKey) -> Rule {
    use SettingKey::*;
    match key {
        MaxConnections => Rule::IntRange { min: 1, max: 200 },
        ListenPort => Rule::IntRange {
            min: 1024,
            max: 65535,
        },
        ConnectionTimeout => Rule::IntRange { min: 5, max: 300 },
        MaxConcurrentTransfers => Rule::IntRange { min: 1, max: 20 },
        WindowWidth => Rule::IntRange {
            min: 800,
            max: 7680,
        },
        WindowHeight => Rule::IntRange {
            min: 600,
            max: 4320,
        },
        ChunkSize => Rule::IntRange { min: 16, max: 4096 },
        UploadLimit | DownloadLimit => Rule::IntRange {
            min: 0,
            max: 1_000_000,
        },
        BackupInterval => Rule::IntRange { min: 1, max: 168 },
        MaxBackupFiles => Rule::IntRange { min: 1, max: 50 },
        Theme => Rule::OneOf { options: THEMES },
        Language => Rule::OneOf { options: LANGUAGES },
        DownloadPath | DeviceName => Rule::NonEmptyString,
        ProxyUrl => Rule::Text,
        AutoAcceptFiles | OpenFolderOnComplete | MinimizeToTray | StartMinimized | EnableDht
        | EnableLocalDiscovery | ShareDeviceName | AllowUnknownPeers | KeepTransferHistory
        | HardwareAcceleration | AutoBackup => Rule::Boolean,
    }
}

/// Check one value against its key's rule.
pub fn validate(key: SettingKey, value: &Value) -> Result<()> {
    rule_for(key)
        .check(value)
        .map_err(|reason| VaultError::validation(key.as_str(), reason))
}

/// Result of re-validating a whole settings object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub failures: Vec<Rejection>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn validate_all(settings: &Settings) -> ValidationReport {
    let failures = SettingKey::ALL
        .iter()
        .filter_map(|key| {
            rule_for(*key)
                .check(&settings.value(*key))
                .err()
                .map(|reason| Rejection {
                    key: key.as_str().to_string(),
                    reason,
                })
        })
        .collect();

    ValidationReport {
        checked: SettingKey::ALL.len(),
        failures,
    }
}

//! Configuration for `spool`.
//!
//! Sources and precedence (highest wins):
//! 1. Environment variables (`SPOOL_*`)
//! 2. Config file (YAML), when the host passes a path to `SpoolConfig::load`
//! 3. Defaults

use crate::error::{Result, SpoolError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Runtime configuration for the cache, queue, and flush coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpoolConfig {
    /// Trailing-edge debounce window before a project flushes (ms).
    pub debounce_ms: u64,

    /// SQLite busy-wait timeout while the sync CLI holds the store (ms).
    pub busy_timeout_ms: u64,

    /// Attempts per queue item before it is dead-lettered.
    pub max_retry_attempts: u32,

    /// Cap on completed-history entries per project (dead letters share it).
    pub max_history_items: usize,

    /// Run the external sync command before applying pending items.
    pub sync_before_flush: bool,

    /// Run the external sync command after applying pending items.
    pub sync_after_flush: bool,

    /// Flush worker pool size. Projects flush concurrently up to this bound;
    /// a single project never flushes on two workers at once.
    pub flush_workers: usize,

    /// Executable invoked as `<sync-command> sync` in the project directory.
    pub sync_command: String,

    /// Actor recorded in the store's events table.
    pub actor: String,

    /// Labels shaped `<prefix>:group/<name>` contribute `<name>` to the
    /// project's group list.
    pub group_label_prefix: String,

    /// Prefix for synthesized issue IDs.
    pub id_prefix: String,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            busy_timeout_ms: 5000,
            max_retry_attempts: 3,
            max_history_items: 100,
            sync_before_flush: true,
            sync_after_flush: true,
            flush_workers: 2,
            sync_command: "tracker".to_string(),
            actor: "spool".to_string(),
            group_label_prefix: "spool".to_string(),
            id_prefix: "is".to_string(),
        }
    }
}

impl SpoolConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults (plus environment) apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, no file.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("SPOOL_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = env_u64("SPOOL_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = v;
        }
        if let Some(v) = env_u64("SPOOL_MAX_RETRY_ATTEMPTS") {
            self.max_retry_attempts = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = env_u64("SPOOL_MAX_HISTORY_ITEMS") {
            self.max_history_items = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = env_bool("SPOOL_SYNC_BEFORE_FLUSH") {
            self.sync_before_flush = v;
        }
        if let Some(v) = env_bool("SPOOL_SYNC_AFTER_FLUSH") {
            self.sync_after_flush = v;
        }
        if let Some(v) = env_u64("SPOOL_FLUSH_WORKERS") {
            self.flush_workers = usize::try_from(v).unwrap_or(1).max(1);
        }
        if let Ok(v) = env::var("SPOOL_SYNC_COMMAND")
            && !v.trim().is_empty()
        {
            self.sync_command = v;
        }
        if let Ok(v) = env::var("SPOOL_ACTOR")
            && !v.trim().is_empty()
        {
            self.actor = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.flush_workers == 0 {
            return Err(SpoolError::Config(
                "flush-workers must be at least 1".to_string(),
            ));
        }
        if self.id_prefix.trim().is_empty() {
            return Err(SpoolError::Config("id-prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SpoolConfig::default();
        assert_eq!(config.debounce_ms, 2000);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.max_history_items, 100);
        assert!(config.sync_before_flush);
        assert!(config.sync_after_flush);
        assert_eq!(config.flush_workers, 2);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpoolConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.debounce_ms, SpoolConfig::default().debounce_ms);
    }

    #[test]
    fn load_reads_kebab_case_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "debounce-ms: 250\nsync-before-flush: false\nsync-command: fake-sync\n",
        )
        .unwrap();
        let config = SpoolConfig::load(&path).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert!(!config.sync_before_flush);
        assert_eq!(config.sync_command, "fake-sync");
        // Unspecified keys keep their defaults.
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "debounce-ms: [not, a, number]\n").unwrap();
        assert!(SpoolConfig::load(&path).is_err());
    }

    #[test]
    fn env_bool_parses_common_forms() {
        assert_eq!(super::env_bool("SPOOL_TEST_UNSET_KEY"), None);
    }
}

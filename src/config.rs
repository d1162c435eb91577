//! Configuration loading and management
//!
//! Handles parsing of `.tagsync.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::query::TagOrder;
use crate::storage::STORE_DIR;

/// Name of the configuration file at the project root
pub const CONFIG_FILE: &str = ".tagsync.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Tag query configuration
    #[serde(default)]
    pub tags: TagsConfig,
}

/// Store-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory, relative to the project root
    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// How long to wait for the store lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Record every tag/link row write in the outstanding change log
    #[serde(default = "default_true")]
    pub record_changes: bool,
}

fn default_store_dir() -> String {
    STORE_DIR.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            record_changes: true,
        }
    }
}

/// Tag query configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsConfig {
    /// Ordering for grouped tag listings
    #[serde(default)]
    pub default_order: TagOrder,

    /// Count hidden tasks in grouped tag listings
    #[serde(default)]
    pub include_hidden: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the project root, using defaults if missing
    pub fn load_from_root(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_else(|err| {
                tracing::warn!(path = %config_path.display(), %err, "ignoring invalid config");
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Absolute store directory for `root`
    pub fn store_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.store.dir)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.store.dir.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "store.dir cannot be empty".to_string(),
            ));
        }

        if self.store.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "store.lock_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.store.dir, ".tagsync");
        assert_eq!(cfg.store.lock_timeout_ms, 5000);
        assert!(cfg.store.record_changes);
        assert_eq!(cfg.tags.default_order, TagOrder::CountDesc);
        assert!(!cfg.tags.include_hidden);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[store]
dir = "state/tags"
lock_timeout_ms = 250
record_changes = false

[tags]
default_order = "name_asc"
include_hidden = true
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.store.dir, "state/tags");
        assert_eq!(cfg.store.lock_timeout_ms, 250);
        assert!(!cfg.store.record_changes);
        assert_eq!(cfg.tags.default_order, TagOrder::NameAsc);
        assert!(cfg.tags.include_hidden);
        assert_eq!(
            cfg.store_dir(dir.path()),
            dir.path().join("state").join("tags")
        );
    }

    #[test]
    fn invalid_store_config_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[store]\nlock_timeout_ms = 0").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            crate::error::Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_order_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[tags]\ndefault_order = \"shuffled\"").expect("write config");

        let err = Config::load(&path).expect_err("invalid order");
        assert!(matches!(err, crate::error::Error::TomlParse(_)));
    }

    #[test]
    fn load_from_root_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_root(dir.path());
        assert_eq!(cfg.store.dir, ".tagsync");
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("dir = \".tagsync\""));
        assert!(written.contains("default_order = \"count_desc\""));
    }
}

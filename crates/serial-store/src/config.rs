//! Store configuration
//!
//! Configuration loaded from a `.serial-store.toml` file, or built in code.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = ".serial-store.toml";

/// What to do when `should_execute` dispatches onto the store it is
/// guarding, on the same thread, before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyPolicy {
    /// Queue the nested action behind the one being checked.
    #[default]
    Enqueue,
    /// Panic, naming the store and the nested action.
    Panic,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name used in log lines
    #[serde(default = "default_label")]
    pub label: String,

    /// Handling of dispatches made from inside a middleware pre-check
    #[serde(default)]
    pub reentrancy: ReentrancyPolicy,

    /// Log a warning when this many actions are waiting (0 disables)
    #[serde(default = "default_backlog_warning")]
    pub backlog_warning: usize,
}

fn default_label() -> String {
    "store".to_string()
}

fn default_backlog_warning() -> usize {
    64
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            reentrancy: ReentrancyPolicy::default(),
            backlog_warning: default_backlog_warning(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load config from CWD first, then home directory, or use defaults
    pub fn load() -> Self {
        for path in config_candidates() {
            if !path.is_file() {
                continue;
            }
            match Self::from_path(&path) {
                Ok(config) => {
                    log::info!("Loaded store config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to load store config {}: {}", path.display(), e);
                }
            }
        }

        log::debug!("Using default store config");
        Self::default()
    }
}

/// Search order for [`StoreConfig::load`]
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(CONFIG_FILE));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.label, "store");
        assert_eq!(config.reentrancy, ReentrancyPolicy::Enqueue);
        assert_eq!(config.backlog_warning, 64);
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            label = "checkout"
            reentrancy = "panic"
            backlog_warning = 0
        "#;
        let config = StoreConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.label, "checkout");
        assert_eq!(config.reentrancy, ReentrancyPolicy::Panic);
        assert_eq!(config.backlog_warning, 0);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config = StoreConfig::from_toml_str(r#"label = "cart""#).unwrap();
        assert_eq!(config.label, "cart");
        // Other fields should use defaults
        assert_eq!(config.reentrancy, ReentrancyPolicy::Enqueue);
        assert_eq!(config.backlog_warning, 64);
    }

    #[test]
    fn test_config_rejects_unknown_policy() {
        let err = StoreConfig::from_toml_str(r#"reentrancy = "ignore""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_config_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "label = \"from-file\"").unwrap();

        let config = StoreConfig::from_path(file.path()).unwrap();
        assert_eq!(config.label, "from-file");
    }

    #[test]
    fn test_config_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = StoreConfig::from_path(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { path, .. } if path == missing));
    }

    #[test]
    fn test_config_candidates_start_with_cwd() {
        let candidates = config_candidates();
        assert_eq!(candidates[0], PathBuf::from(CONFIG_FILE));
    }
}

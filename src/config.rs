use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file::{DEFAULT_CACHE_CAPACITY, EvictionPolicy};

/// Smallest accepted buffer cache capacity, in pages
pub const MIN_CACHE_CAPACITY: usize = 8;

/// Largest accepted buffer cache capacity, in pages
pub const MAX_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache capacity {0} is outside [8, 1024]")]
    InvalidCapacity(usize),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for opening a [`Database`](crate::Database)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding table files, the catalog and index descriptors
    pub data_dir: PathBuf,
    /// Buffer cache size in pages
    pub cache_capacity: usize,
    pub eviction_policy: EvictionPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

impl StorageConfig {
    /// Default settings rooted at `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StorageConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(MIN_CACHE_CAPACITY..=MAX_CACHE_CAPACITY).contains(&self.cache_capacity) {
            return Err(ConfigError::InvalidCapacity(self.cache_capacity));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::new("/tmp/minidb");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/minidb"));
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_bounds() {
        let config = StorageConfig::new("d");
        assert!(config.clone().with_cache_capacity(8).validate().is_ok());
        assert!(config.clone().with_cache_capacity(1024).validate().is_ok());
        assert!(matches!(
            config.clone().with_cache_capacity(7).validate(),
            Err(ConfigError::InvalidCapacity(7))
        ));
        assert!(matches!(
            config.with_cache_capacity(1025).validate(),
            Err(ConfigError::InvalidCapacity(1025))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("minidb.json");
        std::fs::write(&path, r#"{"data_dir": "db", "eviction_policy": "fifo"}"#).unwrap();

        let config = StorageConfig::from_json_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("db"));
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.eviction_policy, EvictionPolicy::Fifo);
    }

    #[test]
    fn test_from_json_file_rejects_bad_capacity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("minidb.json");
        std::fs::write(&path, r#"{"cache_capacity": 2}"#).unwrap();

        let result = StorageConfig::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::InvalidCapacity(2))));
    }
}

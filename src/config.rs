//! Engine configuration
//!
//! Defaults match the block cache and file manager constants; a JSON file
//! may override any subset of fields.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::file::{CACHE_CAPACITY, MAX_OPEN_FILES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for one `Database` instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the catalog, table and index files
    pub data_dir: PathBuf,

    /// Soft limit on cached blocks
    pub cache_capacity: usize,

    /// Most file handles kept open at once
    pub max_open_files: usize,

    /// Fanout for new indexes; unset uses the largest that fits a block
    pub index_fanout: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./minisql_data"),
            cache_capacity: CACHE_CAPACITY,
            max_open_files: MAX_OPEN_FILES,
            index_fanout: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Builder for EngineConfig
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn cache_capacity(mut self, blocks: usize) -> Self {
        self.config.cache_capacity = blocks;
        self
    }

    pub fn max_open_files(mut self, count: usize) -> Self {
        self.config.max_open_files = count;
        self
    }

    pub fn index_fanout(mut self, fanout: usize) -> Self {
        self.config.index_fanout = Some(fanout);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 1024);
        assert_eq!(config.max_open_files, 128);
        assert_eq!(config.index_fanout, None);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .data_dir("/tmp/db")
            .cache_capacity(8)
            .index_fanout(4)
            .build();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/db"));
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.max_open_files, 128);
        assert_eq!(config.index_fanout, Some(4));
    }

    #[test]
    fn test_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minisql.json");
        fs::write(&path, r#"{ "cache_capacity": 32, "index_fanout": 7 }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cache_capacity, 32);
        assert_eq!(config.index_fanout, Some(7));
        assert_eq!(config.max_open_files, 128);
    }

    #[test]
    fn test_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minisql.json");
        fs::write(&path, "{ cache_capacity: ").unwrap();

        assert!(matches!(
            EngineConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            EngineConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}

//! # Pairing Configuration
//!
//! Settings for a pairing run, loaded from a JSON or YAML file. Every field
//! has a default, so a configuration file only needs to name what differs.
//!
//! ```rust
//! use mogreps_pair::config::PairingConfig;
//!
//! let config = PairingConfig::from_json(r#"{
//!   "parameter": "air_temperature",
//!   "regional_path": "s3://mogreps-uk/",
//!   "max_files": 10
//! }"#)?;
//! assert_eq!(config.global_path, "../data/mogreps-gg/");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::filename::{DEFAULT_EXTENSION, DEFAULT_GLOBAL_PREFIX, DEFAULT_REGIONAL_PREFIX};
use crate::pairing::PairingOptions;
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_REGIONAL_PATH: &str = "../data/mogreps-uk/";
pub const DEFAULT_GLOBAL_PATH: &str = "../data/mogreps-gg/";
pub const DEFAULT_MAX_FILES: usize = 100;
pub const DEFAULT_PARAMETER: &str = "air_temperature";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where to find the two archives and what to pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Field name extracted from both products
    pub parameter: String,
    /// Regional archive root, a local directory or `s3://bucket/prefix/`
    pub regional_path: String,
    /// Global archive root, a local directory or `s3://bucket/prefix/`
    pub global_path: String,
    /// Filename prefix used to list regional files
    pub regional_prefix: String,
    /// Filename prefix of the global counterparts
    pub global_prefix: String,
    /// Extension of the global counterparts, without the dot
    pub extension: String,
    /// Upper bound on the number of files listed from each archive
    pub max_files: usize,
    /// Directory for Parquet exports of the aligned fields
    pub output_dir: Option<String>,
    pub storage: StorageConfig,
}

impl Default for PairingConfig {
    fn default() -> Self {
        PairingConfig {
            parameter: DEFAULT_PARAMETER.to_string(),
            regional_path: DEFAULT_REGIONAL_PATH.to_string(),
            global_path: DEFAULT_GLOBAL_PATH.to_string(),
            regional_prefix: DEFAULT_REGIONAL_PREFIX.to_string(),
            global_prefix: DEFAULT_GLOBAL_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            max_files: DEFAULT_MAX_FILES,
            output_dir: None,
            storage: StorageConfig::default(),
        }
    }
}

impl PairingConfig {
    /// Loads a configuration file; `.yaml`/`.yml` files are parsed as YAML,
    /// anything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: PairingConfig = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        let config: PairingConfig = serde_yaml::from_str(yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameter.trim().is_empty() {
            return Err(ConfigError::Invalid("parameter cannot be empty".to_string()));
        }
        if self.regional_path.is_empty() || self.global_path.is_empty() {
            return Err(ConfigError::Invalid("archive paths cannot be empty".to_string()));
        }
        if self.max_files == 0 {
            return Err(ConfigError::Invalid("max_files must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn pairing_options(&self) -> PairingOptions {
        PairingOptions {
            parameter: self.parameter.clone(),
            global_prefix: self.global_prefix.clone(),
            extension: self.extension.clone(),
        }
    }
}

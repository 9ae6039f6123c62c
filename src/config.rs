//! Configuration for the preparation tools.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `CODELM_*` environment variables, then command-line flags. Each layer only
//! overrides what it sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_SEQ_LENGTH};
use crate::filter::{DEFAULT_KEEP, DEFAULT_THRESHOLD_RATIO};
use crate::tokenizer::SpecialTokenNames;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The YAML file could not be parsed.
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings shared by the encode and filter commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// Upper bound on encoded sequence length.
    pub max_seq_length: usize,

    /// JSON file mapping old token ids to new ones.
    pub new_id_map: Option<PathBuf>,

    /// Candidates kept per task by the diversity filter.
    pub keep: usize,

    /// Fraction of a candidate's length under which another candidate counts
    /// as agreeing with it.
    pub threshold_ratio: f64,

    /// Distance worker threads. `None` means half the logical CPUs.
    pub workers: Option<usize>,

    /// Records encoded per chunk.
    pub chunk_size: usize,

    /// Marker token names looked up in the tokenizer vocabulary.
    pub special_tokens: SpecialTokenNames,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            new_id_map: None,
            keep: DEFAULT_KEEP,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            workers: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            special_tokens: SpecialTokenNames::default(),
        }
    }
}

impl PrepConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a YAML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Defaults, then the optional file, then the process environment.
    ///
    /// The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CODELM_MAX_SEQ_LENGTH`: Maximum sequence length (default: 1024)
    /// - `CODELM_ID_MAP`: Path to the token id remapping JSON
    /// - `CODELM_KEEP`: Candidates kept per task (default: 200)
    /// - `CODELM_THRESHOLD_RATIO`: Agreement threshold ratio (default: 0.1)
    /// - `CODELM_WORKERS`: Distance worker threads (default: half the CPUs)
    /// - `CODELM_CHUNK_SIZE`: Records per encoding chunk (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `CODELM_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overrides fields from an arbitrary variable lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CODELM_MAX_SEQ_LENGTH") {
            self.max_seq_length = parse_env_value(&val, "CODELM_MAX_SEQ_LENGTH")?;
        }

        if let Some(val) = lookup("CODELM_ID_MAP") {
            self.new_id_map = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("CODELM_KEEP") {
            self.keep = parse_env_value(&val, "CODELM_KEEP")?;
        }

        if let Some(val) = lookup("CODELM_THRESHOLD_RATIO") {
            self.threshold_ratio = parse_env_value(&val, "CODELM_THRESHOLD_RATIO")?;
        }

        if let Some(val) = lookup("CODELM_WORKERS") {
            self.workers = Some(parse_env_value(&val, "CODELM_WORKERS")?);
        }

        if let Some(val) = lookup("CODELM_CHUNK_SIZE") {
            self.chunk_size = parse_env_value(&val, "CODELM_CHUNK_SIZE")?;
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seq_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_seq_length must be greater than 0".to_string(),
            ));
        }

        if self.keep == 0 {
            return Err(ConfigError::ValidationFailed(
                "keep must be greater than 0".to_string(),
            ));
        }

        if !self.threshold_ratio.is_finite() || self.threshold_ratio <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "threshold_ratio must be a positive number".to_string(),
            ));
        }

        if self.workers == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        let names = &self.special_tokens;
        if [&names.comment, &names.code, &names.end, &names.begin]
            .iter()
            .any(|n| n.is_empty())
        {
            return Err(ConfigError::ValidationFailed(
                "special token names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_max_seq_length(mut self, max: usize) -> Self {
        self.max_seq_length = max;
        self
    }

    pub fn with_new_id_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.new_id_map = Some(path.into());
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_threshold_ratio(mut self, ratio: f64) -> Self {
        self.threshold_ratio = ratio;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_special_tokens(mut self, names: SpecialTokenNames) -> Self {
        self.special_tokens = names;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PrepConfig::default();
        assert_eq!(config.max_seq_length, 1024);
        assert_eq!(config.keep, 200);
        assert!((config.threshold_ratio - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.chunk_size, 1000);
        assert!(config.workers.is_none());
        assert!(config.new_id_map.is_none());
        assert_eq!(config.special_tokens.code, "<python>");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PrepConfig::new()
            .with_max_seq_length(512)
            .with_new_id_map("map.json")
            .with_keep(10)
            .with_threshold_ratio(0.25)
            .with_workers(3)
            .with_chunk_size(64);

        assert_eq!(config.max_seq_length, 512);
        assert_eq!(config.new_id_map, Some(PathBuf::from("map.json")));
        assert_eq!(config.keep, 10);
        assert!((config.threshold_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.chunk_size, 64);
    }

    #[test]
    fn test_env_overrides() {
        let config = PrepConfig::default()
            .apply_env_from(lookup(&[
                ("CODELM_MAX_SEQ_LENGTH", "2048"),
                ("CODELM_KEEP", "50"),
                ("CODELM_WORKERS", " 2 "),
                ("CODELM_ID_MAP", "/tmp/ids.json"),
            ]))
            .unwrap();

        assert_eq!(config.max_seq_length, 2048);
        assert_eq!(config.keep, 50);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.new_id_map, Some(PathBuf::from("/tmp/ids.json")));
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn test_env_invalid_value() {
        let err = PrepConfig::default()
            .apply_env_from(lookup(&[("CODELM_THRESHOLD_RATIO", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("CODELM_THRESHOLD_RATIO"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            (PrepConfig::default().with_max_seq_length(0), "max_seq_length"),
            (PrepConfig::default().with_keep(0), "keep"),
            (PrepConfig::default().with_threshold_ratio(0.0), "threshold_ratio"),
            (PrepConfig::default().with_threshold_ratio(f64::NAN), "threshold_ratio"),
            (PrepConfig::default().with_workers(0), "workers"),
            (PrepConfig::default().with_chunk_size(0), "chunk_size"),
        ];
        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{err} should mention {field}");
        }
    }

    #[test]
    fn test_yaml_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prep.yaml");
        std::fs::write(
            &path,
            "max_seq_length: 256\nkeep: 5\nspecial_tokens:\n  code: \"<code>\"\n",
        )
        .unwrap();

        let config = PrepConfig::from_file(&path).unwrap();
        assert_eq!(config.max_seq_length, 256);
        assert_eq!(config.keep, 5);
        assert_eq!(config.special_tokens.code, "<code>");
        assert_eq!(config.special_tokens.comment, "<comments>");
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn test_yaml_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "keep: [1, 2\n").unwrap();
        assert!(matches!(
            PrepConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}

//! YAML configuration for clonescan.
//!
//! One file configures every stage: tokenizer, block index, matcher, pipeline
//! and logging. Each section may be omitted and falls back to its defaults.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "nightly scan"
//!
//! tokenizer:
//!   version: 1
//!   line_comment: "#"
//!
//! index:
//!   backend: "redb"
//!   path: "/var/lib/clonescan/blocks.redb"
//!   compression: "zstd"
//!   compression_level: 3
//!   write_batch_size: 10000
//!
//! matcher:
//!   version: 1
//!   threshold:
//!     fraction: 0.8
//!
//! pipeline:
//!   workers: 8
//!   retriever_threads: 2
//!   candidate_queue_capacity: 1024
//!   report_queue_capacity: 1024
//!   poll_interval_ms: 50
//!
//! logging:
//!   level: "info"
//!   format: "json"
//! ```

use std::fs;
use std::path::Path;

use index::{BackendConfig, CompressionCodec, CompressionConfig, IndexConfig};
use matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokens::TokenizerConfig;

use crate::pipeline::PipelineConfig;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CloneScanConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingYamlConfig,
}

impl CloneScanConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: CloneScanConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.tokenizer
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("tokenizer: {e}")))?;
        self.index.validate()?;
        self.matcher
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("matcher: {e}")))?;
        self.pipeline
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("pipeline: {e}")))?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Default for CloneScanConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            tokenizer: TokenizerConfig::default(),
            index: IndexYamlConfig::default(),
            matcher: MatcherConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingYamlConfig::default(),
        }
    }
}

/// Index YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file, required for the `redb` backend.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::MissingField(
                "index.path is required when backend is 'redb'".to_string(),
            ));
        }

        let valid_codecs = ["none", "zstd"];
        if !valid_codecs.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.compression must be one of: {valid_codecs:?}"
            )));
        }

        if self.compression == "zstd" && !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "index.compression_level must lie in 1..=22".to_string(),
            ));
        }

        if self.write_batch_size == 0 {
            return Err(ConfigLoadError::Validation(
                "index.write_batch_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts the section into an [`IndexConfig`].
    pub fn to_index_config(&self) -> Result<IndexConfig, ConfigLoadError> {
        self.validate()?;
        let backend = match (self.backend.as_str(), self.path.as_deref()) {
            ("redb", Some(path)) => BackendConfig::redb(path),
            _ => BackendConfig::in_memory(),
        };
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        Ok(IndexConfig::new()
            .with_backend(backend)
            .with_compression(CompressionConfig::new(codec, self.compression_level))
            .with_write_batch_size(self.write_batch_size))
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            compression: default_compression(),
            compression_level: default_compression_level(),
            write_batch_size: default_write_batch_size(),
        }
    }
}

/// Logging YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingYamlConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl LoggingYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "logging.format must be one of: {valid_formats:?}"
            )));
        }
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}
fn default_write_batch_size() -> usize {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher::ThresholdPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
matcher:
  version: 1
  threshold:
    absolute: 5
pipeline:
  workers: 3
"#;

        let config = CloneScanConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, Some("test config".to_string()));
        assert_eq!(config.matcher.threshold, ThresholdPolicy::Absolute(5));
        assert_eq!(config.pipeline.workers, 3);
        assert_eq!(config.pipeline.candidate_queue_capacity, 1024);
        assert_eq!(config.index.backend, "in_memory");
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r##"
version: "1"
tokenizer:
  line_comment: "#"
"##;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = CloneScanConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.tokenizer.line_comment.as_deref(), Some("#"));
        assert!(!config.tokenizer.separators.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = CloneScanConfig::default();
        assert_eq!(config.version, "1.0");
        assert!(config.validate().is_ok());
        assert_eq!(config.matcher.threshold, ThresholdPolicy::Fraction(0.8));
    }

    #[test]
    fn test_unsupported_version() {
        let err = CloneScanConfig::from_yaml("version: \"2.0\"").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn test_redb_requires_path() {
        let yaml = r#"
version: "1.0"
index:
  backend: "redb"
"#;
        let err = CloneScanConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingField(_)));
    }

    #[test]
    fn test_threshold_validation() {
        let yaml = r#"
version: "1.0"
matcher:
  threshold:
    fraction: 1.5
"#;
        let err = CloneScanConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("matcher"));
    }

    #[test]
    fn test_pipeline_validation() {
        let yaml = r#"
version: "1.0"
pipeline:
  workers: 0
"#;
        let err = CloneScanConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_index_section_converts() {
        let yaml = r#"
version: "1.0"
index:
  backend: "redb"
  path: "/tmp/blocks.redb"
  compression: "none"
  write_batch_size: 64
"#;
        let config = CloneScanConfig::from_yaml(yaml).unwrap();
        let index = config.index.to_index_config().unwrap();
        assert!(matches!(
            index.backend,
            BackendConfig::Redb { ref path } if path == "/tmp/blocks.redb"
        ));
        assert_eq!(index.compression.codec, CompressionCodec::None);
        assert_eq!(index.write_batch_size, 64);
    }

    #[test]
    fn test_logging_format_validation() {
        let yaml = r#"
version: "1.0"
logging:
  format: "xml"
"#;
        assert!(CloneScanConfig::from_yaml(yaml).is_err());
        let json =
            CloneScanConfig::from_yaml("version: \"1.0\"\nlogging:\n  format: json\n").unwrap();
        assert!(json.logging.is_json());
    }
}

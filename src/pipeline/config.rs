//! Pipeline configuration.
//!
//! A [`PipelineConfig`] names the pipeline, the source kind it reads from and
//! the model it feeds, and controls batching, validation, transformation,
//! retries and the advisory timeout. Configs come from code (builder
//! methods), from `PIPELINE_*` environment variables, or from YAML.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for one pipeline.
///
/// Immutable once handed to a pipeline; the executor snapshots it into every
/// [`super::PipelineResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Human-readable pipeline name.
    pub name: String,
    /// Kind of source the connector talks to (e.g. "memory", "warehouse", "blob").
    pub source_type: String,
    /// Identifier of the model the prepared data is destined for.
    pub target_model: Option<String>,
    /// Rows per batch for batch pipelines and batched writes.
    pub batch_size: usize,
    /// Run validation between extract and transform.
    pub validate_data: bool,
    /// Run the transform stage.
    pub apply_transforms: bool,
    /// Additional extract attempts after the first failure.
    pub retry_count: u32,
    /// Advisory timeout in seconds; enforcement belongs to the connector.
    pub timeout_secs: u64,
    /// Free-form parameters for pipeline variants.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            source_type: "memory".to_string(),
            target_model: None,
            batch_size: 1000,
            validate_data: true,
            apply_transforms: true,
            retry_count: 3,
            timeout_secs: 300,
            params: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_NAME`: Pipeline name (required)
    /// - `PIPELINE_SOURCE_TYPE`: Source kind (default: memory)
    /// - `PIPELINE_TARGET_MODEL`: Target model identifier
    /// - `PIPELINE_BATCH_SIZE`: Rows per batch (default: 1000)
    /// - `PIPELINE_VALIDATE_DATA`: Enable validation (default: true)
    /// - `PIPELINE_APPLY_TRANSFORMS`: Enable transforms (default: true)
    /// - `PIPELINE_RETRY_COUNT`: Extra extract attempts (default: 3)
    /// - `PIPELINE_TIMEOUT_SECS`: Advisory timeout in seconds (default: 300)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            name: std::env::var("PIPELINE_NAME")
                .map_err(|_| ConfigError::MissingEnvVar("PIPELINE_NAME".to_string()))?,
            ..Self::default()
        };

        if let Ok(val) = std::env::var("PIPELINE_SOURCE_TYPE") {
            config.source_type = val;
        }

        if let Ok(val) = std::env::var("PIPELINE_TARGET_MODEL") {
            config.target_model = Some(val);
        }

        if let Ok(val) = std::env::var("PIPELINE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "PIPELINE_BATCH_SIZE")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_VALIDATE_DATA") {
            config.validate_data = parse_env_bool(&val, "PIPELINE_VALIDATE_DATA")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_APPLY_TRANSFORMS") {
            config.apply_transforms = parse_env_bool(&val, "PIPELINE_APPLY_TRANSFORMS")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_RETRY_COUNT") {
            config.retry_count = parse_env_value(&val, "PIPELINE_RETRY_COUNT")?;
        }

        if let Ok(val) = std::env::var("PIPELINE_TIMEOUT_SECS") {
            config.timeout_secs = parse_env_value(&val, "PIPELINE_TIMEOUT_SECS")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "name cannot be empty".to_string(),
            ));
        }

        if self.source_type.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "source_type cannot be empty".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if matches!(&self.target_model, Some(model) if model.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "target_model cannot be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builder method to set the source kind.
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    /// Builder method to set the target model.
    pub fn with_target_model(mut self, model: impl Into<String>) -> Self {
        self.target_model = Some(model.into());
        self
    }

    /// Builder method to set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to enable or disable validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_data = enabled;
        self
    }

    /// Builder method to enable or disable transforms.
    pub fn with_transforms(mut self, enabled: bool) -> Self {
        self.apply_transforms = enabled;
        self
    }

    /// Builder method to set the retry count.
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Builder method to set the advisory timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Builder method to add a free-form parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_type, "memory");
        assert_eq!(config.batch_size, 1000);
        assert!(config.validate_data);
        assert!(config.apply_transforms);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert!(config.target_model.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new("budget_features")
            .with_source_type("warehouse")
            .with_target_model("budget-optimizer-v2")
            .with_batch_size(250)
            .with_validation(false)
            .with_transforms(false)
            .with_retry_count(0)
            .with_timeout(Duration::from_secs(60))
            .with_param("watermark_column", json!("updated_at"));

        assert_eq!(config.name, "budget_features");
        assert_eq!(config.source_type, "warehouse");
        assert_eq!(config.target_model.as_deref(), Some("budget-optimizer-v2"));
        assert_eq!(config.batch_size, 250);
        assert!(!config.validate_data);
        assert!(!config.apply_transforms);
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.param("watermark_column"), Some(&json!("updated_at")));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_empty_name() {
        let result = PipelineConfig::new("  ").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_validation_zero_batch_size() {
        let result = PipelineConfig::default().with_batch_size(0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("batch_size"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let result = PipelineConfig::default()
            .with_timeout(Duration::from_secs(0))
            .validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_validation_empty_target_model() {
        let result = PipelineConfig::default().with_target_model("").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("target_model"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
name: churn_daily
source_type: warehouse
batch_size: 500
retry_count: 1
params:
  watermark_column: event_time
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.name, "churn_daily");
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.retry_count, 1);
        // unspecified fields fall back to defaults
        assert!(config.validate_data);
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.param("watermark_column"), Some(&json!("event_time")));

        assert!(PipelineConfig::from_yaml_str("name: x\nbatch_size: 0\n").is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "name: from_file\n").unwrap();
        assert_eq!(PipelineConfig::from_yaml_file(&path).unwrap().name, "from_file");
        assert!(matches!(
            PipelineConfig::from_yaml_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("invalid", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let n: usize = parse_env_value("42", "PIPELINE_BATCH_SIZE").unwrap();
        assert_eq!(n, 42);
        let err = parse_env_value::<usize>("many", "PIPELINE_BATCH_SIZE").unwrap_err();
        assert!(err.to_string().contains("PIPELINE_BATCH_SIZE"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("PIPELINE_NAME".to_string());
        assert!(err.to_string().contains("PIPELINE_NAME"));

        let err = ConfigError::ValidationFailed("test failure".to_string());
        assert!(err.to_string().contains("test failure"));
    }
}

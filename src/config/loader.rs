//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and environment overrides
//! using the `config` crate, then validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::RecoveryConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "CONDUCTOR_CONFIG_PATH";

/// File consulted when `CONDUCTOR_CONFIG_PATH` is unset; optional
pub const DEFAULT_CONFIG_PATH: &str = "config/conductor-recovery.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CONDUCTOR";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `$CONDUCTOR_CONFIG_PATH` (must exist) or the default path (may be absent)
    pub fn load() -> ConfigResult<RecoveryConfig> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_path(&PathBuf::from(path), true),
            Err(_) => Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Load with `path` as the file layer
    pub fn load_from_path(path: &Path, required: bool) -> ConfigResult<RecoveryConfig> {
        if required && !path.exists() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        debug!(
            path = %path.display(),
            required,
            "Loading recovery configuration"
        );

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RecoveryConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializationError {
                    error: e.to_string(),
                })?;

        config.validate()?;

        info!(
            polling_interval_ms = config.dlq_processor.polling_interval_ms,
            retention_days = config.dlq_processor.retention_days,
            max_retry_limit = config.dlq_processor.max_retry_limit,
            transport = ?config.notifications.transport,
            "Recovery configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML string on top of defaults, without file or environment layers
    pub fn from_toml_str(toml: &str) -> ConfigResult<RecoveryConfig> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let config: RecoveryConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializationError {
                    error: e.to_string(),
                })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConfigLoader::from_toml_str(
            r#"
            [dlq_processor]
            max_retry_limit = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.dlq_processor.max_retry_limit, 3);
        assert_eq!(config.dlq_processor.retention_days, 90);
        assert_eq!(config.circuit_breaker.timeout_ms, 60_000);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let result = ConfigLoader::from_toml_str(
            r#"
            [circuit_breaker]
            failure_threshold = 0
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_missing_required_file() {
        let result = ConfigLoader::load_from_path(Path::new("/nonexistent/recovery.toml"), true);
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }
}

//! Configuration loading traits and types.
//!
//! Standardized TOML configuration loading for both bridge binaries:
//! parse with serde, then run semantic validation. App-specific config
//! structs embed [`SharedConfig`] and implement their own `validate()`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Common configuration fields shared by both bridge applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "tele-arm-lab-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Semantic validation is the caller's job (`validate()` after load)
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        shared: SharedConfig,
        port: u16,
    }

    #[test]
    fn load_valid_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "[shared]\nlog_level = \"debug\"\nservice_name = \"test\"\nport = 5005"
        )
        .unwrap();
        // port belongs at top level, not in [shared]
        let cfg = TestConfig::load(f.path());
        assert!(cfg.is_err());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "port = 5005\n[shared]\nlog_level = \"debug\"\nservice_name = \"test\""
        )
        .unwrap();
        let cfg = TestConfig::load(f.path()).unwrap();
        assert_eq!(cfg.port, 5005);
        assert_eq!(cfg.shared.log_level, LogLevel::Debug);
        cfg.shared.validate().unwrap();
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            TestConfig::load(Path::new("/nonexistent/x.toml")),
            Err(ConfigError::FileNotFound)
        ));
    }

    #[test]
    fn empty_service_name_rejected() {
        let shared = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(matches!(
            shared.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}

//! Host configuration
//!
//! One JSON file carries both the engine settings and the few options the
//! host itself needs. Engine keys sit at the top level, so a plain
//! `EngineConfig` file is also a valid host configuration.

use std::path::Path;

use padflow_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{defaults, env};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// Identity announced on the in-process transport
    pub transport_identity: String,
    /// Environment variables with this prefix become secrets
    pub secret_env_prefix: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            transport_identity: defaults::TRANSPORT_IDENTITY.to_string(),
            secret_env_prefix: env::SECRET_PREFIX.to_string(),
        }
    }
}

impl HostConfig {
    /// Load configuration from disk; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !fs::try_exists(path).await? {
            log::info!("No configuration at {:?}; using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `PADFLOW_CONFIG`, if set
    pub async fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(env::CONFIG) {
            Some(path) => Self::load(Path::new(&path)).await,
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to disk
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await?;

        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.transport_identity.is_empty() {
            return Err(ConfigError::Invalid(
                "transport_identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use padflow_engine::RuntimeErrorPolicy;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = assert_ok!(HostConfig::load(&dir.path().join("absent.json")).await);
        assert_eq!(config, HostConfig::default());
    }

    #[tokio::test]
    async fn test_engine_keys_sit_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padflow.json");
        std::fs::write(
            &path,
            r#"{"sink_queue_capacity": 4, "runtime_error_policy": "abort_graph", "transport_identity": "studio"}"#,
        )
        .unwrap();

        let config = assert_ok!(HostConfig::load(&path).await);
        assert_eq!(config.engine.sink_queue_capacity, 4);
        assert_eq!(config.engine.runtime_error_policy, RuntimeErrorPolicy::AbortGraph);
        assert_eq!(config.transport_identity, "studio");
        assert_eq!(config.secret_env_prefix, env::SECRET_PREFIX);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("padflow.json");

        let mut config = HostConfig::default();
        config.engine.history_depth = 5;
        assert_ok!(config.save(&path).await);

        let loaded = assert_ok!(HostConfig::load(&path).await);
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_invalid_engine_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padflow.json");
        std::fs::write(&path, r#"{"sink_queue_capacity": 0}"#).unwrap();

        let err = assert_err!(HostConfig::load(&path).await);
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padflow.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = assert_err!(HostConfig::load(&path).await);
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

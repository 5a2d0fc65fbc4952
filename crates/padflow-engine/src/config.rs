//! Engine configuration
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{PadflowError, Result};

/// What the runtime does when a node's run task fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeErrorPolicy {
    /// Log and report the failure; every other node keeps running
    #[default]
    Isolate,
    /// Stop every node on the first failure
    AbortGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of each sink pad's item queue
    pub sink_queue_capacity: usize,
    pub runtime_error_policy: RuntimeErrorPolicy,
    /// Number of snapshots kept for undo/redo
    pub history_depth: usize,
    /// Transport topic carrying data-plane requests
    pub data_plane_topic: String,
    /// How long a data-plane push may take before its context times out
    pub data_plane_completion_timeout_secs: u64,
    /// Upper bound on resolution passes per edit; 0 means node count + 2
    pub max_resolve_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sink_queue_capacity: 256,
            runtime_error_policy: RuntimeErrorPolicy::Isolate,
            history_depth: 100,
            data_plane_topic: "runtime_api".to_string(),
            data_plane_completion_timeout_secs: 30,
            max_resolve_passes: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, falling back to defaults when the file is missing
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await? {
            log::debug!("No configuration at {:?}; using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PadflowError::Config(format!("failed to parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).await?;

        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink_queue_capacity == 0 {
            return Err(PadflowError::Config(
                "sink_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.data_plane_topic.is_empty() {
            return Err(PadflowError::Config(
                "data_plane_topic must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_plane_timeout(&self) -> Duration {
        Duration::from_secs(self.data_plane_completion_timeout_secs)
    }

    /// Resolution pass limit for a graph with `node_count` nodes
    pub fn resolve_pass_limit(&self, node_count: usize) -> usize {
        if self.max_resolve_passes == 0 {
            node_count + 2
        } else {
            self.max_resolve_passes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = assert_ok!(EngineConfig::load(&dir.path().join("absent.json")).await);
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("padflow.json");

        let config = EngineConfig {
            sink_queue_capacity: 8,
            runtime_error_policy: RuntimeErrorPolicy::AbortGraph,
            ..EngineConfig::default()
        };
        assert_ok!(config.save(&path).await);

        let loaded = assert_ok!(EngineConfig::load(&path).await);
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padflow.json");
        std::fs::write(&path, r#"{"runtime_error_policy": "abort_graph"}"#).unwrap();

        let loaded = assert_ok!(EngineConfig::load(&path).await);
        assert_eq!(loaded.runtime_error_policy, RuntimeErrorPolicy::AbortGraph);
        assert_eq!(loaded.sink_queue_capacity, 256);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padflow.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_err!(EngineConfig::load(&path).await);

        std::fs::write(&path, r#"{"sink_queue_capacity": 0}"#).unwrap();
        assert_err!(EngineConfig::load(&path).await);
    }

    #[test]
    fn test_pass_limit() {
        let mut config = EngineConfig::default();
        assert_eq!(config.resolve_pass_limit(3), 5);
        config.max_resolve_passes = 9;
        assert_eq!(config.resolve_pass_limit(3), 9);
    }
}

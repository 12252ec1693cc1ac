//! Engine Configuration
//!
//! Every threshold here is a tunable heuristic. Defaults reproduce the
//! stock behaviour; JSON config files only need the fields they change.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub validation: ValidationThresholds,
    #[serde(default)]
    pub layers: LayerThresholds,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationThresholds {
    #[serde(default = "default_max_canvas_dimension")]
    pub max_canvas_dimension: f64,
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
    #[serde(default = "default_max_paths_per_layer")]
    pub max_paths_per_layer: usize,
    #[serde(default = "default_max_commands_per_path")]
    pub max_commands_per_path: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    /// Upper bound on instances one grid or radial repeat may expand to.
    #[serde(default = "default_max_repeat_instances")]
    pub max_repeat_instances: u64,
}

fn default_max_canvas_dimension() -> f64 { 4096.0 }
fn default_max_layers() -> usize { 10 }
fn default_max_paths_per_layer() -> usize { 20 }
fn default_max_commands_per_path() -> usize { 50 }
fn default_cache_ttl_secs() -> i64 { 3600 }
fn default_max_repeat_instances() -> u64 { 1000 }

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            max_canvas_dimension: default_max_canvas_dimension(),
            max_layers: default_max_layers(),
            max_paths_per_layer: default_max_paths_per_layer(),
            max_commands_per_path: default_max_commands_per_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_repeat_instances: default_max_repeat_instances(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerThresholds {
    /// Below this many commands a layer is `low` complexity.
    #[serde(default = "default_low_complexity")]
    pub low_complexity_commands: usize,
    /// Below this many commands a layer is `medium` complexity.
    #[serde(default = "default_medium_complexity")]
    pub medium_complexity_commands: usize,
    #[serde(default = "default_render_ms_per_command")]
    pub render_ms_per_command: f64,
    #[serde(default = "default_bytes_per_command")]
    pub bytes_per_command: u64,
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
    #[serde(default = "default_max_paths_per_layer")]
    pub max_paths_per_layer: usize,
    /// Offsets beyond this magnitude are reported as anomalous.
    #[serde(default = "default_large_offset")]
    pub large_offset: f64,
}

fn default_low_complexity() -> usize { 20 }
fn default_medium_complexity() -> usize { 100 }
fn default_render_ms_per_command() -> f64 { 0.05 }
fn default_bytes_per_command() -> u64 { 64 }
fn default_large_offset() -> f64 { 0.5 }

impl Default for LayerThresholds {
    fn default() -> Self {
        Self {
            low_complexity_commands: default_low_complexity(),
            medium_complexity_commands: default_medium_complexity(),
            render_ms_per_command: default_render_ms_per_command(),
            bytes_per_command: default_bytes_per_command(),
            max_layers: default_max_layers(),
            max_paths_per_layer: default_max_paths_per_layer(),
            large_offset: default_large_offset(),
        }
    }
}

/// Per-tier retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per tier, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 10_000 }
fn default_timeout_ms() -> u64 { 30_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSettings {
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,
    /// Attempts for the rule-based tier, which is local and fast.
    #[serde(default = "default_rule_based_retries")]
    pub rule_based_retries: u32,
}

fn default_error_log_capacity() -> usize { 100 }
fn default_rule_based_retries() -> u32 { 1 }

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            error_log_capacity: default_error_log_capacity(),
            rule_based_retries: default_rule_based_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry": {{"maxRetries": 5}}, "validation": {{"maxLayers": 4}}}}"#).unwrap();
        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.validation.max_layers, 4);
        assert_eq!(config.validation.max_paths_per_layer, 20);
        assert_eq!(config.validation.max_repeat_instances, 1000);
        assert_eq!(config.orchestrator.error_log_capacity, 100);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load_from_file(Path::new("/nonexistent/ulsvg.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = EngineConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

//! Configuration types for Exptrack.
//!
//! Every field has a default so an absent or partial `exptrack.yml` works.

use exptrack_proto::{QualityGate, standard_quality_gates};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExptrackConfig {
    /// Live session state file. Its absence means no active session.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Finalized result of the most recent manually tracked session.
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,

    /// Directory holding the run log and the aggregated snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Command whose first green run defines time-to-green.
    #[serde(default = "default_test_command")]
    pub test_command: String,

    /// Timeout for the test command in seconds.
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// Gates run after implementation, in order.
    #[serde(default = "standard_quality_gates")]
    pub quality_gates: Vec<QualityGate>,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("experiment_status.json")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".exptrack/metrics")
}

fn default_test_command() -> String {
    "make test".to_string()
}

fn default_test_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for ExptrackConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            results_file: default_results_file(),
            data_dir: default_data_dir(),
            test_command: default_test_command(),
            test_timeout_secs: default_test_timeout(),
            quality_gates: standard_quality_gates(),
        }
    }
}

impl ExptrackConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            data_dir = %config.data_dir.display(),
            gates = config.quality_gates.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if path_ref.exists() {
            Self::from_file(path_ref)
        } else {
            debug!(path = %path_ref.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Rejects gates that could never run meaningfully.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, gate) in self.quality_gates.iter().enumerate() {
            if gate.name.trim().is_empty() {
                return Err(ConfigError::InvalidGate {
                    gate: format!("#{}", index + 1),
                    reason: "name is empty".to_string(),
                });
            }
            if gate.command.trim().is_empty() {
                return Err(ConfigError::InvalidGate {
                    gate: gate.name.clone(),
                    reason: "command is empty".to_string(),
                });
            }
            if gate.timeout_seconds == 0 {
                return Err(ConfigError::InvalidGate {
                    gate: gate.name.clone(),
                    reason: "timeout_seconds must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Append-only run log, one JSON record per line.
    pub fn runs_file(&self) -> PathBuf {
        self.data_dir.join("experiment_runs.jsonl")
    }

    /// Aggregated per-category snapshot.
    pub fn metrics_file(&self) -> PathBuf {
        self.data_dir.join("aggregated_metrics.json")
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid quality gate '{gate}': {reason}")]
    InvalidGate { gate: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ExptrackConfig::default();
        assert_eq!(config.state_file, PathBuf::from("experiment_status.json"));
        assert_eq!(config.results_file, PathBuf::from("results.json"));
        assert_eq!(config.test_command, "make test");
        assert_eq!(config.test_timeout_secs, 300);
        assert_eq!(config.quality_gates.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_paths_live_in_data_dir() {
        let mut config = ExptrackConfig::default();
        config.data_dir = PathBuf::from("/tmp/metrics");
        assert_eq!(
            config.runs_file(),
            PathBuf::from("/tmp/metrics/experiment_runs.jsonl")
        );
        assert_eq!(
            config.metrics_file(),
            PathBuf::from("/tmp/metrics/aggregated_metrics.json")
        );
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
data_dir: "out/metrics"
test_command: "cargo test"
quality_gates:
  - name: "lint"
    command: "cargo clippy -- -D warnings"
    success_criteria: "No warnings"
    timeout_seconds: 120
  - name: "fmt"
    command: "cargo fmt --check"
"#;
        let config: ExptrackConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("out/metrics"));
        assert_eq!(config.test_command, "cargo test");
        assert_eq!(config.test_timeout_secs, 300);
        assert_eq!(config.state_file, PathBuf::from("experiment_status.json"));
        assert_eq!(config.quality_gates.len(), 2);
        assert_eq!(config.quality_gates[0].timeout_seconds, 120);
        assert_eq!(config.quality_gates[1].timeout_seconds, 30);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let yaml = r#"
test_command: "just test"
dashboard_url: "http://localhost:3000"
"#;
        let config: ExptrackConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.test_command, "just test");
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let yaml = r#"
quality_gates:
  - name: "lint"
    command: "  "
"#;
        let config: ExptrackConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidGate { gate, .. } if gate == "lint"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ExptrackConfig::default();
        config.quality_gates[2].timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code_style"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = ExptrackConfig::load_or_default(dir.path().join("exptrack.yml")).unwrap();
        assert_eq!(config.test_command, "make test");
    }

    #[test]
    fn test_from_file_reports_yaml_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exptrack.yml");
        std::fs::write(&path, "quality_gates: [unterminated").unwrap();
        assert!(matches!(
            ExptrackConfig::from_file(&path),
            Err(ConfigError::Yaml(_))
        ));
    }
}

//! Quality gate contract.
//!
//! A gate passes iff its command exits with status 0 within the timeout.

use serde::{Deserialize, Serialize};

/// A named external check run against the experiment's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    /// Gate name shown in reports.
    pub name: String,

    /// Shell command to run.
    pub command: String,

    /// What constitutes success, for humans reading the report.
    #[serde(default)]
    pub success_criteria: String,

    /// Maximum execution time in seconds.
    #[serde(default = "default_gate_timeout")]
    pub timeout_seconds: u64,
}

fn default_gate_timeout() -> u64 {
    30
}

impl QualityGate {
    /// Creates a gate with the default 30 second timeout.
    pub fn new(name: &str, command: &str, success_criteria: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            success_criteria: success_criteria.to_string(),
            timeout_seconds: default_gate_timeout(),
        }
    }

    /// Overrides the timeout.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// The standard gates every component is checked against, in run order:
/// type checking, unit tests, code style, import sorting, CLI smoke test.
pub fn standard_quality_gates() -> Vec<QualityGate> {
    vec![
        QualityGate::new(
            "type_checking",
            "mypy specplane/ --strict",
            "No type errors reported",
        ),
        QualityGate::new("unit_tests", "pytest tests/ -v", "All tests pass"),
        QualityGate::new(
            "code_style",
            "black --check specplane/ tests/",
            "No formatting issues",
        ),
        QualityGate::new(
            "import_sorting",
            "isort --check-only specplane/ tests/",
            "Imports properly sorted",
        ),
        QualityGate::new(
            "cli_smoke_test",
            "python -m specplane --help",
            "Help command returns successfully",
        ),
    ]
}

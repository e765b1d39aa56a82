//! Experiment categories and the immutable per-run record.
//!
//! One [`ExperimentRun`] is appended to the run log for every finished
//! experiment. Once written it is never edited; aggregation re-derives
//! everything from the full set of records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The kind of experiment being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    SourceOfTruth,
    ComponentKernel,
    SpecOnly,
    SpecToPrompt,
    ValidatorLoop,
}

impl ExperimentType {
    /// Every category, in menu order.
    pub const ALL: [ExperimentType; 5] = [
        ExperimentType::SourceOfTruth,
        ExperimentType::ComponentKernel,
        ExperimentType::SpecOnly,
        ExperimentType::SpecToPrompt,
        ExperimentType::ValidatorLoop,
    ];

    /// Returns the wire name used in the run log and snapshot.
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentType::SourceOfTruth => "source_of_truth",
            ExperimentType::ComponentKernel => "component_kernel",
            ExperimentType::SpecOnly => "spec_only",
            ExperimentType::SpecToPrompt => "spec_to_prompt",
            ExperimentType::ValidatorLoop => "validator_loop",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ExperimentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::UnknownExperimentType(s.to_string()))
    }
}

/// A single experiment execution.
///
/// Counters and lists default when absent so that older log lines still
/// deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    /// Unique run identifier (UUID v4).
    pub id: String,

    /// Experiment category this run belongs to.
    pub experiment_type: ExperimentType,

    /// Component being built.
    pub component_name: String,

    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Minutes from "implementation done" until the tests passed.
    #[serde(default)]
    pub time_to_green: Option<f64>,

    /// Number of correction iterations.
    #[serde(default)]
    pub rework_cycles: u32,

    /// Number of quality-gate failures attributed to design divergence.
    #[serde(default)]
    pub spec_drift_count: u32,

    /// Manual edits required.
    #[serde(default)]
    pub editor_friction_count: u32,

    #[serde(default)]
    pub success: bool,

    /// Final quality assessment in `[0, 1]`.
    #[serde(default)]
    pub final_quality_score: Option<f64>,

    #[serde(default)]
    pub artifacts_generated: Vec<String>,

    #[serde(default)]
    pub issues_encountered: Vec<String>,
}

impl ExperimentRun {
    /// Creates a run for `component_name` starting now with a fresh id.
    pub fn new(experiment_type: ExperimentType, component_name: &str) -> Result<Self> {
        Self::started_at(experiment_type, component_name, Utc::now())
    }

    /// Creates a run with an explicit start time.
    ///
    /// The component name is trimmed and must not be empty.
    pub fn started_at(
        experiment_type: ExperimentType,
        component_name: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Self> {
        let component_name = component_name.trim();
        if component_name.is_empty() {
            return Err(Error::EmptyName {
                field: "component_name",
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            experiment_type,
            component_name: component_name.to_string(),
            start_time,
            end_time: None,
            time_to_green: None,
            rework_cycles: 0,
            spec_drift_count: 0,
            editor_friction_count: 0,
            success: false,
            final_quality_score: None,
            artifacts_generated: Vec::new(),
            issues_encountered: Vec::new(),
        })
    }

    /// Records a rework iteration and notes the reason in the issue list.
    pub fn record_rework_cycle(&mut self, reason: &str) -> u32 {
        self.rework_cycles += 1;
        self.issues_encountered
            .push(format!("Rework #{}: {}", self.rework_cycles, reason));
        self.rework_cycles
    }

    /// Records a manual intervention and notes it in the issue list.
    pub fn record_editor_friction(&mut self, description: &str) -> u32 {
        self.editor_friction_count += 1;
        self.issues_encountered.push(format!(
            "Manual edit #{}: {}",
            self.editor_friction_count, description
        ));
        self.editor_friction_count
    }

    /// Sets the final quality score, rejecting values outside `[0, 1]`.
    pub fn set_quality_score(&mut self, score: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::InvalidQualityScore(score));
        }
        self.final_quality_score = Some(score);
        Ok(())
    }

    /// Wall-clock minutes between start and end, if the run has ended.
    pub fn duration_minutes(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 60_000.0)
    }
}

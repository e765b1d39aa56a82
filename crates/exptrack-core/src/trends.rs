//! Per-component trend analysis across repeated attempts.

use exptrack_proto::ExperimentRun;
use serde::Serialize;

use crate::metrics_store::mean;

/// Success-rate movement between the older and newer half of the attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl ImprovementTrend {
    /// Minimum change in success rate that counts as movement.
    pub const THRESHOLD: f64 = 0.1;

    pub fn as_str(self) -> &'static str {
        match self {
            ImprovementTrend::Improving => "improving",
            ImprovementTrend::Declining => "declining",
            ImprovementTrend::Stable => "stable",
            ImprovementTrend::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for ImprovementTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of every attempt at one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTrends {
    pub component_name: String,
    pub total_attempts: usize,
    pub success_rate: f64,
    /// `None` when no attempt recorded a time-to-green.
    pub avg_time_to_green: Option<f64>,
    pub total_rework_cycles: u64,
    pub improvement_trend: ImprovementTrend,
}

fn success_rate(runs: &[&ExperimentRun]) -> f64 {
    runs.iter().filter(|r| r.success).count() as f64 / runs.len() as f64
}

/// Compares the success rate of the newer half of `runs` to the older half.
///
/// Runs are ordered by start time; with an odd count the older half is the
/// smaller one.
pub fn improvement_trend(runs: &[&ExperimentRun]) -> ImprovementTrend {
    if runs.len() < 2 {
        return ImprovementTrend::InsufficientData;
    }

    let mut sorted = runs.to_vec();
    sorted.sort_by_key(|r| r.start_time);

    let (first_half, second_half) = sorted.split_at(sorted.len() / 2);
    let before = success_rate(first_half);
    let after = success_rate(second_half);

    if after > before + ImprovementTrend::THRESHOLD {
        ImprovementTrend::Improving
    } else if after < before - ImprovementTrend::THRESHOLD {
        ImprovementTrend::Declining
    } else {
        ImprovementTrend::Stable
    }
}

/// Trends for `component_name`, or `None` if it has no runs.
pub fn component_trends(runs: &[ExperimentRun], component_name: &str) -> Option<ComponentTrends> {
    let matching: Vec<&ExperimentRun> = runs
        .iter()
        .filter(|r| r.component_name == component_name)
        .collect();

    if matching.is_empty() {
        return None;
    }

    Some(ComponentTrends {
        component_name: component_name.to_string(),
        total_attempts: matching.len(),
        success_rate: success_rate(&matching),
        avg_time_to_green: mean(matching.iter().filter_map(|r| r.time_to_green)),
        total_rework_cycles: matching.iter().map(|r| u64::from(r.rework_cycles)).sum(),
        improvement_trend: improvement_trend(&matching),
    })
}

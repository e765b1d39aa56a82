use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregated metrics for one experiment category.
///
/// Always recomputed from the complete run log; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    pub total_runs: usize,

    /// Successful runs divided by total runs.
    pub success_rate: f64,

    /// Mean over runs that recorded a time-to-green; `None` if none did.
    pub avg_time_to_green: Option<f64>,

    /// Mean over all runs.
    pub avg_rework_cycles: f64,

    /// Mean over runs that recorded a quality score; `None` if none did.
    pub avg_quality_score: Option<f64>,
}

/// Category name to aggregated metrics, ordered by category name.
pub type MetricsSnapshot = BTreeMap<String, ExperimentMetrics>;

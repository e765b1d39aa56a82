//! Per-category aggregation over the full run log.
//!
//! The snapshot is recomputed from every record on each call; there is no
//! incremental state to drift out of sync with the log.

use chrono::Utc;
use exptrack_proto::{ExperimentMetrics, ExperimentRun, MetricsSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::ExptrackConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::persist::write_json_atomic;
use crate::report::render_comparison;
use crate::run_log::{MalformedLine, RunLog};
use crate::trends::{ComponentTrends, component_trends};

/// Arithmetic mean, `None` for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Groups runs by category and computes the metrics for each.
pub fn aggregate(runs: &[ExperimentRun]) -> MetricsSnapshot {
    let mut by_type: BTreeMap<String, Vec<&ExperimentRun>> = BTreeMap::new();
    for run in runs {
        by_type
            .entry(run.experiment_type.to_string())
            .or_default()
            .push(run);
    }

    by_type
        .into_iter()
        .map(|(experiment_type, type_runs)| {
            let total_runs = type_runs.len();
            let successes = type_runs.iter().filter(|r| r.success).count();

            let metrics = ExperimentMetrics {
                total_runs,
                success_rate: successes as f64 / total_runs as f64,
                avg_time_to_green: mean(type_runs.iter().filter_map(|r| r.time_to_green)),
                avg_rework_cycles: mean(type_runs.iter().map(|r| f64::from(r.rework_cycles)))
                    .unwrap_or(0.0),
                avg_quality_score: mean(type_runs.iter().filter_map(|r| r.final_quality_score)),
            };
            (experiment_type, metrics)
        })
        .collect()
}

/// Outcome of a recompute.
#[derive(Debug, Clone)]
pub struct Recomputed {
    pub snapshot: MetricsSnapshot,
    /// Log lines skipped because they did not parse.
    pub malformed: Vec<MalformedLine>,
}

/// The run log plus the aggregated snapshot derived from it.
pub struct MetricsStore {
    run_log: RunLog,
    snapshot_path: PathBuf,
}

impl MetricsStore {
    pub fn new(runs_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            run_log: RunLog::new(runs_path),
            snapshot_path: snapshot_path.into(),
        }
    }

    pub fn from_config(config: &ExptrackConfig) -> Self {
        Self::new(config.runs_file(), config.metrics_file())
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Appends one finished run to the log.
    pub fn append(&self, run: &ExperimentRun) -> TrackerResult<()> {
        self.run_log.append(run)?;
        Ok(())
    }

    /// Re-reads the whole log and overwrites the snapshot.
    ///
    /// An empty or missing log produces an empty snapshot.
    pub fn recompute(&self) -> TrackerResult<Recomputed> {
        let parsed = self.run_log.read_all()?;
        if !parsed.malformed.is_empty() {
            warn!(
                skipped = parsed.malformed.len(),
                path = %self.run_log.path().display(),
                "Skipped malformed lines while aggregating"
            );
        }

        let snapshot = aggregate(&parsed.runs);
        write_json_atomic(&self.snapshot_path, &snapshot)?;
        debug!(
            runs = parsed.runs.len(),
            categories = snapshot.len(),
            path = %self.snapshot_path.display(),
            "Metrics snapshot written"
        );

        Ok(Recomputed {
            snapshot,
            malformed: parsed.malformed,
        })
    }

    /// Reads the stored snapshot. Returns `None` if it was never written.
    pub fn load_snapshot(&self) -> TrackerResult<Option<MetricsSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.snapshot_path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Renders the markdown comparison report from the stored snapshot.
    ///
    /// Fails with `NoData` if the snapshot is absent or empty.
    pub fn compare_report(&self) -> TrackerResult<String> {
        let snapshot = self.load_snapshot()?.ok_or(TrackerError::NoData)?;
        render_comparison(&snapshot, Utc::now())
    }

    /// Trends for one component across all recorded runs.
    ///
    /// Returns `None` when the component has no runs.
    pub fn trends_for(&self, component_name: &str) -> TrackerResult<Option<ComponentTrends>> {
        let parsed = self.run_log.read_all()?;
        if !parsed.malformed.is_empty() {
            warn!(
                skipped = parsed.malformed.len(),
                path = %self.run_log.path().display(),
                "Skipped malformed lines while reading trends"
            );
        }
        Ok(component_trends(&parsed.runs, component_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use exptrack_proto::ExperimentType;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn run(
        kind: ExperimentType,
        success: bool,
        time_to_green: Option<f64>,
        rework_cycles: u32,
        quality: Option<f64>,
    ) -> ExperimentRun {
        let mut run = ExperimentRun::started_at(kind, "Parser", t0()).unwrap();
        run.success = success;
        run.time_to_green = time_to_green;
        run.rework_cycles = rework_cycles;
        run.final_quality_score = quality;
        run
    }

    fn test_store() -> (MetricsStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MetricsStore::new(
            dir.path().join("metrics/experiment_runs.jsonl"),
            dir.path().join("metrics/aggregated_metrics.json"),
        );
        (store, dir)
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(Vec::new()), None);
        assert_eq!(mean(vec![1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn aggregate_three_runs_scenario() {
        let runs = vec![
            run(ExperimentType::SpecOnly, true, Some(5.0), 0, None),
            run(ExperimentType::SpecOnly, false, None, 2, None),
            run(ExperimentType::SpecOnly, true, Some(7.0), 1, None),
        ];
        let snapshot = aggregate(&runs);
        let metrics = &snapshot["spec_only"];

        assert_eq!(metrics.total_runs, 3);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.avg_time_to_green, Some(6.0));
        assert_eq!(metrics.avg_rework_cycles, 1.0);
        assert_eq!(metrics.avg_quality_score, None);
    }

    #[test]
    fn aggregate_groups_by_category() {
        let runs = vec![
            run(ExperimentType::ValidatorLoop, true, None, 0, Some(0.8)),
            run(ExperimentType::ComponentKernel, false, Some(12.0), 3, Some(0.4)),
            run(ExperimentType::ValidatorLoop, true, None, 2, Some(1.0)),
        ];
        let snapshot = aggregate(&runs);

        let keys: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["component_kernel", "validator_loop"]);

        let validator = &snapshot["validator_loop"];
        assert_eq!(validator.total_runs, 2);
        assert_eq!(validator.success_rate, 1.0);
        assert_eq!(validator.avg_time_to_green, None);
        assert_eq!(validator.avg_rework_cycles, 1.0);
        assert!((validator.avg_quality_score.unwrap() - 0.9).abs() < 1e-9);

        let kernel = &snapshot["component_kernel"];
        assert_eq!(kernel.success_rate, 0.0);
        assert_eq!(kernel.avg_time_to_green, Some(12.0));
    }

    #[test]
    fn aggregate_empty_is_empty() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn recompute_missing_log_writes_empty_snapshot() {
        let (store, _dir) = test_store();
        let recomputed = store.recompute().unwrap();
        assert!(recomputed.snapshot.is_empty());
        assert!(store.snapshot_path().exists());
        assert_eq!(store.load_snapshot().unwrap(), Some(MetricsSnapshot::new()));
    }

    #[test]
    fn recompute_is_idempotent() {
        let (store, _dir) = test_store();
        store.append(&run(ExperimentType::SpecOnly, true, Some(5.0), 0, Some(0.6))).unwrap();
        store.append(&run(ExperimentType::SpecToPrompt, false, None, 4, None)).unwrap();

        let first = store.recompute().unwrap().snapshot;
        let first_bytes = std::fs::read(store.snapshot_path()).unwrap();
        let second = store.recompute().unwrap().snapshot;
        let second_bytes = std::fs::read(store.snapshot_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn recompute_skips_malformed_lines() {
        let (store, _dir) = test_store();
        store.append(&run(ExperimentType::SpecOnly, true, None, 0, None)).unwrap();
        let mut contents = std::fs::read_to_string(store.run_log().path()).unwrap();
        contents.push_str("{not a record\n");
        std::fs::write(store.run_log().path(), contents).unwrap();
        store.append(&run(ExperimentType::SpecOnly, false, None, 0, None)).unwrap();

        let recomputed = store.recompute().unwrap();
        assert_eq!(recomputed.malformed.len(), 1);
        assert_eq!(recomputed.malformed[0].line_number, 2);
        assert_eq!(recomputed.snapshot["spec_only"].total_runs, 2);
        assert_eq!(recomputed.snapshot["spec_only"].success_rate, 0.5);
    }

    #[test]
    fn non_utf8_line_does_not_block_recompute_or_trends() {
        use std::io::Write;

        let (store, _dir) = test_store();
        store.append(&run(ExperimentType::SpecOnly, true, None, 0, None)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(store.run_log().path())
            .unwrap()
            .write_all(b"\xff\xfe\n")
            .unwrap();
        store.append(&run(ExperimentType::SpecOnly, false, None, 0, None)).unwrap();

        let recomputed = store.recompute().unwrap();
        assert_eq!(recomputed.malformed.len(), 1);
        assert_eq!(recomputed.snapshot["spec_only"].total_runs, 2);

        let trends = store.trends_for("Parser").unwrap().unwrap();
        assert_eq!(trends.total_attempts, 2);
    }

    #[test]
    fn compare_report_without_snapshot_is_no_data() {
        let (store, _dir) = test_store();
        assert!(matches!(store.compare_report(), Err(TrackerError::NoData)));

        store.recompute().unwrap();
        assert!(matches!(store.compare_report(), Err(TrackerError::NoData)));
    }

    #[test]
    fn compare_report_after_recompute() {
        let (store, _dir) = test_store();
        store.append(&run(ExperimentType::SpecOnly, true, Some(5.0), 0, Some(0.6))).unwrap();
        store.recompute().unwrap();

        let report = store.compare_report().unwrap();
        assert!(report.contains("| spec_only | 1 | 100.0% | 5.0m | 0.0 | 0.60 |"));
    }

    #[test]
    fn trends_for_unknown_component_is_none() {
        let (store, _dir) = test_store();
        assert!(store.trends_for("Parser").unwrap().is_none());
        store.append(&run(ExperimentType::SpecOnly, true, None, 0, None)).unwrap();
        assert!(store.trends_for("Lexer").unwrap().is_none());
        assert_eq!(store.trends_for("Parser").unwrap().unwrap().total_attempts, 1);
    }
}

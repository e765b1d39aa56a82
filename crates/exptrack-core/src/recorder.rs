//! Instrumented experiment runs: measurement, gates, and persistence.

use chrono::{DateTime, Utc};
use exptrack_proto::{ExperimentRun, ExperimentType, QualityGate};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ExptrackConfig;
use crate::error::TrackerResult;
use crate::gates::{CommandFailure, GateReport, run_command, run_gates};
use crate::metrics_store::{MetricsStore, Recomputed};

/// Drives one experiment run from start to the appended log record.
pub struct RunRecorder {
    store: MetricsStore,
    gates: Vec<QualityGate>,
    test_timeout: Duration,
}

impl RunRecorder {
    pub fn new(store: MetricsStore, gates: Vec<QualityGate>, test_timeout: Duration) -> Self {
        Self {
            store,
            gates,
            test_timeout,
        }
    }

    pub fn from_config(config: &ExptrackConfig) -> Self {
        Self::new(
            MetricsStore::from_config(config),
            config.quality_gates.clone(),
            Duration::from_secs(config.test_timeout_secs),
        )
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    pub fn gates(&self) -> &[QualityGate] {
        &self.gates
    }

    /// Creates a fresh run record starting now.
    pub fn start_run(
        &self,
        experiment_type: ExperimentType,
        component_name: &str,
    ) -> TrackerResult<ExperimentRun> {
        let run = ExperimentRun::new(experiment_type, component_name)?;
        info!(
            run_id = %run.id,
            experiment_type = %run.experiment_type,
            component = %run.component_name,
            "Experiment run started"
        );
        Ok(run)
    }

    /// Runs the test command once and, if it passes, records its elapsed
    /// minutes as the run's time-to-green.
    ///
    /// A failing command leaves `time_to_green` unset and returns why.
    pub async fn record_time_to_green(
        &self,
        run: &mut ExperimentRun,
        test_command: &str,
    ) -> Result<f64, CommandFailure> {
        info!(command = %test_command, "Measuring time to green");
        let outcome = run_command(test_command, self.test_timeout).await;

        match outcome.failure {
            None => {
                let minutes = outcome.elapsed_minutes();
                run.time_to_green = Some(minutes);
                info!(minutes, "Tests green");
                Ok(minutes)
            }
            Some(failure) => {
                warn!(command = %test_command, %failure, "Tests not green");
                Err(failure)
            }
        }
    }

    /// Runs every configured gate and records the failures as spec drift.
    pub async fn record_quality_gates(&self, run: &mut ExperimentRun) -> GateReport {
        let report = run_gates(&self.gates).await;
        run.spec_drift_count = u32::try_from(report.failed_count()).unwrap_or(u32::MAX);
        info!(
            passed = report.passed_count(),
            total = report.results.len(),
            "Quality gates finished"
        );
        report
    }

    pub fn finish_run(
        &self,
        run: &mut ExperimentRun,
        success: bool,
        artifacts: Vec<String>,
    ) -> TrackerResult<Recomputed> {
        self.finish_run_at(run, success, artifacts, Utc::now())
    }

    /// Closes the run, appends it to the log and recomputes the snapshot.
    pub fn finish_run_at(
        &self,
        run: &mut ExperimentRun,
        success: bool,
        artifacts: Vec<String>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Recomputed> {
        run.end_time = Some(now);
        run.success = success;
        run.artifacts_generated = artifacts;

        self.store.append(run)?;
        let recomputed = self.store.recompute()?;
        info!(
            run_id = %run.id,
            success,
            duration_minutes = run.duration_minutes().unwrap_or(0.0),
            "Experiment run finished"
        );
        Ok(recomputed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    fn test_recorder(gates: Vec<QualityGate>) -> (RunRecorder, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MetricsStore::new(
            dir.path().join("experiment_runs.jsonl"),
            dir.path().join("aggregated_metrics.json"),
        );
        (RunRecorder::new(store, gates, Duration::from_secs(5)), dir)
    }

    #[test]
    fn start_run_rejects_blank_component() {
        let (recorder, _dir) = test_recorder(Vec::new());
        assert!(recorder.start_run(ExperimentType::SpecOnly, "").is_err());
        let run = recorder.start_run(ExperimentType::SpecOnly, "Parser").unwrap();
        assert_eq!(run.component_name, "Parser");
    }

    #[test]
    fn finish_run_appends_and_recomputes() {
        let (recorder, _dir) = test_recorder(Vec::new());
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        let mut first = ExperimentRun::started_at(ExperimentType::ValidatorLoop, "Parser", start).unwrap();
        first.time_to_green = Some(6.0);
        recorder
            .finish_run_at(&mut first, true, vec!["parser.py".into()], start + ChronoDuration::minutes(30))
            .unwrap();

        let mut second = ExperimentRun::started_at(ExperimentType::ValidatorLoop, "Lexer", start).unwrap();
        second.record_rework_cycle("tests red");
        let recomputed = recorder
            .finish_run_at(&mut second, false, Vec::new(), start + ChronoDuration::minutes(45))
            .unwrap();

        assert_eq!(first.duration_minutes(), Some(30.0));
        assert_eq!(first.artifacts_generated, vec!["parser.py"]);

        let metrics = &recomputed.snapshot["validator_loop"];
        assert_eq!(metrics.total_runs, 2);
        assert_eq!(metrics.success_rate, 0.5);
        assert_eq!(metrics.avg_time_to_green, Some(6.0));
        assert_eq!(metrics.avg_rework_cycles, 0.5);

        let logged = recorder.store().run_log().read_all().unwrap().runs;
        assert_eq!(logged, vec![first, second]);
        assert_eq!(recorder.store().load_snapshot().unwrap(), Some(recomputed.snapshot));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn time_to_green_set_only_when_tests_pass() {
        let (recorder, _dir) = test_recorder(Vec::new());
        let mut run = recorder.start_run(ExperimentType::SpecOnly, "Parser").unwrap();

        let failure = recorder.record_time_to_green(&mut run, "exit 2").await.unwrap_err();
        assert!(matches!(failure, CommandFailure::NonZeroExit { code: Some(2), .. }));
        assert_eq!(run.time_to_green, None);

        let minutes = recorder.record_time_to_green(&mut run, "true").await.unwrap();
        assert!(minutes >= 0.0);
        assert_eq!(run.time_to_green, Some(minutes));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_gates_count_as_spec_drift() {
        let gates = vec![
            QualityGate::new("types", "true", "exit 0"),
            QualityGate::new("tests", "false", "exit 0"),
            QualityGate::new("style", "exit 4", "exit 0"),
        ];
        let (recorder, _dir) = test_recorder(gates);
        let mut run = recorder.start_run(ExperimentType::ComponentKernel, "Parser").unwrap();

        let report = recorder.record_quality_gates(&mut run).await;
        assert_eq!(run.spec_drift_count, 2);
        assert_eq!(report.passed_count(), 1);
        let score = report.quality_score().unwrap();
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }
}

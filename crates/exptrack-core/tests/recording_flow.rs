//! End-to-end flow from recorded runs to the comparison report and trends.
//!
//! Tests cover:
//! - Runs across several categories aggregated into one snapshot
//! - Report rendering from the persisted snapshot
//! - Trends reading the same run log
//! - A session tracked alongside, sharing the config's paths

use chrono::{Duration, TimeZone, Utc};
use exptrack_core::{
    ExptrackConfig, ImprovementTrend, MetricsStore, RunRecorder, SessionStatus, SessionTracker,
    TrackerError,
};
use exptrack_proto::{ExperimentRun, ExperimentType};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> ExptrackConfig {
    let yaml = format!(
        r#"
state_file: "{root}/experiment_status.json"
results_file: "{root}/results.json"
data_dir: "{root}/metrics"
quality_gates: []
"#,
        root = dir.path().display()
    );
    serde_yaml::from_str(&yaml).unwrap()
}

#[test]
fn recorded_runs_feed_report_and_trends() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let recorder = RunRecorder::from_config(&config);
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let plan = [
        (ExperimentType::SpecOnly, "File_Storage", false, None, 2),
        (ExperimentType::SpecOnly, "File_Storage", true, Some(9.0), 1),
        (ExperimentType::ValidatorLoop, "File_Storage", true, Some(3.0), 0),
        (ExperimentType::ValidatorLoop, "Parser", true, Some(5.0), 0),
    ];

    for (hour, (kind, component, success, time_to_green, rework)) in plan.into_iter().enumerate() {
        let start = t0 + Duration::hours(hour as i64);
        let mut run = ExperimentRun::started_at(kind, component, start).unwrap();
        run.time_to_green = time_to_green;
        for _ in 0..rework {
            run.record_rework_cycle("tests red");
        }
        recorder
            .finish_run_at(&mut run, success, Vec::new(), start + Duration::minutes(40))
            .unwrap();
    }

    let store = MetricsStore::from_config(&config);
    assert!(config.runs_file().exists());
    assert!(config.metrics_file().exists());

    let snapshot = store.load_snapshot().unwrap().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["spec_only"].success_rate, 0.5);
    assert_eq!(snapshot["spec_only"].avg_rework_cycles, 1.5);
    assert_eq!(snapshot["validator_loop"].avg_time_to_green, Some(4.0));

    let report = store.compare_report().unwrap();
    assert!(report.contains("| spec_only | 2 | 50.0% | 9.0m | 1.5 | N/A |"));
    assert!(report.contains("- **Highest Success Rate**: validator_loop (100.0%)"));
    assert!(report.contains("- **Fastest to Green**: validator_loop (4.0 minutes)"));
    assert!(report.contains("- **Lowest Rework**: validator_loop (0.0 cycles)"));

    let trends = store.trends_for("File_Storage").unwrap().unwrap();
    assert_eq!(trends.total_attempts, 3);
    assert_eq!(trends.total_rework_cycles, 3);
    assert_eq!(trends.avg_time_to_green, Some(6.0));
    assert_eq!(trends.improvement_trend, ImprovementTrend::Improving);

    assert!(store.trends_for("Scheduler").unwrap().is_none());
}

#[test]
fn report_before_any_run_is_no_data() {
    let dir = TempDir::new().unwrap();
    let store = MetricsStore::from_config(&config_in(&dir));
    assert!(matches!(store.compare_report(), Err(TrackerError::NoData)));
}

#[test]
fn session_uses_configured_paths() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let tracker = SessionTracker::from_config(&config);
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    tracker.start_at("kernel", t0).unwrap();
    assert!(config.state_file.exists());

    let result = tracker.end_at(false, t0 + Duration::minutes(12)).unwrap();
    assert_eq!(result.session.status, SessionStatus::Failed);
    assert!(!config.state_file.exists());
    assert!(config.results_file.exists());
}

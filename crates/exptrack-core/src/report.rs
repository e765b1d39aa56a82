//! Markdown rendering for the comparison report and per-run summaries.

use chrono::{DateTime, Utc};
use exptrack_proto::{ExperimentRun, MetricsSnapshot};

use crate::error::{TrackerError, TrackerResult};

/// Returns the first candidate for which `better(value, best)` held against
/// every earlier candidate. Ties keep the earlier candidate.
fn first_best<'a>(
    candidates: impl Iterator<Item = (&'a str, f64)>,
    better: impl Fn(f64, f64) -> bool,
) -> Option<(&'a str, f64)> {
    candidates.fold(None, |best, (name, value)| match best {
        Some((_, best_value)) if !better(value, best_value) => best,
        _ => Some((name, value)),
    })
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Renders the cross-category comparison table plus derived insights.
///
/// Rows and tie-breaks follow the snapshot's lexicographic category order.
/// Fails with `NoData` on an empty snapshot.
pub fn render_comparison(
    snapshot: &MetricsSnapshot,
    generated_at: DateTime<Utc>,
) -> TrackerResult<String> {
    if snapshot.is_empty() {
        return Err(TrackerError::NoData);
    }

    let mut report = String::from("# Experiment Comparison Report\n\n");
    report += &format!(
        "Generated: {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    report += "## Results Summary\n\n";
    report += "| Experiment | Runs | Success Rate | Avg Time to Green | Avg Rework Cycles | Avg Quality Score |\n";
    report += "|------------|------|--------------|-------------------|-------------------|-------------------|\n";

    for (experiment, data) in snapshot {
        let time_to_green = data
            .avg_time_to_green
            .map_or_else(|| "N/A".to_string(), |t| format!("{t:.1}m"));
        let quality_score = data
            .avg_quality_score
            .map_or_else(|| "N/A".to_string(), |q| format!("{q:.2}"));

        report += &format!(
            "| {} | {} | {} | {} | {:.1} | {} |\n",
            experiment,
            data.total_runs,
            percent(data.success_rate),
            time_to_green,
            data.avg_rework_cycles,
            quality_score
        );
    }

    report += "\n## Key Insights\n\n";

    let rows = || snapshot.iter().map(|(name, data)| (name.as_str(), data));

    if let Some((name, rate)) = first_best(rows().map(|(n, d)| (n, d.success_rate)), |a, b| a > b) {
        report += &format!("- **Highest Success Rate**: {} ({})\n", name, percent(rate));
    }

    let fastest = first_best(
        rows().filter_map(|(n, d)| d.avg_time_to_green.map(|t| (n, t))),
        |a, b| a < b,
    );
    if let Some((name, minutes)) = fastest {
        report += &format!("- **Fastest to Green**: {} ({:.1} minutes)\n", name, minutes);
    }

    if let Some((name, cycles)) = first_best(rows().map(|(n, d)| (n, d.avg_rework_cycles)), |a, b| a < b) {
        report += &format!("- **Lowest Rework**: {} ({:.1} cycles)\n", name, cycles);
    }

    Ok(report)
}

/// Renders the end-of-run summary block.
pub fn render_run_summary(run: &ExperimentRun) -> String {
    let rule = "=".repeat(50);
    let mut out = format!("\n{rule}\n📋 EXPERIMENT SUMMARY\n{rule}\n");

    out += &format!("Type: {}\n", run.experiment_type);
    out += &format!("Component: {}\n", run.component_name);
    out += &format!("Success: {}\n", if run.success { "✅" } else { "❌" });

    if let Some(minutes) = run.time_to_green {
        out += &format!("Time to Green: {minutes:.1} minutes\n");
    }

    out += &format!("Rework Cycles: {}\n", run.rework_cycles);
    out += &format!("Editor Friction: {}\n", run.editor_friction_count);
    out += &format!("Spec Drift Issues: {}\n", run.spec_drift_count);

    if !run.artifacts_generated.is_empty() {
        out += &format!("Artifacts Generated: {}\n", run.artifacts_generated.len());
        for artifact in &run.artifacts_generated {
            out += &format!("  - {artifact}\n");
        }
    }

    if !run.issues_encountered.is_empty() {
        out += &format!("Issues Encountered: {}\n", run.issues_encountered.len());
        // Only the most recent three.
        let skip = run.issues_encountered.len().saturating_sub(3);
        for issue in &run.issues_encountered[skip..] {
            out += &format!("  - {issue}\n");
        }
    }

    out += &rule;
    out
}

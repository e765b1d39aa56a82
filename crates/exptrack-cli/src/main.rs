//! # exptrack-cli
//!
//! Binary entry point for Exptrack.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - The manual session tracker (`start`, `pause`, `resume`, `end`, `status`)
//! - The guided, instrumented experiment run (`run`)
//! - Quality gates and metrics reporting (`gates`, `metrics`)

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use exptrack_core::{
    CommandFailure, ComponentTrends, ExptrackConfig, FinalizedSession, GateReport,
    ImprovementTrend, MetricsStore, PauseOutcome, ResumeOutcome, RunRecorder, SessionStatus,
    SessionTracker, TrackerError, render_run_summary, run_gates,
};
use exptrack_proto::ExperimentType;
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Output format for the trends command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

/// How a manually tracked session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Outcome {
    #[default]
    Success,
    Fail,
}

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
}

fn paint(text: &str, color: &str, use_colors: bool) -> String {
    if use_colors {
        format!("{color}{text}{}", colors::RESET)
    } else {
        text.to_string()
    }
}

/// Exptrack - time and quality tracking for build experiments
#[derive(Parser, Debug)]
#[command(name = "exptrack", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────

    /// Path to configuration file
    #[arg(short, long, default_value = "exptrack.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start tracking a new experiment session
    Start {
        /// Experiment name
        name: String,
    },

    /// Pause the active session
    Pause,

    /// Resume a paused session
    Resume,

    /// End the active session and write the result file
    End {
        #[arg(value_enum, default_value_t = Outcome::Success)]
        outcome: Outcome,
    },

    /// Show the active session
    Status,

    /// Run an instrumented experiment: implement, then measure tests and gates
    Run(RunArgs),

    /// Run the configured quality gates once
    Gates,

    /// Aggregate and report recorded runs
    #[command(subcommand)]
    Metrics(MetricsCommands),
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Experiment category (source_of_truth, component_kernel, spec_only,
    /// spec_to_prompt, validator_loop)
    #[arg(value_parser = parse_experiment_type)]
    experiment_type: ExperimentType,

    /// Component being built
    component: String,

    /// Override the configured test command
    #[arg(long)]
    test_command: Option<String>,

    /// Artifact produced by the run (repeatable)
    #[arg(long = "artifact")]
    artifacts: Vec<String>,

    /// Reason for a rework cycle during implementation (repeatable)
    #[arg(long = "rework", value_name = "REASON")]
    rework: Vec<String>,

    /// Manual edit made to generated output (repeatable)
    #[arg(long = "manual-edit", value_name = "DESCRIPTION")]
    manual_edits: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum MetricsCommands {
    /// Rebuild the aggregated snapshot from the run log
    Recompute,

    /// Print the cross-category comparison report
    Compare {
        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show trends for one component across all runs
    Trends {
        /// Component name
        component: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

fn parse_experiment_type(s: &str) -> Result<ExperimentType, String> {
    s.parse().map_err(|e: exptrack_proto::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let use_colors = cli.color.should_use_colors();
    let config = load_config(&cli.config)?;

    let result = match command {
        Commands::Start { name } => start_command(&config, &name, use_colors),
        Commands::Pause => pause_command(&config, use_colors),
        Commands::Resume => resume_command(&config, use_colors),
        Commands::End { outcome } => end_command(&config, outcome, use_colors),
        Commands::Status => status_command(&config, use_colors),
        Commands::Run(args) => run_experiment_command(&config, args, use_colors).await,
        Commands::Gates => gates_command(&config, use_colors).await,
        Commands::Metrics(cmd) => metrics_command(&config, cmd, use_colors),
    };

    if let Err(e) = &result
        && let Some(err) = e.downcast_ref::<TrackerError>()
        && err.is_user_facing()
    {
        print_user_error(err, use_colors);
        std::process::exit(1);
    }

    result
}

fn load_config(path: &Path) -> Result<ExptrackConfig> {
    let config = ExptrackConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .validate()
        .context("Configuration validation failed")?;
    debug!(
        state_file = %config.state_file.display(),
        data_dir = %config.data_dir.display(),
        "Configuration ready"
    );
    Ok(config)
}

fn print_user_error(err: &TrackerError, use_colors: bool) {
    eprintln!("{}", paint(&format!("❌ {err}"), colors::RED, use_colors));
    match err {
        TrackerError::NoActiveSession => {
            eprintln!("Run `exptrack start <name>` to begin tracking.");
        }
        TrackerError::NoData => {
            eprintln!("Run `exptrack run <category> <component>` to record an experiment.");
        }
        _ => {}
    }
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Manual session tracking
// ─────────────────────────────────────────────────────────────────────────────

fn start_command(config: &ExptrackConfig, name: &str, use_colors: bool) -> Result<()> {
    let state = SessionTracker::from_config(config).start(name)?;
    println!(
        "🔬 Started experiment: {}",
        paint(&state.experiment_name, colors::BOLD, use_colors)
    );
    println!("⏰ Start time: {}", local_time(state.start_time));
    Ok(())
}

fn pause_command(config: &ExptrackConfig, use_colors: bool) -> Result<()> {
    match SessionTracker::from_config(config).pause()? {
        PauseOutcome::Paused { at } => {
            println!("⏸️  Experiment paused at {}", local_time(at));
        }
        PauseOutcome::AlreadyPaused { since } => {
            let since = since.map_or_else(|| "an unknown time".to_string(), local_time);
            println!(
                "{}",
                paint(
                    &format!("⚠️  Experiment is already paused (since {since})"),
                    colors::YELLOW,
                    use_colors
                )
            );
        }
    }
    Ok(())
}

fn resume_command(config: &ExptrackConfig, use_colors: bool) -> Result<()> {
    match SessionTracker::from_config(config).resume()? {
        ResumeOutcome::Resumed(interval) => {
            println!(
                "▶️  Experiment resumed after {:.1} minutes paused",
                interval.duration_minutes
            );
        }
        ResumeOutcome::NotPaused { status } => {
            println!(
                "{}",
                paint(
                    &format!("⚠️  Experiment is not paused (status: {status})"),
                    colors::YELLOW,
                    use_colors
                )
            );
        }
    }
    Ok(())
}

fn end_command(config: &ExptrackConfig, outcome: Outcome, use_colors: bool) -> Result<()> {
    let tracker = SessionTracker::from_config(config);
    let result = tracker.end(outcome == Outcome::Success)?;
    print_finalized(&result, use_colors);
    debug!(path = %tracker.results_path().display(), "Result written");
    Ok(())
}

fn print_finalized(result: &FinalizedSession, use_colors: bool) {
    let headline = if result.session.status == SessionStatus::Completed {
        paint(
            &format!(
                "✅ Experiment completed in {:.1} minutes",
                result.total_duration_minutes
            ),
            colors::GREEN,
            use_colors,
        )
    } else {
        paint(
            &format!(
                "❌ Experiment failed after {:.1} minutes",
                result.total_duration_minutes
            ),
            colors::RED,
            use_colors,
        )
    };
    println!("{headline}");
    println!("   Paused: {:.1} minutes", result.session.paused_time_minutes);
    println!("   Active: {:.1} minutes", result.active_duration_minutes);

    if result.clock_anomaly {
        println!(
            "{}",
            paint(
                "⚠️  Clock anomaly detected; durations were clamped to zero",
                colors::YELLOW,
                use_colors
            )
        );
    }
}

fn status_command(config: &ExptrackConfig, use_colors: bool) -> Result<()> {
    let snapshot = SessionTracker::from_config(config).status()?;
    let state = &snapshot.state;

    let status_color = match snapshot.paused_since() {
        Some(_) => colors::YELLOW,
        None => colors::GREEN,
    };

    println!(
        "🔬 Experiment: {}",
        paint(&state.experiment_name, colors::BOLD, use_colors)
    );
    println!(
        "   Status: {}",
        paint(state.status.as_str(), status_color, use_colors)
    );
    println!("   Started: {}", local_time(state.start_time));
    println!("   Elapsed: {:.1} minutes", snapshot.elapsed_minutes);
    println!("   Paused: {:.1} minutes", snapshot.paused_minutes);
    println!("   Active: {:.1} minutes", snapshot.active_minutes());
    println!("   Pauses: {}", state.pause_history.len());

    if let Some(since) = snapshot.paused_since() {
        println!(
            "{}",
            paint(
                &format!("⏸️  Paused since {}", local_time(since)),
                colors::YELLOW,
                use_colors
            )
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Instrumented runs and quality gates
// ─────────────────────────────────────────────────────────────────────────────

async fn wait_for_enter() -> std::io::Result<()> {
    let mut line = String::new();
    let read = BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    if read == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "input closed before Enter was pressed",
        ));
    }
    Ok(())
}

async fn run_experiment_command(
    config: &ExptrackConfig,
    args: RunArgs,
    use_colors: bool,
) -> Result<()> {
    use colors::*;

    let recorder = RunRecorder::from_config(config);
    let test_command = args
        .test_command
        .unwrap_or_else(|| config.test_command.clone());

    let mut run = recorder.start_run(args.experiment_type, &args.component)?;
    for reason in &args.rework {
        run.record_rework_cycle(reason);
    }
    for description in &args.manual_edits {
        run.record_editor_friction(description);
    }

    println!(
        "🚀 Ready to implement {} using {}",
        paint(&run.component_name, BOLD, use_colors),
        paint(run.experiment_type.as_str(), CYAN, use_colors)
    );
    println!("💡 Follow these steps:");
    println!("   1. Implement the component");
    println!("   2. Run tests when ready");
    println!("   3. Record any rework cycles (--rework <reason>)");
    println!("   4. Record manual edits (--manual-edit <description>)");
    if run.rework_cycles > 0 || run.editor_friction_count > 0 {
        println!(
            "📝 Recorded {} rework cycle(s) and {} manual edit(s)",
            run.rework_cycles, run.editor_friction_count
        );
    }
    println!("⏸️  Press Enter when implementation is complete...");

    if let Err(e) = wait_for_enter().await {
        run.issues_encountered.push(format!("Error: {e}"));
        recorder.finish_run(&mut run, false, args.artifacts)?;
        println!("{}", render_run_summary(&run));
        return Err(e).context("Failed waiting for implementation to complete");
    }

    println!("🧪 Running tests: {test_command}");
    match recorder.record_time_to_green(&mut run, &test_command).await {
        Ok(minutes) => println!(
            "{}",
            paint(&format!("✅ Tests green in {minutes:.1} minutes"), GREEN, use_colors)
        ),
        Err(failure) => print_command_failure("Tests not green", &failure, use_colors),
    }

    println!("🔍 Running quality gates...");
    let report = recorder.record_quality_gates(&mut run).await;
    print_gate_report(&report, use_colors);

    if !report.all_passed() {
        println!(
            "{}",
            paint(
                "⚠️  Some quality gates failed. Recording as rework cycle.",
                YELLOW,
                use_colors
            )
        );
        run.record_rework_cycle("Quality gates failed");
    }

    if let Some(score) = report.quality_score() {
        run.set_quality_score(score)?;
        println!("🎯 Final Quality Score: {score:.2}");
    }

    let recomputed = recorder.finish_run(&mut run, true, args.artifacts)?;
    if !recomputed.malformed.is_empty() {
        println!(
            "{}",
            paint(
                &format!(
                    "⚠️  Skipped {} malformed run log line(s)",
                    recomputed.malformed.len()
                ),
                YELLOW,
                use_colors
            )
        );
    }

    println!("{}", render_run_summary(&run));
    println!("\n{}", recorder.store().compare_report()?);
    Ok(())
}

fn print_command_failure(label: &str, failure: &CommandFailure, use_colors: bool) {
    println!(
        "{}",
        paint(&format!("❌ {label}: {failure}"), colors::RED, use_colors)
    );
    if let CommandFailure::NonZeroExit { stderr, .. } = failure
        && !stderr.is_empty()
    {
        println!("{}", paint(stderr, colors::DIM, use_colors));
    }
}

fn print_gate_report(report: &GateReport, use_colors: bool) {
    for result in &report.results {
        let seconds = result.outcome.elapsed.as_secs_f64();
        match &result.outcome.failure {
            None => println!(
                "  {} {} {}",
                paint("✅", colors::GREEN, use_colors),
                result.name,
                paint(&format!("({seconds:.1}s)"), colors::DIM, use_colors)
            ),
            Some(failure) => {
                println!(
                    "  {} {}: {} {}",
                    paint("❌", colors::RED, use_colors),
                    result.name,
                    failure,
                    paint(&format!("({seconds:.1}s)"), colors::DIM, use_colors)
                );
                if let CommandFailure::NonZeroExit { stderr, .. } = failure
                    && !stderr.is_empty()
                {
                    println!("     {}", paint(stderr, colors::DIM, use_colors));
                }
            }
        }
    }
}

async fn gates_command(config: &ExptrackConfig, use_colors: bool) -> Result<()> {
    if config.quality_gates.is_empty() {
        println!("No quality gates configured.");
        return Ok(());
    }

    let report = run_gates(&config.quality_gates).await;
    print_gate_report(&report, use_colors);

    if let Some(score) = report.quality_score() {
        println!(
            "🎯 Quality Score: {score:.2} ({}/{} gates passed)",
            report.passed_count(),
            report.results.len()
        );
    }

    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics reporting
// ─────────────────────────────────────────────────────────────────────────────

fn metrics_command(config: &ExptrackConfig, cmd: MetricsCommands, use_colors: bool) -> Result<()> {
    let store = MetricsStore::from_config(config);

    match cmd {
        MetricsCommands::Recompute => {
            let recomputed = store.recompute()?;
            println!(
                "📊 Recomputed metrics for {} experiment type(s)",
                recomputed.snapshot.len()
            );
            for line in &recomputed.malformed {
                println!(
                    "{}",
                    paint(
                        &format!(
                            "⚠️  Skipped line {}: {} ({})",
                            line.line_number, line.content, line.error
                        ),
                        colors::YELLOW,
                        use_colors
                    )
                );
            }
        }
        MetricsCommands::Compare { output } => {
            let report = store.compare_report()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &report)
                        .with_context(|| format!("Failed to write report to {}", path.display()))?;
                    println!("📝 Report written to {}", path.display());
                }
                None => println!("{report}"),
            }
        }
        MetricsCommands::Trends { component, format } => {
            let Some(trends) = store.trends_for(&component)? else {
                println!("No runs recorded for {component}");
                return Ok(());
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&trends)?),
                OutputFormat::Table => print_trends(&trends, use_colors),
            }
        }
    }

    Ok(())
}

fn print_trends(trends: &ComponentTrends, use_colors: bool) {
    use colors::*;

    let trend_color = match trends.improvement_trend {
        ImprovementTrend::Improving => GREEN,
        ImprovementTrend::Declining => RED,
        _ => DIM,
    };
    let time_to_green = trends
        .avg_time_to_green
        .map_or_else(|| "N/A".to_string(), |t| format!("{t:.1} minutes"));

    println!(
        "📈 Trends for {}",
        paint(&trends.component_name, BOLD, use_colors)
    );
    println!("   Attempts: {}", trends.total_attempts);
    println!("   Success Rate: {:.1}%", trends.success_rate * 100.0);
    println!("   Avg Time to Green: {time_to_green}");
    println!("   Total Rework Cycles: {}", trends.total_rework_cycles);
    println!(
        "   Trend: {}",
        paint(trends.improvement_trend.as_str(), trend_color, use_colors)
    );
}

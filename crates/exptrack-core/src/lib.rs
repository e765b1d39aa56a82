//! # exptrack-core
//!
//! Measurement and persistence for the Exptrack experiment tracker.
//!
//! This crate provides:
//! - Manual session tracking with pause/resume accounting
//! - The append-only run log and the per-category metrics snapshot
//! - Quality gate and test command execution with timeouts
//! - Markdown comparison reports and per-component trends
//! - Configuration loading

mod config;
mod error;
mod gates;
mod metrics_store;
mod persist;
mod recorder;
mod report;
mod run_log;
mod session;
mod trends;

pub use config::{ConfigError, ExptrackConfig};
pub use error::{TrackerError, TrackerResult};
pub use gates::{CommandFailure, CommandOutcome, GateReport, GateResult, run_command, run_gates};
pub use metrics_store::{MetricsStore, Recomputed, aggregate};
pub use recorder::RunRecorder;
pub use report::{render_comparison, render_run_summary};
pub use run_log::{MalformedLine, ParseResult, RunLog};
pub use session::{
    FinalizedSession, PauseInterval, PauseOutcome, ResumeOutcome, SessionState, SessionStatus,
    SessionTracker, StatusSnapshot, minutes_between,
};
pub use trends::{ComponentTrends, ImprovementTrend, component_trends, improvement_trend};

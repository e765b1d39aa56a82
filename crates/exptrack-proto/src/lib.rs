//! # exptrack-proto
//!
//! Shared types, error definitions, and contracts for the Exptrack tooling.
//!
//! This crate provides the vocabulary used across all Exptrack crates,
//! including:
//! - Experiment categories and the per-run record appended to the run log
//! - Aggregated per-category metrics
//! - Quality gate definitions and the standard gate list
//! - Common error types

mod error;
mod experiment;
mod metrics;
mod quality_gate;

pub use error::{Error, Result};
pub use experiment::{ExperimentRun, ExperimentType};
pub use metrics::{ExperimentMetrics, MetricsSnapshot};
pub use quality_gate::{QualityGate, standard_quality_gates};

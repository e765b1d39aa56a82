//! Error types for constructor-time validation of shared records.

/// Result alias for operations that validate shared records.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation failures for shared records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Quality score must be within [0, 1], got {0}")]
    InvalidQualityScore(f64),

    #[error("{field} cannot be empty")]
    EmptyName { field: &'static str },

    #[error("Unknown experiment type '{0}'")]
    UnknownExperimentType(String),
}

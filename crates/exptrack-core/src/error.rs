/// Errors from session tracking and metrics reporting.
///
/// All variants except `Io` and `Json` are user-facing conditions; those two
/// are unexpected storage failures and should be treated as fatal.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("No active experiment found")]
    NoActiveSession,

    #[error("Experiment '{experiment}' is already in progress; end it before starting another")]
    StateConflict { experiment: String },

    #[error("State file {} is unreadable; remove it before starting another experiment", path.display())]
    UnreadableState { path: std::path::PathBuf },

    #[error("No metrics data available yet")]
    NoData,

    #[error(transparent)]
    Validation(#[from] exptrack_proto::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    /// Returns true for conditions the user caused and can fix.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            TrackerError::NoActiveSession
                | TrackerError::StateConflict { .. }
                | TrackerError::UnreadableState { .. }
                | TrackerError::NoData
                | TrackerError::Validation(_)
        )
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

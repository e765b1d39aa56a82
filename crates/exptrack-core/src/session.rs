//! Manual session tracking with pause/resume bookkeeping.
//!
//! A single live session is persisted to a small JSON state file. The file
//! exists exactly while a session is `in_progress` or `paused`; ending the
//! session writes a finalized result record and removes the state file.
//!
//! ```text
//! ∅ ──start──▶ in_progress ⇄ paused ──end──▶ completed | failed ──▶ ∅
//! ```
//!
//! Every operation has an `*_at` variant taking the current time explicitly,
//! which is what the tests drive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::ExptrackConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::persist::write_json_atomic;

/// Lifecycle status of a manually tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One closed pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub pause_start: DateTime<Utc>,
    pub pause_end: DateTime<Utc>,
    pub duration_minutes: f64,

    /// Set when the clock went backwards and the duration was clamped to 0.
    #[serde(default, skip_serializing_if = "is_false")]
    pub clock_skew: bool,
}

/// The live session as stored in the state file.
///
/// `pause_start` is `Some` iff `status` is `Paused`, and
/// `paused_time_minutes` is the sum of `pause_history` durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub experiment_name: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub pause_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub paused_time_minutes: f64,

    #[serde(default)]
    pub pause_history: Vec<PauseInterval>,
}

impl SessionState {
    fn new(experiment_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            experiment_name: experiment_name.to_string(),
            status: SessionStatus::InProgress,
            start_time: now,
            end_time: None,
            pause_start: None,
            paused_time_minutes: 0.0,
            pause_history: Vec::new(),
        }
    }

    /// When the current pause began, if paused.
    pub fn paused_since(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SessionStatus::Paused => self.pause_start,
            _ => None,
        }
    }

    /// Closes the open pause, if any, and returns to `in_progress`.
    ///
    /// Shared by `resume` and by `end` on a paused session so no paused
    /// interval is lost. Returns the interval appended to the history.
    pub fn close_open_pause(&mut self, now: DateTime<Utc>) -> Option<PauseInterval> {
        if self.status != SessionStatus::Paused {
            return None;
        }
        self.status = SessionStatus::InProgress;

        let Some(pause_start) = self.pause_start.take() else {
            warn!(
                experiment = %self.experiment_name,
                "Session marked paused without a pause start; treating as resumed"
            );
            return None;
        };

        let raw = minutes_between(pause_start, now);
        let clock_skew = raw < 0.0;
        if clock_skew {
            warn!(
                experiment = %self.experiment_name,
                pause_start = %pause_start,
                now = %now,
                "Pause ended before it started (clock skew); recording zero duration"
            );
        }

        let interval = PauseInterval {
            pause_start,
            pause_end: now,
            duration_minutes: raw.max(0.0),
            clock_skew,
        };
        self.paused_time_minutes += interval.duration_minutes;
        self.pause_history.push(interval.clone());
        Some(interval)
    }

    /// Paused minutes including a still-open pause.
    pub fn paused_minutes_at(&self, now: DateTime<Utc>) -> f64 {
        let open = self
            .paused_since()
            .map_or(0.0, |since| minutes_between(since, now).max(0.0));
        self.paused_time_minutes + open
    }
}

/// The immutable record written when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedSession {
    #[serde(flatten)]
    pub session: SessionState,

    /// Wall-clock minutes from start to end.
    pub total_duration_minutes: f64,

    /// Wall-clock minus paused minutes.
    pub active_duration_minutes: f64,

    /// Set when a duration had to be clamped to stay non-negative.
    #[serde(default, skip_serializing_if = "is_false")]
    pub clock_anomaly: bool,
}

/// Result of a pause request.
#[derive(Debug, Clone, PartialEq)]
pub enum PauseOutcome {
    Paused { at: DateTime<Utc> },
    /// Already paused; nothing changed.
    AlreadyPaused { since: Option<DateTime<Utc>> },
}

/// Result of a resume request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Resumed(PauseInterval),
    /// Not paused; nothing changed.
    NotPaused { status: SessionStatus },
}

/// Read-only view of the live session for display.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub elapsed_minutes: f64,
    pub paused_minutes: f64,
}

impl StatusSnapshot {
    pub fn paused_since(&self) -> Option<DateTime<Utc>> {
        self.state.paused_since()
    }

    /// Elapsed minus paused, never negative.
    pub fn active_minutes(&self) -> f64 {
        (self.elapsed_minutes - self.paused_minutes).max(0.0)
    }
}

/// Manages the live state file and the result file.
pub struct SessionTracker {
    state_path: PathBuf,
    results_path: PathBuf,
}

impl SessionTracker {
    pub fn new(state_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            results_path: results_path.into(),
        }
    }

    pub fn from_config(config: &ExptrackConfig) -> Self {
        Self::new(&config.state_file, &config.results_file)
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Loads the live session. Returns `None` if no state file exists.
    pub fn load(&self) -> TrackerResult<Option<SessionState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.state_path)?;
        let state: SessionState = serde_json::from_str(&contents)?;
        Ok(Some(state))
    }

    fn require(&self) -> TrackerResult<SessionState> {
        self.load()?.ok_or(TrackerError::NoActiveSession)
    }

    fn save(&self, state: &SessionState) -> TrackerResult<()> {
        write_json_atomic(&self.state_path, state)?;
        debug!(path = %self.state_path.display(), status = %state.status, "Session state saved");
        Ok(())
    }

    pub fn start(&self, experiment_name: &str) -> TrackerResult<SessionState> {
        self.start_at(experiment_name, Utc::now())
    }

    /// Creates a new live session.
    ///
    /// Fails with `StateConflict` if a state file already exists, or with
    /// `UnreadableState` if that file cannot be parsed.
    pub fn start_at(&self, experiment_name: &str, now: DateTime<Utc>) -> TrackerResult<SessionState> {
        if self.state_path.exists() {
            return Err(match self.load() {
                Ok(Some(existing)) => TrackerError::StateConflict {
                    experiment: existing.experiment_name,
                },
                Ok(None) | Err(_) => TrackerError::UnreadableState {
                    path: self.state_path.clone(),
                },
            });
        }

        let name = experiment_name.trim();
        if name.is_empty() {
            return Err(exptrack_proto::Error::EmptyName {
                field: "experiment_name",
            }
            .into());
        }

        let state = SessionState::new(name, now);
        self.save(&state)?;
        debug!(experiment = %name, start = %now, "Session started");
        Ok(state)
    }

    pub fn pause(&self) -> TrackerResult<PauseOutcome> {
        self.pause_at(Utc::now())
    }

    /// Marks the session paused. A second pause is a no-op with a warning.
    pub fn pause_at(&self, now: DateTime<Utc>) -> TrackerResult<PauseOutcome> {
        let mut state = self.require()?;

        if state.status == SessionStatus::Paused {
            warn!(experiment = %state.experiment_name, "Session is already paused");
            return Ok(PauseOutcome::AlreadyPaused {
                since: state.pause_start,
            });
        }

        state.pause_start = Some(now);
        state.status = SessionStatus::Paused;
        self.save(&state)?;
        debug!(experiment = %state.experiment_name, at = %now, "Session paused");
        Ok(PauseOutcome::Paused { at: now })
    }

    pub fn resume(&self) -> TrackerResult<ResumeOutcome> {
        self.resume_at(Utc::now())
    }

    /// Closes the open pause. Resuming an unpaused session is a no-op with a
    /// warning.
    pub fn resume_at(&self, now: DateTime<Utc>) -> TrackerResult<ResumeOutcome> {
        let mut state = self.require()?;

        if state.status != SessionStatus::Paused {
            warn!(
                experiment = %state.experiment_name,
                status = %state.status,
                "Session is not paused"
            );
            return Ok(ResumeOutcome::NotPaused {
                status: state.status,
            });
        }

        let interval = state.close_open_pause(now);
        self.save(&state)?;

        match interval {
            Some(interval) => {
                debug!(
                    experiment = %state.experiment_name,
                    minutes = interval.duration_minutes,
                    "Session resumed"
                );
                Ok(ResumeOutcome::Resumed(interval))
            }
            None => Ok(ResumeOutcome::NotPaused {
                status: state.status,
            }),
        }
    }

    pub fn end(&self, success: bool) -> TrackerResult<FinalizedSession> {
        self.end_at(success, Utc::now())
    }

    /// Finalizes the session, writes the result file and removes the state
    /// file. A paused session is resumed first.
    pub fn end_at(&self, success: bool, now: DateTime<Utc>) -> TrackerResult<FinalizedSession> {
        let mut state = self.require()?;

        if state.status == SessionStatus::Paused {
            debug!(experiment = %state.experiment_name, "Ending a paused session; closing open pause");
            state.close_open_pause(now);
        }

        state.end_time = Some(now);
        state.status = if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };

        let mut clock_anomaly = false;
        let mut total = minutes_between(state.start_time, now);
        if total < 0.0 {
            warn!(experiment = %state.experiment_name, "End time precedes start time; clamping total duration");
            total = 0.0;
            clock_anomaly = true;
        }
        let mut active = total - state.paused_time_minutes;
        if active < 0.0 {
            warn!(
                experiment = %state.experiment_name,
                total_minutes = total,
                paused_minutes = state.paused_time_minutes,
                "Paused time exceeds total duration; clamping active duration"
            );
            active = 0.0;
            clock_anomaly = true;
        }

        let result = FinalizedSession {
            session: state,
            total_duration_minutes: total,
            active_duration_minutes: active,
            clock_anomaly,
        };

        write_json_atomic(&self.results_path, &result)?;
        std::fs::remove_file(&self.state_path)?;
        debug!(
            experiment = %result.session.experiment_name,
            status = %result.session.status,
            results = %self.results_path.display(),
            "Session finalized"
        );
        Ok(result)
    }

    pub fn status(&self) -> TrackerResult<StatusSnapshot> {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> TrackerResult<StatusSnapshot> {
        let state = self.require()?;
        let elapsed_minutes = minutes_between(state.start_time, now).max(0.0);
        let paused_minutes = state.paused_minutes_at(now);
        Ok(StatusSnapshot {
            state,
            elapsed_minutes,
            paused_minutes,
        })
    }
}

/// Fractional minutes from `from` to `to`; negative if `to` is earlier.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

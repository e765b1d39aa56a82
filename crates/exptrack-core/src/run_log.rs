//! Append-only run log at `<data_dir>/experiment_runs.jsonl`.
//!
//! One JSON-encoded [`ExperimentRun`] per line, in append order. Records are
//! never rewritten; readers skip malformed lines instead of failing.

use exptrack_proto::ExperimentRun;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of reading the run log.
///
/// Contains both successfully parsed runs and information about lines
/// that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Successfully parsed runs, in file order.
    pub runs: Vec<ExperimentRun>,
    /// Lines that failed to parse.
    pub malformed: Vec<MalformedLine>,
}

/// Information about a malformed JSONL line.
#[derive(Debug, Clone, Serialize)]
pub struct MalformedLine {
    /// Line number in the file (1-indexed).
    pub line_number: u64,
    /// The raw content that failed to parse (truncated if very long).
    pub content: String,
    /// The parse error message.
    pub error: String,
}

impl MalformedLine {
    /// Maximum content length (in characters) before truncation.
    const MAX_CONTENT_LEN: usize = 100;

    pub fn new(line_number: u64, content: &str, error: String) -> Self {
        let content = match content.char_indices().nth(Self::MAX_CONTENT_LEN) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.to_string(),
        };
        Self {
            line_number,
            content,
            error,
        }
    }
}

/// Handle to the append-only run log.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single line, creating the file and its
    /// parent directory on first use.
    pub fn append(&self, run: &ExperimentRun) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(run)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        debug!(
            run_id = %run.id,
            experiment_type = %run.experiment_type,
            component = %run.component_name,
            "Appended run to log"
        );
        Ok(())
    }

    /// Reads every record. A missing file reads as empty.
    ///
    /// Lines that are not valid UTF-8 or not a valid record are collected
    /// in `malformed` and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be opened or read.
    pub fn read_all(&self) -> std::io::Result<ParseResult> {
        if !self.path.exists() {
            return Ok(ParseResult::default());
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut result = ParseResult::default();
        let mut buf = Vec::new();
        let mut line_number = 0u64;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(text) => text.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    warn!(error = %e, line_number, "Skipping non-UTF-8 run log line");
                    let lossy = String::from_utf8_lossy(&buf);
                    result.malformed.push(MalformedLine::new(
                        line_number,
                        lossy.trim_end(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<ExperimentRun>(line) {
                Ok(run) => result.runs.push(run),
                Err(e) => {
                    warn!(error = %e, line_number, "Skipping malformed run log line");
                    result
                        .malformed
                        .push(MalformedLine::new(line_number, line, e.to_string()));
                }
            }
        }

        Ok(result)
    }
}

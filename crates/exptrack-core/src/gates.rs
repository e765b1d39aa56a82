//! External command execution for quality gates and the test command.
//!
//! Commands run through the platform shell with an explicit timeout. A
//! timeout, a non-zero exit, or a spawn failure is recorded as a failed
//! outcome and never returned as an error.

use exptrack_proto::QualityGate;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How long a timed-out command gets to exit after SIGTERM before SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Maximum stderr characters kept in a failure.
const STDERR_EXCERPT_LEN: usize = 200;

/// Why an external command did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandFailure {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("exited with {}", exit_label(*.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("failed to run: {0}")]
    Spawn(String),
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// Outcome of one command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub elapsed: Duration,
    /// `None` when the command exited 0 within its timeout.
    pub failure: Option<CommandFailure>,
}

impl CommandOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        // Own process group so a timeout can signal the whole pipeline.
        cmd.process_group(0);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Runs `command` through the shell, waiting at most `timeout`.
pub async fn run_command(command: &str, timeout: Duration) -> CommandOutcome {
    let started = Instant::now();

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %command, timeout_secs = timeout.as_secs(), "Spawning command");

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %command, error = %e, "Failed to spawn command");
            return CommandOutcome {
                elapsed: started.elapsed(),
                failure: Some(CommandFailure::Spawn(e.to_string())),
            };
        }
    };

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    // Drain both pipes concurrently so a chatty command cannot block on a
    // full pipe buffer.
    let run = async {
        let stdout_future = async {
            if let Some(mut stdout) = stdout_handle {
                tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await?;
            }
            Ok::<_, io::Error>(())
        };
        let stderr_future = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr_handle {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, io::Error>(buf)
        };

        let ((), stderr) = tokio::try_join!(stdout_future, stderr_future)?;
        let status = child.wait().await?;
        Ok::<(ExitStatus, Vec<u8>), io::Error>((status, stderr))
    };

    let result = tokio::time::timeout(timeout, run).await;
    let failure = match result {
        Ok(Ok((status, _))) if status.success() => None,
        Ok(Ok((status, stderr))) => Some(CommandFailure::NonZeroExit {
            code: status.code(),
            stderr: excerpt(&stderr),
        }),
        Ok(Err(e)) => Some(CommandFailure::Spawn(e.to_string())),
        Err(_) => {
            warn!(
                command = %command,
                timeout_secs = timeout.as_secs(),
                "Command timeout reached, sending SIGTERM"
            );
            terminate_child(&mut child).await;
            Some(CommandFailure::Timeout {
                secs: timeout.as_secs(),
            })
        }
    };

    let outcome = CommandOutcome {
        elapsed: started.elapsed(),
        failure,
    };
    debug!(
        command = %command,
        passed = outcome.passed(),
        elapsed_secs = outcome.elapsed.as_secs_f64(),
        "Command finished"
    );
    outcome
}

/// Sends SIGTERM to the child's process group, escalating to SIGKILL if it
/// does not exit within the grace period.
async fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(pid as i32);
        debug!(%pgid, "Sending SIGTERM to command process group");
        let _ = killpg(pgid, Signal::SIGTERM);
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        debug!("Command ignored SIGTERM, killing");
        let _ = child.kill().await;
    }
}

/// Result of one quality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    pub name: String,
    pub outcome: CommandOutcome,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

/// Results of a full gate run, in gate order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateReport {
    pub results: Vec<GateResult>,
}

impl GateReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    /// Fraction of gates passed; `None` when no gates ran.
    pub fn quality_score(&self) -> Option<f64> {
        if self.results.is_empty() {
            None
        } else {
            Some(self.passed_count() as f64 / self.results.len() as f64)
        }
    }
}

/// Runs every gate in order. Failures never stop later gates.
pub async fn run_gates(gates: &[QualityGate]) -> GateReport {
    let mut report = GateReport::default();

    for gate in gates {
        info!(gate = %gate.name, command = %gate.command, "Running quality gate");
        let outcome = run_command(&gate.command, Duration::from_secs(gate.timeout_seconds)).await;

        match &outcome.failure {
            None => info!(gate = %gate.name, "Quality gate passed"),
            Some(failure) => warn!(gate = %gate.name, %failure, "Quality gate failed"),
        }

        report.results.push(GateResult {
            name: gate.name.clone(),
            outcome,
        });
    }

    report
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn gate(name: &str, command: &str, timeout_seconds: u64) -> QualityGate {
        QualityGate::new(name, command, "exit 0").with_timeout(timeout_seconds)
    }

    #[tokio::test]
    async fn zero_exit_passes() {
        let outcome = run_command("true", Duration::from_secs(5)).await;
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_code_and_stderr() {
        let outcome = run_command("echo boom >&2; exit 3", Duration::from_secs(5)).await;
        assert_eq!(
            outcome.failure,
            Some(CommandFailure::NonZeroExit {
                code: Some(3),
                stderr: "boom".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn timeout_is_a_failure_not_an_error() {
        let outcome = run_command("sleep 10", Duration::from_millis(200)).await;
        assert_eq!(outcome.failure, Some(CommandFailure::Timeout { secs: 0 }));
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_program_fails_through_shell() {
        let outcome = run_command("definitely-not-a-real-binary-xyz", Duration::from_secs(5)).await;
        assert!(matches!(
            outcome.failure,
            Some(CommandFailure::NonZeroExit { code: Some(127), .. })
        ));
    }

    #[tokio::test]
    async fn gates_all_run_and_score() {
        let gates = vec![
            gate("types", "true", 5),
            gate("tests", "exit 1", 5),
            gate("style", "true", 5),
            gate("slow", "sleep 10", 1),
        ];
        let report = run_gates(&gates).await;

        let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["types", "tests", "style", "slow"]);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 2);
        assert!(!report.all_passed());
        assert_eq!(report.quality_score(), Some(0.5));
        assert_eq!(
            report.results[3].outcome.failure,
            Some(CommandFailure::Timeout { secs: 1 })
        );
    }

    #[tokio::test]
    async fn no_gates_has_no_score() {
        let report = run_gates(&[]).await;
        assert!(report.all_passed());
        assert_eq!(report.quality_score(), None);
    }

    #[test]
    fn failure_messages() {
        assert_eq!(CommandFailure::Timeout { secs: 30 }.to_string(), "timed out after 30s");
        assert_eq!(
            CommandFailure::NonZeroExit {
                code: Some(2),
                stderr: String::new()
            }
            .to_string(),
            "exited with status 2"
        );
        assert_eq!(
            CommandFailure::NonZeroExit {
                code: None,
                stderr: String::new()
            }
            .to_string(),
            "exited with a signal"
        );
    }

    #[test]
    fn stderr_excerpt_is_trimmed_and_bounded() {
        let long = format!("  {}  ", "x".repeat(500));
        let text = excerpt(long.as_bytes());
        assert_eq!(text.len(), STDERR_EXCERPT_LEN + 3);
        assert!(text.starts_with("xxx"));
    }
}

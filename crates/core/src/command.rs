//! Deadline-bounded subprocess execution with multiplexed output capture.
//!
//! Every external tool this crate touches goes through [`run_command`]. All
//! failure modes — spawn errors, timeouts, non-zero exits — are folded into
//! the returned [`CommandOutput`] so callers can treat every invocation
//! uniformly and never handle an error type at this boundary.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL when a command overruns.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Captured result of one subprocess invocation. Never mutated after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
	pub stdout_lines: Vec<String>,
	pub stderr_lines: Vec<String>,
	/// Exit code, or `-1` when the command timed out or failed to spawn.
	pub exit_code: i32,
	pub timed_out: bool,
}

impl CommandOutput {
	fn spawn_failure(err: std::io::Error) -> Self {
		Self {
			stdout_lines: Vec::new(),
			stderr_lines: vec![format!("spawn failed: {err}")],
			exit_code: -1,
			timed_out: false,
		}
	}

	pub fn stdout_text(&self) -> String {
		self.stdout_lines.join("\n")
	}

	pub fn stderr_text(&self) -> String {
		self.stderr_lines.join("\n")
	}
}

/// Runs `program` with `args`, reading both output streams until they close
/// or `timeout` elapses. On timeout the child is terminated gracefully, then
/// force-killed after [`KILL_GRACE`].
pub async fn run_command(program: &str, args: &[String], timeout: Duration) -> CommandOutput {
	debug!(target = "blewake.command", program, ?args, "running command");

	let mut cmd = Command::new(program);
	cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(cmd.as_std_mut(), 0);

	let mut child = match cmd.spawn() {
		Ok(child) => child,
		Err(err) => {
			warn!(target = "blewake.command", program, error = %err, "failed to spawn command");
			return CommandOutput::spawn_failure(err);
		}
	};

	let deadline = Instant::now() + timeout;
	let mut stdout_lines = Vec::new();
	let mut stderr_lines = Vec::new();
	let mut timed_out = false;

	// Both pipes were requested above, so take() cannot return None.
	let mut stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
	let mut stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

	while stdout.is_some() || stderr.is_some() {
		tokio::select! {
			segment = next_segment(&mut stdout) => match segment {
				Some(line) => {
					debug!(target = "blewake.command", %line, "stdout");
					stdout_lines.push(line);
				}
				None => stdout = None,
			},
			segment = next_segment(&mut stderr) => match segment {
				Some(line) => {
					debug!(target = "blewake.command", %line, "stderr");
					stderr_lines.push(line);
				}
				None => stderr = None,
			},
			_ = tokio::time::sleep_until(deadline) => {
				timed_out = true;
				break;
			}
		}
	}

	if timed_out {
		warn!(target = "blewake.command", program, "command deadline elapsed; terminating");
		terminate(&mut child).await;
		return CommandOutput {
			stdout_lines,
			stderr_lines,
			exit_code: -1,
			timed_out: true,
		};
	}

	// Streams are closed but the child may still be winding down; the wait is
	// bounded by the same deadline so the overall call stays bounded.
	let exit_code = match tokio::time::timeout_at(deadline, child.wait()).await {
		Ok(Ok(status)) => status.code().unwrap_or(-1),
		Ok(Err(err)) => {
			warn!(target = "blewake.command", program, error = %err, "failed to collect exit status");
			-1
		}
		Err(_) => {
			warn!(target = "blewake.command", program, "command closed its streams but did not exit; terminating");
			terminate(&mut child).await;
			return CommandOutput {
				stdout_lines,
				stderr_lines,
				exit_code: -1,
				timed_out: true,
			};
		}
	};

	debug!(target = "blewake.command", program, exit_code, "command finished");
	CommandOutput {
		stdout_lines,
		stderr_lines,
		exit_code,
		timed_out: false,
	}
}

type LineSplitter<R> = tokio::io::Split<BufReader<R>>;

/// Reads the next non-empty line from an optional stream, decoding lossily.
/// Resolves to `None` once the stream reports EOF or an error; a `None`
/// stream pends forever so the surrounding `select!` ignores it.
async fn next_segment<R>(stream: &mut Option<LineSplitter<R>>) -> Option<String>
where
	R: tokio::io::AsyncRead + Unpin,
{
	let Some(splitter) = stream.as_mut() else {
		return std::future::pending().await;
	};

	loop {
		match splitter.next_segment().await {
			Ok(Some(bytes)) => {
				let line = String::from_utf8_lossy(&bytes).trim_end_matches('\r').trim().to_string();
				if !line.is_empty() {
					return Some(line);
				}
			}
			Ok(None) => return None,
			Err(_) => return None,
		}
	}
}

/// Terminates `child`: graceful SIGTERM first, SIGKILL after [`KILL_GRACE`].
pub(crate) async fn terminate(child: &mut Child) {
	#[cfg(unix)]
	if let Some(pid) = child.id() {
		unsafe {
			libc::kill(pid as libc::pid_t, libc::SIGTERM);
		}
	}

	if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
		let _ = child.kill().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn captures_stdout_lines_in_order() {
		let out = run_command("sh", &["-c".into(), "echo one; echo two".into()], Duration::from_secs(5)).await;
		assert_eq!(out.stdout_lines, vec!["one", "two"]);
		assert_eq!(out.exit_code, 0);
		assert!(!out.timed_out);
	}

	#[tokio::test]
	async fn separates_stderr_and_reports_exit_code() {
		let out = run_command("sh", &["-c".into(), "echo oops 1>&2; exit 3".into()], Duration::from_secs(5)).await;
		assert!(out.stdout_lines.is_empty());
		assert_eq!(out.stderr_lines, vec!["oops"]);
		assert_eq!(out.exit_code, 3);
	}

	#[tokio::test]
	async fn timeout_terminates_and_returns_promptly() {
		let started = std::time::Instant::now();
		let out = run_command("sleep", &["30".into()], Duration::from_millis(200)).await;
		assert!(out.timed_out);
		assert_eq!(out.exit_code, -1);
		// 200ms deadline + 2s kill grace, with slack for slow machines.
		assert!(started.elapsed() < Duration::from_secs(5));
	}

	#[tokio::test]
	async fn spawn_failure_is_reported_in_result() {
		let out = run_command("/nonexistent/blewake-tool", &[], Duration::from_secs(1)).await;
		assert_eq!(out.exit_code, -1);
		assert!(!out.timed_out);
		assert!(out.stderr_text().contains("spawn failed"));
	}

	#[tokio::test]
	async fn partial_output_survives_timeout() {
		let out = run_command("sh", &["-c".into(), "echo early; sleep 30".into()], Duration::from_millis(300)).await;
		assert!(out.timed_out);
		assert_eq!(out.stdout_lines, vec!["early"]);
	}
}

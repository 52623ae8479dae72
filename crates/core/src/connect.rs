//! Connection requests and outcome classification.
//!
//! The connection utility reports success or failure only through free-text
//! markers on its output streams. Mapping that text onto a closed set of
//! outcomes is kept inside [`classify_outcome`] so the fragile matching has
//! exactly one home.

use tracing::{error, info, warn};

use crate::adapter::AdapterControl;
use crate::command::{CommandOutput, run_command};
use crate::config::ControllerConfig;

const SUCCESS_MARKER: &str = "Connection handle";
const REFUSED_MARKER: &str = "Could not create connection";
const TIMEOUT_MARKER: &str = "Connection timed out";

/// Classified result of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
	/// The tool reported a connection handle; carries the handle token.
	Success(String),
	/// The tool refused to create the connection.
	Refused(String),
	/// The attempt timed out, either in the tool or at the command deadline.
	TimedOut,
	/// None of the known markers matched; carries the raw output for triage.
	Unknown(String),
}

impl ConnectionOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, ConnectionOutcome::Success(_))
	}
}

/// Maps raw connection-utility output onto a [`ConnectionOutcome`].
pub(crate) fn classify_outcome(output: &CommandOutput) -> ConnectionOutcome {
	if let Some(line) = output.stdout_lines.iter().find(|l| l.contains(SUCCESS_MARKER)) {
		let token = line.split_once(SUCCESS_MARKER).map(|(_, rest)| rest.trim()).unwrap_or_default();
		let token = if token.is_empty() { line.trim() } else { token };
		return ConnectionOutcome::Success(token.to_string());
	}

	let stderr = output.stderr_text();
	if stderr.contains(REFUSED_MARKER) {
		return ConnectionOutcome::Refused(stderr.trim().to_string());
	}
	if stderr.contains(TIMEOUT_MARKER) || output.timed_out {
		return ConnectionOutcome::TimedOut;
	}

	ConnectionOutcome::Unknown(format!(
		"exit_code={} stdout={:?} stderr={:?}",
		output.exit_code, output.stdout_lines, output.stderr_lines
	))
}

/// Issues bounded connection requests against a resolved address.
pub struct ConnectEngine<'a> {
	cfg: &'a ControllerConfig,
	control: &'a AdapterControl,
}

impl<'a> ConnectEngine<'a> {
	pub fn new(cfg: &'a ControllerConfig, control: &'a AdapterControl) -> Self {
		Self { cfg, control }
	}

	/// One connection attempt: sweep stray processes, reset the adapter,
	/// request a low-energy connection, classify the textual result.
	pub async fn connect(&self, address: &str) -> ConnectionOutcome {
		if address.is_empty() {
			error!(target = "blewake.connect", "refusing connection attempt without an address");
			return ConnectionOutcome::Refused("invalid address".to_string());
		}

		self.control.kill_stray_tools().await;
		tokio::time::sleep(self.cfg.settle_delay).await;
		self.control.reset().await;

		let adapter = self.control.adapter_id();
		info!(target = "blewake.connect", adapter, %address, "requesting connection");
		let (program, args) = self.cfg.tools.privileged(&self.cfg.tools.hcitool, &["-i", adapter, "lecc", "--random", address]);
		let output = run_command(&program, &args, self.cfg.connect_timeout).await;

		let outcome = classify_outcome(&output);
		match &outcome {
			ConnectionOutcome::Success(token) => info!(target = "blewake.connect", %address, token = %token, "connection established"),
			ConnectionOutcome::Refused(reason) => error!(target = "blewake.connect", %address, reason = %reason, "connection refused"),
			ConnectionOutcome::TimedOut => error!(target = "blewake.connect", %address, "connection timed out"),
			ConnectionOutcome::Unknown(raw) => warn!(target = "blewake.connect", %address, raw = %raw, "unclassified connection result"),
		}
		outcome
	}
}

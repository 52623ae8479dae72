//! Controller configuration and external tool wiring.

use std::path::PathBuf;
use std::time::Duration;

/// Names of the external Bluetooth utilities and how to invoke them.
///
/// Tool names are plain strings resolved through `PATH`, so tests can point
/// them at stub scripts by using absolute paths.
#[derive(Debug, Clone)]
pub struct ToolConfig {
	/// Adapter status/control utility (`hciconfig`).
	pub hciconfig: String,
	/// Discovery and connection utility (`hcitool`).
	pub hcitool: String,
	/// Stray-process sweeper (`pkill`).
	pub pkill: String,
	/// Prefix control commands with `sudo`. Status reads never use it.
	pub sudo: bool,
}

impl Default for ToolConfig {
	fn default() -> Self {
		Self {
			hciconfig: "hciconfig".to_string(),
			hcitool: "hcitool".to_string(),
			pkill: "pkill".to_string(),
			sudo: true,
		}
	}
}

impl ToolConfig {
	/// Builds a privileged invocation, prefixing `sudo` when enabled.
	pub(crate) fn privileged(&self, program: &str, args: &[&str]) -> (String, Vec<String>) {
		if self.sudo {
			let mut full = Vec::with_capacity(args.len() + 1);
			full.push(program.to_string());
			full.extend(args.iter().map(|a| a.to_string()));
			("sudo".to_string(), full)
		} else {
			self.unprivileged(program, args)
		}
	}

	/// Builds a plain invocation for read-only queries.
	pub(crate) fn unprivileged(&self, program: &str, args: &[&str]) -> (String, Vec<String>) {
		(program.to_string(), args.iter().map(|a| a.to_string()).collect())
	}
}

/// Tunables for one controller. The timing values mirror what the adapters
/// in the field needed; they are defaults, not contracts.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
	/// Advertised name of the target peripheral, matched as a substring.
	pub target_name: String,
	/// Adapter id override (e.g. `hci0`); autodetected when `None`.
	pub adapter: Option<String>,
	/// Retry ceiling for readiness, scan, and connect operations.
	pub max_attempts: u32,
	/// Full discovery window per scan attempt.
	pub scan_timeout: Duration,
	/// Deadline for one connection request.
	pub connect_timeout: Duration,
	/// How long to wait for the per-adapter lock before proceeding without it.
	pub lock_wait: Duration,
	/// Pause after adapter control commands while the radio settles.
	pub settle_delay: Duration,
	/// Directory holding the per-adapter lock files.
	pub lock_dir: PathBuf,
	pub tools: ToolConfig,
}

impl ControllerConfig {
	pub fn new(target_name: impl Into<String>) -> Self {
		Self {
			target_name: target_name.into(),
			adapter: None,
			max_attempts: 3,
			scan_timeout: Duration::from_secs(30),
			connect_timeout: Duration::from_secs(35),
			lock_wait: Duration::from_secs(30),
			settle_delay: Duration::from_secs(2),
			lock_dir: PathBuf::from("/tmp"),
			tools: ToolConfig::default(),
		}
	}

	pub fn with_adapter(mut self, adapter: Option<String>) -> Self {
		self.adapter = adapter;
		self
	}

	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts.max(1);
		self
	}

	pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
		self.scan_timeout = timeout;
		self
	}

	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;
		self
	}

	pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.lock_dir = dir.into();
		self
	}
}

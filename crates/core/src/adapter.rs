//! Adapter enumeration, selection, and state control.
//!
//! The status utility exposes adapters as text blocks, one per device, each
//! introduced by an `hciX:` header carrying the bus type and followed by
//! indented state lines. Parsing of that fragile format is centralized here.

use std::time::Duration;

use tracing::{info, warn};

use crate::command::run_command;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};

/// Deadline for status and control commands against the adapter.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the stray-process sweep.
const SWEEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Marker on a device header line identifying a USB-attached adapter.
const USB_MARKER: &str = "Bus: USB";

/// Marker in a device block identifying an activated adapter.
const RUNNING_MARKER: &str = "UP RUNNING";

/// One Bluetooth adapter as reported by the status utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterHandle {
	pub id: String,
	pub is_usb: bool,
	pub is_running: bool,
}

/// Parses status-utility output into adapter handles.
pub(crate) fn parse_status_blocks(lines: &[String]) -> Vec<AdapterHandle> {
	let mut adapters: Vec<AdapterHandle> = Vec::new();

	for line in lines {
		let starts_block = line.starts_with("hci") && line.contains(':');
		if starts_block {
			let id = line.split(':').next().unwrap_or_default().trim().to_string();
			adapters.push(AdapterHandle {
				id,
				is_usb: line.contains(USB_MARKER),
				is_running: false,
			});
		} else if line.contains(RUNNING_MARKER) {
			if let Some(current) = adapters.last_mut() {
				current.is_running = true;
			}
		}
	}

	adapters
}

/// Picks the adapter to use: a running USB adapter when one exists, else the
/// first USB adapter found. Virtual adapters are never selected.
pub(crate) fn select_adapter(adapters: &[AdapterHandle]) -> Option<&AdapterHandle> {
	let usb: Vec<&AdapterHandle> = adapters.iter().filter(|a| a.is_usb).collect();
	usb.iter().find(|a| a.is_running).copied().or_else(|| usb.first().copied())
}

/// Enumerates adapters and resolves the one this controller will drive.
///
/// A configured override must still be visible to the OS; zero USB adapters
/// without an override is unrecoverable — no retry can materialize a dongle.
pub async fn resolve(cfg: &ControllerConfig) -> Result<AdapterHandle> {
	let (program, args) = cfg.tools.unprivileged(&cfg.tools.hciconfig, &[]);
	let output = run_command(&program, &args, CONTROL_TIMEOUT).await;

	if output.timed_out || output.exit_code != 0 {
		return Err(Error::AdapterUnavailable(format!(
			"adapter status query failed (exit {}): {}",
			output.exit_code,
			output.stderr_text()
		)));
	}

	let adapters = parse_status_blocks(&output.stdout_lines);

	if let Some(wanted) = &cfg.adapter {
		return adapters
			.iter()
			.find(|a| &a.id == wanted)
			.cloned()
			.ok_or_else(|| Error::AdapterUnavailable(format!("requested adapter {wanted} not present")));
	}

	select_adapter(&adapters)
		.cloned()
		.ok_or_else(|| Error::AdapterUnavailable("no USB adapter found".to_string()))
}

/// Issues state-control commands against one resolved adapter.
#[derive(Debug, Clone)]
pub struct AdapterControl {
	cfg: ControllerConfig,
	id: String,
}

impl AdapterControl {
	pub fn new(cfg: &ControllerConfig, adapter_id: &str) -> Self {
		Self {
			cfg: cfg.clone(),
			id: adapter_id.to_string(),
		}
	}

	pub fn adapter_id(&self) -> &str {
		&self.id
	}

	/// Re-reads adapter state from the OS; never trusts cached state.
	pub async fn is_ready(&self) -> bool {
		let (program, args) = self.cfg.tools.unprivileged(&self.cfg.tools.hciconfig, &[&self.id]);
		let output = run_command(&program, &args, CONTROL_TIMEOUT).await;
		output.stdout_text().contains(RUNNING_MARKER)
	}

	/// Ensures the adapter is up and running, activating it when necessary.
	pub async fn ensure_ready(&self) -> bool {
		if self.is_ready().await {
			info!(target = "blewake.adapter", adapter = %self.id, "adapter already running");
			return true;
		}

		warn!(target = "blewake.adapter", adapter = %self.id, "adapter down; activating");
		self.control("up").await;
		tokio::time::sleep(self.cfg.settle_delay).await;

		let ready = self.is_ready().await;
		if ready {
			info!(target = "blewake.adapter", adapter = %self.id, "adapter activated");
		} else {
			warn!(target = "blewake.adapter", adapter = %self.id, "adapter still down after activation");
		}
		ready
	}

	/// Full down/reset/up cycle, verifying the running state afterwards.
	/// Clears scan and connection residue that a plain reset leaves behind.
	pub async fn reset_cycle(&self) -> bool {
		self.control("down").await;
		tokio::time::sleep(self.cfg.settle_delay).await;
		self.control("reset").await;
		tokio::time::sleep(self.cfg.settle_delay).await;
		self.control("up").await;
		tokio::time::sleep(self.cfg.settle_delay).await;

		let ready = self.is_ready().await;
		if ready {
			info!(target = "blewake.adapter", adapter = %self.id, "adapter reset complete");
		} else {
			warn!(target = "blewake.adapter", adapter = %self.id, "adapter not running after reset");
		}
		ready
	}

	/// Single reset command with a settle pause, used before connecting.
	pub async fn reset(&self) {
		self.control("reset").await;
		tokio::time::sleep(self.cfg.settle_delay).await;
	}

	/// Kills stray discovery/connection processes left by earlier runs. The
	/// sweeper exits non-zero when nothing matched, so the result is ignored.
	pub async fn kill_stray_tools(&self) {
		let (program, args) = self.cfg.tools.privileged(&self.cfg.tools.pkill, &["-f", &self.cfg.tools.hcitool]);
		let _ = run_command(&program, &args, SWEEP_TIMEOUT).await;
	}

	async fn control(&self, action: &str) {
		let (program, args) = self.cfg.tools.privileged(&self.cfg.tools.hciconfig, &[&self.id, action]);
		let output = run_command(&program, &args, CONTROL_TIMEOUT).await;
		if output.exit_code != 0 {
			warn!(
				target = "blewake.adapter",
				adapter = %self.id,
				action,
				exit_code = output.exit_code,
				stderr = %output.stderr_text(),
				"adapter control command failed"
			);
		}
	}
}

//! Peripheral discovery and address resolution.
//!
//! Discovery runs as a continuous external process whose stdout is a stream
//! of `<address> <name>` lines, noisy and full of duplicates. The stream is
//! consumed incrementally and checked on a short poll interval so a match
//! ends the scan immediately; if the window closes without one, the winner
//! is resolved by frequency voting over everything observed.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::AdapterControl;
use crate::command;
use crate::config::ControllerConfig;

/// How often accumulated discovery output is checked for the target.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Six colon-separated two-hex-digit groups, then free-text name data.
static DISCOVERY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^((?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}) (.+)$").expect("valid discovery pattern"));

/// Splits one discovery line into `(address, name)`.
pub(crate) fn parse_discovery_line(line: &str) -> Option<(String, String)> {
	let captures = DISCOVERY_LINE.captures(line)?;
	Some((captures[1].to_string(), captures[2].to_string()))
}

/// First sighting whose name contains `target`.
fn find_target(sightings: &[(String, String)], target: &str) -> Option<String> {
	sightings.iter().find(|(_, name)| name.contains(target)).map(|(addr, _)| addr.clone())
}

/// Resolves the winning address among sightings matching `target`: highest
/// occurrence count wins, ties go to the address seen first. Occurrence
/// count is the only signal-quality proxy the discovery output offers.
pub(crate) fn resolve_by_frequency(sightings: &[(String, String)], target: &str) -> Option<String> {
	let mut counts: Vec<(&str, usize)> = Vec::new();
	for (addr, name) in sightings {
		if !name.contains(target) {
			continue;
		}
		match counts.iter_mut().find(|(a, _)| *a == addr.as_str()) {
			Some(entry) => entry.1 += 1,
			None => counts.push((addr, 1)),
		}
	}

	// Strictly-greater comparison keeps the first-seen address on ties.
	let mut best: Option<(&str, usize)> = None;
	for (addr, count) in counts {
		if best.map_or(true, |(_, best_count)| count > best_count) {
			best = Some((addr, count));
		}
	}
	best.map(|(addr, _)| addr.to_string())
}

/// Drives one discovery pass against the adapter.
pub struct ScanEngine<'a> {
	cfg: &'a ControllerConfig,
	control: &'a AdapterControl,
}

impl<'a> ScanEngine<'a> {
	pub fn new(cfg: &'a ControllerConfig, control: &'a AdapterControl) -> Self {
		Self { cfg, control }
	}

	/// Scans for a peripheral advertising `target` and returns its address,
	/// or `None` when the window closes without a sighting. The discovery
	/// subprocess is terminated before returning on every branch.
	pub async fn scan(&self, target: &str) -> Option<String> {
		self.control.kill_stray_tools().await;
		tokio::time::sleep(self.cfg.settle_delay).await;

		if !self.control.reset_cycle().await {
			warn!(target = "blewake.scan", "adapter reset failed before scan; scanning anyway");
		}

		let adapter = self.control.adapter_id();
		let (program, args) = self.cfg.tools.privileged(&self.cfg.tools.hcitool, &["-i", adapter, "lescan", "--duplicates"]);

		let mut cmd = Command::new(&program);
		cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
		#[cfg(unix)]
		std::os::unix::process::CommandExt::process_group(cmd.as_std_mut(), 0);

		let mut child = match cmd.spawn() {
			Ok(child) => child,
			Err(err) => {
				warn!(target = "blewake.scan", error = %err, "failed to start discovery");
				return None;
			}
		};

		let Some(stdout) = child.stdout.take() else {
			command::terminate(&mut child).await;
			return None;
		};
		let mut reader = BufReader::new(stdout).split(b'\n');

		info!(target = "blewake.scan", adapter, peripheral = %target, "discovery started");
		let deadline = Instant::now() + self.cfg.scan_timeout;
		let mut poll = tokio::time::interval(POLL_INTERVAL);
		let mut sightings: Vec<(String, String)> = Vec::new();
		let mut checked = 0;
		let mut early_match = None;

		loop {
			tokio::select! {
				segment = reader.next_segment() => match segment {
					Ok(Some(bytes)) => {
						let line = String::from_utf8_lossy(&bytes).trim().to_string();
						if let Some(sighting) = parse_discovery_line(&line) {
							debug!(target = "blewake.scan", address = %sighting.0, name = %sighting.1, "sighting");
							sightings.push(sighting);
						}
					}
					// Discovery ended on its own; fall through to the final pass.
					_ => break,
				},
				_ = poll.tick() => {
					if let Some(address) = find_target(&sightings[checked..], target) {
						early_match = Some(address);
						break;
					}
					checked = sightings.len();
				}
				_ = tokio::time::sleep_until(deadline) => break,
			}
		}

		command::terminate(&mut child).await;

		if let Some(address) = early_match {
			info!(target = "blewake.scan", peripheral = %target, %address, "target found; scan stopped early");
			return Some(address);
		}

		match resolve_by_frequency(&sightings, target) {
			Some(address) => {
				info!(target = "blewake.scan", peripheral = %target, %address, sightings = sightings.len(), "target resolved after full window");
				Some(address)
			}
			None => {
				warn!(target = "blewake.scan", peripheral = %target, sightings = sightings.len(), "target not seen within scan window");
				None
			}
		}
	}
}

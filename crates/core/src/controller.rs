//! Orchestration of one full ready → lock → scan → connect flow.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapter::{self, AdapterControl, AdapterHandle};
use crate::config::ControllerConfig;
use crate::connect::ConnectEngine;
use crate::error::{Error, Result};
use crate::lock::{self, AdapterLock};
use crate::retry::retry;
use crate::scan::ScanEngine;

/// Snapshot of one controller run. Always produced, never an error, so
/// callers can treat the whole flow as a boolean-producing step.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
	pub success: bool,
	pub resolved_address: Option<String>,
	pub adapter_id: String,
}

/// Drives a USB BLE adapter through discovery and connection against one
/// named peripheral.
///
/// Construction resolves the adapter and guarantees it is running; both are
/// fatal when they fail, since nothing downstream can work without a live
/// adapter. [`Controller::run`] itself never fails — every non-fatal problem
/// is absorbed by retries and reflected in the returned [`RunReport`].
pub struct Controller {
	cfg: ControllerConfig,
	adapter: AdapterHandle,
	control: AdapterControl,
	report: RunReport,
}

impl Controller {
	/// Resolves the adapter and ensures it is up, activating it (with
	/// retries) when necessary.
	pub async fn new(cfg: ControllerConfig) -> Result<Self> {
		let adapter = adapter::resolve(&cfg).await?;
		info!(target = "blewake.controller", adapter = %adapter.id, usb = adapter.is_usb, running = adapter.is_running, "using adapter");

		let control = AdapterControl::new(&cfg, &adapter.id);
		let ready = retry("ensure adapter ready", cfg.max_attempts, || async { Ok(control.ensure_ready().await.then_some(())) })
			.await
			.is_some();
		if !ready {
			return Err(Error::AdapterUnavailable(format!("adapter {} could not be activated", adapter.id)));
		}

		let report = RunReport {
			success: false,
			resolved_address: None,
			adapter_id: adapter.id.clone(),
		};
		Ok(Self {
			cfg,
			adapter,
			control,
			report,
		})
	}

	pub fn adapter(&self) -> &AdapterHandle {
		&self.adapter
	}

	/// Result snapshot of the most recent [`Controller::run`].
	pub fn last_report(&self) -> &RunReport {
		&self.report
	}

	/// Runs the full flow: lock → scan → connect → unlock. The lock is
	/// released on every exit path; a lock that could not be acquired only
	/// downgrades exclusivity, never the run itself.
	pub async fn run(&mut self) -> RunReport {
		info!(target = "blewake.controller", peripheral = %self.cfg.target_name, "=== starting BLE connection flow ===");
		self.report = RunReport {
			success: false,
			resolved_address: None,
			adapter_id: self.adapter.id.clone(),
		};

		let mut held_lock = lock::acquire(&self.adapter.id, &self.cfg.lock_dir, self.cfg.lock_wait).await;
		if held_lock.is_none() {
			warn!(target = "blewake.controller", adapter = %self.adapter.id, "proceeding without adapter lock; concurrent runs possible");
		}

		let scan_engine = ScanEngine::new(&self.cfg, &self.control);
		let peripheral = self.cfg.target_name.clone();
		let address = retry("scan for peripheral", self.cfg.max_attempts, || {
			let engine = &scan_engine;
			let peripheral = peripheral.clone();
			async move { Ok(engine.scan(&peripheral).await) }
		})
		.await;

		let Some(address) = address else {
			error!(target = "blewake.controller", peripheral = %self.cfg.target_name, "no address resolved; skipping connection");
			Self::release_lock(&mut held_lock);
			info!(target = "blewake.controller", success = false, "=== BLE connection flow finished ===");
			return self.report.clone();
		};
		self.report.resolved_address = Some(address.clone());

		let connect_engine = ConnectEngine::new(&self.cfg, &self.control);
		let connected = retry("connect to peripheral", self.cfg.max_attempts, || {
			let engine = &connect_engine;
			let address = address.clone();
			async move { Ok(engine.connect(&address).await.is_success().then_some(())) }
		})
		.await
		.is_some();

		self.report.success = connected;
		Self::release_lock(&mut held_lock);
		info!(target = "blewake.controller", success = connected, "=== BLE connection flow finished ===");
		self.report.clone()
	}

	fn release_lock(held: &mut Option<AdapterLock>) {
		match held.take() {
			Some(held) => held.release(),
			None => info!(target = "blewake.lock", "no lock to release"),
		}
	}
}

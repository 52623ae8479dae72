use std::path::PathBuf;
use std::time::Duration;

use blewake::{ControllerConfig, ToolConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "blewake")]
#[command(about = "Connect to a named BLE peripheral through a USB adapter")]
#[command(version)]
pub struct Cli {
	/// Advertised name of the target peripheral (substring match)
	pub name: String,

	/// Adapter to use (e.g. hci0); autodetected when omitted
	#[arg(short, long)]
	pub adapter: Option<String>,

	/// Retry attempts for scan and connect operations
	#[arg(long, default_value = "3")]
	pub attempts: u32,

	/// Discovery window per scan attempt (seconds)
	#[arg(long, default_value = "30")]
	pub scan_timeout: u64,

	/// Deadline for one connection request (seconds)
	#[arg(long, default_value = "35")]
	pub connect_timeout: u64,

	/// Directory for the per-adapter lock file
	#[arg(long, default_value = "/tmp")]
	pub lock_dir: PathBuf,

	/// Invoke the Bluetooth tools without sudo
	#[arg(long)]
	pub no_sudo: bool,

	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

impl Cli {
	pub fn to_config(&self) -> ControllerConfig {
		let mut cfg = ControllerConfig::new(self.name.clone())
			.with_adapter(self.adapter.clone())
			.with_max_attempts(self.attempts)
			.with_scan_timeout(Duration::from_secs(self.scan_timeout))
			.with_connect_timeout(Duration::from_secs(self.connect_timeout))
			.with_lock_dir(self.lock_dir.clone());
		cfg.tools = ToolConfig {
			sudo: !self.no_sudo,
			..ToolConfig::default()
		};
		cfg
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_minimal_invocation_uses_defaults() {
		let cli = Cli::try_parse_from(["blewake", "0848 LE"]).unwrap();
		assert_eq!(cli.name, "0848 LE");
		assert_eq!(cli.attempts, 3);
		assert_eq!(cli.scan_timeout, 30);
		assert_eq!(cli.connect_timeout, 35);
		assert_eq!(cli.lock_dir, PathBuf::from("/tmp"));
		assert!(cli.adapter.is_none());
		assert!(!cli.no_sudo);
	}

	#[test]
	fn parse_full_invocation() {
		let cli = Cli::try_parse_from([
			"blewake",
			"0848 LE",
			"--adapter",
			"hci1",
			"--attempts",
			"5",
			"--scan-timeout",
			"10",
			"--lock-dir",
			"/var/lock",
			"--no-sudo",
			"-vv",
		])
		.unwrap();
		assert_eq!(cli.adapter.as_deref(), Some("hci1"));
		assert_eq!(cli.attempts, 5);
		assert_eq!(cli.verbose, 2);
		assert!(cli.no_sudo);
	}

	#[test]
	fn config_carries_flags_through() {
		let cli = Cli::try_parse_from(["blewake", "0848 LE", "--attempts", "5", "--no-sudo"]).unwrap();
		let cfg = cli.to_config();
		assert_eq!(cfg.target_name, "0848 LE");
		assert_eq!(cfg.max_attempts, 5);
		assert!(!cfg.tools.sudo);
		assert_eq!(cfg.scan_timeout, Duration::from_secs(30));
	}

	#[test]
	fn missing_name_fails_to_parse() {
		assert!(Cli::try_parse_from(["blewake"]).is_err());
	}
}

//! End-to-end controller runs against stub Bluetooth tools.
//!
//! The external utilities are replaced by shell scripts in a temp dir, so
//! these tests exercise real subprocess spawning, stream capture, lock
//! files, and cleanup without any Bluetooth hardware.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use blewake::{Controller, ControllerConfig, Error, ToolConfig};
use tempfile::TempDir;

const HCICONFIG_USB_UP: &str = r#"#!/bin/sh
if [ "$#" -eq 0 ]; then
	printf 'hci0:\tType: Primary  Bus: USB\n'
	printf '\tBD Address: 00:1A:7D:DA:71:13  ACL MTU: 310:10  SCO MTU: 64:8\n'
	printf '\tUP RUNNING PSCAN\n'
	exit 0
fi
case "$2" in
up|down|reset) exit 0 ;;
*) printf 'hci0:\tType: Primary  Bus: USB\n\tUP RUNNING PSCAN\n' ;;
esac
"#;

const HCICONFIG_NO_USB: &str = r#"#!/bin/sh
printf 'hci0:\tType: Primary  Bus: UART\n'
printf '\tUP RUNNING PSCAN\n'
"#;

const PKILL_NOOP: &str = "#!/bin/sh\nexit 0\n";

fn write_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
	let path = dir.join(name);
	fs::write(&path, script).expect("tool script written");
	fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("tool script executable");
	path
}

fn config(dir: &Path, hciconfig: &str, hcitool: &str) -> ControllerConfig {
	let hciconfig = write_tool(dir, "hciconfig", hciconfig);
	let hcitool = write_tool(dir, "hcitool", hcitool);
	let pkill = write_tool(dir, "pkill", PKILL_NOOP);

	let mut cfg = ControllerConfig::new("0848 LE")
		.with_max_attempts(1)
		.with_scan_timeout(Duration::from_secs(5))
		.with_connect_timeout(Duration::from_secs(5))
		.with_lock_dir(dir);
	cfg.settle_delay = Duration::ZERO;
	cfg.lock_wait = Duration::from_millis(200);
	cfg.tools = ToolConfig {
		hciconfig: hciconfig.display().to_string(),
		hcitool: hcitool.display().to_string(),
		pkill: pkill.display().to_string(),
		sudo: false,
	};
	cfg
}

fn lock_file(dir: &Path) -> PathBuf {
	dir.join(".ble_lock_hci0")
}

#[tokio::test]
async fn full_flow_connects_and_cleans_up_lock() {
	let dir = TempDir::new().unwrap();
	let hcitool = r#"#!/bin/sh
if [ "$3" = "lescan" ]; then
	echo 'LE Scan ...'
	echo 'AA:BB:CC:DD:EE:FF 0848 LE'
	echo 'AA:BB:CC:DD:EE:FF 0848 LE'
	sleep 30
fi
if [ "$3" = "lecc" ]; then
	echo 'Connection handle 64'
fi
"#;
	let cfg = config(dir.path(), HCICONFIG_USB_UP, hcitool);

	let started = std::time::Instant::now();
	let mut controller = Controller::new(cfg).await.expect("adapter should resolve");
	let report = controller.run().await;

	assert!(report.success);
	assert_eq!(report.resolved_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
	assert_eq!(report.adapter_id, "hci0");
	assert!(!lock_file(dir.path()).exists(), "lock file should be cleaned up");
	// Early exit: the scan must not wait out the stub's 30s sleep.
	assert!(started.elapsed() < Duration::from_secs(15));
	assert!(controller.last_report().success);
}

#[tokio::test]
async fn refused_connection_is_retried_then_reported_as_failure() {
	let dir = TempDir::new().unwrap();
	let attempts_log = dir.path().join("lecc_attempts");
	let hcitool = format!(
		r#"#!/bin/sh
if [ "$3" = "lescan" ]; then
	echo 'AA:BB:CC:DD:EE:FF 0848 LE'
	sleep 30
fi
if [ "$3" = "lecc" ]; then
	echo x >> {log}
	echo 'Could not create connection: Input/output error' 1>&2
	exit 1
fi
"#,
		log = attempts_log.display()
	);
	let mut cfg = config(dir.path(), HCICONFIG_USB_UP, &hcitool);
	cfg.max_attempts = 2;

	let mut controller = Controller::new(cfg).await.expect("adapter should resolve");
	let report = controller.run().await;

	assert!(!report.success);
	assert_eq!(report.resolved_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
	assert!(!lock_file(dir.path()).exists(), "lock file should be cleaned up on failure too");

	let attempts = fs::read_to_string(&attempts_log).unwrap();
	assert_eq!(attempts.lines().count(), 2, "connect should be retried up to max_attempts");
}

#[tokio::test]
async fn scan_miss_skips_connection_entirely() {
	let dir = TempDir::new().unwrap();
	let lecc_marker = dir.path().join("lecc_was_called");
	let hcitool = format!(
		r#"#!/bin/sh
if [ "$3" = "lescan" ]; then
	echo '11:22:33:44:55:66 some other device'
fi
if [ "$3" = "lecc" ]; then
	touch {marker}
fi
"#,
		marker = lecc_marker.display()
	);
	let cfg = config(dir.path(), HCICONFIG_USB_UP, &hcitool);

	let mut controller = Controller::new(cfg).await.expect("adapter should resolve");
	let report = controller.run().await;

	assert!(!report.success);
	assert_eq!(report.resolved_address, None);
	assert!(!lecc_marker.exists(), "connect must not run without a resolved address");
	assert!(!lock_file(dir.path()).exists());
}

#[tokio::test]
async fn down_adapter_is_activated_during_init() {
	let dir = TempDir::new().unwrap();
	let marker = dir.path().join("adapter_up");
	let hciconfig = format!(
		r#"#!/bin/sh
if [ "$#" -eq 0 ]; then
	printf 'hci0:\tType: Primary  Bus: USB\n'
	printf '\tDOWN\n'
	exit 0
fi
case "$2" in
up) touch {marker}; exit 0 ;;
down|reset) exit 0 ;;
*)
	if [ -e {marker} ]; then
		printf 'hci0:\tType: Primary  Bus: USB\n\tUP RUNNING PSCAN\n'
	else
		printf 'hci0:\tType: Primary  Bus: USB\n\tDOWN\n'
	fi
	;;
esac
"#,
		marker = marker.display()
	);
	let cfg = config(dir.path(), &hciconfig, "#!/bin/sh\n");

	let controller = Controller::new(cfg).await.expect("down adapter should be activated");
	assert!(marker.exists(), "an up command should have been issued");
	assert_eq!(controller.adapter().id, "hci0");
}

#[tokio::test]
async fn unactivatable_adapter_is_fatal() {
	let dir = TempDir::new().unwrap();
	let hciconfig = r#"#!/bin/sh
if [ "$#" -eq 0 ]; then
	printf 'hci0:\tType: Primary  Bus: USB\n'
	printf '\tDOWN\n'
	exit 0
fi
case "$2" in
up|down|reset) exit 0 ;;
*) printf 'hci0:\tType: Primary  Bus: USB\n\tDOWN\n' ;;
esac
"#;
	let cfg = config(dir.path(), hciconfig, "#!/bin/sh\n");

	match Controller::new(cfg).await.err() {
		Some(Error::AdapterUnavailable(reason)) => assert!(reason.contains("could not be activated")),
		other => panic!("expected AdapterUnavailable, got {other:?}"),
	}
}

#[tokio::test]
async fn missing_usb_adapter_is_fatal() {
	let dir = TempDir::new().unwrap();
	let cfg = config(dir.path(), HCICONFIG_NO_USB, "#!/bin/sh\n");

	match Controller::new(cfg).await.err() {
		Some(Error::AdapterUnavailable(reason)) => assert!(reason.contains("no USB adapter")),
		other => panic!("expected AdapterUnavailable, got {other:?}"),
	}
}

#[tokio::test]
async fn contended_lock_downgrades_but_does_not_fail_the_run() {
	let dir = TempDir::new().unwrap();
	let hcitool = r#"#!/bin/sh
if [ "$3" = "lescan" ]; then
	echo 'AA:BB:CC:DD:EE:FF 0848 LE'
	sleep 30
fi
if [ "$3" = "lecc" ]; then
	echo 'Connection handle 64'
fi
"#;
	let cfg = config(dir.path(), HCICONFIG_USB_UP, hcitool);

	// Hold the adapter lock for the whole run, as a sibling process would.
	let external = blewake::lock::acquire("hci0", dir.path(), Duration::from_secs(1)).await.expect("external lock");

	let mut controller = Controller::new(cfg).await.expect("adapter should resolve");
	let report = controller.run().await;

	assert!(report.success, "missing exclusivity must not fail the run");
	assert!(lock_file(dir.path()).exists(), "the external holder's lock file must be left alone");
	external.release();
}

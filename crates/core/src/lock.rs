//! Per-adapter advisory locking across processes.
//!
//! A single physical adapter may be fought over by several independent test
//! processes. The lock is a `flock`-ed file at `<dir>/.ble_lock_<adapter>`
//! holding the owner's pid (diagnostic only). Acquisition fails soft: after
//! the wait ceiling the caller proceeds without exclusivity rather than
//! blocking the whole flow on a possibly stale holder.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Poll interval while another process holds the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock file path for `adapter_id` under `dir`.
pub fn lock_path(dir: &Path, adapter_id: &str) -> PathBuf {
	dir.join(format!(".ble_lock_{adapter_id}"))
}

/// A held exclusive lock on one adapter. Released explicitly via
/// [`AdapterLock::release`]; dropping a still-held lock releases it too, so
/// no exit path can leak one.
#[derive(Debug)]
pub struct AdapterLock {
	path: PathBuf,
	file: Option<std::fs::File>,
}

impl AdapterLock {
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Releases the OS lock, closes the descriptor, and best-effort deletes
	/// the lock file.
	pub fn release(mut self) {
		self.unlock();
	}

	fn unlock(&mut self) {
		let Some(file) = self.file.take() else {
			return;
		};

		unsafe {
			libc::flock(file.as_raw_fd(), libc::LOCK_UN);
		}
		drop(file);

		match std::fs::remove_file(&self.path) {
			Ok(()) => {}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
			Err(err) => warn!(target = "blewake.lock", path = %self.path.display(), error = %err, "failed to delete lock file"),
		}
		info!(target = "blewake.lock", path = %self.path.display(), "lock released");
	}
}

impl Drop for AdapterLock {
	fn drop(&mut self) {
		self.unlock();
	}
}

/// Attempts to take the exclusive lock for `adapter_id`, polling for up to
/// `max_wait` when another process holds it. Returns `None` on timeout or
/// error — lack of exclusivity must never block the flow.
pub async fn acquire(adapter_id: &str, lock_dir: &Path, max_wait: Duration) -> Option<AdapterLock> {
	let path = lock_path(lock_dir, adapter_id);

	let mut file = match OpenOptions::new().read(true).write(true).create(true).mode(0o644).open(&path) {
		Ok(file) => file,
		Err(err) => {
			warn!(target = "blewake.lock", path = %path.display(), error = %err, "could not open lock file");
			return None;
		}
	};

	if try_flock(&file) {
		write_owner_pid(&mut file);
		info!(target = "blewake.lock", path = %path.display(), "lock acquired");
		return Some(AdapterLock { path, file: Some(file) });
	}

	info!(target = "blewake.lock", path = %path.display(), "lock held by another process; waiting");
	let deadline = Instant::now() + max_wait;
	while Instant::now() < deadline {
		tokio::time::sleep(POLL_INTERVAL).await;
		if try_flock(&file) {
			write_owner_pid(&mut file);
			info!(target = "blewake.lock", path = %path.display(), "lock acquired after wait");
			return Some(AdapterLock { path, file: Some(file) });
		}
	}

	warn!(
		target = "blewake.lock",
		path = %path.display(),
		wait_secs = max_wait.as_secs(),
		"lock wait ceiling reached; continuing without exclusivity"
	);
	None
}

fn try_flock(file: &std::fs::File) -> bool {
	unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

/// Records the holder's pid in the lock file so a stuck lock can be traced
/// back to its process. Failures here do not affect the lock itself.
fn write_owner_pid(file: &mut std::fs::File) {
	let _ = file.set_len(0);
	let _ = file.seek(SeekFrom::Start(0));
	let _ = write!(file, "{}", std::process::id());
	let _ = file.flush();
}

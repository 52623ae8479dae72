//! Bounded retry with exponential backoff.
//!
//! Higher-level operations (readiness, scan, connect) all funnel through
//! [`retry`], which absorbs their individual failure shapes: an `Err` is
//! logged and counted as a failed attempt, never propagated, so retry policy
//! stays decoupled from operation-specific errors.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::Result;

/// Backoff ceiling in seconds.
const MAX_BACKOFF_SECS: u64 = 30;

/// Delay before the attempt following `attempt` (1-based): `min(2^n, 30)` s.
pub fn backoff_delay(attempt: u32) -> Duration {
	Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

/// Runs `op` up to `max_attempts` times, sleeping [`backoff_delay`] between
/// attempts and never after the last one. Returns the first non-empty result,
/// or `None` once attempts are exhausted.
pub async fn retry<T, F, Fut>(name: &str, max_attempts: u32, mut op: F) -> Option<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>>>,
{
	let max_attempts = max_attempts.max(1);

	for attempt in 1..=max_attempts {
		info!(target = "blewake.retry", name, attempt, max_attempts, "running operation");

		match op().await {
			Ok(Some(value)) => return Some(value),
			Ok(None) => info!(target = "blewake.retry", name, attempt, "attempt came up empty"),
			Err(err) => warn!(target = "blewake.retry", name, attempt, error = %err, "attempt failed"),
		}

		if attempt < max_attempts {
			let wait = backoff_delay(attempt);
			info!(target = "blewake.retry", name, wait_secs = wait.as_secs(), "backing off before retry");
			tokio::time::sleep(wait).await;
		}
	}

	error!(target = "blewake.retry", name, max_attempts, "retries exhausted");
	None
}

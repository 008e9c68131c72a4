//! Bounded retry with exponential backoff for indexing-side I/O.
//!
//! Flush and merge wrap their write-temp-then-publish step in [`retry`]. Only
//! errors for which [`LexisError::is_transient`] returns true are retried; any
//! other error, or running out of attempts, is returned to the caller with the
//! previously published state untouched.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LexisError, Result};

/// Retry configuration for flush and merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 20,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn no_retry() -> Self {
        RetryConfig {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff before attempt `attempt + 1` (attempts are 1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let base = exp.min(self.max_backoff_ms);
        let jitter = if base > 1 {
            rand::rng().random_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `what` names the operation in log records.
pub fn retry<T, F>(config: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let backoff = config.backoff(attempt);
                warn!(
                    operation = what,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    return Err(LexisError::Io(std::io::Error::other(format!(
                        "{what} failed after {attempt} attempts: {err}"
                    ))));
                }
                return Err(err);
            }
        }
    }
}

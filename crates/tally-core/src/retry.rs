//! The single reusable retry policy applied at I/O boundaries.
//!
//! Stages that talk to a best-effort HTTP endpoint (the watcher's
//! forwarder, the intake gate's publisher) retry locally with this policy;
//! bus-delivered stages use the same schedule for bounded redelivery.

use std::{fmt, future::Future, time::Duration};

use serde::{Deserialize, Serialize};

/// Ceiling on a single backoff delay, whatever the multiplier produces.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry with exponential backoff: `max_attempts` tries in total,
/// the delay after attempt `n` being `base_delay_ms * multiplier^n`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts:  u32,
  pub base_delay_ms: u64,
  pub multiplier:    f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, base_delay_ms: 500, multiplier: 2.0 }
  }
}

impl RetryPolicy {
  /// A policy that never retries — for tests and for stages whose platform
  /// already redelivers.
  pub fn none() -> Self {
    Self { max_attempts: 1, base_delay_ms: 0, multiplier: 1.0 }
  }

  /// Delay to sleep after failed attempt `attempt` (zero-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
    Duration::from_millis(ms as u64).min(MAX_DELAY)
  }

  /// Run `op` until it succeeds or the attempt budget is exhausted; the
  /// final error is returned unchanged.
  pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
  {
    let mut attempt = 0u32;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(error) if attempt + 1 < self.max_attempts.max(1) => {
          let delay = self.delay_for(attempt);
          tracing::warn!(%error, attempt, ?delay, "operation failed; retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(error) => return Err(error),
      }
    }
  }
}

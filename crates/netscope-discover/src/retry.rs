//! Retry policy for individual probes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{DiscoverError, Result};
use crate::transport::ProbeError;

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base`, `2 * base`, `4 * base`, ...
    Exponential { base: Duration },
    /// `step`, `2 * step`, `3 * step`, ...
    Linear { step: Duration },
}

/// Bounded retries for transient probe failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Liveness probes: 3 attempts, 100ms doubling.
    ///
    /// `max_attempts` counts the first try, so this is one probe plus up to
    /// two retries.
    pub fn ping() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(100),
            },
        }
    }

    /// Port probes: 2 attempts, 50ms per attempt.
    pub fn port() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Linear {
                step: Duration::from_millis(50),
            },
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential { base } => base * 2u32.saturating_pow(attempt.saturating_sub(1)),
            Backoff::Linear { step } => step * attempt,
        }
    }
}

/// Run `probe` under `policy`.
///
/// Returns `Ok(Some(_))` on success and `Ok(None)` once the target is
/// judged unresponsive (non-transient failure, or retries exhausted). Fatal
/// probe errors and cancellation are returned as errors. Cancellation is
/// observed before each attempt and during backoff, never mid-probe.
pub async fn retry_probe<T, D, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    target: D,
    mut probe: F,
) -> Result<Option<T>>
where
    D: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, ProbeError>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }

        match probe(attempt).await {
            Ok(value) => return Ok(Some(value)),
            Err(ProbeError::Fatal(reason)) => {
                return Err(DiscoverError::Probe {
                    target: target.to_string(),
                    reason,
                });
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    probe = %target,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Probe failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DiscoverError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                tracing::debug!(probe = %target, attempt, error = %e, "Probe gave up");
                return Ok(None);
            }
        }
    }

    Ok(None)
}

//! # Bounded Exponential Backoff
//!
//! The retry policy is split into a pure delay schedule and a combinator that
//! drives an async operation against it. Call sites decide which errors are
//! worth another attempt.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try an operation and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds. Doubles afterwards.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// The pause after the failed attempt number `attempt` (zero-based).
    ///
    /// `delay(0) == initial`, `delay(1) == 2 * initial`, and so on. The exponent is
    /// capped so a misconfigured attempt count cannot overflow.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Runs `operation` until it succeeds, `should_retry` rejects the error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let is_last = attempt + 1 >= max_attempts;
                if is_last || !should_retry(&e) {
                    return Err(e);
                }
                let delay = policy.delay(attempt);
                warn!(
                    "{label} failed (attempt {}/{max_attempts}): {e}. Retrying in {}ms...",
                    attempt + 1,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

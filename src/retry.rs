//! Bounded retry with exponential backoff for the upload step.
//!
//! The data upload is the one call worth retrying: the task endpoint hands
//! out a token before the task's ingress has finished provisioning, so the
//! first push can land on a connection that is refused or times out. Those
//! failures resolve themselves within seconds; everything else (bad
//! payload, quota, remote rejection) will fail identically on every
//! attempt and propagates immediately.
//!
//! The delay sequence with the defaults is 2 s → 3 s → 4.5 s → 6.75 s
//! between the five attempts.

use crate::config::ClientConfig;
use crate::error::DtcError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Attempt budget and backoff curve for one logical operation. Created
/// fresh per invocation — never shared across items.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Minimum 1.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(2000),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            attempts: config.upload_attempts.max(1),
            initial_delay: config.initial_backoff,
            multiplier: config.backoff_multiplier,
        }
    }

    /// Run `op`, retrying connection-class failures until the budget is
    /// exhausted. Non-connection errors propagate without consuming the
    /// remaining budget; on exhaustion the last error propagates.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, DtcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DtcError>>,
    {
        let mut delay = self.initial_delay;
        let attempts = self.attempts.max(1);

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection_class() && attempt < attempts => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "connection error, backing off before retry: {e}"
                    );
                    sleep(delay).await;
                    delay = delay.mul_f64(self.multiplier);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop returns on the final attempt")
    }
}

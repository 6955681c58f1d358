//! Caller-supplied retry policy for remote calls.
//!
//! Nothing in this crate retries on its own. Callers that want retries wrap a
//! call with [`RetryPolicy::retry`], which sleeps with bounded exponential
//! backoff between attempts and only retries errors classified transient.

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Add up to 25% random jitter to each backoff
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for attempt number (0-based)
    #[must_use]
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_millis() as f64);

        let millis = if self.jitter {
            let jitter_factor = f64::from(rand::thread_rng().gen_range(0u32..25)) / 100.0;
            capped * (1.0 + jitter_factor)
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    ///
    /// `what` names the operation in log lines.
    ///
    /// # Errors
    ///
    /// Returns the last error `op` produced.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.should_retry() && attempt < self.max_retries => {
                    let delay = self.backoff_duration(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

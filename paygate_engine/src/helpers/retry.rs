use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;
use tokio::time::{sleep, timeout};

use crate::traits::ProviderError;

/// Exponential backoff with full jitter for provider calls.
///
/// Every attempt is bounded by `attempt_timeout`; a timed-out attempt counts as a transient failure. Only
/// [`ProviderError::Transient`] failures are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    /// The backoff ceiling before attempt `attempt + 1` (attempts are 1-based).
    fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempts run out. The closure receives the
    /// 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.attempt_timeout, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient(format!("{label} timed out after {:?}", self.attempt_timeout))),
            };
            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("🔁️ {label} succeeded after {attempt} attempts");
                    }
                    return Ok(value);
                },
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.jittered_delay(attempt);
                    warn!("🔁️ {label} attempt {attempt}/{max_attempts} failed: {e}. Retrying in {delay:?}");
                    sleep(delay).await;
                },
                Err(e) => {
                    if e.is_transient() {
                        warn!("🔁️ {label} failed after {attempt} attempts: {e}");
                    }
                    return Err(e);
                },
            }
        }
    }
}

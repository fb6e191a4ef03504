//! Bounded retry with exponential backoff for mail submission.
//!
//! [`RetryTransport`] wraps any [`MailTransport`] and retries failures that
//! [`NotifyError::is_transient`] marks as retryable. Rejections such as a
//! failed login are returned immediately.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use super::transport::{MailTransport, SmtpLogin};
use crate::error::NotifyError;
use lettre::Message;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Decorator adding retry to a [`MailTransport`].
pub struct RetryTransport<T> {
    inner: T,
    /// Retries after the first attempt; `0` disables retrying.
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl<T> RetryTransport<T>
where
    T: MailTransport,
{
    /// Wrap `inner`, retrying up to `max_retries` times starting at `base_delay`.
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    #[cfg(test)]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTransport")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> MailTransport for RetryTransport<T>
where
    T: MailTransport,
{
    #[instrument(level = "info", skip_all)]
    async fn submit(&self, login: &SmtpLogin, message: Message) -> Result<(), NotifyError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.submit(login, message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "submit() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "submit() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::{
    error::{Error, Result},
    metrics::RETRIES_COUNTER,
};

use super::transport::{Request, Response, StatusClass, Transport};

/// Bounded exponential backoff. `max_attempts` counts the first try too.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Full jitter: sleep a random duration in `0..=backoff`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next try, after `failures` failed attempts.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter && !capped.is_zero() {
            let millis = capped.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
        } else {
            capped
        }
    }
}

/// Wraps any transport so every outbound call made through it gets the same
/// retry treatment. Network errors and 5xx answers are retried; once attempts
/// run out a network error becomes `DependencyUnavailable` and a 5xx answer is
/// handed back as-is so the caller can apply its own degrade policy.
pub struct RetryingTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Transport for RetryingTransport {
    async fn request(&self, req: &Request) -> Result<Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (reason, last) = match self.inner.request(req).await {
                Ok(resp) if resp.class() == StatusClass::Retryable => {
                    if attempt >= max_attempts {
                        return Ok(resp);
                    }
                    ("status", format!("HTTP {}", resp.status))
                }
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        return Err(Error::DependencyUnavailable {
                            url: req.url.clone(),
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    ("network", err.to_string())
                }
                Err(err) => return Err(err),
            };

            let delay = self.policy.backoff(attempt);
            warn!(url = %req.url, attempt, max_attempts, ?delay, "retrying: {last}");
            RETRIES_COUNTER.with_label_values(&[reason]).inc();
            tokio::time::sleep(delay).await;
        }
    }
}

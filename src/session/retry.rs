//! Bounded exponential backoff for per-theme generation

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::gateway::{GatewayError, GatewayResult};
use crate::server::config::GenerationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry `k` (0-based): `base * 2^k`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(retry));
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out.
    ///
    /// Returns the final result and the number of attempts made. Backoff sleeps
    /// end early with `Cancelled` when the token fires.
    pub async fn run<T, F, Fut>(&self, label: &str, cancel: &CancellationToken, mut operation: F) -> (GatewayResult<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = operation(attempt).await;
            let err = match result {
                Ok(value) => return (Ok(value), attempt),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.max_attempts {
                return (Err(err), attempt);
            }

            let delay = self.delay_for(attempt - 1);
            warn!(
                "{}: attempt {} failed: {}. Retrying in {}ms...",
                label,
                attempt,
                err,
                delay.as_millis()
            );
            tokio::select! {
                _ = cancel.cancelled() => return (Err(GatewayError::cancelled(err.service())), attempt),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

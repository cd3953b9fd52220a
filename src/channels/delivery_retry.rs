//! Message send retry with exponential backoff.
//!
//! Wraps platform send operations so transient failures (rate limits,
//! server errors, dropped connections) are retried with exponential backoff
//! and jitter. Permanent failures such as an unreachable recipient return
//! immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Configuration for delivery retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (milliseconds).
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) - randomness added to delay.
    pub jitter_factor: f64,
    /// Whether retry is enabled.
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.25,
            enabled: true,
        }
    }
}

/// Tracks delivery metrics.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Total send attempts.
    pub total_attempts: AtomicU64,
    /// Number of successful deliveries.
    pub successful: AtomicU64,
    /// Number of failed deliveries (retries exhausted or permanent error).
    pub failed: AtomicU64,
    /// Number of deliveries that required at least one retry.
    pub retried: AtomicU64,
    /// Cumulative retry delay in milliseconds.
    pub total_retry_delay_ms: AtomicU64,
}

impl DeliveryMetrics {
    /// Take a point-in-time snapshot of the metrics for serialization.
    pub fn snapshot(&self) -> DeliverySnapshot {
        let total_attempts = self.total_attempts.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let retried = self.retried.load(Ordering::Relaxed);
        let total_retry_delay_ms = self.total_retry_delay_ms.load(Ordering::Relaxed);

        let total_deliveries = successful + failed;
        let success_rate = if total_deliveries > 0 {
            successful as f64 / total_deliveries as f64
        } else {
            0.0
        };

        let avg_retry_delay_ms = if retried > 0 {
            total_retry_delay_ms as f64 / retried as f64
        } else {
            0.0
        };

        DeliverySnapshot {
            total_attempts,
            successful,
            failed,
            retried,
            avg_retry_delay_ms,
            success_rate,
        }
    }
}

/// Snapshot of delivery metrics for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct DeliverySnapshot {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub retried: u64,
    /// Average retry delay in milliseconds (for deliveries that were retried).
    pub avg_retry_delay_ms: f64,
    /// Success rate as a fraction (0.0 to 1.0).
    pub success_rate: f64,
}

/// Retries transient send failures for one platform.
#[derive(Debug, Default)]
pub struct DeliveryRetryManager {
    config: RetryConfig,
    metrics: DeliveryMetrics,
}

impl DeliveryRetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: DeliveryMetrics::default(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calculate delay for a given attempt number with jitter.
    ///
    /// Uses exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`,
    /// with additive jitter of up to `jitter_factor * computed_delay`.
    pub fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
        let exp_delay_ms = config
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped_delay_ms = exp_delay_ms.min(config.max_delay_ms);

        let jitter_range = (capped_delay_ms as f64 * config.jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..=jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay_ms.saturating_add(jitter))
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// A server-supplied `retry_after` overrides the computed backoff for
    /// that attempt, still capped at `max_delay_ms`.
    pub async fn deliver_with_retry<T, F, Fut>(&self, operation: F) -> Result<T, ChannelError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ChannelError>>,
    {
        let max_retries = if self.config.enabled {
            self.config.max_retries
        } else {
            0
        };
        let mut total_delay_ms: u64 = 0;
        let mut attempt: u32 = 0;

        loop {
            self.metrics.total_attempts.fetch_add(1, Ordering::Relaxed);
            let error = match operation().await {
                Ok(value) => {
                    self.metrics.successful.fetch_add(1, Ordering::Relaxed);
                    if attempt > 0 {
                        self.record_retried(total_delay_ms);
                        tracing::debug!(attempts = attempt + 1, "Delivery succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= max_retries {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                if attempt > 0 {
                    self.record_retried(total_delay_ms);
                    tracing::warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "Delivery failed after all retries"
                    );
                }
                return Err(error);
            }

            let mut delay = Self::calculate_delay(&self.config, attempt);
            if let ChannelError::RateLimited {
                retry_after: Some(retry_after),
                ..
            } = &error
            {
                delay = (*retry_after).min(Duration::from_millis(self.config.max_delay_ms));
            }

            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Delivery attempt failed, will retry"
            );

            total_delay_ms = total_delay_ms.saturating_add(delay.as_millis() as u64);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn metrics(&self) -> DeliverySnapshot {
        self.metrics.snapshot()
    }

    fn record_retried(&self, total_delay_ms: u64) {
        self.metrics.retried.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_retry_delay_ms
            .fetch_add(total_delay_ms, Ordering::Relaxed);
    }
}

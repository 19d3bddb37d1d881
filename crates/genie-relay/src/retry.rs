//! Bounded retry with per-attempt timeouts.
//!
//! Every backend call goes through [`RetryExecutor::execute`]. Each attempt
//! holds a permit from a shared semaphore while it runs, which bounds the
//! number of backend calls in flight across all users.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Per-attempt timeout used when a caller passes a zero duration.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Message fragments that mark an error as permanent.
const NON_RETRYABLE_SIGNALS: [&str; 6] = [
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid schema",
    "bad request",
];

// ============================================================================
// Error Classification
// ============================================================================

/// Errors the executor knows how to classify.
pub trait RetryClass: Sized {
    fn is_retryable(&self) -> bool;

    /// Error produced when a single attempt exceeds its timeout.
    fn attempt_timed_out(timeout: Duration) -> Self;
}

/// Whether an error's text carries an authorization or malformed-request signal.
pub fn is_non_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    NON_RETRYABLE_SIGNALS.iter().any(|sig| lower.contains(sig))
}

// ============================================================================
// RetryPolicy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }

    /// Delay after the failed attempt `attempt` (0-indexed):
    /// `base * 2^attempt + uniform(0, base)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let backoff = base * f64::from(1u32 << attempt.min(16));
        let jitter = rand::random::<f64>() * base;
        Duration::try_from_secs_f64(backoff + jitter).unwrap_or(Duration::MAX)
    }
}

// ============================================================================
// RetryExecutor
// ============================================================================

/// Runs backend calls with timeouts, backoff and a shared concurrency bound.
///
/// Cheap to clone; clones share the same permit pool.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, max_concurrent_calls: usize) -> Self {
        Self {
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. The last error is returned on exhaustion.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        timeout: Duration,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + Display,
    {
        let timeout = if timeout.is_zero() {
            DEFAULT_CALL_TIMEOUT
        } else {
            timeout
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = {
                // A closed semaphore only happens at shutdown; run unbounded then.
                let _permit = self.permits.acquire().await.ok();
                match tokio::time::timeout(timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(E::attempt_timed_out(timeout)),
                }
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(call = label, attempt = attempt + 1, error = %err, "Backend call failed permanently");
                return Err(err);
            }
            if attempt + 1 >= max_attempts {
                warn!(call = label, attempts = max_attempts, error = %err, "Backend call retries exhausted");
                return Err(err);
            }

            let delay = self.policy.delay_for_attempt(attempt);
            debug!(
                call = label,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying backend call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Executor
//!
//! Bounded exponential-backoff-plus-jitter wrapper around fallible async
//! operations.
//!
//! ## Behavior
//!
//! - Attempt `k` (1-based) sleeps `initial * multiplier^(k-1)` before the
//!   next try, capped at `max_delay`, with up to +25% random jitter
//! - Errors are classified through a retryable predicate (defaulting to
//!   [`EtlError::is_retryable`]); permanent errors are re-thrown on the
//!   spot without consuming further attempts
//! - Exhausting `max_attempts` on a retryable error yields
//!   [`EtlError::RetryExhausted`] wrapping the last error
//!
//! The per-retry callback receives `(error, attempt)` so callers can
//! count retries into run metrics.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use landrecord_etl_domain::EtlError;

/// Backoff parameters. The defaults match the pipeline-wide contract:
/// three attempts starting at one second, doubling, capped at thirty.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of the random jitter as a fraction of the computed
    /// delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, jitter included.
    ///
    /// Deterministic base: `initial * multiplier^(attempt - 1)`, capped at
    /// `max_delay`; jitter adds up to `jitter * base` on top.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter_factor = 1.0 + rand::rng().random_range(0.0..=self.jitter);
        Duration::from_secs_f64(capped * jitter_factor)
    }
}

/// Executes operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts are
    /// exhausted.
    ///
    /// `is_retryable` classifies errors; `on_retry` fires once per failed
    /// retryable attempt that will be retried.
    pub async fn retry<T, F, Fut, C, R>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: C,
        mut on_retry: R,
    ) -> Result<T, EtlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
        C: Fn(&EtlError) -> bool,
        R: FnMut(&EtlError, u32),
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !is_retryable(&error) => {
                    debug!(operation, attempt, error = %error, "permanent error, not retrying");
                    return Err(error);
                }
                Err(error) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(operation, attempt, error = %error, "retry attempts exhausted");
                        return Err(EtlError::RetryExhausted(format!(
                            "{} failed after {} attempts: {}",
                            operation, attempt, error
                        )));
                    }
                    on_retry(&error, attempt);
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`RetryExecutor::retry`] with the default error classification.
    pub async fn retry_default<T, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<T, EtlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
    {
        self.retry(operation, op, EtlError::is_retryable, |_, _| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(8),
            jitter: 0.25,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let retries_clone = retries.clone();
        let result = executor
            .retry(
                "flaky-op",
                move || {
                    let calls = calls_clone.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(EtlError::source_unavailable("ECONNRESET"))
                        } else {
                            Ok(42)
                        }
                    }
                },
                EtlError::is_retryable,
                |_, _| {
                    retries_clone.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let result: Result<(), _> = executor
            .retry_default("permanent-op", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(EtlError::validation_error("bad record"))
                }
            })
            .await;

        assert!(matches!(result, Err(EtlError::ValidationError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let executor = RetryExecutor::new(fast_policy());
        let result: Result<(), _> = executor
            .retry_default("always-down", || async {
                Err(EtlError::source_unavailable("HTTP 503"))
            })
            .await;

        match result {
            Err(EtlError::RetryExhausted(msg)) => {
                assert!(msg.contains("3 attempts"));
                assert!(msg.contains("503"));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_delay_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=6 {
            let base = 1.0f64 * 2.0f64.powi(attempt as i32 - 1);
            let capped = base.min(30.0);
            for _ in 0..32 {
                let delay = policy.delay_for_attempt(attempt).as_secs_f64();
                assert!(delay >= capped, "attempt {} delay {} below base", attempt, delay);
                assert!(
                    delay <= capped * 1.25 + f64::EPSILON,
                    "attempt {} delay {} above jitter bound",
                    attempt,
                    delay
                );
            }
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn delay_never_exceeds_jittered_cap(
                attempt in 1u32..=16,
                initial_ms in 1u64..=2_000,
                multiplier in 1.0f64..=4.0,
                max_ms in 1u64..=60_000,
            ) {
                let policy = RetryPolicy {
                    max_attempts: 3,
                    initial_delay: Duration::from_millis(initial_ms),
                    multiplier,
                    max_delay: Duration::from_millis(max_ms),
                    jitter: 0.25,
                };
                let delay = policy.delay_for_attempt(attempt).as_secs_f64();
                let base = (initial_ms as f64 / 1000.0)
                    * multiplier.powi(attempt as i32 - 1);
                let capped = base.min(max_ms as f64 / 1000.0);
                prop_assert!(delay >= capped - 1e-9);
                prop_assert!(delay <= capped * 1.25 + 1e-9);
            }
        }
    }
}

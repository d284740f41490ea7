// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Circuit Breaker
//!
//! Named, per-dependency three-state gate protecting sources and
//! destinations from hammering a failing collaborator.
//!
//! ## State Machine
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ─────────────────────────▶ OPEN
//!      ▲                               │ reset_timeout elapsed
//!      │  successes >= threshold       ▼
//!      └──────────────────────── HALF_OPEN
//!                                      │ any failure
//!                                      └────────▶ OPEN
//! ```
//!
//! Calls through an `OPEN` breaker are rejected immediately with
//! [`EtlError::BreakerOpen`] and never reach the wrapped operation. Every
//! call races a per-operation timeout; a timeout counts as a failure.
//!
//! A process-wide [`CircuitBreakerFactory`] memoizes breakers by name so
//! every stage guarding the same dependency shares one state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use landrecord_etl_domain::EtlError;

/// Breaker tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip CLOSED → OPEN.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that restore CLOSED.
    pub success_threshold: u32,
    /// Time OPEN before admitting a half-open probe.
    pub reset_timeout: Duration,
    /// Per-call timeout raced against the wrapped operation.
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time snapshot for status surfaces and tests.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<Instant>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
}

/// One named breaker guarding one external dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                last_failure_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `op` through the breaker, racing the per-call timeout.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, EtlError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
    {
        self.admit()?;

        let outcome = tokio::time::timeout(self.config.call_timeout, op()).await;
        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure();
                Err(error)
            }
            Err(_) => {
                self.record_failure();
                Err(EtlError::timeout_error(format!(
                    "operation through breaker '{}' exceeded {:?}",
                    self.name, self.config.call_timeout
                )))
            }
        }
    }

    /// Admission check; OPEN flips to HALF_OPEN once the reset timeout
    /// has elapsed.
    fn admit(&self) -> Result<(), EtlError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.reset_timeout {
                    debug!(breaker = %self.name, "reset timeout elapsed, probing half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                    Ok(())
                } else {
                    Err(EtlError::BreakerOpen(self.name.clone()))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    debug!(breaker = %self.name, "half-open probes passed, closing");
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, opening"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "half-open probe failed, re-opening");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            success_count: inner.consecutive_successes,
            last_failure_at: inner.last_failure_at,
        }
    }
}

/// Memoizing factory: one breaker per dependency name, shared across
/// every stage that guards that dependency.
#[derive(Default)]
pub struct CircuitBreakerFactory {
    default_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerFactory {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `name`, creating it with the factory
    /// default configuration on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(name, self.default_config)
    }

    /// Returns the breaker for `name`, creating it with `config` on first
    /// use. An existing breaker keeps its original configuration.
    pub fn breaker_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    /// Snapshots of every breaker created so far.
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers
            .lock()
            .values()
            .map(|breaker| breaker.snapshot())
            .collect()
    }
}

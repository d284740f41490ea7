// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cancellation and Pause Primitives
//!
//! Cooperative control signals shared by all pipeline stages:
//!
//! - [`CancellationToken`]: broadcast "stop now" flag; stages check it at
//!   loop boundaries and between record hand-offs
//! - [`PauseGate`]: RUNNING ↔ PAUSED control; a paused stage parks at its
//!   next hand-off until resumed
//!
//! Both are clone-cheap handles over shared state, safe to hand to every
//! spawned task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Cooperative cancellation token.
///
/// Cancellation is level-triggered and permanent for the life of the
/// token: once cancelled, every clone observes it.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancel this token and wake all waiters.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async).
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative pause gate.
///
/// Stages call [`PauseGate::wait_if_paused`] before each hand-off; the
/// call returns immediately while running and parks while paused.
#[derive(Clone)]
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    pub fn pause(&self) {
        let _ = self.paused.send(true);
    }

    pub fn resume(&self) {
        let _ = self.paused.send(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Parks until the gate is open. Returns immediately when running.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.paused.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_gate_parks_and_releases() {
        let gate = PauseGate::new();
        gate.pause();

        let waiter = gate.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_if_paused().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("gate should open")
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_gate_does_not_block() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_if_paused())
            .await
            .expect("open gate must not park");
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Supervised spawning for the pipeline's stage tasks:
//!
//! - Logs task start and completion/failure
//! - Returns a `JoinHandle` the orchestrator must await
//! - Converts panics and aborts into typed errors on join
//!
//! No stage task is ever spawn-and-forgotten; the orchestrator joins every
//! handle so no error is lost.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use landrecord_etl_domain::EtlError;

/// Result type alias for pipeline task outcomes.
pub type TaskResult<T> = Result<T, EtlError>;

/// Spawns a supervised task with automatic outcome logging.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<TaskResult<T>>
where
    F: std::future::Future<Output = TaskResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed successfully"),
            Err(e) => error!(task = name, error = ?e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised task handle, converting panics into typed errors.
pub async fn join_supervised<T>(handle: JoinHandle<TaskResult<T>>) -> TaskResult<T> {
    match handle.await {
        Ok(task_result) => task_result,
        Err(e) => {
            if e.is_panic() {
                Err(EtlError::internal_error(format!("task panicked: {}", e)))
            } else if e.is_cancelled() {
                Err(EtlError::cancelled("task aborted"))
            } else {
                Err(EtlError::internal_error(format!("task join failed: {}", e)))
            }
        }
    }
}

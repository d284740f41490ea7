// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Run Entity
//!
//! One ETL pass through the pipeline. A [`PipelineRun`] is created when the
//! orchestrator starts a run, mutated only by the orchestrator that owns
//! it, and persisted to the audit table on completion or failure.
//!
//! ## State Machine
//!
//! ```text
//! IDLE ──▶ RUNNING ──▶ COMPLETED
//!             │  ▲
//!             ▼  │
//!           PAUSED
//!             │
//!             ▼
//!           FAILED
//! ```
//!
//! Only `IDLE` admits a new run; terminal states reset to `IDLE` after the
//! run record has been published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::EtlError;

/// Extraction mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// Extract everything, ignoring the watermark.
    Full,
    /// Extract records updated after the stored watermark.
    Incremental,
    /// Reserved: source-supplied change feed. Treated as incremental.
    Cdc,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "FULL",
            RunMode::Incremental => "INCREMENTAL",
            RunMode::Cdc => "CDC",
        }
    }

    /// Whether this mode consults the watermark store at run start.
    pub fn uses_watermark(&self) -> bool {
        matches!(self, RunMode::Incremental | RunMode::Cdc)
    }
}

/// Lifecycle state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Failed,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Paused => "PAUSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Completed)
    }
}

/// Aggregate counters of one run.
///
/// The monotonic relation `records_extracted >= records_transformed >=
/// records_loaded + records_failed` holds for every completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub records_extracted: u64,
    pub records_transformed: u64,
    pub records_loaded: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    /// Transient-failure retries performed across all stages.
    pub retries: u64,
    pub duration: Option<Duration>,
    pub throughput_records_per_second: f64,
}

impl RunMetrics {
    /// Derives throughput from the loaded count and duration.
    pub fn finalize(&mut self, duration: Duration) {
        self.duration = Some(duration);
        let secs = duration.as_secs_f64();
        self.throughput_records_per_second = if secs > 0.0 {
            (self.records_loaded + self.records_updated) as f64 / secs
        } else {
            0.0
        };
    }
}

/// One recorded error within a run. Per-record errors never abort the
/// run; they accumulate here for the final run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub stage: String,
    pub source: Option<String>,
    pub record_id: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl RunError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            source: None,
            record_id: None,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

/// One complete ETL pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metrics: RunMetrics,
    pub errors: Vec<RunError>,
}

impl PipelineRun {
    /// Creates a run in the `RUNNING` state with a fresh identifier.
    pub fn start(mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            metrics: RunMetrics::default(),
            errors: Vec::new(),
        }
    }

    /// RUNNING → PAUSED.
    pub fn pause(&mut self) -> Result<(), EtlError> {
        match self.status {
            RunStatus::Running => {
                self.status = RunStatus::Paused;
                Ok(())
            }
            other => Err(EtlError::internal_error(format!(
                "cannot pause run in state {}",
                other.as_str()
            ))),
        }
    }

    /// PAUSED → RUNNING.
    pub fn resume(&mut self) -> Result<(), EtlError> {
        match self.status {
            RunStatus::Paused => {
                self.status = RunStatus::Running;
                Ok(())
            }
            other => Err(EtlError::internal_error(format!(
                "cannot resume run in state {}",
                other.as_str()
            ))),
        }
    }

    /// RUNNING → COMPLETED, stamping the end time and throughput.
    pub fn complete(&mut self, metrics: RunMetrics) -> Result<(), EtlError> {
        if self.status != RunStatus::Running {
            return Err(EtlError::internal_error(format!(
                "cannot complete run in state {}",
                self.status.as_str()
            )));
        }
        self.status = RunStatus::Completed;
        self.end_time = Some(Utc::now());
        self.metrics = metrics;
        self.stamp_duration();
        Ok(())
    }

    /// RUNNING | PAUSED → FAILED. Failure is always reachable.
    pub fn fail(&mut self, metrics: RunMetrics, errors: Vec<RunError>) {
        self.status = RunStatus::Failed;
        self.end_time = Some(Utc::now());
        self.metrics = metrics;
        self.errors.extend(errors);
        self.stamp_duration();
    }

    fn stamp_duration(&mut self) {
        if let Some(end) = self.end_time {
            let elapsed = (end - self.start_time).to_std().unwrap_or_default();
            self.metrics.finalize(elapsed);
        }
    }

    /// Wall-clock duration, once the run has ended.
    pub fn duration(&self) -> Option<Duration> {
        self.metrics.duration
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Events
//!
//! Typed lifecycle and progress events for one pipeline run. The
//! orchestrator broadcasts these over a channel; consumers subscribe to
//! the channel rather than registering listeners on the orchestrator.
//!
//! Events are intentionally a single flat enum: stage progress, run
//! lifecycle and quality alerts all travel the same channel, so a consumer
//! can follow a run end-to-end from one subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::pipeline_run::{RunMetrics, RunMode};
use crate::entities::quality::QualityDimensions;

/// Progress of one source's extraction.
///
/// `total` and `percentage` are `None` when the adapter could not estimate
/// the total up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractProgress {
    pub source: String,
    pub extracted: u64,
    pub total: Option<u64>,
    pub percentage: Option<f64>,
}

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        mode: RunMode,
        occurred_at: DateTime<Utc>,
    },
    RunCompleted {
        run_id: Uuid,
        metrics: RunMetrics,
        occurred_at: DateTime<Utc>,
    },
    RunFailed {
        run_id: Uuid,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    ExtractStarted {
        run_id: Uuid,
        source: String,
        occurred_at: DateTime<Utc>,
    },
    ExtractProgress {
        run_id: Uuid,
        progress: ExtractProgress,
        occurred_at: DateTime<Utc>,
    },
    ExtractCompleted {
        run_id: Uuid,
        source: String,
        extracted: u64,
        rejected: u64,
        occurred_at: DateTime<Utc>,
    },
    ExtractFailed {
        run_id: Uuid,
        source: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    TransformCompleted {
        run_id: Uuid,
        source: String,
        transformed: u64,
        quality: QualityDimensions,
        occurred_at: DateTime<Utc>,
    },
    LoadStarted {
        run_id: Uuid,
        destination: String,
        occurred_at: DateTime<Utc>,
    },
    LoadCompleted {
        run_id: Uuid,
        destination: String,
        loaded: u64,
        updated: u64,
        skipped: u64,
        occurred_at: DateTime<Utc>,
    },
    LoadFailed {
        run_id: Uuid,
        destination: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    QualityAlert {
        run_id: Uuid,
        source: String,
        score: f64,
        occurred_at: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Stable event-type tag for logging and metrics labels.
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "run.start",
            PipelineEvent::RunCompleted { .. } => "run.complete",
            PipelineEvent::RunFailed { .. } => "run.error",
            PipelineEvent::ExtractStarted { .. } => "extract.start",
            PipelineEvent::ExtractProgress { .. } => "extract.progress",
            PipelineEvent::ExtractCompleted { .. } => "extract.complete",
            PipelineEvent::ExtractFailed { .. } => "extract.error",
            PipelineEvent::TransformCompleted { .. } => "transform.complete",
            PipelineEvent::LoadStarted { .. } => "load.start",
            PipelineEvent::LoadCompleted { .. } => "load.complete",
            PipelineEvent::LoadFailed { .. } => "load.error",
            PipelineEvent::QualityAlert { .. } => "quality.alert",
        }
    }

    /// Timestamp the event occurred.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PipelineEvent::RunStarted { occurred_at, .. }
            | PipelineEvent::RunCompleted { occurred_at, .. }
            | PipelineEvent::RunFailed { occurred_at, .. }
            | PipelineEvent::ExtractStarted { occurred_at, .. }
            | PipelineEvent::ExtractProgress { occurred_at, .. }
            | PipelineEvent::ExtractCompleted { occurred_at, .. }
            | PipelineEvent::ExtractFailed { occurred_at, .. }
            | PipelineEvent::TransformCompleted { occurred_at, .. }
            | PipelineEvent::LoadStarted { occurred_at, .. }
            | PipelineEvent::LoadCompleted { occurred_at, .. }
            | PipelineEvent::LoadFailed { occurred_at, .. }
            | PipelineEvent::QualityAlert { occurred_at, .. } => *occurred_at,
        }
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Destination Port
//!
//! Loading boundary of the pipeline. A destination receives merged record
//! batches and upserts them transactionally; the orchestrator wraps each
//! batch call in retry and a named circuit breaker.
//!
//! ## Contract
//!
//! - `load_batch` is idempotent at-least-once: re-loading an unchanged
//!   batch produces updates (version bumps), never duplicates
//! - per-record failures inside a batch are reported in
//!   [`LoadResult::errors`] and do not roll the batch back
//! - framework-level failures roll back and surface as `LoadBatchError`,
//!   which the orchestrator retries at the batch level

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::entities::land_record::LandRecord;
use crate::entities::pipeline_run::PipelineRun;
use crate::error::EtlError;

/// Per-record load failure that did not cause a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadError {
    pub record_id: String,
    pub message: String,
}

/// Outcome of one transactional batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Newly inserted records.
    pub records_loaded: u64,
    /// Existing records updated in place.
    pub records_updated: u64,
    /// Records skipped by validation.
    pub records_skipped: u64,
    pub errors: Vec<LoadError>,
    pub duration: Option<Duration>,
}

impl LoadResult {
    /// Folds another batch result into this one.
    pub fn absorb(&mut self, other: LoadResult) {
        self.records_loaded += other.records_loaded;
        self.records_updated += other.records_updated;
        self.records_skipped += other.records_skipped;
        self.errors.extend(other.errors);
    }
}

/// Loading port implemented by every destination store.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short stable name, used for breaker names, metrics labels and logs.
    fn name(&self) -> &str;

    /// Establishes the connection pool.
    async fn connect(&self) -> Result<(), EtlError>;

    /// Releases the connection pool.
    async fn disconnect(&self) -> Result<(), EtlError>;

    /// Announces the run whose batches follow; audit entries are keyed on
    /// it. Destinations without an audit trail can ignore this.
    async fn begin_run(&self, _run_id: Uuid) -> Result<(), EtlError> {
        Ok(())
    }

    /// Upserts one batch inside a single transaction.
    async fn load_batch(&self, records: &[LandRecord]) -> Result<LoadResult, EtlError>;

    /// Publishes the finished run record to the destination's audit
    /// trail. Default is a no-op for destinations without one.
    async fn record_run(&self, _run: &PipelineRun) -> Result<(), EtlError> {
        Ok(())
    }
}

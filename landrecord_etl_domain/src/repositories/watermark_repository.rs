// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Watermark Repository
//!
//! Persisted incremental-extraction boundary. The orchestrator reads the
//! watermark once at run start and commits a new one atomically on
//! successful completion; nothing touches it mid-run (single-writer
//! discipline at run boundaries).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EtlError;

/// Per-pipeline extraction watermark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Pipeline this watermark belongs to.
    pub pipeline: String,
    /// Instant the last successful run finished extracting.
    pub last_successful_run_at: Option<DateTime<Utc>>,
    /// Last extraction boundary per source name.
    pub last_extracted_at: HashMap<String, DateTime<Utc>>,
}

impl Watermark {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            last_successful_run_at: None,
            last_extracted_at: HashMap::new(),
        }
    }

    /// The `extract since` boundary for one source: the source-specific
    /// timestamp when present, the run-level timestamp otherwise.
    pub fn since_for(&self, source: &str) -> Option<DateTime<Utc>> {
        self.last_extracted_at
            .get(source)
            .copied()
            .or(self.last_successful_run_at)
    }

    /// Advances every boundary to `instant` for the given sources.
    pub fn advance(&mut self, instant: DateTime<Utc>, sources: impl IntoIterator<Item = String>) {
        self.last_successful_run_at = Some(instant);
        for source in sources {
            self.last_extracted_at.insert(source, instant);
        }
    }
}

/// Watermark persistence port. `commit` must be atomic: a torn watermark
/// would silently re-extract or skip records on the next incremental run.
#[async_trait]
pub trait WatermarkRepository: Send + Sync {
    /// Loads the watermark for a pipeline, `None` on first run.
    async fn get(&self, pipeline: &str) -> Result<Option<Watermark>, EtlError>;

    /// Atomically replaces the stored watermark.
    async fn commit(&self, watermark: &Watermark) -> Result<(), EtlError>;
}

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Watermark Repository
//!
//! Watermark store without persistence, for tests and single-shot runs
//! where incremental state does not need to survive the process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use landrecord_etl_domain::repositories::watermark_repository::{Watermark, WatermarkRepository};
use landrecord_etl_domain::EtlError;

/// Process-local watermark store.
#[derive(Debug, Default)]
pub struct MemoryWatermarkRepository {
    watermarks: Mutex<HashMap<String, Watermark>>,
}

impl MemoryWatermarkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkRepository for MemoryWatermarkRepository {
    async fn get(&self, pipeline: &str) -> Result<Option<Watermark>, EtlError> {
        Ok(self.watermarks.lock().get(pipeline).cloned())
    }

    async fn commit(&self, watermark: &Watermark) -> Result<(), EtlError> {
        self.watermarks
            .lock()
            .insert(watermark.pipeline.clone(), watermark.clone());
        Ok(())
    }
}

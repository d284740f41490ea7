// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Core Settings
//!
//! Tunables owned by the pipeline core. The YAML configuration loader and
//! scheduler are external collaborators; the core only reads the few
//! environment variables it owns (encryption key material, metrics port,
//! destination URL) and exposes typed defaults for everything else.

use std::time::Duration;

/// Environment variable carrying the destination connection string.
pub const DATABASE_URL_ENV: &str = "ETL_DATABASE_URL";

/// Pipeline tuning parameters with production defaults.
#[derive(Debug, Clone)]
pub struct EtlSettings {
    /// Logical pipeline name, keys the watermark row.
    pub pipeline_name: String,
    /// Records per normalization batch; quality is reported per batch.
    pub normalizer_batch_size: usize,
    /// Records per loader batch.
    pub load_batch_size: usize,
    /// Depth of the bounded channels between stages.
    pub channel_depth: usize,
    /// Maximum parcel groups held by the merge window. Defaults to ten
    /// times the normalizer batch size.
    pub merge_window_capacity: usize,
    /// Delay between successive source pages.
    pub politeness_delay: Duration,
    /// Batch quality score below which a warning alert fires.
    pub quality_alert_threshold: f64,
    /// Cap on per-record errors retained in the run record.
    pub max_recorded_errors: usize,
}

impl Default for EtlSettings {
    fn default() -> Self {
        let normalizer_batch_size = 100;
        Self {
            pipeline_name: "land-records".to_string(),
            normalizer_batch_size,
            load_batch_size: 50,
            channel_depth: 64,
            merge_window_capacity: normalizer_batch_size * 10,
            politeness_delay: Duration::from_millis(100),
            quality_alert_threshold: 0.7,
            max_recorded_errors: 100,
        }
    }
}

impl EtlSettings {
    /// Reads the destination connection string from the environment.
    pub fn database_url() -> Option<String> {
        std::env::var(DATABASE_URL_ENV).ok()
    }
}

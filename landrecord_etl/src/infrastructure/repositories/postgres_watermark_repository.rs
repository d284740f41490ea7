// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Postgres Watermark Repository
//!
//! Persists the incremental-extraction watermark in a single
//! `etl_watermarks` row per pipeline. Commit is one upsert statement, so
//! the replace is atomic: a reader sees either the old watermark or the
//! new one, never a torn mix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use landrecord_etl_domain::repositories::watermark_repository::{Watermark, WatermarkRepository};
use landrecord_etl_domain::EtlError;

/// Watermark store backed by the destination database.
pub struct PostgresWatermarkRepository {
    pool: PgPool,
}

impl PostgresWatermarkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatermarkRepository for PostgresWatermarkRepository {
    async fn get(&self, pipeline: &str) -> Result<Option<Watermark>, EtlError> {
        let row = sqlx::query(
            "SELECT pipeline, last_successful_run_at, last_extracted_at \
             FROM etl_watermarks WHERE pipeline = $1",
        )
        .bind(pipeline)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EtlError::watermark_error(format!("watermark read failed: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_extracted_at: HashMap<String, DateTime<Utc>> =
            serde_json::from_value(row.get::<serde_json::Value, _>("last_extracted_at"))?;

        Ok(Some(Watermark {
            pipeline: row.get("pipeline"),
            last_successful_run_at: row.get("last_successful_run_at"),
            last_extracted_at,
        }))
    }

    async fn commit(&self, watermark: &Watermark) -> Result<(), EtlError> {
        let last_extracted_at = serde_json::to_value(&watermark.last_extracted_at)?;

        sqlx::query(
            "INSERT INTO etl_watermarks (pipeline, last_successful_run_at, last_extracted_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (pipeline) DO UPDATE SET \
                 last_successful_run_at = EXCLUDED.last_successful_run_at, \
                 last_extracted_at = EXCLUDED.last_extracted_at",
        )
        .bind(&watermark.pipeline)
        .bind(watermark.last_successful_run_at)
        .bind(last_extracted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EtlError::watermark_error(format!("watermark commit failed: {}", e)))?;

        Ok(())
    }
}

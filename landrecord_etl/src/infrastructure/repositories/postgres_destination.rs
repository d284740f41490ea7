// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Postgres Destination
//!
//! Transactional upsert loader into the canonical land-records schema.
//!
//! ## Batch Algorithm
//!
//! 1. Open one transaction per batch
//! 2. Bulk existence lookup by primary key
//! 3. Per record: validate (skip on failure), encrypt PII fields and
//!    compute sibling hashes, INSERT with `version = 1` or UPDATE with
//!    `version = version + 1`, replace child rows, append an audit entry
//! 4. Per-record exceptions are recorded and do not roll the batch back;
//!    framework-level failures roll back and fail the batch
//!
//! The schema is assumed bootstrapped externally (migrations are out of
//! scope). Geometry is written as WKT through `ST_GeomFromText`, with
//! polygons auto-closed.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use landrecord_etl_domain::entities::land_record::{Coordinates, LandRecord};
use landrecord_etl_domain::entities::pipeline_run::PipelineRun;
use landrecord_etl_domain::services::destination::{Destination, LoadError, LoadResult};
use landrecord_etl_domain::services::encryption_service::EncryptionService;
use landrecord_etl_domain::EtlError;

/// Pool sizing per the destination contract.
const MAX_CONNECTIONS: u32 = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

enum UpsertAction {
    Inserted,
    Updated,
}

impl UpsertAction {
    fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Inserted => "INSERT",
            UpsertAction::Updated => "UPDATE",
        }
    }
}

/// Loader into the canonical Postgres schema.
pub struct PostgresDestination {
    name: String,
    database_url: String,
    encryption: Arc<dyn EncryptionService>,
    pool: Mutex<Option<PgPool>>,
    run_id: Mutex<Option<Uuid>>,
}

impl PostgresDestination {
    pub fn new(
        name: impl Into<String>,
        database_url: impl Into<String>,
        encryption: Arc<dyn EncryptionService>,
    ) -> Self {
        Self {
            name: name.into(),
            database_url: database_url.into(),
            encryption,
            pool: Mutex::new(None),
            run_id: Mutex::new(None),
        }
    }

    fn pool(&self) -> Result<PgPool, EtlError> {
        self.pool.lock().clone().ok_or_else(|| {
            EtlError::destination_unavailable(format!("destination '{}' is not connected", self.name))
        })
    }

    /// Encrypted value and sibling hash for one optional PII field.
    fn protect(&self, value: Option<&str>) -> Result<(Option<String>, Option<String>), EtlError> {
        match value {
            Some(plaintext) => Ok((
                Some(self.encryption.encrypt(plaintext)?),
                Some(self.encryption.hash(plaintext)),
            )),
            None => Ok((None, None)),
        }
    }

    async fn upsert_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &LandRecord,
        exists: bool,
    ) -> Result<UpsertAction, EtlError> {
        let (national_id_enc, national_id_hash) =
            self.protect(record.owner.national_id.as_deref())?;
        let (phone_enc, phone_hash) = self.protect(record.owner.phone_number.as_deref())?;
        let (email_enc, email_hash) = self.protect(record.owner.email.as_deref())?;

        let point = record.coordinates.as_ref().map(point_wkt);
        let polygon = record.boundaries.as_deref().map(polygon_wkt);

        let action = if exists {
            sqlx::query(
                r#"
                UPDATE land_records SET
                    parcel_number = $2,
                    district = $3,
                    chiefdom = $4,
                    ward = $5,
                    address = $6,
                    coordinates = ST_GeomFromText($7, 4326),
                    boundaries = ST_GeomFromText($8, 4326),
                    owner_name = $9,
                    owner_national_id = $10,
                    owner_national_id_hash = $11,
                    owner_phone = $12,
                    owner_phone_hash = $13,
                    owner_email = $14,
                    owner_email_hash = $15,
                    land_type = $16,
                    area = $17,
                    land_use = $18,
                    current_value = $19,
                    last_valuation_date = $20,
                    tax_assessment = $21,
                    title_deed_number = $22,
                    encumbrances = $23,
                    tax_status = $24,
                    last_payment_date = $25,
                    arrears_amount = $26,
                    verification_status = $27,
                    last_verification_date = $28,
                    verification_method = $29,
                    source_system = $30,
                    quality_score = $31,
                    updated_at = $32,
                    version = version + 1
                WHERE id = $1
                "#,
            )
            .bind(&record.id)
            .bind(&record.parcel_number)
            .bind(&record.district)
            .bind(&record.chiefdom)
            .bind(&record.ward)
            .bind(&record.address)
            .bind(&point)
            .bind(&polygon)
            .bind(&record.owner.name)
            .bind(&national_id_enc)
            .bind(&national_id_hash)
            .bind(&phone_enc)
            .bind(&phone_hash)
            .bind(&email_enc)
            .bind(&email_hash)
            .bind(record.land_type.as_str())
            .bind(record.area)
            .bind(&record.land_use)
            .bind(record.current_value)
            .bind(record.last_valuation_date)
            .bind(record.tax_assessment)
            .bind(&record.title_deed_number)
            .bind(&record.encumbrances)
            .bind(record.tax_status.as_str())
            .bind(record.last_payment_date)
            .bind(record.arrears_amount)
            .bind(record.verification_status.as_str())
            .bind(record.last_verification_date)
            .bind(&record.verification_method)
            .bind(record.source_system.as_str())
            .bind(record.quality_score as i32)
            .bind(record.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::database_error(format!("update of {} failed: {}", record.id, e)))?;

            UpsertAction::Updated
        } else {
            sqlx::query(
                r#"
                INSERT INTO land_records (
                    id, parcel_number, district, chiefdom, ward, address,
                    coordinates, boundaries,
                    owner_name, owner_national_id, owner_national_id_hash,
                    owner_phone, owner_phone_hash, owner_email, owner_email_hash,
                    land_type, area, land_use,
                    current_value, last_valuation_date, tax_assessment,
                    title_deed_number, encumbrances,
                    tax_status, last_payment_date, arrears_amount,
                    verification_status, last_verification_date, verification_method,
                    source_system, quality_score, created_at, updated_at, version
                ) VALUES (
                    $1, $2, $3, $4, $5, $6,
                    ST_GeomFromText($7, 4326), ST_GeomFromText($8, 4326),
                    $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23,
                    $24, $25, $26, $27, $28, $29,
                    $30, $31, $32, $33, 1
                )
                "#,
            )
            .bind(&record.id)
            .bind(&record.parcel_number)
            .bind(&record.district)
            .bind(&record.chiefdom)
            .bind(&record.ward)
            .bind(&record.address)
            .bind(&point)
            .bind(&polygon)
            .bind(&record.owner.name)
            .bind(&national_id_enc)
            .bind(&national_id_hash)
            .bind(&phone_enc)
            .bind(&phone_hash)
            .bind(&email_enc)
            .bind(&email_hash)
            .bind(record.land_type.as_str())
            .bind(record.area)
            .bind(&record.land_use)
            .bind(record.current_value)
            .bind(record.last_valuation_date)
            .bind(record.tax_assessment)
            .bind(&record.title_deed_number)
            .bind(&record.encumbrances)
            .bind(record.tax_status.as_str())
            .bind(record.last_payment_date)
            .bind(record.arrears_amount)
            .bind(record.verification_status.as_str())
            .bind(record.last_verification_date)
            .bind(&record.verification_method)
            .bind(record.source_system.as_str())
            .bind(record.quality_score as i32)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::database_error(format!("insert of {} failed: {}", record.id, e)))?;

            UpsertAction::Inserted
        };

        self.replace_children(tx, record).await?;
        self.append_audit(tx, record, &action).await?;

        Ok(action)
    }

    /// Child tables are replaced wholesale: delete then bulk insert.
    async fn replace_children(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &LandRecord,
    ) -> Result<(), EtlError> {
        for table in [
            "land_record_previous_owners",
            "land_record_structures",
            "land_record_disputes",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE land_record_id = $1", table))
                .bind(&record.id)
                .execute(&mut **tx)
                .await
                .map_err(|e| EtlError::database_error(format!("clearing {} failed: {}", table, e)))?;
        }

        for owner in &record.previous_owners {
            sqlx::query(
                "INSERT INTO land_record_previous_owners (land_record_id, owner_name, from_date, to_date) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.id)
            .bind(&owner.name)
            .bind(owner.from_date)
            .bind(owner.to_date)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::database_error(format!("previous owner insert failed: {}", e)))?;
        }

        for structure in &record.structures {
            sqlx::query(
                "INSERT INTO land_record_structures (land_record_id, structure_type, year_built, condition) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.id)
            .bind(&structure.structure_type)
            .bind(structure.year_built)
            .bind(&structure.condition)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::database_error(format!("structure insert failed: {}", e)))?;
        }

        for dispute in &record.disputes {
            sqlx::query(
                "INSERT INTO land_record_disputes (land_record_id, dispute_type, status, filed_date) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.id)
            .bind(&dispute.dispute_type)
            .bind(&dispute.status)
            .bind(dispute.filed_date)
            .execute(&mut **tx)
            .await
            .map_err(|e| EtlError::database_error(format!("dispute insert failed: {}", e)))?;
        }

        Ok(())
    }

    async fn append_audit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &LandRecord,
        action: &UpsertAction,
    ) -> Result<(), EtlError> {
        let run_id = (*self.run_id.lock()).unwrap_or_default();
        let changes = serde_json::to_value(record)?;

        sqlx::query(
            "INSERT INTO etl_audit_log (run_id, record_id, action, source_system, changes, created_at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(run_id)
        .bind(&record.id)
        .bind(action.as_str())
        .bind(record.source_system.as_str())
        .bind(changes)
        .execute(&mut **tx)
        .await
        .map_err(|e| EtlError::database_error(format!("audit append failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), EtlError> {
        if self.pool.lock().is_some() {
            return Ok(());
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .idle_timeout(IDLE_TIMEOUT)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&self.database_url)
            .await
            .map_err(|e| {
                EtlError::destination_unavailable(format!(
                    "connecting destination '{}' failed: {}",
                    self.name, e
                ))
            })?;

        debug!(destination = %self.name, "connection pool established");
        *self.pool.lock() = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EtlError> {
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.close().await;
            debug!(destination = %self.name, "connection pool closed");
        }
        Ok(())
    }

    async fn begin_run(&self, run_id: Uuid) -> Result<(), EtlError> {
        *self.run_id.lock() = Some(run_id);
        Ok(())
    }

    async fn record_run(&self, run: &PipelineRun) -> Result<(), EtlError> {
        let pool = self.pool()?;
        let changes = serde_json::to_value(run)?;

        sqlx::query(
            "INSERT INTO etl_audit_log (run_id, record_id, action, source_system, changes, created_at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(run.run_id)
        .bind(run.run_id.to_string())
        .bind("RUN")
        .bind("UNIFIED")
        .bind(changes)
        .execute(&pool)
        .await
        .map_err(|e| EtlError::database_error(format!("run record append failed: {}", e)))?;

        Ok(())
    }

    async fn load_batch(&self, records: &[LandRecord]) -> Result<LoadResult, EtlError> {
        let pool = self.pool()?;
        let started = Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| EtlError::load_batch_error(format!("opening transaction failed: {}", e)))?;

        // Bulk existence lookup over the whole batch.
        let ids: Vec<String> = records.iter().map(|record| record.id.clone()).collect();
        let rows = sqlx::query("SELECT id FROM land_records WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| EtlError::load_batch_error(format!("existence lookup failed: {}", e)))?;
        let existing: HashMap<String, bool> = rows
            .into_iter()
            .map(|row| (row.get::<String, _>("id"), true))
            .collect();

        let mut result = LoadResult::default();

        for record in records {
            if let Err(validation) = record.validate() {
                debug!(record = %record.id, error = %validation, "record skipped by validation");
                result.records_skipped += 1;
                continue;
            }

            let exists = existing.contains_key(&record.id);
            match self.upsert_record(&mut tx, record, exists).await {
                Ok(UpsertAction::Inserted) => result.records_loaded += 1,
                Ok(UpsertAction::Updated) => result.records_updated += 1,
                Err(error) => {
                    // Per-record failures stay inside the transaction.
                    warn!(record = %record.id, error = %error, "record failed within batch");
                    result.errors.push(LoadError {
                        record_id: record.id.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::load_batch_error(format!("commit failed: {}", e)))?;

        result.duration = Some(started.elapsed());
        Ok(result)
    }
}

/// WKT for a point, longitude first.
fn point_wkt(point: &Coordinates) -> String {
    format!("POINT({} {})", point.longitude, point.latitude)
}

/// WKT for a polygon ring, auto-closing when the input ring is open.
fn polygon_wkt(ring: &[Coordinates]) -> String {
    let mut vertices: Vec<String> = ring
        .iter()
        .map(|v| format!("{} {}", v.longitude, v.latitude))
        .collect();
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first != last {
            vertices.push(format!("{} {}", first.longitude, first.latitude));
        }
    }
    format!("POLYGON(({}))", vertices.join(", "))
}

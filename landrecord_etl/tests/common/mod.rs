// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared in-memory sources and destinations for end-to-end pipeline
//! tests. The destination models the canonical upsert semantics (insert
//! with version 1, update with version + 1, audit entries per action) so
//! idempotence properties can be asserted without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use landrecord_etl_domain::entities::land_record::{LandRecord, SourceSystem};
use landrecord_etl_domain::services::destination::{Destination, LoadResult};
use landrecord_etl_domain::services::source_adapter::{
    PageRequest, RawLandRecord, RawOwner, SourceAdapter, SourceFilter, SourcePage,
    SourcePagination,
};
use landrecord_etl_domain::EtlError;

/// Scripted source: serves a fixed record set page by page, optionally
/// failing the first N calls with a transient error.
pub struct ScriptedSource {
    name: String,
    system: SourceSystem,
    records: Vec<RawLandRecord>,
    page_size: usize,
    fail_first_calls: u32,
    fail_message: String,
    calls: AtomicU32,
    filters_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl ScriptedSource {
    pub fn new(
        name: impl Into<String>,
        system: SourceSystem,
        records: Vec<RawLandRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            system,
            records,
            page_size: 100,
            fail_first_calls: 0,
            fail_message: "ECONNRESET".to_string(),
            calls: AtomicU32::new(0),
            filters_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fails the first `n` query calls with a transient error.
    pub fn failing_first(mut self, n: u32, message: impl Into<String>) -> Self {
        self.fail_first_calls = n;
        self.fail_message = message.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `updated_after` filters received, one per successful page call.
    pub fn filters_seen(&self) -> Vec<Option<DateTime<Utc>>> {
        self.filters_seen.lock().clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_system(&self) -> SourceSystem {
        self.system
    }

    fn batch_size(&self) -> usize {
        self.page_size
    }

    async fn query(
        &self,
        filter: &SourceFilter,
        page: PageRequest,
    ) -> Result<SourcePage, EtlError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first_calls {
            return Err(EtlError::source_unavailable(self.fail_message.clone()));
        }
        self.filters_seen.lock().push(filter.updated_after);

        let end = (page.offset + page.limit).min(self.records.len());
        let records = if page.offset < self.records.len() {
            self.records[page.offset..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(SourcePage {
            records,
            pagination: SourcePagination {
                total: Some(self.records.len() as u64),
                has_more: end < self.records.len(),
            },
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<RawLandRecord>, EtlError> {
        Ok(self
            .records
            .iter()
            .find(|record| record.id.as_deref() == Some(id))
            .cloned())
    }
}

/// One persisted row in the in-memory destination.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub record: LandRecord,
    pub version: i64,
}

/// In-memory destination modelling the canonical upsert semantics.
#[derive(Default)]
pub struct MemoryDestination {
    name: String,
    rows: Mutex<HashMap<String, StoredRow>>,
    audit: Mutex<Vec<(String, String)>>,
    fail_first_batches: AtomicU32,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fails the first `n` batch loads with a transient error.
    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first_batches.store(n, Ordering::SeqCst);
        self
    }

    pub fn rows(&self) -> Vec<StoredRow> {
        self.rows.lock().values().cloned().collect()
    }

    pub fn row(&self, id: &str) -> Option<StoredRow> {
        self.rows.lock().get(id).cloned()
    }

    pub fn row_by_parcel(&self, parcel: &str) -> Option<StoredRow> {
        self.rows
            .lock()
            .values()
            .find(|row| row.record.parcel_number == parcel)
            .cloned()
    }

    /// `(record_id, action)` audit entries in write order.
    pub fn audit(&self) -> Vec<(String, String)> {
        self.audit.lock().clone()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), EtlError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EtlError> {
        Ok(())
    }

    async fn load_batch(&self, records: &[LandRecord]) -> Result<LoadResult, EtlError> {
        let remaining = self.fail_first_batches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_batches.store(remaining - 1, Ordering::SeqCst);
            return Err(EtlError::load_batch_error("connection reset by peer"));
        }

        let mut result = LoadResult::default();
        let mut rows = self.rows.lock();
        let mut audit = self.audit.lock();

        for record in records {
            if record.validate().is_err() {
                result.records_skipped += 1;
                continue;
            }

            match rows.get_mut(&record.id) {
                Some(existing) => {
                    existing.version += 1;
                    existing.record = record.clone();
                    audit.push((record.id.clone(), "UPDATE".to_string()));
                    result.records_updated += 1;
                }
                None => {
                    rows.insert(
                        record.id.clone(),
                        StoredRow {
                            record: record.clone(),
                            version: 1,
                        },
                    );
                    audit.push((record.id.clone(), "INSERT".to_string()));
                    result.records_loaded += 1;
                }
            }
        }

        Ok(result)
    }
}

/// Raw record builder with the common fields filled in.
pub fn raw_record(parcel: &str, owner: &str, area: f64) -> RawLandRecord {
    RawLandRecord {
        parcel_number: parcel.to_string(),
        owner: Some(RawOwner {
            name: Some(owner.to_string()),
            ..Default::default()
        }),
        area: Some(area),
        ..Default::default()
    }
}

/// A raw record complete enough to carry no quality issues except the
/// ones a test injects.
pub fn complete_raw_record(parcel: &str, owner: &str, area: f64) -> RawLandRecord {
    let mut record = raw_record(parcel, owner, area);
    record.owner.as_mut().unwrap().national_id = Some(format!("SL{:08}", parcel.len() * 1111));
    record.owner.as_mut().unwrap().phone_number = Some("076123456".to_string());
    record.latitude = Some(8.48);
    record.longitude = Some(-13.23);
    record.title_deed_number = Some(format!("TD-{}", parcel.len()));
    record
}

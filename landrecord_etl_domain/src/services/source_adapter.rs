// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Adapter Port
//!
//! The extraction boundary of the pipeline. Concrete adapters (HTTP and
//! database clients to the land authority, revenue authority and registry)
//! live outside the core; the extractor drives this trait and never sees
//! transport details.
//!
//! ## Contract
//!
//! - [`SourceAdapter::query`] pages through the source with limit/offset
//!   paging. The returned [`SourcePagination`] reports `has_more` and an
//!   optional `total`; a source that cannot estimate its total returns
//!   `None` and progress is reported as unknown.
//! - `updated_after` on [`SourceFilter`] is the incremental watermark;
//!   `None` means a full extraction.
//! - Adapters return [`RawLandRecord`] values: a deliberately loose input
//!   shape, distinct from the canonical [`LandRecord`](crate::entities::land_record::LandRecord),
//!   that the normalizer tightens into the domain model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::land_record::SourceSystem;
use crate::error::EtlError;
use crate::value_objects::parcel_number::ParcelNumber;

/// Filter passed to [`SourceAdapter::query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFilter {
    /// Incremental watermark: only records updated strictly after this
    /// instant are requested. `None` requests everything.
    pub updated_after: Option<DateTime<Utc>>,
}

/// Limit/offset paging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    /// The request for the page after `returned` records came back.
    pub fn advance(&self, returned: usize) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset + returned,
        }
    }
}

/// Pagination metadata accompanying one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePagination {
    /// Total matching records, when the source can estimate it.
    pub total: Option<u64>,
    pub has_more: bool,
}

/// One page of raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePage {
    pub records: Vec<RawLandRecord>,
    pub pagination: SourcePagination,
}

/// Raw owner block as delivered by a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOwner {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// Raw previous-owner interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPreviousOwner {
    pub name: String,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

/// Raw structure entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStructure {
    pub structure_type: String,
    pub year_built: Option<i32>,
    pub condition: Option<String>,
}

/// Raw dispute entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDispute {
    pub dispute_type: String,
    pub status: Option<String>,
    pub filed_date: Option<DateTime<Utc>>,
}

/// Loosely-typed source record, before normalization.
///
/// Every field a source may or may not deliver is optional; string fields
/// arrive in whatever casing and formatting the source uses. The
/// normalizer owns the rules that turn this into a canonical record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLandRecord {
    pub id: Option<String>,
    pub parcel_number: String,
    pub district: Option<String>,
    pub chiefdom: Option<String>,
    pub ward: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Ordered (latitude, longitude) vertices, when the source has a
    /// surveyed boundary.
    pub boundaries: Option<Vec<(f64, f64)>>,
    pub owner: Option<RawOwner>,
    pub previous_owners: Vec<RawPreviousOwner>,
    pub land_type: Option<String>,
    pub area: Option<f64>,
    pub land_use: Option<String>,
    pub structures: Vec<RawStructure>,
    pub current_value: Option<f64>,
    pub last_valuation_date: Option<DateTime<Utc>>,
    pub tax_assessment: Option<f64>,
    pub title_deed_number: Option<String>,
    pub encumbrances: Vec<String>,
    pub disputes: Vec<RawDispute>,
    pub tax_status: Option<String>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub arrears_amount: Option<f64>,
    pub verification_status: Option<String>,
    pub last_verification_date: Option<DateTime<Utc>>,
    pub verification_method: Option<String>,
    pub version: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Extraction port implemented by every source system client.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short stable name, used for breaker names, metrics labels and logs.
    fn name(&self) -> &str;

    /// Which authoritative system this adapter reads.
    fn source_system(&self) -> SourceSystem;

    /// Page size the extractor should request from this source.
    fn batch_size(&self) -> usize {
        100
    }

    /// Fetches one page of raw records.
    async fn query(&self, filter: &SourceFilter, page: PageRequest) -> Result<SourcePage, EtlError>;

    /// Point lookup by source record id.
    async fn get_by_id(&self, id: &str) -> Result<Option<RawLandRecord>, EtlError>;

    /// Gate applied to each record before normalization. Rejected records
    /// are collected as extraction errors and do not fail the stream.
    fn is_valid_record(&self, record: &RawLandRecord) -> bool {
        !ParcelNumber::canonicalize(&record.parcel_number).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_advances_by_returned() {
        let page = PageRequest::first(50);
        let next = page.advance(50);
        assert_eq!(next.offset, 50);
        assert_eq!(next.limit, 50);
    }

    #[test]
    fn test_default_validity_gate_requires_parcel() {
        struct Probe;

        #[async_trait]
        impl SourceAdapter for Probe {
            fn name(&self) -> &str {
                "probe"
            }
            fn source_system(&self) -> SourceSystem {
                SourceSystem::Registry
            }
            async fn query(
                &self,
                _filter: &SourceFilter,
                _page: PageRequest,
            ) -> Result<SourcePage, EtlError> {
                unimplemented!()
            }
            async fn get_by_id(&self, _id: &str) -> Result<Option<RawLandRecord>, EtlError> {
                unimplemented!()
            }
        }

        let adapter = Probe;
        let mut record = RawLandRecord {
            parcel_number: "wa/kai/01/0001".into(),
            ..Default::default()
        };
        assert!(adapter.is_valid_record(&record));

        record.parcel_number = " .. ".into();
        assert!(!adapter.is_valid_record(&record));
    }
}

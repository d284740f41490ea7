// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services and Ports
//!
//! Pure domain services with concrete logic:
//!
//! - [`normalizer::RecordNormalizer`]: raw record → canonical record plus
//!   quality issues
//! - [`merge_policy::MergePolicy`]: one parcel group → one `UNIFIED` record
//!
//! Infrastructure ports (traits implemented outside the domain):
//!
//! - [`source_adapter::SourceAdapter`]: paging extraction boundary
//! - [`destination::Destination`]: transactional load boundary
//! - [`encryption_service::EncryptionService`]: PII protection
//! - [`alert_service::AlertSink`]: alert delivery
//!
//! I/O-bound ports are `async_trait`; pure services are sync.

pub mod alert_service;
pub mod destination;
pub mod encryption_service;
pub mod merge_policy;
pub mod normalizer;
pub mod source_adapter;

pub use alert_service::{Alert, AlertSink, AlertType};
pub use destination::{Destination, LoadError, LoadResult};
pub use encryption_service::EncryptionService;
pub use merge_policy::{MergePolicy, MergedRecord};
pub use normalizer::{NormalizedRecord, RecordNormalizer};
pub use source_adapter::{
    PageRequest, RawDispute, RawLandRecord, RawOwner, RawPreviousOwner, RawStructure,
    SourceAdapter, SourceFilter, SourcePage, SourcePagination,
};

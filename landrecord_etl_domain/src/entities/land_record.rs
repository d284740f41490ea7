// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Land Record Entity
//!
//! The canonical land-record entity: one record per parcel per source until
//! the merge stage reconciles them into a single `UNIFIED` record.
//!
//! ## Overview
//!
//! A [`LandRecord`] carries:
//!
//! - **Identity**: a stable `id` plus the business key `parcel_number`
//!   (globally unique after canonicalization)
//! - **Provenance**: originating [`SourceSystem`], monotonic `version`,
//!   created/updated timestamps
//! - **Location**: administrative hierarchy, optional point coordinates,
//!   optional polygon boundary
//! - **Ownership**: the current [`Owner`] and an ordered history of
//!   [`PreviousOwner`] intervals
//! - **Property / Valuation / Legal / Tax / Verification** attribute groups
//! - **Quality**: a `quality_score` in `[0, 100]`
//!
//! ## Invariants
//!
//! [`LandRecord::validate`] enforces the persistence invariants:
//!
//! - `area > 0`
//! - coordinates, when present, lie inside the configured region bounds
//!   (latitude `[6.9, 10.0]`, longitude `[-13.5, -10.2]`)
//! - a boundary polygon, when present, has at least three vertices, each
//!   inside the region bounds
//! - the parcel number is non-empty in canonical form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EtlError;
use crate::value_objects::parcel_number::ParcelNumber;

/// Latitude bounds of the target region, inclusive.
pub const LATITUDE_BOUNDS: (f64, f64) = (6.9, 10.0);

/// Longitude bounds of the target region, inclusive.
pub const LONGITUDE_BOUNDS: (f64, f64) = (-13.5, -10.2);

/// Authoritative system a record originated from.
///
/// Merge priority is `LandAuthority > RevenueAuthority > Registry`;
/// `Unified` marks an already-merged record and outranks all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSystem {
    LandAuthority,
    RevenueAuthority,
    Registry,
    Unified,
}

impl SourceSystem {
    /// Merge priority, higher wins. `Unified` inputs are already merged
    /// and therefore outrank everything.
    pub fn priority(&self) -> u8 {
        match self {
            SourceSystem::Unified => 3,
            SourceSystem::LandAuthority => 2,
            SourceSystem::RevenueAuthority => 1,
            SourceSystem::Registry => 0,
        }
    }

    /// Canonical wire name, matching the persisted `source_system` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::LandAuthority => "LAND_AUTHORITY",
            SourceSystem::RevenueAuthority => "REVENUE_AUTHORITY",
            SourceSystem::Registry => "REGISTRY",
            SourceSystem::Unified => "UNIFIED",
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enumerated land usage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandType {
    Residential,
    Commercial,
    Agricultural,
    Industrial,
    Mixed,
}

impl LandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LandType::Residential => "residential",
            LandType::Commercial => "commercial",
            LandType::Agricultural => "agricultural",
            LandType::Industrial => "industrial",
            LandType::Mixed => "mixed",
        }
    }
}

/// Tax compliance status of a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxStatus {
    Compliant,
    Arrears,
    Exempt,
    Pending,
}

impl TaxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxStatus::Compliant => "compliant",
            TaxStatus::Arrears => "arrears",
            TaxStatus::Exempt => "exempt",
            TaxStatus::Pending => "pending",
        }
    }
}

/// Verification status of a parcel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Pending,
    Disputed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Disputed => "disputed",
        }
    }
}

/// Geographic point, WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Checks the point against the target-region bounds.
    pub fn in_region_bounds(&self) -> bool {
        self.latitude >= LATITUDE_BOUNDS.0
            && self.latitude <= LATITUDE_BOUNDS.1
            && self.longitude >= LONGITUDE_BOUNDS.0
            && self.longitude <= LONGITUDE_BOUNDS.1
    }
}

/// Current owner of a parcel. `national_id`, `phone_number` and `email`
/// are PII: encrypted at rest with sibling hash columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub national_id: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// One historical ownership interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousOwner {
    pub name: String,
    pub from_date: DateTime<Utc>,
    pub to_date: Option<DateTime<Utc>>,
}

/// A structure standing on the parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub structure_type: String,
    pub year_built: Option<i32>,
    pub condition: Option<String>,
}

/// A recorded dispute against the parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_type: String,
    pub status: String,
    pub filed_date: DateTime<Utc>,
}

/// Canonical land-record entity.
///
/// One instance exists per parcel per source until the merge stage folds
/// them into a single record with `source_system = Unified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandRecord {
    // Identity
    pub id: String,
    pub parcel_number: String,

    // Provenance
    pub source_system: SourceSystem,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Location
    pub district: String,
    pub chiefdom: String,
    pub ward: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub boundaries: Option<Vec<Coordinates>>,

    // Ownership
    pub owner: Owner,
    pub previous_owners: Vec<PreviousOwner>,

    // Property
    pub land_type: LandType,
    pub area: f64,
    pub land_use: Option<String>,
    pub structures: Vec<Structure>,

    // Valuation
    pub current_value: Option<f64>,
    pub last_valuation_date: Option<DateTime<Utc>>,
    pub tax_assessment: Option<f64>,

    // Legal
    pub title_deed_number: Option<String>,
    pub encumbrances: Vec<String>,
    pub disputes: Vec<Dispute>,

    // Tax
    pub tax_status: TaxStatus,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub arrears_amount: Option<f64>,

    // Verification
    pub verification_status: VerificationStatus,
    pub last_verification_date: Option<DateTime<Utc>>,
    pub verification_method: Option<String>,

    // Quality
    pub quality_score: u8,
}

impl LandRecord {
    /// Validates the persistence invariants.
    ///
    /// Returns the first violated invariant as a `ValidationError`; a
    /// record that passes is safe to hand to a loader.
    pub fn validate(&self) -> Result<(), EtlError> {
        if self.id.trim().is_empty() {
            return Err(EtlError::validation_error("record id must not be empty"));
        }

        let parcel = ParcelNumber::new(&self.parcel_number)?;
        if parcel.as_str() != self.parcel_number {
            return Err(EtlError::validation_error(format!(
                "parcel number '{}' is not in canonical form",
                self.parcel_number
            )));
        }

        if !(self.area > 0.0) {
            return Err(EtlError::validation_error(format!(
                "area must be positive, got {} for parcel {}",
                self.area, self.parcel_number
            )));
        }

        if let Some(coordinates) = &self.coordinates {
            if !coordinates.in_region_bounds() {
                return Err(EtlError::validation_error(format!(
                    "coordinates ({}, {}) outside region bounds for parcel {}",
                    coordinates.latitude, coordinates.longitude, self.parcel_number
                )));
            }
        }

        if let Some(boundaries) = &self.boundaries {
            if boundaries.len() < 3 {
                return Err(EtlError::validation_error(format!(
                    "boundary polygon needs at least 3 vertices, got {} for parcel {}",
                    boundaries.len(),
                    self.parcel_number
                )));
            }
            if let Some(vertex) = boundaries.iter().find(|v| !v.in_region_bounds()) {
                return Err(EtlError::validation_error(format!(
                    "boundary vertex ({}, {}) outside region bounds for parcel {}",
                    vertex.latitude, vertex.longitude, self.parcel_number
                )));
            }
        }

        if self.owner.name.trim().is_empty() {
            return Err(EtlError::validation_error(format!(
                "owner name must not be empty for parcel {}",
                self.parcel_number
            )));
        }

        if self.quality_score > 100 {
            return Err(EtlError::validation_error(format!(
                "quality score {} out of range for parcel {}",
                self.quality_score, self.parcel_number
            )));
        }

        Ok(())
    }

    /// True once the record has been reconciled across sources.
    pub fn is_unified(&self) -> bool {
        self.source_system == SourceSystem::Unified
    }
}

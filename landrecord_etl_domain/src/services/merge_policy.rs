// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Policy
//!
//! Cross-source reconciliation of records sharing one canonical parcel
//! number into a single `UNIFIED` record.
//!
//! ## Decision Table
//!
//! | Field group                         | Primary            | Strategy                 |
//! |-------------------------------------|--------------------|--------------------------|
//! | location, core ownership, type/area | LAND_AUTHORITY     | primary wins             |
//! | tax status, payments, valuation     | REVENUE_AUTHORITY  | non-null override        |
//! | deeds, encumbrances, prior owners   | REGISTRY           | non-null override, union |
//! | owner contact (phone/email)         | REVENUE_AUTHORITY  | supplement only          |
//!
//! Source priority, high to low: `LAND_AUTHORITY`, `REVENUE_AUTHORITY`,
//! `REGISTRY`; already-unified inputs outrank everything. The merged
//! record's version is `max(source versions) + 1` and its quality score is
//! the primary's score plus per-source bonuses, capped at 100.
//!
//! The policy is a pure fold over one parcel group; the streaming window
//! that feeds it groups records without holding whole sources in memory.

use chrono::Utc;

use crate::entities::land_record::{LandRecord, SourceSystem, TaxStatus};
use crate::entities::quality::{IssueCategory, QualityIssue, QualitySeverity};
use crate::error::EtlError;

/// Default base score when the primary record carries no score of its own.
const DEFAULT_BASE_SCORE: u8 = 70;

/// Plausible tax-assessment-per-square-metre band; values outside it are
/// flagged as an inconsistency.
const ASSESSMENT_PER_SQM_BOUNDS: (f64, f64) = (10.0, 10_000.0);

/// Outcome of merging one parcel group.
#[derive(Debug, Clone)]
pub struct MergedRecord {
    pub record: LandRecord,
    pub issues: Vec<QualityIssue>,
}

/// Pure cross-source merge policy. Stateless; one instance serves the
/// whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct MergePolicy;

impl MergePolicy {
    pub fn new() -> Self {
        Self
    }

    /// Folds all records of one parcel group into a single `UNIFIED`
    /// record.
    ///
    /// The group must be non-empty and share one canonical parcel number;
    /// the merge stage guarantees both.
    pub fn merge_group(&self, mut records: Vec<LandRecord>) -> Result<MergedRecord, EtlError> {
        if records.is_empty() {
            return Err(EtlError::internal_error("cannot merge an empty parcel group"));
        }

        // Highest priority first; newer update wins inside one source.
        records.sort_by(|a, b| {
            b.source_system
                .priority()
                .cmp(&a.source_system.priority())
                .then(b.updated_at.cmp(&a.updated_at))
        });

        let parcel_number = records[0].parcel_number.clone();
        if records
            .iter()
            .any(|record| record.parcel_number != parcel_number)
        {
            return Err(EtlError::internal_error(format!(
                "merge group mixes parcel numbers (expected {})",
                parcel_number
            )));
        }

        let source_count = {
            let mut systems: Vec<SourceSystem> =
                records.iter().map(|record| record.source_system).collect();
            systems.dedup();
            systems.len()
        };
        let max_version = records.iter().map(|record| record.version).max().unwrap_or(1);

        let primary = records[0].clone();
        let revenue = find_source(&records, SourceSystem::RevenueAuthority);
        let registry = find_source(&records, SourceSystem::Registry);
        let land_authority = find_source(&records, SourceSystem::LandAuthority);

        // Location, core ownership, land type and area come from the
        // primary record wholesale.
        let mut merged = primary.clone();

        self.apply_tax_and_valuation(&mut merged, revenue, land_authority);
        self.apply_legal(&mut merged, registry);
        self.apply_contact(&mut merged, revenue, land_authority);

        merged.source_system = SourceSystem::Unified;
        merged.version = max_version + 1;
        merged.updated_at = Utc::now();
        merged.quality_score = merged_score(&primary, source_count);

        let issues = self.consistency_issues(&merged, registry.is_some());

        Ok(MergedRecord {
            record: merged,
            issues,
        })
    }

    /// Tax and valuation group: `REVENUE_AUTHORITY` is authoritative;
    /// the land authority supplements valuation fields when its valuation
    /// is newer.
    fn apply_tax_and_valuation(
        &self,
        merged: &mut LandRecord,
        revenue: Option<&LandRecord>,
        land_authority: Option<&LandRecord>,
    ) {
        if let Some(revenue) = revenue {
            merged.tax_status = revenue.tax_status;
            override_option(&mut merged.last_payment_date, revenue.last_payment_date);
            override_option(&mut merged.arrears_amount, revenue.arrears_amount);
            override_option(&mut merged.current_value, revenue.current_value);
            override_option(&mut merged.tax_assessment, revenue.tax_assessment);
            override_option(&mut merged.last_valuation_date, revenue.last_valuation_date);
        }

        // Newer land-authority valuation overrides the revenue figures.
        if let (Some(land), Some(revenue)) = (land_authority, revenue) {
            let land_newer = match (land.last_valuation_date, revenue.last_valuation_date) {
                (Some(l), Some(r)) => l > r,
                (Some(_), None) => true,
                _ => false,
            };
            if land_newer {
                override_option(&mut merged.current_value, land.current_value);
                override_option(&mut merged.tax_assessment, land.tax_assessment);
                override_option(&mut merged.last_valuation_date, land.last_valuation_date);
            }
        }
    }

    /// Legal group: `REGISTRY` supplies deeds and history; arrays are
    /// set-unioned, previous owners de-duplicated on `(name, from_date)`
    /// and sorted ascending.
    fn apply_legal(&self, merged: &mut LandRecord, registry: Option<&LandRecord>) {
        let Some(registry) = registry else {
            // Single pass even without a registry record: history must
            // still come out deduplicated and ordered.
            dedup_previous_owners(merged);
            return;
        };

        if registry.title_deed_number.is_some() {
            merged.title_deed_number = registry.title_deed_number.clone();
        }

        for encumbrance in &registry.encumbrances {
            if !merged.encumbrances.contains(encumbrance) {
                merged.encumbrances.push(encumbrance.clone());
            }
        }

        merged
            .previous_owners
            .extend(registry.previous_owners.iter().cloned());
        dedup_previous_owners(merged);

        for dispute in &registry.disputes {
            let seen = merged.disputes.iter().any(|existing| {
                existing.dispute_type == dispute.dispute_type
                    && existing.filed_date == dispute.filed_date
            });
            if !seen {
                merged.disputes.push(dispute.clone());
            }
        }
    }

    /// Contact group: phone and email supplement from the revenue
    /// authority; the owner's name always stays with the land authority
    /// (the primary) when present.
    fn apply_contact(
        &self,
        merged: &mut LandRecord,
        revenue: Option<&LandRecord>,
        land_authority: Option<&LandRecord>,
    ) {
        if let Some(revenue) = revenue {
            override_option(
                &mut merged.owner.phone_number,
                revenue.owner.phone_number.clone(),
            );
            override_option(&mut merged.owner.email, revenue.owner.email.clone());
            override_option(
                &mut merged.owner.national_id,
                revenue.owner.national_id.clone(),
            );
        }
        if let Some(land) = land_authority {
            merged.owner.name = land.owner.name.clone();
            if merged.owner.national_id.is_none() {
                merged.owner.national_id = land.owner.national_id.clone();
            }
        }
    }

    /// Post-merge consistency checks, emitted as quality issues.
    fn consistency_issues(&self, merged: &LandRecord, registry_present: bool) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        if let Some(assessment) = merged.tax_assessment {
            if merged.area > 0.0 {
                let per_sqm = assessment / merged.area;
                if per_sqm < ASSESSMENT_PER_SQM_BOUNDS.0 || per_sqm > ASSESSMENT_PER_SQM_BOUNDS.1 {
                    issues.push(
                        QualityIssue::new(
                            "tax_assessment",
                            "tax assessment implausible for parcel area",
                            IssueCategory::Inconsistent,
                            QualitySeverity::Medium,
                        )
                        .with_example(format!("{:.2}/sqm", per_sqm)),
                    );
                }
            }
        }

        if registry_present && merged.title_deed_number.is_none() {
            issues.push(
                QualityIssue::new(
                    "title_deed_number",
                    "no title deed despite registry record",
                    IssueCategory::Inconsistent,
                    QualitySeverity::High,
                )
                .with_example(merged.parcel_number.clone()),
            );
        }

        if merged.tax_status == TaxStatus::Pending {
            issues.push(
                QualityIssue::new(
                    "tax_status",
                    "tax status unresolved after merge",
                    IssueCategory::Inconsistent,
                    QualitySeverity::Medium,
                )
                .with_example(merged.parcel_number.clone()),
            );
        }

        issues
    }
}

fn find_source(records: &[LandRecord], system: SourceSystem) -> Option<&LandRecord> {
    // Records arrive sorted newest-first per source.
    records.iter().find(|record| record.source_system == system)
}

fn override_option<T>(target: &mut Option<T>, candidate: Option<T>) {
    if candidate.is_some() {
        *target = candidate;
    }
}

fn dedup_previous_owners(merged: &mut LandRecord) {
    merged
        .previous_owners
        .sort_by(|a, b| a.from_date.cmp(&b.from_date).then(a.name.cmp(&b.name)));
    merged
        .previous_owners
        .dedup_by(|a, b| a.name == b.name && a.from_date == b.from_date);
}

/// Merged quality score: primary's score (default 70) plus 10 per
/// additional source, plus a 5-per-source bonus when more than one source
/// contributed, capped at 100.
fn merged_score(primary: &LandRecord, source_count: usize) -> u8 {
    let base = if primary.quality_score == 0 {
        DEFAULT_BASE_SCORE
    } else {
        primary.quality_score
    };
    let mut score = base as u32 + 10 * (source_count.saturating_sub(1) as u32);
    if source_count > 1 {
        score += 5 * source_count as u32;
    }
    score.min(100) as u8
}

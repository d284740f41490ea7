// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Normalizer
//!
//! Pure per-record transformation from a loose [`RawLandRecord`] into a
//! canonical [`LandRecord`] plus the quality issues discovered on the way.
//!
//! ## Field Rules
//!
//! - **parcel number**: canonicalized through
//!   [`ParcelNumber`](crate::value_objects::parcel_number::ParcelNumber)
//! - **district**: synonym table to the canonical district name; unknown
//!   values pass through trimmed
//! - **chiefdom / owner name**: title-cased and trimmed
//! - **national id**: stripped to word characters, uppercased, then must
//!   be 8-15 alphanumerics containing a digit; an invalid value is dropped
//!   and recorded as a high-severity issue
//! - **phone**: stripped to digits, country code prepended when missing,
//!   emitted as `+232<subscriber>`; subscriber must be eight digits
//! - **land type**: synonym table onto the enumerated set; unknown maps
//!   to `mixed`
//! - **numerics** (`area`, `current_value`, `tax_assessment`,
//!   `arrears_amount`): NaN or negative becomes 0, otherwise rounded to
//!   two decimals
//! - **updated_at**: stamped "now" on every normalization
//!
//! A record whose area ends up non-positive is still emitted (with the
//! critical issue recorded) so batch quality reflects it; the loader's
//! validation gate skips it before persistence.

use chrono::Utc;

use crate::entities::land_record::{
    Coordinates, Dispute, LandRecord, LandType, Owner, PreviousOwner, SourceSystem, Structure,
    TaxStatus, VerificationStatus,
};
use crate::entities::quality::{IssueCategory, QualityIssue, QualitySeverity};
use crate::error::EtlError;
use crate::services::source_adapter::RawLandRecord;
use crate::value_objects::parcel_number::ParcelNumber;

/// Country calling code prepended to subscriber numbers.
const COUNTRY_CODE: &str = "232";

/// Years after which an unrefreshed verification is considered stale.
const VERIFICATION_STALE_YEARS: i64 = 5;

/// Canonical district names and their known variants, keyed on the
/// squashed uppercase form of the variant.
const DISTRICT_SYNONYMS: &[(&str, &str)] = &[
    ("WESTERNAREA", "Western Area Urban"),
    ("WESTERNAREAURBAN", "Western Area Urban"),
    ("WESTERNURBAN", "Western Area Urban"),
    ("FREETOWN", "Western Area Urban"),
    ("WESTERNAREARURAL", "Western Area Rural"),
    ("WESTERNRURAL", "Western Area Rural"),
    ("PORTLOKO", "Port Loko"),
    ("PORTLOCKO", "Port Loko"),
    ("BO", "Bo"),
    ("BOMBALI", "Bombali"),
    ("BONTHE", "Bonthe"),
    ("FALABA", "Falaba"),
    ("KAILAHUN", "Kailahun"),
    ("KAMBIA", "Kambia"),
    ("KARENE", "Karene"),
    ("KENEMA", "Kenema"),
    ("KOINADUGU", "Koinadugu"),
    ("KONO", "Kono"),
    ("MOYAMBA", "Moyamba"),
    ("PUJEHUN", "Pujehun"),
    ("TONKOLILI", "Tonkolili"),
];

/// Land-type variants, keyed on the squashed uppercase form.
const LAND_TYPE_SYNONYMS: &[(&str, LandType)] = &[
    ("RESIDENTIAL", LandType::Residential),
    ("HOME", LandType::Residential),
    ("HOUSE", LandType::Residential),
    ("DWELLING", LandType::Residential),
    ("COMMERCIAL", LandType::Commercial),
    ("BUSINESS", LandType::Commercial),
    ("SHOP", LandType::Commercial),
    ("OFFICE", LandType::Commercial),
    ("AGRICULTURAL", LandType::Agricultural),
    ("AGRIC", LandType::Agricultural),
    ("FARM", LandType::Agricultural),
    ("FARMING", LandType::Agricultural),
    ("FARMLAND", LandType::Agricultural),
    ("INDUSTRIAL", LandType::Industrial),
    ("FACTORY", LandType::Industrial),
    ("WAREHOUSE", LandType::Industrial),
    ("MIXED", LandType::Mixed),
    ("MIXEDUSE", LandType::Mixed),
];

/// Output of one normalization: the canonical record and the issues
/// discovered while producing it.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub record: LandRecord,
    pub issues: Vec<QualityIssue>,
}

/// Pure normalizer. Stateless; safe to share across extraction tasks.
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes one raw record.
    ///
    /// Returns a `TransformError` when no canonical record can be built at
    /// all (unusable parcel number or missing owner name); every other
    /// deficiency becomes a quality issue on the emitted record.
    pub fn normalize(
        &self,
        source: SourceSystem,
        raw: &RawLandRecord,
    ) -> Result<NormalizedRecord, EtlError> {
        let mut issues = Vec::new();

        let parcel = ParcelNumber::new(&raw.parcel_number).map_err(|e| {
            EtlError::transform_error(format!("unusable parcel number: {}", e))
        })?;

        let owner_name = raw
            .owner
            .as_ref()
            .and_then(|o| o.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                EtlError::transform_error(format!(
                    "record for parcel {} has no owner name",
                    parcel
                ))
            })?;

        let national_id = self.normalize_national_id(raw, &parcel, &mut issues);
        let phone_number = self.normalize_phone(raw, &parcel, &mut issues);
        let email = raw
            .owner
            .as_ref()
            .and_then(|o| o.email.as_deref())
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty());

        let coordinates = self.normalize_coordinates(raw, &parcel, &mut issues);
        let boundaries = self.normalize_boundaries(raw, &parcel, &mut issues);

        let area = round2(sanitize_numeric(raw.area.unwrap_or(0.0)));
        if area <= 0.0 {
            issues.push(
                QualityIssue::new(
                    "area",
                    "area is zero or negative",
                    IssueCategory::Invalid,
                    QualitySeverity::Critical,
                )
                .with_example(parcel.as_str()),
            );
        }

        let title_deed_number = raw
            .title_deed_number
            .as_deref()
            .map(str::trim)
            .filter(|deed| !deed.is_empty())
            .map(|deed| deed.to_ascii_uppercase());
        if title_deed_number.is_none() {
            issues.push(QualityIssue::new(
                "title_deed_number",
                "missing title deed number",
                IssueCategory::Missing,
                QualitySeverity::Medium,
            ));
        }

        let last_verification_date = raw.last_verification_date;
        if let Some(verified_at) = last_verification_date {
            let age = Utc::now().signed_duration_since(verified_at);
            if age.num_days() > VERIFICATION_STALE_YEARS * 365 {
                issues.push(
                    QualityIssue::new(
                        "last_verification_date",
                        "verification older than five years",
                        IssueCategory::Stale,
                        QualitySeverity::Medium,
                    )
                    .with_example(parcel.as_str()),
                );
            }
        }

        let now = Utc::now();
        let mut record = LandRecord {
            id: raw
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}:{}", source.as_str(), parcel.as_str())),
            parcel_number: parcel.as_str().to_string(),
            source_system: source,
            version: raw.version.unwrap_or(1).max(1),
            created_at: raw.created_at.unwrap_or(now),
            updated_at: now,
            district: self.normalize_district(raw.district.as_deref()),
            chiefdom: title_case(raw.chiefdom.as_deref().unwrap_or("").trim()),
            ward: clean_optional(&raw.ward),
            address: clean_optional(&raw.address),
            coordinates,
            boundaries,
            owner: Owner {
                name: title_case(owner_name),
                national_id,
                phone_number,
                email,
            },
            previous_owners: raw
                .previous_owners
                .iter()
                .filter_map(|prev| {
                    prev.from_date.map(|from_date| PreviousOwner {
                        name: title_case(prev.name.trim()),
                        from_date,
                        to_date: prev.to_date,
                    })
                })
                .collect(),
            land_type: self.normalize_land_type(raw.land_type.as_deref()),
            area,
            land_use: clean_optional(&raw.land_use),
            structures: raw
                .structures
                .iter()
                .map(|s| Structure {
                    structure_type: s.structure_type.trim().to_ascii_lowercase(),
                    year_built: s.year_built,
                    condition: s.condition.as_deref().map(|c| c.trim().to_ascii_lowercase()),
                })
                .collect(),
            current_value: raw.current_value.map(|v| round2(sanitize_numeric(v))),
            last_valuation_date: raw.last_valuation_date,
            tax_assessment: raw.tax_assessment.map(|v| round2(sanitize_numeric(v))),
            title_deed_number,
            encumbrances: raw
                .encumbrances
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            disputes: raw
                .disputes
                .iter()
                .filter_map(|d| {
                    d.filed_date.map(|filed_date| Dispute {
                        dispute_type: d.dispute_type.trim().to_ascii_lowercase(),
                        status: d
                            .status
                            .as_deref()
                            .unwrap_or("open")
                            .trim()
                            .to_ascii_lowercase(),
                        filed_date,
                    })
                })
                .collect(),
            tax_status: parse_tax_status(raw.tax_status.as_deref()),
            last_payment_date: raw.last_payment_date,
            arrears_amount: raw.arrears_amount.map(|v| round2(sanitize_numeric(v))),
            verification_status: parse_verification_status(raw.verification_status.as_deref()),
            last_verification_date,
            verification_method: clean_optional(&raw.verification_method),
            quality_score: 0,
        };

        record.quality_score = record_score(&issues);

        Ok(NormalizedRecord { record, issues })
    }

    fn normalize_district(&self, raw: Option<&str>) -> String {
        let trimmed = raw.unwrap_or("").trim();
        let key = squash_key(trimmed);
        DISTRICT_SYNONYMS
            .iter()
            .find(|(variant, _)| *variant == key)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or_else(|| trimmed.to_string())
    }

    fn normalize_land_type(&self, raw: Option<&str>) -> LandType {
        let key = squash_key(raw.unwrap_or(""));
        LAND_TYPE_SYNONYMS
            .iter()
            .find(|(variant, _)| *variant == key)
            .map(|(_, land_type)| *land_type)
            .unwrap_or(LandType::Mixed)
    }

    fn normalize_national_id(
        &self,
        raw: &RawLandRecord,
        parcel: &ParcelNumber,
        issues: &mut Vec<QualityIssue>,
    ) -> Option<String> {
        let raw_id = raw.owner.as_ref().and_then(|o| o.national_id.as_deref());
        let Some(raw_id) = raw_id else {
            issues.push(
                QualityIssue::new(
                    "owner.national_id",
                    "missing national id",
                    IssueCategory::Missing,
                    QualitySeverity::High,
                )
                .with_example(parcel.as_str()),
            );
            return None;
        };

        let cleaned: String = raw_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let valid = (8..=15).contains(&cleaned.len()) && cleaned.chars().any(|c| c.is_ascii_digit());
        if valid {
            Some(cleaned)
        } else {
            issues.push(
                QualityIssue::new(
                    "owner.national_id",
                    "national id failed format check",
                    IssueCategory::Invalid,
                    QualitySeverity::High,
                )
                .with_example(raw_id),
            );
            None
        }
    }

    fn normalize_phone(
        &self,
        raw: &RawLandRecord,
        parcel: &ParcelNumber,
        issues: &mut Vec<QualityIssue>,
    ) -> Option<String> {
        let raw_phone = raw.owner.as_ref().and_then(|o| o.phone_number.as_deref());
        let Some(raw_phone) = raw_phone else {
            issues.push(
                QualityIssue::new(
                    "owner.phone_number",
                    "missing phone number",
                    IssueCategory::Missing,
                    QualitySeverity::Medium,
                )
                .with_example(parcel.as_str()),
            );
            return None;
        };

        let digits: String = raw_phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let subscriber = if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
            rest.to_string()
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest.to_string()
        } else {
            digits
        };

        // Sierra Leone subscriber numbers are eight digits.
        if subscriber.len() == 8 && subscriber.chars().next().is_some_and(|c| ('2'..='9').contains(&c)) {
            Some(format!("+{}{}", COUNTRY_CODE, subscriber))
        } else {
            issues.push(
                QualityIssue::new(
                    "owner.phone_number",
                    "phone number failed region rules",
                    IssueCategory::Invalid,
                    QualitySeverity::Medium,
                )
                .with_example(raw_phone),
            );
            None
        }
    }

    fn normalize_coordinates(
        &self,
        raw: &RawLandRecord,
        parcel: &ParcelNumber,
        issues: &mut Vec<QualityIssue>,
    ) -> Option<Coordinates> {
        match (raw.latitude, raw.longitude) {
            (Some(latitude), Some(longitude)) => {
                let point = Coordinates::new(latitude, longitude);
                if point.in_region_bounds() {
                    Some(point)
                } else {
                    issues.push(
                        QualityIssue::new(
                            "coordinates",
                            "coordinates outside region bounds",
                            IssueCategory::Invalid,
                            QualitySeverity::High,
                        )
                        .with_example(format!("({}, {})", latitude, longitude)),
                    );
                    None
                }
            }
            _ => {
                issues.push(
                    QualityIssue::new(
                        "coordinates",
                        "no geographic location",
                        IssueCategory::Missing,
                        QualitySeverity::High,
                    )
                    .with_example(parcel.as_str()),
                );
                None
            }
        }
    }

    fn normalize_boundaries(
        &self,
        raw: &RawLandRecord,
        parcel: &ParcelNumber,
        issues: &mut Vec<QualityIssue>,
    ) -> Option<Vec<Coordinates>> {
        let vertices = raw.boundaries.as_ref()?;
        let boundary: Vec<Coordinates> = vertices
            .iter()
            .map(|(lat, lng)| Coordinates::new(*lat, *lng))
            .collect();

        if boundary.len() >= 3 && boundary.iter().all(|v| v.in_region_bounds()) {
            Some(boundary)
        } else {
            issues.push(
                QualityIssue::new(
                    "boundaries",
                    "boundary polygon rejected",
                    IssueCategory::Invalid,
                    QualitySeverity::Medium,
                )
                .with_example(parcel.as_str()),
            );
            None
        }
    }
}

/// Per-record quality score from the issues found during normalization.
fn record_score(issues: &[QualityIssue]) -> u8 {
    let penalty: u32 = issues
        .iter()
        .map(|issue| issue.severity.record_penalty() as u32)
        .sum();
    100u32.saturating_sub(penalty) as u8
}

fn sanitize_numeric(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else {
        value
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clean_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Squashes a variant to its lookup key: uppercase alphanumerics only.
fn squash_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_tax_status(raw: Option<&str>) -> TaxStatus {
    match squash_key(raw.unwrap_or("")).as_str() {
        "COMPLIANT" | "PAID" | "CURRENT" => TaxStatus::Compliant,
        "ARREARS" | "OVERDUE" | "DELINQUENT" => TaxStatus::Arrears,
        "EXEMPT" | "EXEMPTED" => TaxStatus::Exempt,
        _ => TaxStatus::Pending,
    }
}

fn parse_verification_status(raw: Option<&str>) -> VerificationStatus {
    match squash_key(raw.unwrap_or("")).as_str() {
        "VERIFIED" | "CONFIRMED" => VerificationStatus::Verified,
        "DISPUTED" | "CONTESTED" => VerificationStatus::Disputed,
        _ => VerificationStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::source_adapter::RawOwner;

    fn raw(parcel: &str, owner: &str) -> RawLandRecord {
        RawLandRecord {
            parcel_number: parcel.to_string(),
            owner: Some(RawOwner {
                name: Some(owner.to_string()),
                ..Default::default()
            }),
            area: Some(100.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_values_normalize() {
        let normalizer = RecordNormalizer::new();

        let mut first = raw("wa/kai/01/0001", "JOHN doe");
        first.district = Some("Western Area".to_string());
        first.land_type = Some("HOME".to_string());
        let first = normalizer
            .normalize(SourceSystem::LandAuthority, &first)
            .unwrap()
            .record;
        assert_eq!(first.parcel_number, "WA/KAI/01/0001");
        assert_eq!(first.district, "Western Area Urban");
        assert_eq!(first.owner.name, "John Doe");
        assert_eq!(first.land_type, LandType::Residential);

        let mut second = raw("wa/kai/01/0002", "mary SMITH");
        second.district = Some("PORTLOKO".to_string());
        second.land_type = Some("FARMING".to_string());
        second.area = Some(200.0);
        let second = normalizer
            .normalize(SourceSystem::LandAuthority, &second)
            .unwrap()
            .record;
        assert_eq!(second.parcel_number, "WA/KAI/01/0002");
        assert_eq!(second.district, "Port Loko");
        assert_eq!(second.owner.name, "Mary Smith");
        assert_eq!(second.land_type, LandType::Agricultural);
        assert_eq!(second.area, 200.0);
    }

    #[test]
    fn test_unknown_district_passes_through_trimmed() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/1", "A");
        record.district = Some("  Atlantis  ".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::Registry, &record)
            .unwrap();
        assert_eq!(normalized.record.district, "Atlantis");
    }

    #[test]
    fn test_invalid_national_id_dropped_with_high_issue() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/2", "A");
        record.owner.as_mut().unwrap().national_id = Some("ab-12".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert!(normalized.record.owner.national_id.is_none());
        assert!(normalized.issues.iter().any(|issue| {
            issue.field == "owner.national_id" && issue.severity == QualitySeverity::High
        }));
    }

    #[test]
    fn test_valid_national_id_cleaned() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/3", "A");
        record.owner.as_mut().unwrap().national_id = Some("sl-1234-5678".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(
            normalized.record.owner.national_id.as_deref(),
            Some("SL12345678")
        );
    }

    #[test]
    fn test_phone_gets_country_code() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/4", "A");
        record.owner.as_mut().unwrap().phone_number = Some("076 123 456".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(
            normalized.record.owner.phone_number.as_deref(),
            Some("+23276123456")
        );
    }

    #[test]
    fn test_phone_with_country_code_unchanged() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/5", "A");
        record.owner.as_mut().unwrap().phone_number = Some("+232 76 123 456".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(
            normalized.record.owner.phone_number.as_deref(),
            Some("+23276123456")
        );
    }

    #[test]
    fn test_negative_area_becomes_zero_with_critical_issue() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/6", "A");
        record.area = Some(-50.0);
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(normalized.record.area, 0.0);
        assert!(normalized
            .issues
            .iter()
            .any(|issue| issue.severity == QualitySeverity::Critical));
    }

    #[test]
    fn test_numeric_rounding() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/7", "A");
        record.area = Some(123.456_789);
        record.current_value = Some(1000.009);
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(normalized.record.area, 123.46);
        assert_eq!(normalized.record.current_value, Some(1000.01));
    }

    #[test]
    fn test_out_of_bounds_coordinates_dropped() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/8", "A");
        record.latitude = Some(51.5);
        record.longitude = Some(-0.12);
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert!(normalized.record.coordinates.is_none());
    }

    #[test]
    fn test_unknown_land_type_maps_to_mixed() {
        let normalizer = RecordNormalizer::new();
        let mut record = raw("p/9", "A");
        record.land_type = Some("SPACEPORT".to_string());
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &record)
            .unwrap();
        assert_eq!(normalized.record.land_type, LandType::Mixed);
    }

    #[test]
    fn test_missing_owner_name_is_transform_error() {
        let normalizer = RecordNormalizer::new();
        let record = RawLandRecord {
            parcel_number: "p/10".to_string(),
            ..Default::default()
        };
        let result = normalizer.normalize(SourceSystem::LandAuthority, &record);
        assert!(matches!(result, Err(EtlError::TransformError(_))));
    }

    #[test]
    fn test_missing_fields_recorded_as_issues() {
        let normalizer = RecordNormalizer::new();
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &raw("p/11", "A"))
            .unwrap();
        let fields: Vec<&str> = normalized
            .issues
            .iter()
            .map(|issue| issue.field.as_str())
            .collect();
        assert!(fields.contains(&"owner.national_id"));
        assert!(fields.contains(&"owner.phone_number"));
        assert!(fields.contains(&"coordinates"));
        assert!(fields.contains(&"title_deed_number"));
    }

    #[test]
    fn test_record_score_reflects_issues() {
        let normalizer = RecordNormalizer::new();
        let normalized = normalizer
            .normalize(SourceSystem::LandAuthority, &raw("p/12", "A"))
            .unwrap();
        // missing national id (15) + phone (7) + coordinates (15) + deed (7)
        assert_eq!(normalized.record.quality_score, 56);
    }
}

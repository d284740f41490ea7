// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Data Quality Model
//!
//! Quality issues and batch-level quality scoring for normalized records.
//!
//! ## Scoring Model
//!
//! A [`QualityReport`] aggregates issues across one batch, de-duplicated on
//! `(field, issue)` with a capped example list. The overall score is a
//! weighted average of five dimensions, each in `[0, 1]`:
//!
//! | Dimension    | Weight | Base  |
//! |--------------|--------|-------|
//! | completeness | 0.30   | 1.00  |
//! | accuracy     | 0.30   | 0.90  |
//! | consistency  | 0.20   | 0.85  |
//! | timeliness   | 0.10   | 1.00  |
//! | uniqueness   | 0.10   | 1.00  |
//!
//! Each issue is assigned an [`IssueCategory`] that maps it onto one
//! dimension; the dimension drops from its base by the severity-weighted
//! issue count per record, clamped to `[0, 1]`.

use serde::{Deserialize, Serialize};

/// Maximum number of example values retained per aggregated issue.
const MAX_ISSUE_EXAMPLES: usize = 5;

/// Severity of a quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl QualitySeverity {
    /// Weight applied when a dimension is reduced by an issue of this
    /// severity.
    pub fn dimension_weight(&self) -> f64 {
        match self {
            QualitySeverity::Low => 0.25,
            QualitySeverity::Medium => 0.5,
            QualitySeverity::High => 1.0,
            QualitySeverity::Critical => 1.0,
        }
    }

    /// Penalty subtracted from a single record's 0-100 quality score.
    pub fn record_penalty(&self) -> u8 {
        match self {
            QualitySeverity::Low => 3,
            QualitySeverity::Medium => 7,
            QualitySeverity::High => 15,
            QualitySeverity::Critical => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualitySeverity::Low => "low",
            QualitySeverity::Medium => "medium",
            QualitySeverity::High => "high",
            QualitySeverity::Critical => "critical",
        }
    }
}

/// Dimension an issue counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    /// A required or expected field is absent (completeness).
    Missing,
    /// A present value failed a format or range rule (accuracy).
    Invalid,
    /// The record is out of date (timeliness).
    Stale,
    /// Cross-field or cross-source contradiction (consistency).
    Inconsistent,
    /// Duplicate business key within the batch (uniqueness).
    Duplicate,
}

/// One aggregated quality issue within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub field: String,
    pub issue: String,
    pub category: IssueCategory,
    pub severity: QualitySeverity,
    pub count: u64,
    pub examples: Vec<String>,
}

impl QualityIssue {
    pub fn new(
        field: impl Into<String>,
        issue: impl Into<String>,
        category: IssueCategory,
        severity: QualitySeverity,
    ) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
            category,
            severity,
            count: 1,
            examples: Vec::new(),
        }
    }

    /// Attaches an example value, respecting the cap.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        if self.examples.len() < MAX_ISSUE_EXAMPLES {
            self.examples.push(example.into());
        }
        self
    }
}

/// The five scored dimensions, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityDimensions {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub uniqueness: f64,
}

impl QualityDimensions {
    /// Weighted average across the five dimensions.
    pub fn weighted_score(&self) -> f64 {
        0.30 * self.completeness
            + 0.30 * self.accuracy
            + 0.20 * self.consistency
            + 0.10 * self.timeliness
            + 0.10 * self.uniqueness
    }
}

/// Batch-level quality aggregation.
///
/// Issues are de-duplicated on `(field, issue)`: repeated reports bump the
/// count and extend the example list up to the cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    records: u64,
    issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that one more record passed through the batch.
    pub fn record_seen(&mut self) {
        self.records += 1;
    }

    /// Number of records in the batch.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Aggregated issues, de-duplicated on `(field, issue)`.
    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    /// Adds an issue occurrence, merging with an existing `(field, issue)`
    /// entry when present.
    pub fn add_issue(&mut self, issue: QualityIssue) {
        if let Some(existing) = self
            .issues
            .iter_mut()
            .find(|existing| existing.field == issue.field && existing.issue == issue.issue)
        {
            existing.count += issue.count;
            for example in issue.examples {
                if existing.examples.len() >= MAX_ISSUE_EXAMPLES {
                    break;
                }
                existing.examples.push(example);
            }
        } else {
            self.issues.push(issue);
        }
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: QualityReport) {
        self.records += other.records;
        for issue in other.issues {
            self.add_issue(issue);
        }
    }

    /// Computes the five dimensions from the aggregated issues.
    pub fn dimensions(&self) -> QualityDimensions {
        if self.records == 0 {
            return QualityDimensions {
                completeness: 1.0,
                accuracy: 0.90,
                consistency: 0.85,
                timeliness: 1.0,
                uniqueness: 1.0,
            };
        }

        let records = self.records as f64;
        let weighted = |category: IssueCategory| -> f64 {
            self.issues
                .iter()
                .filter(|issue| issue.category == category)
                .map(|issue| issue.severity.dimension_weight() * issue.count as f64)
                .sum::<f64>()
                / records
        };

        QualityDimensions {
            completeness: clamp01(1.0 - weighted(IssueCategory::Missing)),
            accuracy: clamp01(0.90 - weighted(IssueCategory::Invalid)),
            consistency: clamp01(0.85 - weighted(IssueCategory::Inconsistent)),
            timeliness: clamp01(1.0 - weighted(IssueCategory::Stale)),
            uniqueness: clamp01(1.0 - weighted(IssueCategory::Duplicate)),
        }
    }

    /// Weighted overall score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        self.dimensions().weighted_score()
    }

    /// Overall score as a 0-100 integer.
    pub fn score_percent(&self) -> u8 {
        (self.score() * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

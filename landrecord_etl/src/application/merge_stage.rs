// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Merge Stage
//!
//! Groups normalized records by canonical parcel number inside a bounded
//! window and hands complete groups to the
//! [`MergePolicy`](landrecord_etl_domain::services::merge_policy::MergePolicy).
//!
//! ## Windowing
//!
//! The stage never holds whole sources in memory:
//!
//! - a group is emitted as soon as every expected source has contributed
//! - when the window is full, the oldest group is emitted as-is
//!   (single-source emission is allowed; stragglers for that parcel reach
//!   the destination as an UPDATE in a later run)
//! - end-of-input flushes all remaining groups in arrival order
//!
//! Each parcel number is emitted at most once per run; records arriving
//! for an already-emitted parcel are dropped and counted.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use landrecord_etl_domain::entities::land_record::{LandRecord, SourceSystem};
use landrecord_etl_domain::services::merge_policy::{MergePolicy, MergedRecord};
use landrecord_etl_domain::EtlError;

/// Bounded grouping window over the normalized record stream.
pub struct MergeStage {
    policy: MergePolicy,
    expected_sources: HashSet<SourceSystem>,
    window_capacity: usize,
    groups: HashMap<String, Vec<LandRecord>>,
    arrival_order: VecDeque<String>,
    emitted: HashSet<String>,
    late_records: u64,
}

impl MergeStage {
    pub fn new(
        policy: MergePolicy,
        expected_sources: HashSet<SourceSystem>,
        window_capacity: usize,
    ) -> Self {
        Self {
            policy,
            expected_sources,
            window_capacity: window_capacity.max(1),
            groups: HashMap::new(),
            arrival_order: VecDeque::new(),
            emitted: HashSet::new(),
            late_records: 0,
        }
    }

    /// Records dropped because their parcel was already emitted this run.
    pub fn late_records(&self) -> u64 {
        self.late_records
    }

    /// Parcel groups currently buffered.
    pub fn buffered_groups(&self) -> usize {
        self.groups.len()
    }

    /// Accepts one normalized record; returns zero, one or two merged
    /// records (a completed group, plus possibly an evicted oldest group).
    pub fn push(&mut self, record: LandRecord) -> Result<Vec<MergedRecord>, EtlError> {
        let parcel = record.parcel_number.clone();

        if self.emitted.contains(&parcel) {
            self.late_records += 1;
            warn!(parcel = %parcel, "record for already-emitted parcel dropped");
            return Ok(Vec::new());
        }

        let group = self.groups.entry(parcel.clone()).or_insert_with(|| {
            self.arrival_order.push_back(parcel.clone());
            Vec::new()
        });
        group.push(record);

        let mut output = Vec::new();

        if self.group_complete(&parcel) {
            output.push(self.emit(&parcel)?);
        } else if self.groups.len() > self.window_capacity {
            if let Some(oldest) = self.oldest_pending() {
                debug!(parcel = %oldest, "window full, evicting oldest group");
                output.push(self.emit(&oldest)?);
            }
        }

        Ok(output)
    }

    /// Emits every remaining group in arrival order. Called once at
    /// end-of-input.
    pub fn flush(&mut self) -> Result<Vec<MergedRecord>, EtlError> {
        let mut output = Vec::new();
        while let Some(parcel) = self.oldest_pending() {
            output.push(self.emit(&parcel)?);
        }
        Ok(output)
    }

    fn group_complete(&self, parcel: &str) -> bool {
        let Some(group) = self.groups.get(parcel) else {
            return false;
        };
        let present: HashSet<SourceSystem> =
            group.iter().map(|record| record.source_system).collect();
        self.expected_sources
            .iter()
            .all(|expected| present.contains(expected))
    }

    fn oldest_pending(&mut self) -> Option<String> {
        while let Some(parcel) = self.arrival_order.front().cloned() {
            if self.groups.contains_key(&parcel) {
                return Some(parcel);
            }
            // Already emitted; drop the stale ordering entry.
            self.arrival_order.pop_front();
        }
        None
    }

    fn emit(&mut self, parcel: &str) -> Result<MergedRecord, EtlError> {
        let group = self
            .groups
            .remove(parcel)
            .ok_or_else(|| EtlError::internal_error(format!("no group buffered for {}", parcel)))?;
        self.emitted.insert(parcel.to_string());
        self.policy.merge_group(group)
    }
}

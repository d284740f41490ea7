// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Error types for the land-records ETL domain. The taxonomy distinguishes
//! per-record failures (recorded, never aborting a run), stage failures
//! (failing one source or destination while the run continues), resilience
//! rejections (retry exhaustion, open breakers), caller mistakes, and
//! fatal conditions that abort the run.
//!
//! All pipeline operations return `Result<T, EtlError>` and propagate with
//! the `?` operator; the orchestrator decides at each boundary whether a
//! failure is survivable.

pub mod etl_error;

pub use etl_error::EtlError;

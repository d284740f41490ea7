// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations of the domain's ports plus the cross-cutting
//! machinery the pipeline runs on: resilience (retry, circuit breakers),
//! observability (Prometheus metrics and the scrape endpoint), PII
//! encryption, Postgres persistence, and task runtime utilities.

pub mod adapters;
pub mod alerts;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod repositories;
pub mod resilience;
pub mod runtime;

// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Land Records ETL Engine
//!
//! Fault-tolerant, resumable, streaming ETL core for reconciling land
//! records from multiple authoritative government sources into a single
//! canonical record per parcel.
//!
//! ## Layers
//!
//! - **application**: the orchestrator (fan-out extraction, normalization,
//!   streaming merge, fan-out loading), the paginating extractor, and the
//!   bounded merge window
//! - **infrastructure**: retry and circuit breakers, Prometheus metrics
//!   with a scrape endpoint, AES-GCM PII encryption, the Postgres loader
//!   and watermark store, task supervision and cooperative cancellation
//!
//! Domain types and ports live in the `landrecord_etl_domain` crate; the
//! engine depends on sources, destinations, alert sinks and encryption
//! only through those ports.
//!
//! ## Quick Start
//!
//! ```ignore
//! let metrics = Arc::new(EtlMetricsService::new()?);
//! let orchestrator = Orchestrator::new(
//!     EtlSettings::default(),
//!     sources,
//!     destinations,
//!     Arc::new(MemoryWatermarkRepository::new()),
//!     Arc::new(TracingAlertSink::new()),
//!     metrics.clone(),
//! );
//!
//! tokio::spawn({
//!     let endpoint = MetricsEndpoint::from_env(metrics);
//!     async move { endpoint.start().await }
//! });
//!
//! let run = orchestrator.run(RunMode::Incremental).await?;
//! ```

pub mod application;
pub mod infrastructure;

pub use application::{Orchestrator, RunSnapshot};
pub use infrastructure::config::EtlSettings;
pub use infrastructure::metrics::{EtlMetricsService, MetricsEndpoint};

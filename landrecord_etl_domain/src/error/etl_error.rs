// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the land-records
//! ETL domain. It categorizes failures along the boundaries the pipeline
//! cares about: per-record, per-batch, per-source, and fatal.
//!
//! ## Error Architecture
//!
//! ### Per-Record Errors
//! - **ValidationError**: A record failed an invariant and was skipped
//! - **TransformError**: Normalization or merge of one record failed
//!
//! ### Stage Errors
//! - **SourceUnavailable**: An extraction stream failed permanently
//! - **DestinationUnavailable**: A loader is unreachable or its breaker open
//! - **LoadBatchError**: A transactional batch rolled back
//!
//! ### Resilience Errors
//! - **RetryExhausted**: A retryable operation ran out of attempts
//! - **BreakerOpen**: A circuit breaker rejected the call immediately
//! - **TimeoutError**: An operation exceeded its per-call budget
//!
//! ### Caller Errors
//! - **AlreadyRunning**: `run()` called while a run is in flight
//! - **InvalidMode**: Unsupported run mode requested
//!
//! ### Fatal Errors
//! - **FatalError**: Unrecoverable condition (missing schema, bad key
//!   material); aborts the run
//!
//! ## Retryable Classification
//!
//! [`EtlError::is_retryable`] implements the transient-error contract:
//! network faults, timeouts, connection resets, 429/502/503 responses and
//! "temporarily unavailable" conditions are retryable; everything else is
//! permanent and re-thrown immediately by the retry executor.

use thiserror::Error;

/// Domain-specific errors for the land-records ETL pipeline.
///
/// Each variant carries a descriptive message. Variants map onto the
/// propagation boundaries of the pipeline: per-record errors are recorded
/// and never abort a run, stage errors fail one source or destination, and
/// fatal errors abort the run.
#[derive(Error, Debug, Clone)]
pub enum EtlError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transform error: {0}")]
    TransformError(String),

    #[error("Load batch failed: {0}")]
    LoadBatchError(String),

    #[error("Circuit breaker '{0}' is open")]
    BreakerOpen(String),

    #[error("Retry attempts exhausted: {0}")]
    RetryExhausted(String),

    #[error("Pipeline already running: {0}")]
    AlreadyRunning(String),

    #[error("Invalid run mode: {0}")]
    InvalidMode(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Watermark error: {0}")]
    WatermarkError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Fatal error: {0}")]
    FatalError(String),
}

impl EtlError {
    /// Creates a new source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Creates a new destination-unavailable error
    pub fn destination_unavailable(msg: impl Into<String>) -> Self {
        Self::DestinationUnavailable(msg.into())
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new transform error
    pub fn transform_error(msg: impl Into<String>) -> Self {
        Self::TransformError(msg.into())
    }

    /// Creates a new load batch error
    pub fn load_batch_error(msg: impl Into<String>) -> Self {
        Self::LoadBatchError(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout_error(msg: impl Into<String>) -> Self {
        Self::TimeoutError(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new encryption error
    pub fn encryption_error(msg: impl Into<String>) -> Self {
        Self::EncryptionError(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new watermark error
    pub fn watermark_error(msg: impl Into<String>) -> Self {
        Self::WatermarkError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new fatal error
    pub fn fatal_error(msg: impl Into<String>) -> Self {
        Self::FatalError(msg.into())
    }

    /// Checks whether the error is transient and safe to retry.
    ///
    /// Classification follows the retry executor contract: transient
    /// network and availability faults are retryable; validation,
    /// caller and fatal errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            EtlError::TimeoutError(_) | EtlError::IoError(_) => true,
            EtlError::SourceUnavailable(msg)
            | EtlError::DestinationUnavailable(msg)
            | EtlError::DatabaseError(msg)
            | EtlError::LoadBatchError(msg)
            | EtlError::InternalError(msg) => is_transient_message(msg),
            _ => false,
        }
    }

    /// Checks whether the error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::FatalError(_))
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            EtlError::SourceUnavailable(_) => "source",
            EtlError::DestinationUnavailable(_) => "destination",
            EtlError::ValidationError(_) => "validation",
            EtlError::TransformError(_) => "transform",
            EtlError::LoadBatchError(_) => "load",
            EtlError::BreakerOpen(_) => "breaker",
            EtlError::RetryExhausted(_) => "retry",
            EtlError::AlreadyRunning(_) => "caller",
            EtlError::InvalidMode(_) => "caller",
            EtlError::TimeoutError(_) => "timeout",
            EtlError::Cancelled(_) => "cancellation",
            EtlError::EncryptionError(_) => "encryption",
            EtlError::DatabaseError(_) => "database",
            EtlError::SerializationError(_) => "serialization",
            EtlError::WatermarkError(_) => "watermark",
            EtlError::MetricsError(_) => "metrics",
            EtlError::IoError(_) => "io",
            EtlError::InternalError(_) => "internal",
            EtlError::FatalError(_) => "fatal",
        }
    }
}

/// Message-level transient fault detection.
///
/// Source adapters surface upstream failures as strings; the well-known
/// transient signatures (network faults, throttling, gateway errors) are
/// recognized here so the retry executor can classify wrapped errors.
fn is_transient_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    const TRANSIENT_MARKERS: &[&str] = &[
        "econnreset",
        "econnrefused",
        "etimedout",
        "timeout",
        "timed out",
        "connection reset",
        "broken pipe",
        "temporarily unavailable",
        "too many requests",
        "429",
        "502",
        "503",
    ];
    TRANSIENT_MARKERS.iter().any(|marker| msg.contains(marker))
}

// Implement conversion from standard library errors
impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::SerializationError(err.to_string())
    }
}

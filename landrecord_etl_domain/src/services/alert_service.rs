// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Sink Port
//!
//! The pipeline emits structured alerts at stage failures and quality
//! regressions. Delivery transports (email, SMS, webhooks) are external
//! collaborators behind [`AlertSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::quality::QualitySeverity;
use crate::error::EtlError;

/// Kind of alert being raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Warning,
    Error,
}

/// A structured alert emitted by the pipeline core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: QualitySeverity,
    pub title: String,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub metadata: Option<serde_json::Value>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: QualitySeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            timestamp: Utc::now(),
            resolved: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Alert delivery port. Failures to deliver are the sink's problem; the
/// pipeline logs and moves on.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: Alert) -> Result<(), EtlError>;
}

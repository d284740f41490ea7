// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Sinks
//!
//! In-process implementations of the domain's `AlertSink` port. Real
//! delivery transports (email, SMS, webhooks) are external collaborators;
//! these sinks cover logging and testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use landrecord_etl_domain::services::alert_service::{Alert, AlertSink, AlertType};
use landrecord_etl_domain::EtlError;

/// Sink that logs alerts through `tracing` at a severity-mapped level.
#[derive(Debug, Clone, Default)]
pub struct TracingAlertSink;

impl TracingAlertSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send(&self, alert: Alert) -> Result<(), EtlError> {
        match alert.alert_type {
            AlertType::Error => error!(
                alert_id = %alert.id,
                severity = alert.severity.as_str(),
                source = %alert.source,
                title = %alert.title,
                "{}",
                alert.message
            ),
            AlertType::Warning => warn!(
                alert_id = %alert.id,
                severity = alert.severity.as_str(),
                source = %alert.source,
                title = %alert.title,
                "{}",
                alert.message
            ),
            AlertType::Info => info!(
                alert_id = %alert.id,
                severity = alert.severity.as_str(),
                source = %alert.source,
                title = %alert.title,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Sink that retains alerts in memory; test double.
#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertSink for CollectingAlertSink {
    async fn send(&self, alert: Alert) -> Result<(), EtlError> {
        self.alerts.lock().push(alert);
        Ok(())
    }
}

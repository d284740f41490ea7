// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end pipeline runs over in-memory sources and destinations:
//! single-source loads, cross-source merges, retry and breaker behavior,
//! idempotent re-loads, watermark advancement and quality alerting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use landrecord_etl::application::Orchestrator;
use landrecord_etl::infrastructure::alerts::CollectingAlertSink;
use landrecord_etl::infrastructure::config::EtlSettings;
use landrecord_etl::infrastructure::metrics::EtlMetricsService;
use landrecord_etl::infrastructure::repositories::MemoryWatermarkRepository;
use landrecord_etl::infrastructure::resilience::{BreakerState, RetryExecutor, RetryPolicy};
use landrecord_etl_domain::entities::land_record::{LandType, SourceSystem, TaxStatus};
use landrecord_etl_domain::entities::pipeline_run::{RunMode, RunStatus};
use landrecord_etl_domain::services::alert_service::AlertType;
use landrecord_etl_domain::services::destination::Destination;
use landrecord_etl_domain::services::source_adapter::{
    PageRequest, RawLandRecord, SourceAdapter, SourceFilter, SourcePage, SourcePagination,
};
use landrecord_etl_domain::EtlError;

use common::{complete_raw_record, raw_record, MemoryDestination, ScriptedSource};

fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        ..Default::default()
    })
}

fn orchestrator(
    sources: Vec<Arc<dyn SourceAdapter>>,
    destinations: Vec<Arc<dyn Destination>>,
    alerts: Arc<CollectingAlertSink>,
) -> Orchestrator {
    let mut settings = EtlSettings::default();
    settings.politeness_delay = Duration::from_millis(1);
    Orchestrator::new(
        settings,
        sources,
        destinations,
        Arc::new(MemoryWatermarkRepository::new()),
        alerts,
        Arc::new(EtlMetricsService::new().unwrap()),
    )
    .with_retry(fast_retry())
}

fn assert_monotonic_counts(metrics: &landrecord_etl_domain::entities::pipeline_run::RunMetrics) {
    assert!(
        metrics.records_extracted >= metrics.records_transformed,
        "extracted {} < transformed {}",
        metrics.records_extracted,
        metrics.records_transformed
    );
    assert!(
        metrics.records_transformed
            >= metrics.records_loaded + metrics.records_updated + metrics.records_failed,
        "transformed {} < loaded {} + updated {} + failed {}",
        metrics.records_transformed,
        metrics.records_loaded,
        metrics.records_updated,
        metrics.records_failed
    );
}

#[tokio::test]
async fn test_single_source_end_to_end() {
    let mut first = raw_record("wa/kai/01/0001", "JOHN doe", 100.0);
    first.district = Some("Western Area".to_string());
    first.land_type = Some("HOME".to_string());
    let mut second = raw_record("wa/kai/01/0002", "mary SMITH", 200.0);
    second.district = Some("PORTLOKO".to_string());
    second.land_type = Some("FARMING".to_string());

    let source = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        vec![first, second],
    ));
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![source.clone()],
        vec![destination.clone()],
        alerts.clone(),
    );

    let mut events = orchestrator.subscribe();
    let run = orchestrator.run(RunMode::Full).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metrics.records_extracted, 2);
    assert_eq!(run.metrics.records_transformed, 2);
    assert_eq!(run.metrics.records_loaded, 2);
    assert_eq!(run.metrics.records_failed, 0);
    assert_monotonic_counts(&run.metrics);

    let first = destination.row_by_parcel("WA/KAI/01/0001").unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(first.record.district, "Western Area Urban");
    assert_eq!(first.record.owner.name, "John Doe");
    assert_eq!(first.record.land_type, LandType::Residential);
    assert_eq!(first.record.source_system, SourceSystem::Unified);

    let second = destination.row_by_parcel("WA/KAI/01/0002").unwrap();
    assert_eq!(second.version, 1);
    assert_eq!(second.record.district, "Port Loko");
    assert_eq!(second.record.owner.name, "Mary Smith");
    assert_eq!(second.record.land_type, LandType::Agricultural);

    // Lifecycle events reached subscribers in order.
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type().to_string());
    }
    assert_eq!(seen.first().map(String::as_str), Some("run.start"));
    assert!(seen.iter().any(|t| t == "extract.complete"));
    assert!(seen.iter().any(|t| t == "transform.complete"));
    assert!(seen.iter().any(|t| t == "load.complete"));
    assert_eq!(seen.last().map(String::as_str), Some("run.complete"));

    // Status is back to IDLE after the terminal state published.
    assert_eq!(orchestrator.status().0, RunStatus::Idle);
}

#[tokio::test]
async fn test_cross_source_merge() {
    let mut land = raw_record("P/1", "A", 150.0);
    land.land_type = Some("residential".to_string());
    land.tax_status = Some("pending".to_string());

    let mut revenue = raw_record("P/1", "Someone Else", 150.0);
    revenue.tax_status = Some("arrears".to_string());
    revenue.arrears_amount = Some(1200.0);

    let land_source = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        vec![land],
    ));
    let revenue_source = Arc::new(ScriptedSource::new(
        "nra",
        SourceSystem::RevenueAuthority,
        vec![revenue],
    ));
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![land_source, revenue_source],
        vec![destination.clone()],
        alerts,
    );

    let run = orchestrator.run(RunMode::Full).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_monotonic_counts(&run.metrics);

    let row = destination.row_by_parcel("P/1").unwrap();
    assert_eq!(row.version, 1);
    let merged = &row.record;
    assert_eq!(merged.source_system, SourceSystem::Unified);
    assert_eq!(merged.owner.name, "A");
    assert_eq!(merged.tax_status, TaxStatus::Arrears);
    assert_eq!(merged.arrears_amount, Some(1200.0));
    // Two source versions of 1 each bump the merged record to 2.
    assert_eq!(merged.version, 2);
    // Primary score plus the two-source bonuses.
    assert!(merged.quality_score >= 56 + 15);
}

#[tokio::test]
async fn test_transient_source_failures_are_retried() {
    let source = Arc::new(
        ScriptedSource::new(
            "flaky",
            SourceSystem::LandAuthority,
            vec![raw_record("P/7", "A", 90.0)],
        )
        .failing_first(2, "ECONNRESET"),
    );
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![source.clone()],
        vec![destination.clone()],
        alerts,
    );

    let run = orchestrator.run(RunMode::Full).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metrics.records_loaded, 1);
    assert_eq!(run.metrics.retries, 2);
    // Two failures, then the successful page call.
    assert_eq!(source.calls(), 3);
    assert!(destination.row_by_parcel("P/7").is_some());

    let snapshot = orchestrator
        .breakers()
        .snapshots()
        .into_iter()
        .find(|snapshot| snapshot.name == "extractor-flaky")
        .unwrap();
    assert_eq!(snapshot.state, BreakerState::Closed);
}

#[tokio::test]
async fn test_failing_source_opens_breaker_and_run_continues() {
    let broken = Arc::new(
        ScriptedSource::new(
            "oarg",
            SourceSystem::Registry,
            vec![raw_record("P/8", "A", 80.0)],
        )
        .failing_first(u32::MAX, "ETIMEDOUT"),
    );
    let healthy = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        vec![raw_record("P/9", "B", 120.0)],
    ));
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![broken.clone(), healthy],
        vec![destination.clone()],
        alerts.clone(),
    );

    let run = orchestrator.run(RunMode::Full).await.unwrap();

    // The healthy source still landed its record.
    assert_eq!(run.status, RunStatus::Completed);
    assert!(destination.row_by_parcel("P/9").is_some());
    assert!(destination.row_by_parcel("P/8").is_none());
    assert!(run
        .errors
        .iter()
        .any(|error| error.source.as_deref() == Some("oarg")));

    // Retry budget exhausted: three calls, breaker open afterwards.
    assert_eq!(broken.calls(), 3);
    let snapshot = orchestrator
        .breakers()
        .snapshots()
        .into_iter()
        .find(|snapshot| snapshot.name == "extractor-oarg")
        .unwrap();
    assert_eq!(snapshot.state, BreakerState::Open);

    // Stage failure raised an error-severity alert.
    assert!(alerts
        .alerts()
        .iter()
        .any(|alert| alert.alert_type == AlertType::Error));
}

#[tokio::test]
async fn test_incremental_rerun_is_idempotent() {
    let records = vec![
        complete_raw_record("P/10", "A", 100.0),
        complete_raw_record("P/11", "B", 140.0),
    ];
    let source = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        records,
    ));
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![source.clone()],
        vec![destination.clone()],
        alerts,
    );

    let first = orchestrator.run(RunMode::Incremental).await.unwrap();
    assert_eq!(first.metrics.records_loaded, 2);
    assert_eq!(first.metrics.records_updated, 0);
    assert_eq!(first.metrics.records_failed, 0);

    let second = orchestrator.run(RunMode::Incremental).await.unwrap();
    assert_eq!(second.metrics.records_loaded, 0);
    assert_eq!(second.metrics.records_updated, 2);

    // Version advanced by exactly one per row on the second pass.
    for row in destination.rows() {
        assert_eq!(row.version, 2);
    }

    // Audit trail: one INSERT then one UPDATE per record.
    let audit = destination.audit();
    assert_eq!(audit.len(), 4);
    assert!(audit[..2].iter().all(|(_, action)| action == "INSERT"));
    assert!(audit[2..].iter().all(|(_, action)| action == "UPDATE"));

    // The watermark advanced: the second run asked for records updated
    // after the first run started.
    let filters = source.filters_seen();
    assert_eq!(filters[0], None);
    assert_eq!(filters[1], Some(first.start_time));
}

#[tokio::test]
async fn test_low_quality_batch_raises_warning_alert() {
    let mut records = Vec::new();
    for i in 0..6 {
        // Missing national id only.
        let mut record = complete_raw_record(&format!("Q/{}", i), "A", 100.0);
        record.owner.as_mut().unwrap().national_id = None;
        records.push(record);
    }
    for i in 6..10 {
        // Invalid area only.
        records.push(complete_raw_record(&format!("Q/{}", i), "B", -5.0));
    }

    let source = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        records,
    ));
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![source],
        vec![destination.clone()],
        alerts.clone(),
    );

    let run = orchestrator.run(RunMode::Full).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    // Invalid-area records were normalized through but skipped by the
    // loader's validation gate.
    assert_eq!(run.metrics.records_transformed, 10);
    assert_eq!(run.metrics.records_loaded, 6);
    assert_eq!(run.metrics.records_failed, 4);
    assert_monotonic_counts(&run.metrics);

    let warning = alerts
        .alerts()
        .into_iter()
        .find(|alert| alert.alert_type == AlertType::Warning)
        .expect("expected a quality warning alert");
    let metadata = warning.metadata.expect("quality report metadata");
    let issues = metadata.get("issues").and_then(|issues| issues.as_array()).unwrap();
    assert!(!issues.is_empty());
}

#[tokio::test]
async fn test_transient_destination_failure_is_retried_at_batch_level() {
    let source = Arc::new(ScriptedSource::new(
        "mlhcp",
        SourceSystem::LandAuthority,
        vec![complete_raw_record("P/20", "A", 100.0)],
    ));
    let destination = Arc::new(MemoryDestination::new("postgres").failing_first(1));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = orchestrator(
        vec![source],
        vec![destination.clone()],
        alerts,
    );

    let run = orchestrator.run(RunMode::Full).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.metrics.records_loaded, 1);
    assert!(run.metrics.retries >= 1);
    assert!(destination.row_by_parcel("P/20").is_some());
}

/// Source that parks long enough for a second `run` call to race it.
struct SlowSource;

#[async_trait]
impl SourceAdapter for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }
    fn source_system(&self) -> SourceSystem {
        SourceSystem::LandAuthority
    }
    async fn query(
        &self,
        _filter: &SourceFilter,
        _page: PageRequest,
    ) -> Result<SourcePage, EtlError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(SourcePage {
            records: vec![raw_record("S/1", "A", 50.0)],
            pagination: SourcePagination {
                total: Some(1),
                has_more: false,
            },
        })
    }
    async fn get_by_id(&self, _id: &str) -> Result<Option<RawLandRecord>, EtlError> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_second_run_rejected_while_running() {
    let destination = Arc::new(MemoryDestination::new("postgres"));
    let alerts = Arc::new(CollectingAlertSink::new());
    let orchestrator = Arc::new(orchestrator(
        vec![Arc::new(SlowSource)],
        vec![destination],
        alerts,
    ));

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(RunMode::Full).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orchestrator.status().0, RunStatus::Running);

    let second = orchestrator.run(RunMode::Full).await;
    assert!(matches!(second, Err(EtlError::AlreadyRunning(_))));

    let first = background.await.unwrap().unwrap();
    assert_eq!(first.status, RunStatus::Completed);
}

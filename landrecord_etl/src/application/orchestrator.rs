// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Drives one complete ETL pass: fans out one extraction task per source,
//! pipes each source through a normalization task into a shared bounded
//! channel, groups records in the streaming merge stage, and fans merged
//! batches out to one loader task per destination.
//!
//! ## Architecture
//!
//! ```text
//!  extract(src A) ─▶ normalize(A) ─┐
//!  extract(src B) ─▶ normalize(B) ─┼─▶ merge window ─┬─▶ load(dest 1)
//!  extract(src C) ─▶ normalize(C) ─┘                 └─▶ load(dest 2)
//! ```
//!
//! Stages are connected by bounded channels; a full downstream queue
//! blocks the producer, which is the pipeline's backpressure. All stage
//! statistics flow as messages into a single aggregator task that owns the
//! run's counters and yields the final immutable [`PipelineRun`].
//!
//! ## State Machine
//!
//! `IDLE → RUNNING → (COMPLETED | FAILED)`, with `RUNNING ↔ PAUSED`.
//! Only `IDLE` admits [`Orchestrator::run`]; terminal states reset to
//! `IDLE` once the run record has been published.
//!
//! ## Failure Policy
//!
//! Per-record errors are recorded and never abort the run. A failed
//! source or destination is dropped while at least one of each remains
//! healthy; losing the last of either fails the run. Fatal errors
//! (watermark store down, bad key material) abort immediately.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use landrecord_etl_domain::entities::land_record::{LandRecord, SourceSystem};
use landrecord_etl_domain::entities::pipeline_run::{
    PipelineRun, RunError, RunMetrics, RunMode, RunStatus,
};
use landrecord_etl_domain::entities::quality::{QualityReport, QualitySeverity};
use landrecord_etl_domain::events::pipeline_events::{ExtractProgress, PipelineEvent};
use landrecord_etl_domain::repositories::watermark_repository::{Watermark, WatermarkRepository};
use landrecord_etl_domain::services::alert_service::{Alert, AlertSink, AlertType};
use landrecord_etl_domain::services::destination::Destination;
use landrecord_etl_domain::services::merge_policy::MergePolicy;
use landrecord_etl_domain::services::normalizer::RecordNormalizer;
use landrecord_etl_domain::services::source_adapter::{RawLandRecord, SourceAdapter};
use landrecord_etl_domain::EtlError;

use crate::application::extractor::{ExtractObserver, Extractor};
use crate::application::merge_stage::MergeStage;
use crate::infrastructure::config::EtlSettings;
use crate::infrastructure::metrics::EtlMetricsService;
use crate::infrastructure::resilience::{
    CircuitBreakerConfig, CircuitBreakerFactory, RetryExecutor,
};
use crate::infrastructure::runtime::{
    join_supervised, spawn_supervised, CancellationToken, PauseGate,
};

/// Extractor breakers trip faster than the generic default: a flapping
/// source should stand down quickly while others continue.
const EXTRACTOR_BREAKER: CircuitBreakerConfig = CircuitBreakerConfig {
    failure_threshold: 3,
    success_threshold: 3,
    reset_timeout: std::time::Duration::from_secs(60),
    call_timeout: std::time::Duration::from_secs(30),
};

/// Point-in-time view of the in-progress run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub records_extracted: u64,
    pub records_transformed: u64,
    pub records_loaded: u64,
    pub records_failed: u64,
}

impl RunSnapshot {
    fn new(run_id: Uuid, mode: RunMode, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            mode,
            started_at,
            records_extracted: 0,
            records_transformed: 0,
            records_loaded: 0,
            records_failed: 0,
        }
    }
}

/// Stage statistics flowing into the aggregator task.
enum StatEvent {
    Extracted { source: String, count: u64 },
    Rejected { count: u64 },
    Transformed { count: u64 },
    TransformFailed { error: RunError },
    Retried,
    Loaded {
        destination: String,
        loaded: u64,
        updated: u64,
        skipped: u64,
        errors: u64,
    },
    RecordError(RunError),
    SourceFailed { source: String, error: RunError },
    DestinationFailed { destination: String, error: RunError },
}

/// Counters owned by the aggregator; folded into `RunMetrics` at the end.
#[derive(Default)]
struct RunTotals {
    extracted: u64,
    rejected: u64,
    transformed: u64,
    transform_failures: u64,
    retries: u64,
    per_destination: HashMap<String, (u64, u64, u64, u64)>,
    errors: Vec<RunError>,
    failed_sources: HashSet<String>,
    failed_destinations: HashSet<String>,
}

impl RunTotals {
    fn record_error(&mut self, error: RunError, cap: usize) {
        if self.errors.len() < cap {
            self.errors.push(error);
        }
    }

    /// Run-level load counts come from the destination that made the most
    /// progress; per-destination detail stays in Prometheus.
    fn metrics(&self) -> RunMetrics {
        let (loaded, updated, skipped, load_errors) = self
            .per_destination
            .values()
            .max_by_key(|(loaded, updated, _, _)| loaded + updated)
            .copied()
            .unwrap_or_default();

        RunMetrics {
            records_extracted: self.extracted,
            records_transformed: self.transformed,
            records_loaded: loaded,
            records_updated: updated,
            records_failed: self.rejected + self.transform_failures + skipped + load_errors,
            retries: self.retries,
            duration: None,
            throughput_records_per_second: 0.0,
        }
    }
}

/// The streaming pipeline orchestrator.
pub struct Orchestrator {
    settings: EtlSettings,
    sources: Vec<Arc<dyn SourceAdapter>>,
    destinations: Vec<Arc<dyn Destination>>,
    normalizer: RecordNormalizer,
    merge_policy: MergePolicy,
    watermarks: Arc<dyn WatermarkRepository>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<EtlMetricsService>,
    breakers: Arc<CircuitBreakerFactory>,
    retry: RetryExecutor,

    status: Mutex<RunStatus>,
    snapshot: Arc<Mutex<Option<RunSnapshot>>>,
    pause: PauseGate,
    cancel: Mutex<CancellationToken>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Orchestrator {
    pub fn new(
        settings: EtlSettings,
        sources: Vec<Arc<dyn SourceAdapter>>,
        destinations: Vec<Arc<dyn Destination>>,
        watermarks: Arc<dyn WatermarkRepository>,
        alerts: Arc<dyn AlertSink>,
        metrics: Arc<EtlMetricsService>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            settings,
            sources,
            destinations,
            normalizer: RecordNormalizer::new(),
            merge_policy: MergePolicy::new(),
            watermarks,
            alerts,
            metrics,
            breakers: Arc::new(CircuitBreakerFactory::default()),
            retry: RetryExecutor::default(),
            status: Mutex::new(RunStatus::Idle),
            snapshot: Arc::new(Mutex::new(None)),
            pause: PauseGate::new(),
            cancel: Mutex::new(CancellationToken::new()),
            events,
        }
    }

    /// Replaces the breaker factory; breakers are otherwise created with
    /// pipeline defaults.
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerFactory>) -> Self {
        self.breakers = breakers;
        self
    }

    /// Replaces the retry executor.
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Subscribes to run lifecycle and progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state and in-progress run snapshot.
    pub fn status(&self) -> (RunStatus, Option<RunSnapshot>) {
        (*self.status.lock(), *self.snapshot.lock())
    }

    /// RUNNING → PAUSED; the next record hand-off in every stage parks.
    pub fn pause(&self) -> Result<(), EtlError> {
        let mut status = self.status.lock();
        if *status != RunStatus::Running {
            return Err(EtlError::internal_error(format!(
                "cannot pause pipeline in state {}",
                status.as_str()
            )));
        }
        *status = RunStatus::Paused;
        self.pause.pause();
        info!("pipeline paused");
        Ok(())
    }

    /// PAUSED → RUNNING.
    pub fn resume(&self) -> Result<(), EtlError> {
        let mut status = self.status.lock();
        if *status != RunStatus::Paused {
            return Err(EtlError::internal_error(format!(
                "cannot resume pipeline in state {}",
                status.as_str()
            )));
        }
        *status = RunStatus::Running;
        self.pause.resume();
        info!("pipeline resumed");
        Ok(())
    }

    /// Propagates a cancel signal to all stages of the in-flight run.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Breaker factory, for status surfaces.
    pub fn breakers(&self) -> &CircuitBreakerFactory {
        &self.breakers
    }

    /// Executes one complete ETL pass.
    pub async fn run(&self, mode: RunMode) -> Result<PipelineRun, EtlError> {
        {
            let mut status = self.status.lock();
            if *status != RunStatus::Idle {
                return Err(EtlError::AlreadyRunning(format!(
                    "pipeline is {}",
                    status.as_str()
                )));
            }
            *status = RunStatus::Running;
        }
        self.pause.resume();
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let mut run = PipelineRun::start(mode);
        let run_id = run.run_id;
        let started = Instant::now();
        *self.snapshot.lock() = Some(RunSnapshot::new(run_id, mode, run.start_time));

        info!(run_id = %run_id, mode = mode.as_str(), "pipeline run starting");
        self.emit(PipelineEvent::RunStarted {
            run_id,
            mode,
            occurred_at: Utc::now(),
        });
        self.metrics.job_started("run");

        let outcome = self.execute(mode, run_id, run.start_time, &cancel).await;

        self.metrics.job_finished("run");
        self.metrics
            .observe_stage_duration("run", started.elapsed().as_secs_f64());

        match outcome {
            Ok(totals) => {
                let metrics = totals.metrics();
                let failure = self.failure_reason(&totals, &cancel);
                if let Some(reason) = failure {
                    run.fail(metrics, totals.errors);
                    self.publish_failure(&run, &reason).await;
                } else {
                    run.errors = totals.errors;
                    run.complete(metrics)?;
                    self.metrics
                        .record_run(run.status.as_str(), mode.as_str());
                    info!(
                        run_id = %run_id,
                        extracted = run.metrics.records_extracted,
                        loaded = run.metrics.records_loaded,
                        updated = run.metrics.records_updated,
                        failed = run.metrics.records_failed,
                        "pipeline run completed"
                    );
                    self.emit(PipelineEvent::RunCompleted {
                        run_id,
                        metrics: run.metrics,
                        occurred_at: Utc::now(),
                    });
                }
            }
            Err(fatal) => {
                run.fail(
                    RunMetrics::default(),
                    vec![RunError::new("run", fatal.to_string())],
                );
                self.publish_failure(&run, &fatal.to_string()).await;
            }
        }

        self.publish_run_record(&run).await;

        // Terminal states reset to IDLE once the run record is out.
        *self.status.lock() = RunStatus::Idle;
        *self.snapshot.lock() = None;

        Ok(run)
    }

    fn failure_reason(&self, totals: &RunTotals, cancel: &CancellationToken) -> Option<String> {
        if cancel.is_cancelled() {
            return Some("run cancelled".to_string());
        }
        if !self.sources.is_empty() && totals.failed_sources.len() == self.sources.len() {
            return Some("all sources failed".to_string());
        }
        if !self.destinations.is_empty()
            && totals.failed_destinations.len() == self.destinations.len()
        {
            return Some("all destinations failed".to_string());
        }
        None
    }

    async fn publish_failure(&self, run: &PipelineRun, reason: &str) {
        warn!(run_id = %run.run_id, reason, "pipeline run failed");
        self.metrics.record_run(run.status.as_str(), run.mode.as_str());
        self.emit(PipelineEvent::RunFailed {
            run_id: run.run_id,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.send_alert(
            AlertType::Error,
            QualitySeverity::Critical,
            "pipeline run failed",
            reason,
            "orchestrator",
            None,
        )
        .await;
    }

    /// The run record lands in every healthy destination's audit trail.
    async fn publish_run_record(&self, run: &PipelineRun) {
        for destination in &self.destinations {
            if let Err(e) = destination.record_run(run).await {
                warn!(
                    destination = destination.name(),
                    error = %e,
                    "failed to publish run record"
                );
            }
        }
    }

    async fn execute(
        &self,
        mode: RunMode,
        run_id: Uuid,
        run_started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunTotals, EtlError> {
        // 1. Watermark read, run boundary only.
        let watermark = if mode.uses_watermark() {
            self.watermarks.get(&self.settings.pipeline_name).await?
        } else {
            None
        };

        // 2. Destinations connect first; with nowhere to load there is no
        //    point extracting.
        let mut active_destinations = Vec::new();
        let mut totals_seed = RunTotals::default();
        for destination in &self.destinations {
            match destination.connect().await {
                Ok(()) => {
                    destination.begin_run(run_id).await?;
                    active_destinations.push(destination.clone());
                }
                Err(e) => {
                    warn!(destination = destination.name(), error = %e, "destination unavailable");
                    totals_seed.failed_destinations.insert(destination.name().to_string());
                    totals_seed.record_error(
                        RunError::new("load", e.to_string()).with_source(destination.name()),
                        self.settings.max_recorded_errors,
                    );
                }
            }
        }
        if active_destinations.is_empty() {
            return Err(EtlError::destination_unavailable(
                "no destination could be connected",
            ));
        }

        // 3. Plumbing: stats aggregator, merged-batch fan-out, shared
        //    normalized channel.
        let (stat_tx, stat_rx) = mpsc::unbounded_channel::<StatEvent>();
        let aggregator = tokio::spawn(aggregate_stats(
            stat_rx,
            totals_seed,
            self.snapshot.clone(),
            self.settings.max_recorded_errors,
        ));

        let (normalized_tx, normalized_rx) =
            mpsc::channel::<LandRecord>(self.settings.channel_depth);

        let mut batch_senders = Vec::new();
        let mut loader_handles = Vec::new();
        for destination in &active_destinations {
            let (batch_tx, batch_rx) =
                mpsc::channel::<Vec<LandRecord>>(self.settings.channel_depth);
            batch_senders.push((destination.name().to_string(), batch_tx));
            loader_handles.push((
                destination.name().to_string(),
                spawn_supervised(
                    "loader",
                    loader_task(
                        destination.clone(),
                        batch_rx,
                        self.retry.clone(),
                        self.breakers.breaker(&format!("loader-{}", destination.name())),
                        stat_tx.clone(),
                        self.events.clone(),
                        self.metrics.clone(),
                        run_id,
                        self.pause.clone(),
                        cancel.clone(),
                    ),
                ),
            ));
        }

        let expected_sources: HashSet<SourceSystem> = self
            .sources
            .iter()
            .map(|adapter| adapter.source_system())
            .collect();
        let merge_stage = MergeStage::new(
            self.merge_policy.clone(),
            expected_sources,
            self.settings.merge_window_capacity,
        );
        let merge_handle = spawn_supervised(
            "merge-stage",
            merge_task(
                merge_stage,
                normalized_rx,
                batch_senders,
                self.settings.load_batch_size,
                self.pause.clone(),
                cancel.clone(),
            ),
        );

        // 4. One extract and one normalize task per source.
        let mut source_handles = Vec::new();
        for adapter in &self.sources {
            let source = adapter.name().to_string();
            let since = match mode {
                RunMode::Full => None,
                RunMode::Incremental | RunMode::Cdc => watermark
                    .as_ref()
                    .and_then(|watermark| watermark.since_for(&source)),
            };

            let (raw_tx, raw_rx) = mpsc::channel::<RawLandRecord>(self.settings.channel_depth);

            let extractor = Extractor::new(
                adapter.clone(),
                self.retry.clone(),
                self.breakers
                    .breaker_with(&format!("extractor-{}", source), EXTRACTOR_BREAKER),
                self.settings.politeness_delay,
            );
            let extract_handle = spawn_supervised(
                "extract",
                extract_task(
                    extractor,
                    source.clone(),
                    since,
                    raw_tx,
                    stat_tx.clone(),
                    self.events.clone(),
                    self.metrics.clone(),
                    run_id,
                    self.pause.clone(),
                    cancel.clone(),
                ),
            );

            let normalize_handle = spawn_supervised(
                "normalize",
                normalize_task(
                    self.normalizer.clone(),
                    adapter.source_system(),
                    source.clone(),
                    raw_rx,
                    normalized_tx.clone(),
                    stat_tx.clone(),
                    self.events.clone(),
                    self.metrics.clone(),
                    self.alerts.clone(),
                    run_id,
                    self.settings.clone(),
                    self.pause.clone(),
                    cancel.clone(),
                ),
            );

            source_handles.push((source, extract_handle, normalize_handle));
        }
        drop(normalized_tx);

        // 5. Join the per-source pipelines; a failed source is recorded
        //    and the rest continue.
        for (source, extract_handle, normalize_handle) in source_handles {
            let (extract_result, normalize_result) = futures::future::join(
                join_supervised(extract_handle),
                join_supervised(normalize_handle),
            )
            .await;

            if let Err(error) = extract_result.and(normalize_result) {
                let message = error.to_string();
                let _ = stat_tx.send(StatEvent::SourceFailed {
                    source: source.clone(),
                    error: RunError::new("extract", message.clone()).with_source(&source),
                });
                self.metrics.record_failed("extract", "source_failed", 1);
                self.emit(PipelineEvent::ExtractFailed {
                    run_id,
                    source: source.clone(),
                    reason: message.clone(),
                    occurred_at: Utc::now(),
                });
                self.send_alert(
                    AlertType::Error,
                    QualitySeverity::High,
                    "source extraction failed",
                    &message,
                    &source,
                    None,
                )
                .await;
            }
        }

        // 6. Merge flushes on end-of-input, loaders drain their queues.
        if let Err(error) = join_supervised(merge_handle).await {
            warn!(error = %error, "merge stage failed");
        }
        for (destination, handle) in loader_handles {
            if let Err(error) = join_supervised(handle).await {
                let message = error.to_string();
                let _ = stat_tx.send(StatEvent::DestinationFailed {
                    destination: destination.clone(),
                    error: RunError::new("load", message.clone()).with_source(&destination),
                });
                self.emit(PipelineEvent::LoadFailed {
                    run_id,
                    destination: destination.clone(),
                    reason: message.clone(),
                    occurred_at: Utc::now(),
                });
                self.send_alert(
                    AlertType::Error,
                    QualitySeverity::High,
                    "destination load failed",
                    &message,
                    &destination,
                    None,
                )
                .await;
            }
        }

        drop(stat_tx);
        let totals = aggregator
            .await
            .map_err(|e| EtlError::internal_error(format!("aggregator task failed: {}", e)))?;

        // 7. Watermark advances only on a successful pass, and only for
        //    sources that finished cleanly.
        if self.failure_reason(&totals, cancel).is_none() {
            let mut next = watermark
                .unwrap_or_else(|| Watermark::new(&self.settings.pipeline_name));
            let mut all_sources_healthy = true;
            for adapter in &self.sources {
                let source = adapter.name().to_string();
                if totals.failed_sources.contains(&source) {
                    all_sources_healthy = false;
                } else {
                    next.last_extracted_at.insert(source, run_started_at);
                }
            }
            if all_sources_healthy {
                next.last_successful_run_at = Some(run_started_at);
            }
            if let Err(e) = self.watermarks.commit(&next).await {
                warn!(error = %e, "watermark commit failed; next incremental run will re-extract");
            }
        }

        for destination in &active_destinations {
            if let Err(e) = destination.disconnect().await {
                debug!(destination = destination.name(), error = %e, "disconnect failed");
            }
        }

        Ok(totals)
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    async fn send_alert(
        &self,
        alert_type: AlertType,
        severity: QualitySeverity,
        title: &str,
        message: &str,
        source: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let mut alert = Alert::new(alert_type, severity, title, message, source);
        if let Some(metadata) = metadata {
            alert = alert.with_metadata(metadata);
        }
        if let Err(e) = self.alerts.send(alert).await {
            warn!(error = %e, "alert delivery failed");
        }
    }
}

/// Folds stage statistics into the run totals and keeps the live
/// snapshot current.
async fn aggregate_stats(
    mut stat_rx: mpsc::UnboundedReceiver<StatEvent>,
    seed: RunTotals,
    snapshot: Arc<Mutex<Option<RunSnapshot>>>,
    error_cap: usize,
) -> RunTotals {
    let mut totals = seed;

    while let Some(event) = stat_rx.recv().await {
        match event {
            StatEvent::Extracted { count, .. } => totals.extracted += count,
            StatEvent::Rejected { count } => {
                totals.rejected += count;
            }
            StatEvent::Transformed { count } => totals.transformed += count,
            StatEvent::TransformFailed { error } => {
                totals.transform_failures += 1;
                totals.record_error(error, error_cap);
            }
            StatEvent::Retried => totals.retries += 1,
            StatEvent::Loaded {
                destination,
                loaded,
                updated,
                skipped,
                errors,
            } => {
                let entry = totals.per_destination.entry(destination).or_default();
                entry.0 += loaded;
                entry.1 += updated;
                entry.2 += skipped;
                entry.3 += errors;
            }
            StatEvent::RecordError(error) => totals.record_error(error, error_cap),
            StatEvent::SourceFailed { source, error } => {
                totals.failed_sources.insert(source);
                totals.record_error(error, error_cap);
            }
            StatEvent::DestinationFailed { destination, error } => {
                totals.failed_destinations.insert(destination);
                totals.record_error(error, error_cap);
            }
        }

        if let Some(snapshot) = snapshot.lock().as_mut() {
            let metrics = totals.metrics();
            snapshot.records_extracted = metrics.records_extracted;
            snapshot.records_transformed = metrics.records_transformed;
            snapshot.records_loaded = metrics.records_loaded + metrics.records_updated;
            snapshot.records_failed = metrics.records_failed;
        }
    }

    totals
}

/// Observer wiring extraction side effects into stats and events.
struct ChannelObserver {
    source: String,
    run_id: Uuid,
    stat_tx: mpsc::UnboundedSender<StatEvent>,
    events: broadcast::Sender<PipelineEvent>,
    metrics: Arc<EtlMetricsService>,
}

impl ExtractObserver for ChannelObserver {
    fn on_progress(&mut self, progress: ExtractProgress) {
        let _ = self.events.send(PipelineEvent::ExtractProgress {
            run_id: self.run_id,
            progress,
            occurred_at: Utc::now(),
        });
    }

    fn on_rejected(&mut self, record: &RawLandRecord) {
        self.metrics.record_failed("extract", "invalid_record", 1);
        let _ = self.stat_tx.send(StatEvent::Rejected { count: 1 });
        let _ = self.stat_tx.send(StatEvent::RecordError(
            RunError::new(
                "extract",
                format!("record rejected by validity gate: '{}'", record.parcel_number),
            )
            .with_source(&self.source),
        ));
    }

    fn on_retry(&mut self, _error: &EtlError, _attempt: u32) {
        let _ = self.stat_tx.send(StatEvent::Retried);
    }
}

#[allow(clippy::too_many_arguments)]
async fn extract_task(
    extractor: Extractor,
    source: String,
    since: Option<DateTime<Utc>>,
    raw_tx: mpsc::Sender<RawLandRecord>,
    stat_tx: mpsc::UnboundedSender<StatEvent>,
    events: broadcast::Sender<PipelineEvent>,
    metrics: Arc<EtlMetricsService>,
    run_id: Uuid,
    pause: PauseGate,
    cancel: CancellationToken,
) -> Result<(), EtlError> {
    let _ = events.send(PipelineEvent::ExtractStarted {
        run_id,
        source: source.clone(),
        occurred_at: Utc::now(),
    });
    metrics.job_started("extractor");
    let started = Instant::now();

    let mut observer = ChannelObserver {
        source: source.clone(),
        run_id,
        stat_tx: stat_tx.clone(),
        events: events.clone(),
        metrics: metrics.clone(),
    };

    let result = extractor
        .extract_incremental(since, raw_tx, cancel, pause, &mut observer)
        .await;

    metrics.job_finished("extractor");
    metrics.observe_stage_duration("extract", started.elapsed().as_secs_f64());

    let summary = result?;
    metrics.record_extracted(&source, summary.extracted);
    let _ = stat_tx.send(StatEvent::Extracted {
        source: source.clone(),
        count: summary.extracted,
    });
    let _ = events.send(PipelineEvent::ExtractCompleted {
        run_id,
        source,
        extracted: summary.extracted,
        rejected: summary.rejected,
        occurred_at: Utc::now(),
    });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn normalize_task(
    normalizer: RecordNormalizer,
    source_system: SourceSystem,
    source: String,
    mut raw_rx: mpsc::Receiver<RawLandRecord>,
    normalized_tx: mpsc::Sender<LandRecord>,
    stat_tx: mpsc::UnboundedSender<StatEvent>,
    events: broadcast::Sender<PipelineEvent>,
    metrics: Arc<EtlMetricsService>,
    alerts: Arc<dyn AlertSink>,
    run_id: Uuid,
    settings: EtlSettings,
    pause: PauseGate,
    cancel: CancellationToken,
) -> Result<(), EtlError> {
    let started = Instant::now();
    let mut report = QualityReport::new();
    let mut transformed = 0u64;
    let mut last_dimensions = report.dimensions();

    while let Some(raw) = raw_rx.recv().await {
        if cancel.is_cancelled() {
            return Err(EtlError::cancelled(format!(
                "normalization of '{}' cancelled",
                source
            )));
        }
        pause.wait_if_paused().await;

        match normalizer.normalize(source_system, &raw) {
            Ok(normalized) => {
                report.record_seen();
                for issue in normalized.issues {
                    report.add_issue(issue);
                }
                transformed += 1;
                let _ = stat_tx.send(StatEvent::Transformed { count: 1 });
                metrics.record_transformed("normalizer", 1);

                if normalized_tx.send(normalized.record).await.is_err() {
                    return Err(EtlError::cancelled(format!(
                        "merge stage closed while '{}' was transforming",
                        source
                    )));
                }

                if report.records() >= settings.normalizer_batch_size as u64 {
                    last_dimensions = close_quality_batch(
                        &mut report, &source, run_id, &settings, &metrics, &alerts, &events,
                    )
                    .await;
                }
            }
            Err(error) => {
                metrics.record_failed("transform", "transform_error", 1);
                let _ = stat_tx.send(StatEvent::TransformFailed {
                    error: RunError::new("transform", error.to_string()).with_source(&source),
                });
            }
        }
    }

    if report.records() > 0 {
        last_dimensions = close_quality_batch(
            &mut report, &source, run_id, &settings, &metrics, &alerts, &events,
        )
        .await;
    }

    metrics.observe_stage_duration("transform", started.elapsed().as_secs_f64());
    let _ = events.send(PipelineEvent::TransformCompleted {
        run_id,
        source,
        transformed,
        quality: last_dimensions,
        occurred_at: Utc::now(),
    });
    Ok(())
}

/// Publishes one batch quality report: gauges always, a warning alert and
/// event when the score is below the alert threshold.
async fn close_quality_batch(
    report: &mut QualityReport,
    source: &str,
    run_id: Uuid,
    settings: &EtlSettings,
    metrics: &EtlMetricsService,
    alerts: &Arc<dyn AlertSink>,
    events: &broadcast::Sender<PipelineEvent>,
) -> landrecord_etl_domain::entities::quality::QualityDimensions {
    let dimensions = report.dimensions();
    let score = dimensions.weighted_score();
    metrics.set_quality(&dimensions);

    if score < settings.quality_alert_threshold {
        warn!(source, score, "batch quality below threshold");
        let _ = events.send(PipelineEvent::QualityAlert {
            run_id,
            source: source.to_string(),
            score,
            occurred_at: Utc::now(),
        });
        let metadata = serde_json::to_value(&*report).ok();
        let mut alert = Alert::new(
            AlertType::Warning,
            QualitySeverity::Medium,
            "batch quality below threshold",
            format!("batch from '{}' scored {:.2}", source, score),
            source,
        );
        if let Some(metadata) = metadata {
            alert = alert.with_metadata(metadata);
        }
        if let Err(e) = alerts.send(alert).await {
            warn!(error = %e, "quality alert delivery failed");
        }
    }

    *report = QualityReport::new();
    dimensions
}

/// Consumes the shared normalized stream, windows it by parcel, and fans
/// merged batches out to every destination.
async fn merge_task(
    mut stage: MergeStage,
    mut normalized_rx: mpsc::Receiver<LandRecord>,
    mut batch_senders: Vec<(String, mpsc::Sender<Vec<LandRecord>>)>,
    batch_size: usize,
    pause: PauseGate,
    cancel: CancellationToken,
) -> Result<(), EtlError> {
    let mut pending: Vec<LandRecord> = Vec::with_capacity(batch_size);

    while let Some(record) = normalized_rx.recv().await {
        if cancel.is_cancelled() {
            return Err(EtlError::cancelled("merge stage cancelled"));
        }
        pause.wait_if_paused().await;

        for merged in stage.push(record)? {
            for issue in &merged.issues {
                debug!(
                    parcel = %merged.record.parcel_number,
                    field = %issue.field,
                    severity = issue.severity.as_str(),
                    "merge consistency issue: {}",
                    issue.issue
                );
            }
            pending.push(merged.record);
            if pending.len() >= batch_size {
                dispatch_batch(&mut batch_senders, &mut pending).await?;
            }
        }
    }

    for merged in stage.flush()? {
        pending.push(merged.record);
        if pending.len() >= batch_size {
            dispatch_batch(&mut batch_senders, &mut pending).await?;
        }
    }
    if !pending.is_empty() {
        dispatch_batch(&mut batch_senders, &mut pending).await?;
    }

    Ok(())
}

/// Hands the pending batch to every destination still listening; a
/// destination whose loader died is silently dropped from the fan-out.
async fn dispatch_batch(
    batch_senders: &mut Vec<(String, mpsc::Sender<Vec<LandRecord>>)>,
    pending: &mut Vec<LandRecord>,
) -> Result<(), EtlError> {
    let batch = std::mem::take(pending);

    let mut gone = Vec::new();
    for (index, (destination, sender)) in batch_senders.iter().enumerate() {
        if sender.send(batch.clone()).await.is_err() {
            warn!(destination = %destination, "loader gone, dropping from fan-out");
            gone.push(index);
        }
    }
    for index in gone.into_iter().rev() {
        batch_senders.remove(index);
    }

    if batch_senders.is_empty() {
        return Err(EtlError::destination_unavailable(
            "every destination loader has failed",
        ));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn loader_task(
    destination: Arc<dyn Destination>,
    mut batch_rx: mpsc::Receiver<Vec<LandRecord>>,
    retry: RetryExecutor,
    breaker: Arc<crate::infrastructure::resilience::CircuitBreaker>,
    stat_tx: mpsc::UnboundedSender<StatEvent>,
    events: broadcast::Sender<PipelineEvent>,
    metrics: Arc<EtlMetricsService>,
    run_id: Uuid,
    pause: PauseGate,
    cancel: CancellationToken,
) -> Result<(), EtlError> {
    let name = destination.name().to_string();
    let _ = events.send(PipelineEvent::LoadStarted {
        run_id,
        destination: name.clone(),
        occurred_at: Utc::now(),
    });
    metrics.job_started("loader");
    let started = Instant::now();

    let result = async {
        while let Some(batch) = batch_rx.recv().await {
            if cancel.is_cancelled() {
                return Err(EtlError::cancelled(format!("load into '{}' cancelled", name)));
            }
            pause.wait_if_paused().await;

            let destination_ref = &destination;
            let breaker_ref = &breaker;
            let batch_ref = &batch;
            let stat_tx_ref = &stat_tx;
            let load_result = retry
                .retry(
                    &format!("load-{}", name),
                    move || async move {
                        breaker_ref
                            .call(|| destination_ref.load_batch(batch_ref))
                            .await
                    },
                    EtlError::is_retryable,
                    |_, _| {
                        let _ = stat_tx_ref.send(StatEvent::Retried);
                    },
                )
                .await
                .map_err(|e| {
                    EtlError::destination_unavailable(format!(
                        "batch load into '{}' failed: {}",
                        name, e
                    ))
                })?;

            metrics.record_loaded(&name, load_result.records_loaded + load_result.records_updated);
            if load_result.records_skipped > 0 {
                metrics.record_failed("load", "validation_skipped", load_result.records_skipped);
            }
            if !load_result.errors.is_empty() {
                metrics.record_failed("load", "record_error", load_result.errors.len() as u64);
            }
            for error in &load_result.errors {
                let _ = stat_tx.send(StatEvent::RecordError(
                    RunError::new("load", error.message.clone())
                        .with_source(&name)
                        .with_record_id(&error.record_id),
                ));
            }
            let _ = stat_tx.send(StatEvent::Loaded {
                destination: name.clone(),
                loaded: load_result.records_loaded,
                updated: load_result.records_updated,
                skipped: load_result.records_skipped,
                errors: load_result.errors.len() as u64,
            });
            let _ = events.send(PipelineEvent::LoadCompleted {
                run_id,
                destination: name.clone(),
                loaded: load_result.records_loaded,
                updated: load_result.records_updated,
                skipped: load_result.records_skipped,
                occurred_at: Utc::now(),
            });
        }
        Ok(())
    }
    .await;

    metrics.job_finished("loader");
    metrics.observe_stage_duration("load", started.elapsed().as_secs_f64());
    result
}

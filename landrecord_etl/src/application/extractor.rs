// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extractor
//!
//! Turns an opaque [`SourceAdapter`] into a lazy stream of raw records
//! with pagination, retry, circuit breaking and progress reporting.
//!
//! ## Paging
//!
//! Offsets start at zero and advance by the returned page length; the
//! stream terminates when the adapter reports `has_more = false` or
//! returns a short page. A small politeness delay separates successive
//! pages.
//!
//! ## Failure Semantics
//!
//! Every page call runs under the retry executor and the source's named
//! breaker (`extractor-<source>`). Records failing the adapter's validity
//! gate are reported to the observer and dropped without failing the
//! stream; a permanently failing page call fails the whole source
//! extraction.

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use landrecord_etl_domain::events::pipeline_events::ExtractProgress;
use landrecord_etl_domain::services::source_adapter::{
    PageRequest, RawLandRecord, SourceAdapter, SourceFilter,
};
use landrecord_etl_domain::EtlError;

use crate::infrastructure::resilience::{CircuitBreaker, RetryExecutor};
use crate::infrastructure::runtime::{CancellationToken, PauseGate};

/// Typed observer for extraction side effects. One implementation per
/// source task; the orchestrator wires it to run statistics and events.
pub trait ExtractObserver: Send {
    /// Fired after each page with cumulative progress.
    fn on_progress(&mut self, _progress: ExtractProgress) {}

    /// Fired for each record rejected by the validity gate.
    fn on_rejected(&mut self, _record: &RawLandRecord) {}

    /// Fired for each retried page-call failure.
    fn on_retry(&mut self, _error: &EtlError, _attempt: u32) {}
}

/// No-op observer for callers that only want the records.
pub struct NullObserver;

impl ExtractObserver for NullObserver {}

/// Cumulative outcome of one source extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub extracted: u64,
    pub rejected: u64,
}

/// Paginating extraction driver for one source.
pub struct Extractor {
    adapter: Arc<dyn SourceAdapter>,
    retry: RetryExecutor,
    breaker: Arc<CircuitBreaker>,
    politeness_delay: Duration,
}

impl Extractor {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        retry: RetryExecutor,
        breaker: Arc<CircuitBreaker>,
        politeness_delay: Duration,
    ) -> Self {
        Self {
            adapter,
            retry,
            breaker,
            politeness_delay,
        }
    }

    /// Extracts everything the source has.
    pub async fn extract_all(
        &self,
        tx: mpsc::Sender<RawLandRecord>,
        cancel: CancellationToken,
        pause: PauseGate,
        observer: &mut dyn ExtractObserver,
    ) -> Result<ExtractionSummary, EtlError> {
        self.extract(None, tx, cancel, pause, observer).await
    }

    /// Extracts records updated after `since`; `None` behaves like
    /// [`Extractor::extract_all`].
    pub async fn extract_incremental(
        &self,
        since: Option<DateTime<Utc>>,
        tx: mpsc::Sender<RawLandRecord>,
        cancel: CancellationToken,
        pause: PauseGate,
        observer: &mut dyn ExtractObserver,
    ) -> Result<ExtractionSummary, EtlError> {
        self.extract(since, tx, cancel, pause, observer).await
    }

    async fn extract(
        &self,
        since: Option<DateTime<Utc>>,
        tx: mpsc::Sender<RawLandRecord>,
        cancel: CancellationToken,
        pause: PauseGate,
        observer: &mut dyn ExtractObserver,
    ) -> Result<ExtractionSummary, EtlError> {
        let source = self.adapter.name().to_string();
        let filter = SourceFilter {
            updated_after: since,
        };
        let mut page = PageRequest::first(self.adapter.batch_size().max(1));
        let mut total: Option<u64> = None;
        let mut summary = ExtractionSummary::default();

        loop {
            if cancel.is_cancelled() {
                return Err(EtlError::cancelled(format!(
                    "extraction of '{}' cancelled",
                    source
                )));
            }
            pause.wait_if_paused().await;

            let adapter = &self.adapter;
            let breaker = &self.breaker;
            let filter_ref = &filter;
            let response = self
                .retry
                .retry(
                    &format!("extract-{}", source),
                    move || async move {
                        breaker
                            .call(|| adapter.query(filter_ref, page))
                            .await
                    },
                    EtlError::is_retryable,
                    |error, attempt| observer.on_retry(error, attempt),
                )
                .await
                .map_err(|e| match e {
                    EtlError::Cancelled(msg) => EtlError::Cancelled(msg),
                    other => EtlError::source_unavailable(format!(
                        "source '{}' extraction failed: {}",
                        source, other
                    )),
                })?;

            total = response.pagination.total.or(total);
            let returned = response.records.len();

            for record in response.records {
                if self.adapter.is_valid_record(&record) {
                    summary.extracted += 1;
                    if tx.send(record).await.is_err() {
                        return Err(EtlError::cancelled(format!(
                            "downstream of '{}' closed",
                            source
                        )));
                    }
                } else {
                    summary.rejected += 1;
                    observer.on_rejected(&record);
                }
            }

            let percentage = total
                .filter(|&t| t > 0)
                .map(|t| (summary.extracted as f64 / t as f64) * 100.0);
            observer.on_progress(ExtractProgress {
                source: source.clone(),
                extracted: summary.extracted,
                total,
                percentage,
            });

            if !response.pagination.has_more || returned < page.limit {
                break;
            }
            page = page.advance(returned);
            tokio::time::sleep(self.politeness_delay).await;
        }

        debug!(
            source = %source,
            extracted = summary.extracted,
            rejected = summary.rejected,
            "extraction stream finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use landrecord_etl_domain::entities::land_record::SourceSystem;
    use landrecord_etl_domain::services::source_adapter::{SourcePage, SourcePagination};

    use crate::infrastructure::resilience::{
        CircuitBreakerConfig, RetryPolicy,
    };

    struct PagedAdapter {
        pages: Vec<Vec<RawLandRecord>>,
        total: u64,
        calls: AtomicU32,
        fail_first: u32,
    }

    impl PagedAdapter {
        fn record(parcel: &str) -> RawLandRecord {
            RawLandRecord {
                parcel_number: parcel.to_string(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for PagedAdapter {
        fn name(&self) -> &str {
            "paged"
        }
        fn source_system(&self) -> SourceSystem {
            SourceSystem::LandAuthority
        }
        fn batch_size(&self) -> usize {
            2
        }
        async fn query(
            &self,
            _filter: &SourceFilter,
            page: PageRequest,
        ) -> Result<SourcePage, EtlError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(EtlError::source_unavailable("ECONNRESET"));
            }
            let index = page.offset / 2;
            let records = self.pages.get(index).cloned().unwrap_or_default();
            let has_more = index + 1 < self.pages.len();
            Ok(SourcePage {
                records,
                pagination: SourcePagination {
                    total: Some(self.total),
                    has_more,
                },
            })
        }
        async fn get_by_id(&self, _id: &str) -> Result<Option<RawLandRecord>, EtlError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        progress: Vec<ExtractProgress>,
        rejected: u32,
        retries: u32,
    }

    impl ExtractObserver for RecordingObserver {
        fn on_progress(&mut self, progress: ExtractProgress) {
            self.progress.push(progress);
        }
        fn on_rejected(&mut self, _record: &RawLandRecord) {
            self.rejected += 1;
        }
        fn on_retry(&mut self, _error: &EtlError, _attempt: u32) {
            self.retries += 1;
        }
    }

    fn extractor(adapter: Arc<dyn SourceAdapter>) -> Extractor {
        let retry = RetryExecutor::new(RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            ..Default::default()
        });
        let breaker = Arc::new(CircuitBreaker::new(
            "extractor-paged",
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(60),
                call_timeout: Duration::from_secs(30),
                ..Default::default()
            },
        ));
        Extractor::new(adapter, retry, breaker, Duration::from_millis(1))
    }

    fn collect(rx: &mut mpsc::Receiver<RawLandRecord>) -> Vec<RawLandRecord> {
        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let adapter = Arc::new(PagedAdapter {
            pages: vec![
                vec![PagedAdapter::record("p/1"), PagedAdapter::record("p/2")],
                vec![PagedAdapter::record("p/3")],
            ],
            total: 3,
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let extractor = extractor(adapter);
        let (tx, mut rx) = mpsc::channel(16);
        let mut observer = RecordingObserver::default();

        let summary = extractor
            .extract_all(
                tx,
                CancellationToken::new(),
                PauseGate::new(),
                &mut observer,
            )
            .await
            .unwrap();

        assert_eq!(summary.extracted, 3);
        assert_eq!(collect(&mut rx).len(), 3);
        // Final page reports full progress.
        let last = observer.progress.last().unwrap();
        assert_eq!(last.extracted, 3);
        assert_eq!(last.percentage, Some(100.0));
    }

    #[tokio::test]
    async fn test_transient_failures_retried_then_delivered() {
        let adapter = Arc::new(PagedAdapter {
            pages: vec![vec![PagedAdapter::record("p/1")]],
            total: 1,
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let extractor = extractor(adapter.clone());
        let (tx, mut rx) = mpsc::channel(16);
        let mut observer = RecordingObserver::default();

        let summary = extractor
            .extract_all(
                tx,
                CancellationToken::new(),
                PauseGate::new(),
                &mut observer,
            )
            .await
            .unwrap();

        assert_eq!(summary.extracted, 1);
        assert_eq!(observer.retries, 2);
        assert_eq!(collect(&mut rx).len(), 1);
        // Two failures plus the success.
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_fails_stream() {
        let adapter = Arc::new(PagedAdapter {
            pages: vec![vec![PagedAdapter::record("p/1")]],
            total: 1,
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let extractor = extractor(adapter);
        let (tx, _rx) = mpsc::channel(16);
        let mut observer = RecordingObserver::default();

        let result = extractor
            .extract_all(
                tx,
                CancellationToken::new(),
                PauseGate::new(),
                &mut observer,
            )
            .await;
        assert!(matches!(result, Err(EtlError::SourceUnavailable(_))));
    }

    struct InvalidRecordAdapter;

    #[async_trait]
    impl SourceAdapter for InvalidRecordAdapter {
        fn name(&self) -> &str {
            "invalid"
        }
        fn source_system(&self) -> SourceSystem {
            SourceSystem::Registry
        }
        async fn query(
            &self,
            _filter: &SourceFilter,
            _page: PageRequest,
        ) -> Result<SourcePage, EtlError> {
            Ok(SourcePage {
                records: vec![
                    RawLandRecord {
                        parcel_number: "ok/1".into(),
                        ..Default::default()
                    },
                    RawLandRecord {
                        parcel_number: " . ".into(),
                        ..Default::default()
                    },
                ],
                pagination: SourcePagination {
                    total: Some(2),
                    has_more: false,
                },
            })
        }
        async fn get_by_id(&self, _id: &str) -> Result<Option<RawLandRecord>, EtlError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_rejected_records_do_not_fail_stream() {
        let extractor = extractor(Arc::new(InvalidRecordAdapter));
        let (tx, mut rx) = mpsc::channel(16);
        let mut observer = RecordingObserver::default();

        let summary = extractor
            .extract_all(
                tx,
                CancellationToken::new(),
                PauseGate::new(),
                &mut observer,
            )
            .await
            .unwrap();

        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(observer.rejected, 1);
        assert_eq!(collect(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_stream() {
        let adapter = Arc::new(PagedAdapter {
            pages: vec![
                vec![PagedAdapter::record("p/1"), PagedAdapter::record("p/2")],
                vec![PagedAdapter::record("p/3"), PagedAdapter::record("p/4")],
            ],
            total: 4,
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let extractor = extractor(adapter);
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        drop(rx);

        let result = extractor
            .extract_all(tx, cancel, PauseGate::new(), &mut NullObserver)
            .await;
        assert!(matches!(result, Err(EtlError::Cancelled(_))));
    }
}

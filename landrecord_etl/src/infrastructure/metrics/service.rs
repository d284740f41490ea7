// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ETL Metrics Service
//!
//! Prometheus metrics collection for the pipeline core. One registry per
//! process, scraped by the endpoint in
//! [`endpoint`](crate::infrastructure::metrics::endpoint).
//!
//! ## Metric Families
//!
//! - **etl_extracted_records_total{source}**: records pulled per source
//! - **etl_transformed_records_total{transformer}**: normalized records
//! - **etl_loaded_records_total{destination}**: records upserted
//! - **etl_failed_records_total{stage,reason}**: failures by stage
//! - **etl_pipeline_runs_total{status,mode}**: completed run outcomes
//! - **etl_pipeline_duration_seconds{stage}**: stage duration histogram
//! - **etl_data_quality_score{dimension}**: latest batch quality gauge
//! - **etl_active_jobs{type}**: in-flight task gauge
//!
//! The service is cheap to clone; all handles share the same underlying
//! registry and are safe for concurrent label mutations.

use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use tracing::debug;

use landrecord_etl_domain::entities::quality::QualityDimensions;
use landrecord_etl_domain::EtlError;

/// Prometheus metrics service for pipeline observability.
#[derive(Clone)]
pub struct EtlMetricsService {
    registry: Arc<Registry>,

    extracted_records_total: IntCounterVec,
    transformed_records_total: IntCounterVec,
    loaded_records_total: IntCounterVec,
    failed_records_total: IntCounterVec,
    pipeline_runs_total: IntCounterVec,
    pipeline_duration_seconds: HistogramVec,
    data_quality_score: GaugeVec,
    active_jobs: GaugeVec,
}

impl EtlMetricsService {
    /// Creates the service with a fresh Prometheus registry.
    pub fn new() -> Result<Self, EtlError> {
        let registry = Registry::new();

        let extracted_records_total = IntCounterVec::new(
            Opts::new(
                "etl_extracted_records_total",
                "Total records extracted, by source",
            ),
            &["source"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_extracted_records_total: {}", e)))?;

        let transformed_records_total = IntCounterVec::new(
            Opts::new(
                "etl_transformed_records_total",
                "Total records normalized, by transformer",
            ),
            &["transformer"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_transformed_records_total: {}", e)))?;

        let loaded_records_total = IntCounterVec::new(
            Opts::new(
                "etl_loaded_records_total",
                "Total records loaded, by destination",
            ),
            &["destination"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_loaded_records_total: {}", e)))?;

        let failed_records_total = IntCounterVec::new(
            Opts::new(
                "etl_failed_records_total",
                "Total failed records, by stage and reason",
            ),
            &["stage", "reason"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_failed_records_total: {}", e)))?;

        let pipeline_runs_total = IntCounterVec::new(
            Opts::new(
                "etl_pipeline_runs_total",
                "Completed pipeline runs, by status and mode",
            ),
            &["status", "mode"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_pipeline_runs_total: {}", e)))?;

        let pipeline_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "etl_pipeline_duration_seconds",
                "Stage and run durations in seconds",
            )
            .buckets(vec![
                10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 3600.0,
            ]),
            &["stage"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_pipeline_duration_seconds: {}", e)))?;

        let data_quality_score = GaugeVec::new(
            Opts::new(
                "etl_data_quality_score",
                "Latest batch quality score, by dimension",
            ),
            &["dimension"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_data_quality_score: {}", e)))?;

        let active_jobs = GaugeVec::new(
            Opts::new("etl_active_jobs", "Currently active pipeline tasks, by type"),
            &["type"],
        )
        .map_err(|e| EtlError::metrics_error(format!("Failed to create etl_active_jobs: {}", e)))?;

        // Register all metrics
        registry
            .register(Box::new(extracted_records_total.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_extracted_records_total: {}", e)))?;
        registry
            .register(Box::new(transformed_records_total.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_transformed_records_total: {}", e)))?;
        registry
            .register(Box::new(loaded_records_total.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_loaded_records_total: {}", e)))?;
        registry
            .register(Box::new(failed_records_total.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_failed_records_total: {}", e)))?;
        registry
            .register(Box::new(pipeline_runs_total.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_pipeline_runs_total: {}", e)))?;
        registry
            .register(Box::new(pipeline_duration_seconds.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_pipeline_duration_seconds: {}", e)))?;
        registry
            .register(Box::new(data_quality_score.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_data_quality_score: {}", e)))?;
        registry
            .register(Box::new(active_jobs.clone()))
            .map_err(|e| EtlError::metrics_error(format!("Failed to register etl_active_jobs: {}", e)))?;

        debug!("EtlMetricsService initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            extracted_records_total,
            transformed_records_total,
            loaded_records_total,
            failed_records_total,
            pipeline_runs_total,
            pipeline_duration_seconds,
            data_quality_score,
            active_jobs,
        })
    }

    pub fn record_extracted(&self, source: &str, count: u64) {
        self.extracted_records_total
            .with_label_values(&[source])
            .inc_by(count);
    }

    pub fn record_transformed(&self, transformer: &str, count: u64) {
        self.transformed_records_total
            .with_label_values(&[transformer])
            .inc_by(count);
    }

    pub fn record_loaded(&self, destination: &str, count: u64) {
        self.loaded_records_total
            .with_label_values(&[destination])
            .inc_by(count);
    }

    pub fn record_failed(&self, stage: &str, reason: &str, count: u64) {
        self.failed_records_total
            .with_label_values(&[stage, reason])
            .inc_by(count);
    }

    pub fn record_run(&self, status: &str, mode: &str) {
        self.pipeline_runs_total
            .with_label_values(&[status, mode])
            .inc();
    }

    pub fn observe_stage_duration(&self, stage: &str, seconds: f64) {
        self.pipeline_duration_seconds
            .with_label_values(&[stage])
            .observe(seconds);
    }

    /// Publishes a batch quality report, one gauge per dimension plus the
    /// weighted overall score.
    pub fn set_quality(&self, dimensions: &QualityDimensions) {
        self.data_quality_score
            .with_label_values(&["completeness"])
            .set(dimensions.completeness);
        self.data_quality_score
            .with_label_values(&["accuracy"])
            .set(dimensions.accuracy);
        self.data_quality_score
            .with_label_values(&["consistency"])
            .set(dimensions.consistency);
        self.data_quality_score
            .with_label_values(&["timeliness"])
            .set(dimensions.timeliness);
        self.data_quality_score
            .with_label_values(&["uniqueness"])
            .set(dimensions.uniqueness);
        self.data_quality_score
            .with_label_values(&["overall"])
            .set(dimensions.weighted_score());
    }

    pub fn job_started(&self, job_type: &str) {
        self.active_jobs.with_label_values(&[job_type]).inc();
    }

    pub fn job_finished(&self, job_type: &str) {
        self.active_jobs.with_label_values(&[job_type]).dec();
    }

    /// Prometheus text exposition for the scrape endpoint.
    pub fn gather(&self) -> Result<String, EtlError> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| EtlError::metrics_error(format!("Failed to encode metrics: {}", e)))
    }

    /// The underlying registry, for advanced consumers.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_metric_families_present() {
        let service = EtlMetricsService::new().unwrap();
        service.record_extracted("mlhcp", 10);
        service.record_transformed("normalizer", 9);
        service.record_loaded("postgres", 8);
        service.record_failed("extract", "validation", 1);
        service.record_run("COMPLETED", "FULL");
        service.observe_stage_duration("extract", 12.5);
        service.set_quality(&QualityDimensions {
            completeness: 0.9,
            accuracy: 0.9,
            consistency: 0.85,
            timeliness: 1.0,
            uniqueness: 1.0,
        });
        service.job_started("extractor");

        let output = service.gather().unwrap();
        for family in [
            "etl_extracted_records_total",
            "etl_transformed_records_total",
            "etl_loaded_records_total",
            "etl_failed_records_total",
            "etl_pipeline_runs_total",
            "etl_pipeline_duration_seconds",
            "etl_data_quality_score",
            "etl_active_jobs",
        ] {
            assert!(output.contains(family), "missing family {}", family);
        }
    }

    #[test]
    fn test_counter_labels() {
        let service = EtlMetricsService::new().unwrap();
        service.record_extracted("mlhcp", 3);
        service.record_extracted("mlhcp", 2);
        let output = service.gather().unwrap();
        assert!(output.contains("etl_extracted_records_total{source=\"mlhcp\"} 5"));
    }

    #[test]
    fn test_active_jobs_gauge_goes_down() {
        let service = EtlMetricsService::new().unwrap();
        service.job_started("loader");
        service.job_started("loader");
        service.job_finished("loader");
        let output = service.gather().unwrap();
        assert!(output.contains("etl_active_jobs{type=\"loader\"} 1"));
    }
}

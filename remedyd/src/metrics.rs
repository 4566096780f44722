//! Prometheus metrics.
//!
//! [`RemedyMetrics`] owns its registry and is shared with the HTTP API
//! through the daemon context; nothing is registered globally.

use crate::selector::SelectionReport;
use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use remedy_common::outcome::outcome_counts;
use remedy_common::{BatchReport, RecordMap};

/// Result label values of `remedy_cycles_total`.
pub mod cycle_result {
    pub const OK: &str = "ok";
    pub const DRY_RUN: &str = "dry_run";
    pub const ORACLE_ERROR: &str = "oracle_error";
    pub const PERSISTENCE_ERROR: &str = "persistence_error";
}

#[derive(Debug, Clone)]
pub struct RemedyMetrics {
    registry: Registry,
    pub candidates: IntGauge,
    pub excluded_candidates: IntGaugeVec,
    pub remediation_requests: IntCounterVec,
    pub remediations: IntCounter,
    pub last_remediation: GaugeVec,
    pub refused_batches: IntCounter,
    pub cycles: IntCounterVec,
    pub records: IntGaugeVec,
    pub oracle_query_duration: HistogramVec,
    pub next_cycle_delay: Gauge,
}

impl RemedyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let candidates = IntGauge::new(
            "remedy_candidates",
            "Machines eligible for remediation in the last cycle, before cooldown",
        )?;
        let excluded_candidates = IntGaugeVec::new(
            Opts::new(
                "remedy_excluded_candidates",
                "Unreachable machines covered by each exclusion in the last cycle",
            ),
            &["exclusion"],
        )?;
        let remediation_requests = IntCounterVec::new(
            Opts::new(
                "remedy_remediation_requests_total",
                "Power-cycle requests sent, by machine and result",
            ),
            &["machine", "site", "status"],
        )?;
        let remediations = IntCounter::new(
            "remedy_remediations_total",
            "Power-cycle requests issued since start",
        )?;
        let last_remediation = GaugeVec::new(
            Opts::new(
                "remedy_last_remediation_timestamp_seconds",
                "Unix time of the last power-cycle request per machine",
            ),
            &["machine", "site"],
        )?;
        let refused_batches = IntCounter::new(
            "remedy_refused_batches_total",
            "Batches refused for exceeding the safety threshold",
        )?;
        let cycles = IntCounterVec::new(
            Opts::new("remedy_cycles_total", "Remediation cycles run, by result"),
            &["result"],
        )?;
        let records = IntGaugeVec::new(
            Opts::new("remedy_records", "Remediation records by outcome"),
            &["outcome"],
        )?;
        let oracle_query_duration = HistogramVec::new(
            HistogramOpts::new(
                "remedy_oracle_query_duration_seconds",
                "Oracle query latency by signal or exclusion",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["query"],
        )?;
        let next_cycle_delay = Gauge::new(
            "remedy_next_cycle_delay_seconds",
            "Delay drawn before the next cycle",
        )?;

        registry.register(Box::new(candidates.clone()))?;
        registry.register(Box::new(excluded_candidates.clone()))?;
        registry.register(Box::new(remediation_requests.clone()))?;
        registry.register(Box::new(remediations.clone()))?;
        registry.register(Box::new(last_remediation.clone()))?;
        registry.register(Box::new(refused_batches.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(records.clone()))?;
        registry.register(Box::new(oracle_query_duration.clone()))?;
        registry.register(Box::new(next_cycle_delay.clone()))?;

        Ok(Self {
            registry,
            candidates,
            excluded_candidates,
            remediation_requests,
            remediations,
            last_remediation,
            refused_batches,
            cycles,
            records,
            oracle_query_duration,
            next_cycle_delay,
        })
    }

    pub fn observe_selection(&self, report: &SelectionReport) {
        self.candidates.set(report.candidates.len() as i64);
        for (exclusion, count) in &report.exclusion_counts {
            self.excluded_candidates
                .with_label_values(&[exclusion.as_str()])
                .set(*count as i64);
        }
        for (query, elapsed) in &report.query_durations {
            self.oracle_query_duration
                .with_label_values(&[query.as_str()])
                .observe(elapsed.as_secs_f64());
        }
    }

    pub fn observe_batch(&self, batch: &BatchReport, at: DateTime<Utc>) {
        if batch.refused {
            self.refused_batches.inc();
        }
        for entity in &batch.attempted {
            let status = if batch.failures.contains_key(&entity.name) {
                "failure"
            } else {
                "success"
            };
            self.remediation_requests
                .with_label_values(&[entity.name.as_str(), entity.site.as_str(), status])
                .inc();
            self.last_remediation
                .with_label_values(&[entity.name.as_str(), entity.site.as_str()])
                .set(at.timestamp() as f64);
        }
        self.remediations.inc_by(batch.attempted.len() as u64);
    }

    pub fn observe_records(&self, records: &RecordMap) {
        for (outcome, count) in outcome_counts(records) {
            self.records
                .with_label_values(&[outcome.as_str()])
                .set(count as i64);
        }
    }

    pub fn observe_cycle(&self, result: &str) {
        self.cycles.with_label_values(&[result]).inc();
    }

    /// Text exposition of every metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

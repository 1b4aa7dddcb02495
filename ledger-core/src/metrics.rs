//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger:
//!
//! - `ledger_events_total{event_type}` - Events accepted
//! - `ledger_duplicate_events_total` - Idempotency hits
//! - `ledger_postings_total{entry_type}` - Postings created
//! - `ledger_payouts_total{status}` - Payout lifecycle transitions
//! - `ledger_ingest_duration_seconds` - Ingest latency histogram
//!
//! Metrics live on an owned [`Registry`] rather than the process-global
//! one, so constructing several `Metrics` (tests, embedded use) cannot
//! collide on registration.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events accepted, by event type
    pub events_total: IntCounterVec,

    /// Duplicate deliveries resolved idempotently
    pub duplicate_events_total: IntCounter,

    /// Postings created, by entry type
    pub postings_total: IntCounterVec,

    /// Payout transitions, by resulting status
    pub payouts_total: IntCounterVec,

    /// Ingest latency histogram
    pub ingest_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounterVec::new(
            Opts::new("ledger_events_total", "Events accepted"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let duplicate_events_total = IntCounter::new(
            "ledger_duplicate_events_total",
            "Duplicate deliveries resolved idempotently",
        )?;
        registry.register(Box::new(duplicate_events_total.clone()))?;

        let postings_total = IntCounterVec::new(
            Opts::new("ledger_postings_total", "Postings created"),
            &["entry_type"],
        )?;
        registry.register(Box::new(postings_total.clone()))?;

        let payouts_total = IntCounterVec::new(
            Opts::new("ledger_payouts_total", "Payout transitions"),
            &["status"],
        )?;
        registry.register(Box::new(payouts_total.clone()))?;

        let ingest_duration = Histogram::with_opts(
            HistogramOpts::new("ledger_ingest_duration_seconds", "Ingest latency").buckets(
                vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0],
            ),
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        Ok(Self {
            events_total,
            duplicate_events_total,
            postings_total,
            payouts_total,
            ingest_duration,
            registry,
        })
    }

    /// Record an accepted event
    pub fn record_event(&self, event_type: &str) {
        self.events_total.with_label_values(&[event_type]).inc();
    }

    /// Record an idempotency hit
    pub fn record_duplicate(&self) {
        self.duplicate_events_total.inc();
    }

    /// Record a created posting
    pub fn record_posting(&self, entry_type: &str) {
        self.postings_total.with_label_values(&[entry_type]).inc();
    }

    /// Record a payout transition
    pub fn record_payout(&self, status: &str) {
        self.payouts_total.with_label_values(&[status]).inc();
    }

    /// Record ingest latency
    pub fn record_ingest_duration(&self, duration_seconds: f64) {
        self.ingest_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.duplicate_events_total.get(), 0);
    }

    #[test]
    fn test_record_event_and_duplicate() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("charge_succeeded");
        metrics.record_event("charge_succeeded");
        metrics.record_duplicate();

        assert_eq!(
            metrics
                .events_total
                .with_label_values(&["charge_succeeded"])
                .get(),
            2
        );
        assert_eq!(metrics.duplicate_events_total.get(), 1);
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors must not collide on registration.
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_payout("created");
        assert_eq!(
            second.payouts_total.with_label_values(&["created"]).get(),
            0
        );
    }
}

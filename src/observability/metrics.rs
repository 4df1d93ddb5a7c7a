//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `registry_credentials_reconciliations_total` - Total number of reconciliation passes
//! - `registry_credentials_reconciliation_errors_total` - Failed passes by error kind
//! - `registry_credentials_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `registry_credentials_provider_fetch_total` - Credential fetches by provider and result
//! - `registry_credentials_secret_sync_total` - Pull secret syncs by outcome
//! - `registry_credentials_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "registry_credentials_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_credentials_reconciliation_errors_total",
            "Total number of failed reconciliation passes by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "registry_credentials_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PROVIDER_FETCH_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_credentials_provider_fetch_total",
            "Total number of credential fetches by provider kind and result",
        ),
        &["provider", "result"],
    )
    .expect("Failed to create PROVIDER_FETCH_TOTAL metric - this should never happen")
});

static SECRET_SYNC_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_credentials_secret_sync_total",
            "Total number of pull secret syncs by outcome (created, updated, unchanged)",
        ),
        &["outcome"],
    )
    .expect("Failed to create SECRET_SYNC_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "registry_credentials_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_FETCH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_SYNC_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

/// Registered metrics in the Prometheus text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Returns the encoder error unchanged"
)]
pub fn encode_metrics() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_provider_fetch(provider: &str, result: &str) {
    PROVIDER_FETCH_TOTAL
        .with_label_values(&[provider, result])
        .inc();
}

pub fn record_secret_sync(outcome: &str) {
    SECRET_SYNC_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["provider"])
            .get();
        increment_reconciliation_errors("provider");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["provider"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_provider_fetch() {
        let before = PROVIDER_FETCH_TOTAL
            .with_label_values(&["AssumedRoleECR", "transport"])
            .get();
        record_provider_fetch("AssumedRoleECR", "transport");
        let after = PROVIDER_FETCH_TOTAL
            .with_label_values(&["AssumedRoleECR", "transport"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_secret_sync() {
        let before = SECRET_SYNC_TOTAL.with_label_values(&["unchanged"]).get();
        record_secret_sync("unchanged");
        assert_eq!(
            SECRET_SYNC_TOTAL.with_label_values(&["unchanged"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get();
        increment_requeues_total("error-backoff");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(0.2);
        // Just verify it doesn't panic
    }
}

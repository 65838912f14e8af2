//! Prometheus metrics for the three robot stages.
//!
//! This module provides metrics for:
//! - Registry traffic (calls, durations, rate-limit pauses)
//! - Overview extraction (agreements found, institutions skipped)
//! - Work queue upload and processing outcomes

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding every metric below.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Only fails on duplicate registration, which all_metrics() rules out.
        let _ = registry.register(metric);
    }
    registry
});

// =============================================================================
// Registry Metrics
// =============================================================================

/// Registry calls by operation and outcome.
pub static REGISTRY_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dataaftaler_registry_calls_total", "Total registry calls"),
        &["operation", "outcome"], // outcome: "success", "error"
    )
    .unwrap()
});

/// Registry call duration in seconds.
pub static REGISTRY_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dataaftaler_registry_call_duration_seconds",
            "Duration of registry calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Rate-limit pauses taken.
pub static RATE_LIMIT_PAUSES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dataaftaler_rate_limit_pauses_total",
        "Total pauses forced by the registry call window",
    )
    .unwrap()
});

// =============================================================================
// Extraction Metrics
// =============================================================================

/// Agreements collected into the overview.
pub static AGREEMENTS_EXTRACTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dataaftaler_agreements_extracted_total",
        "Total agreements collected during extraction",
    )
    .unwrap()
});

/// Institutions skipped after failed fetches.
pub static INSTITUTIONS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dataaftaler_institutions_skipped_total",
            "Institutions skipped during extraction",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics
// =============================================================================

/// Elements handed to the work queue by result.
pub static QUEUE_ELEMENTS_UPLOADED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dataaftaler_queue_elements_uploaded_total",
            "Queue elements pushed by the upload stage",
        ),
        &["result"], // "queued", "already_queued"
    )
    .unwrap()
});

/// Elements processed by outcome.
pub static QUEUE_ELEMENTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dataaftaler_queue_elements_processed_total",
            "Queue elements processed by the handle stage",
        ),
        &["result"], // "done", "retry", "failed"
    )
    .unwrap()
});

/// Get all metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REGISTRY_CALLS.clone()),
        Box::new(REGISTRY_CALL_DURATION.clone()),
        Box::new(RATE_LIMIT_PAUSES.clone()),
        Box::new(AGREEMENTS_EXTRACTED.clone()),
        Box::new(INSTITUTIONS_SKIPPED.clone()),
        Box::new(QUEUE_ELEMENTS_UPLOADED.clone()),
        Box::new(QUEUE_ELEMENTS_PROCESSED.clone()),
    ]
}

/// Render all metrics in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text_contains_counters() {
        RATE_LIMIT_PAUSES.inc();
        QUEUE_ELEMENTS_PROCESSED.with_label_values(&["done"]).inc();

        let text = gather_text();
        assert!(text.contains("dataaftaler_rate_limit_pauses_total"));
        assert!(text.contains("dataaftaler_queue_elements_processed_total"));
    }
}

//! Prometheus metrics exposition
//!
//! - `naming_requests_total` (counter): label `status`
//! - `naming_items_total` (counter): label `outcome`
//! - `naming_fast_credits_total` (counter)
//! - `naming_premium_credits_total` (counter, fractional increments)
//! - `naming_batch_duration_seconds` (histogram)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pipeline::{BatchOutcome, Resolution};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `naming_batch_duration_seconds` gets explicit buckets so it renders as a
/// Prometheus histogram with `_bucket` lines. Inference dominates the batch
/// duration, so the buckets reach into the minutes.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "naming_batch_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.025, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed resolve request with its HTTP status.
pub fn record_request(status: u16) {
    metrics::counter!("naming_requests_total", "status" => status.to_string()).increment(1);
}

/// Record per-item outcomes and the batch's billing totals.
pub fn record_batch(outcome: &BatchOutcome) {
    for item in &outcome.items {
        let label = match item.outcome {
            Resolution::Named(_) => "named",
            Resolution::CreditExceeded => "credit_exceeded",
            Resolution::Failed => "failed",
        };
        metrics::counter!("naming_items_total", "outcome" => label).increment(1);
    }
    metrics::counter!("naming_fast_credits_total").increment(outcome.totals.fast_credits);
    metrics::counter!("naming_premium_credits_total")
        .increment((outcome.totals.premium_credits * 1000.0) as u64);
    metrics::histogram!("naming_batch_duration_seconds")
        .record(outcome.totals.slow_elapsed.as_secs_f64());
}

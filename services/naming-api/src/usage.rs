//! Best-effort usage logging
//!
//! Every batch emits its billing totals as structured fields. A full
//! per-item record is heavier, so it is only emitted for every Nth batch.
//! Logging happens after the response is already determined and can never
//! affect it.

use std::sync::atomic::{AtomicU64, Ordering};

use pipeline::{BatchOutcome, Resolution};
use tracing::info;

pub struct UsageLogger {
    batches: AtomicU64,
    sample_every: u64,
}

impl UsageLogger {
    pub fn new(sample_every: u64) -> Self {
        Self {
            batches: AtomicU64::new(0),
            sample_every: sample_every.max(1),
        }
    }

    pub fn record(&self, account_id: &str, outcome: &BatchOutcome) {
        let batch_no = self.batches.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            account_id,
            items = outcome.items.len(),
            fast_credits = outcome.totals.fast_credits,
            premium_credits = outcome.totals.premium_credits,
            slow_elapsed_secs = outcome.totals.slow_elapsed.as_secs_f64(),
            "batch usage"
        );

        if batch_no % self.sample_every == 0 {
            let statuses: Vec<&'static str> = outcome
                .items
                .iter()
                .map(|item| match item.outcome {
                    Resolution::Named(_) => "named",
                    Resolution::CreditExceeded => "credit_exceeded",
                    Resolution::Failed => "failed",
                })
                .collect();
            info!(
                account_id,
                batch_no,
                statuses = ?statuses,
                "sampled usage record"
            );
        }
    }
}

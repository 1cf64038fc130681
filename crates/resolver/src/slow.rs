//! Slow path: metered inference with memoization
//!
//! One `resolve_batch` call covers every slow-pending item of a request.
//! The result cache is consulted per item first; only genuinely uncached
//! identifiers reach the engine. The returned elapsed time is the
//! wall-clock span of the whole call, cache hits included — that aggregate
//! is the basis for even credit apportionment across the batch, not a
//! per-item profiled cost.
//!
//! A bounded permit pool caps concurrent engine work across requests;
//! excess demand queues. There is no timeout and no cancellation: once a
//! batch holds a permit it runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::engine::{EngineError, InferenceEngine};
use crate::validate::normalize;

/// Per-slot outcome of a slow batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlowOutcome {
    Named(String),
    Failed,
}

pub struct SlowResolver {
    engine: Arc<dyn InferenceEngine>,
    cache: Arc<ResultCache>,
    permits: Arc<Semaphore>,
}

impl SlowResolver {
    pub fn new(engine: Arc<dyn InferenceEngine>, cache: Arc<ResultCache>, pool_size: usize) -> Self {
        Self {
            engine,
            cache,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Resolve a batch in order, returning per-slot outcomes and the
    /// elapsed wall-clock time of the whole call.
    ///
    /// Measured with `tokio::time::Instant` so the apportionment basis is
    /// observable under a paused test clock.
    pub async fn resolve_batch(&self, identifiers: &[String]) -> (Vec<SlowOutcome>, Duration) {
        let started = tokio::time::Instant::now();
        let mut outcomes: Vec<Option<SlowOutcome>> = vec![None; identifiers.len()];

        // Cache pass: slots answered here never touch the engine.
        let mut pending: Vec<(usize, String)> = Vec::new();
        for (index, identifier) in identifiers.iter().enumerate() {
            let key = normalize(identifier);
            match self.cache.get(&key) {
                Some(name) => {
                    debug!(identifier = key.as_str(), "slow path: cache hit");
                    outcomes[index] = Some(SlowOutcome::Named(name));
                }
                None => pending.push((index, key)),
            }
        }

        if !pending.is_empty() {
            let _permit = self.permits.acquire().await;
            let uncached: Vec<String> = pending.iter().map(|(_, key)| key.clone()).collect();

            match self.run_engine(&uncached).await {
                Ok(results) => {
                    for ((index, key), result) in pending.into_iter().zip(results) {
                        match result {
                            Ok(name) => {
                                self.cache.insert(&key, &name);
                                outcomes[index] = Some(SlowOutcome::Named(name));
                            }
                            Err(e) => {
                                debug!(identifier = key.as_str(), error = %e, "inference failed for item");
                                outcomes[index] = Some(SlowOutcome::Failed);
                            }
                        }
                    }
                }
                Err(e) => {
                    // Batch-level failure affects only the uncached slots.
                    warn!(items = uncached.len(), error = %e, "inference batch failed");
                }
            }
        }

        let elapsed = started.elapsed();
        let resolved = outcomes
            .into_iter()
            .map(|o| o.unwrap_or(SlowOutcome::Failed))
            .collect();
        (resolved, elapsed)
    }

    /// Invoke the engine's native batch entry point, or degrade to
    /// sequential single-item calls in order.
    async fn run_engine(
        &self,
        identifiers: &[String],
    ) -> Result<Vec<Result<String, EngineError>>, EngineError> {
        if let Some(batch) = self.engine.infer_batch(identifiers) {
            return batch.await;
        }
        let mut results = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            results.push(self.engine.infer(identifier).await);
        }
        Ok(results)
    }
}

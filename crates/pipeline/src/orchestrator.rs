//! Hybrid pipeline orchestration
//!
//! One `resolve_names` call per inbound batch: fast lookups fan out
//! concurrently, fast debits walk the original order, the leftover subset
//! goes to the slow resolver as a single batch, and its aggregate elapsed
//! cost is apportioned evenly before the premium debits walk the subset in
//! append order. Output always matches the input length and positions.
//!
//! Billing fails closed: a ledger that cannot answer is treated exactly
//! like a rejection, never like an approval.

use std::sync::Arc;
use std::time::Duration;

use ledger::{CreditLedger, Debit, Error as LedgerError};
use resolver::{FastResolver, SlowOutcome, SlowResolver};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::item::{ItemEvent, ItemState, advance};

/// Final status of one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Named(String),
    CreditExceeded,
    Failed,
}

/// One slot of the ordered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionItem {
    pub identifier: String,
    pub index: usize,
    pub outcome: Resolution,
}

/// Aggregate billing totals for one batch, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchTotals {
    pub fast_credits: u64,
    pub premium_credits: f64,
    pub slow_elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub items: Vec<ResolutionItem>,
    pub totals: BatchTotals,
}

/// Premium credits per slow-batch member: elapsed seconds divided evenly
/// across the batch, at one credit per ten seconds of inference.
pub fn credits_per_item(elapsed: Duration, batch_size: usize) -> f64 {
    if batch_size == 0 {
        return 0.0;
    }
    (elapsed.as_secs_f64() / batch_size as f64) / 10.0
}

pub struct Orchestrator {
    ledger: Arc<CreditLedger>,
    fast: Arc<FastResolver>,
    slow: Arc<SlowResolver>,
    fast_workers: usize,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<CreditLedger>,
        fast: Arc<FastResolver>,
        slow: Arc<SlowResolver>,
        fast_workers: usize,
    ) -> Self {
        Self {
            ledger,
            fast,
            slow,
            fast_workers: fast_workers.max(1),
        }
    }

    /// Resolve a batch of identifiers for one account.
    ///
    /// An unknown account fails the whole request; every other failure is
    /// isolated to its item. The returned items are in input order.
    pub async fn resolve_names(
        &self,
        account_id: &str,
        identifiers: &[String],
    ) -> Result<BatchOutcome, LedgerError> {
        match self.ledger.ensure_current_period(account_id).await {
            Ok(()) => {}
            Err(LedgerError::Unavailable(reason)) => {
                // Debits will fail closed against the same outage.
                warn!(account_id, reason = %reason, "period check skipped, ledger unavailable");
            }
            Err(e) => return Err(e),
        }

        let mut states: Vec<ItemState> = vec![ItemState::Pending; identifiers.len()];
        let fast_names = self.fast_lookups(identifiers).await;

        // Fast debits walk the original index order.
        let mut fast_credits = 0u64;
        let mut slow_pending: Vec<usize> = Vec::new();
        for (index, name) in fast_names.into_iter().enumerate() {
            let event = match name {
                Some(name) => ItemEvent::FastHit(name),
                None => ItemEvent::FastMissed,
            };
            let mut state = advance(states[index].clone(), event);

            if matches!(state, ItemState::FastNamed(_)) {
                let accepted = self.debit(account_id, Debit::Fast(1)).await;
                state = advance(
                    state,
                    if accepted {
                        fast_credits += 1;
                        ItemEvent::FastDebitAccepted
                    } else {
                        ItemEvent::FastDebitRejected
                    },
                );
            }
            if state == ItemState::SlowPending {
                slow_pending.push(index);
            }
            states[index] = state;
        }

        // One inference batch for everything the fast path left behind.
        let (slow_elapsed, per_item) = if slow_pending.is_empty() {
            (Duration::ZERO, 0.0)
        } else {
            let subset: Vec<String> = slow_pending
                .iter()
                .map(|&i| identifiers[i].clone())
                .collect();
            let (outcomes, elapsed) = self.slow.resolve_batch(&subset).await;
            let per_item = credits_per_item(elapsed, slow_pending.len());
            debug!(
                account_id,
                batch = slow_pending.len(),
                elapsed_secs = elapsed.as_secs_f64(),
                per_item,
                "slow batch resolved"
            );

            // Premium debits walk the subset in append order.
            for (&index, outcome) in slow_pending.iter().zip(outcomes) {
                let event = match outcome {
                    SlowOutcome::Named(name) => ItemEvent::SlowHit(name),
                    SlowOutcome::Failed => ItemEvent::SlowFailed,
                };
                states[index] = advance(states[index].clone(), event);
            }
            (elapsed, per_item)
        };

        let mut premium_credits = 0.0f64;
        for &index in &slow_pending {
            if matches!(states[index], ItemState::SlowNamed(_)) {
                let accepted = self.debit(account_id, Debit::Premium(per_item)).await;
                states[index] = advance(
                    states[index].clone(),
                    if accepted {
                        premium_credits += per_item;
                        ItemEvent::SlowDebitAccepted
                    } else {
                        ItemEvent::SlowDebitRejected
                    },
                );
            }
        }

        let items = identifiers
            .iter()
            .zip(states)
            .enumerate()
            .map(|(index, (identifier, state))| ResolutionItem {
                identifier: identifier.clone(),
                index,
                outcome: match state {
                    ItemState::Billed(name) => Resolution::Named(name),
                    ItemState::CreditExceeded => Resolution::CreditExceeded,
                    _ => Resolution::Failed,
                },
            })
            .collect();

        Ok(BatchOutcome {
            items,
            totals: BatchTotals {
                fast_credits,
                premium_credits,
                slow_elapsed,
            },
        })
    }

    /// Fan the fast lookups out over a bounded worker pool, collecting
    /// results back into original-index positions.
    async fn fast_lookups(&self, identifiers: &[String]) -> Vec<Option<String>> {
        let semaphore = Arc::new(Semaphore::new(self.fast_workers));
        let mut tasks = JoinSet::new();
        for (index, identifier) in identifiers.iter().cloned().enumerate() {
            let fast = self.fast.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // The semaphore is never closed while tasks hold it.
                let _permit = semaphore.acquire_owned().await.ok();
                (index, fast.resolve(&identifier).await)
            });
        }

        let mut names: Vec<Option<String>> = vec![None; identifiers.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, name)) => names[index] = name,
                Err(e) => warn!(error = %e, "fast lookup task panicked, treating as miss"),
            }
        }
        names
    }

    /// Attempt a debit, collapsing ledger unavailability into rejection.
    async fn debit(&self, account_id: &str, debit: Debit) -> bool {
        match self.ledger.try_consume(account_id, debit).await {
            Ok(outcome) => outcome.accepted(),
            Err(e) => {
                warn!(account_id, error = %e, "debit failed closed");
                false
            }
        }
    }
}

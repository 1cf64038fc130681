//! Credit ledger policy layer
//!
//! The ledger is the only component that issues balance mutations; the
//! orchestrator reacts to accept/reject outcomes and never touches
//! balances directly. Store I/O failure surfaces as `Error::Unavailable`
//! and callers must treat it exactly like a rejection: billing fails
//! closed, never open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::account::{Account, Tier, month_start, same_billing_month};
use crate::error::{Error, Result};
use crate::store::AccountStore;

/// The two non-fungible credit currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    /// One unit per fast-path lookup.
    Fast,
    /// Apportioned inference seconds / 10, fractional.
    Premium,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Fast => "fast",
            Currency::Premium => "premium",
        }
    }
}

/// A single debit request against one currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Debit {
    Fast(u64),
    Premium(f64),
}

impl Debit {
    pub fn currency(&self) -> Currency {
        match self {
            Debit::Fast(_) => Currency::Fast,
            Debit::Premium(_) => Currency::Premium,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Debit::Fast(n) => *n as f64,
            Debit::Premium(x) => *x,
        }
    }
}

/// Outcome of an atomic debit attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebitOutcome {
    Accepted { used: f64, limit: f64 },
    Rejected { requested: f64, available: f64 },
}

impl DebitOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, DebitOutcome::Accepted { .. })
    }
}

/// Policy layer over the account store: debits, lazy monthly resets, tier
/// updates, and administrative overrides.
pub struct CreditLedger {
    store: Arc<dyn AccountStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Register a new account on the given tier with zero usage.
    pub async fn create_account(&self, id: &str, tier: Tier) -> Result<Account> {
        let account = Account::new(id, tier, Utc::now());
        self.store.insert(account.clone()).await?;
        info!(account_id = id, tier = tier.as_str(), "account created");
        Ok(account)
    }

    /// Fetch an account, failing with `AccountNotFound` when absent.
    pub async fn account(&self, id: &str) -> Result<Account> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// Attempt an atomic debit. Insufficient balance is a `Rejected`
    /// outcome; only a missing account or an unreachable store is an error.
    pub async fn try_consume(&self, id: &str, debit: Debit) -> Result<DebitOutcome> {
        let outcome = self.store.try_consume(id, debit).await?;
        match &outcome {
            DebitOutcome::Accepted { used, limit } => {
                debug!(
                    account_id = id,
                    currency = debit.currency().as_str(),
                    amount = debit.amount(),
                    used,
                    limit,
                    "debit accepted"
                );
            }
            DebitOutcome::Rejected { requested, available } => {
                debug!(
                    account_id = id,
                    currency = debit.currency().as_str(),
                    requested,
                    available,
                    "debit rejected"
                );
            }
        }
        Ok(outcome)
    }

    /// Lazily roll the account into the current billing month.
    ///
    /// Invoked before any debit for the account. Idempotent; racing calls
    /// are last-writer-wins, which is equivalent once per month.
    pub async fn ensure_current_period(&self, id: &str) -> Result<()> {
        self.ensure_current_period_at(id, Utc::now()).await
    }

    pub async fn ensure_current_period_at(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let account = self.account(id).await?;
        if !same_billing_month(account.period_anchor, now) {
            let anchor = month_start(now);
            info!(
                account_id = id,
                anchor = %anchor,
                "new billing month, resetting usage counters"
            );
            self.store.begin_period(id, anchor).await?;
        }
        Ok(())
    }

    /// Replace both limits from the tier table. Usage counters are untouched.
    pub async fn set_tier_limits(&self, id: &str, tier: Tier) -> Result<()> {
        self.store.set_tier(id, tier).await?;
        info!(account_id = id, tier = tier.as_str(), "tier limits updated");
        Ok(())
    }

    /// Administrative override: zero both usage counters.
    pub async fn reset_usage(&self, id: &str) -> Result<()> {
        self.store.reset_usage(id).await?;
        info!(account_id = id, "usage counters reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BoxFuture, MemoryStore};
    use chrono::TimeZone;

    fn ledger_with(store: Arc<dyn AccountStore>) -> CreditLedger {
        CreditLedger::new(store)
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_then_consume_walks_the_balance() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store);
        ledger.create_account("a", Tier::Free).await.unwrap();

        let outcome = ledger.try_consume("a", Debit::Fast(1)).await.unwrap();
        assert_eq!(
            outcome,
            DebitOutcome::Accepted {
                used: 1.0,
                limit: Tier::Free.fast_limit() as f64
            }
        );
    }

    #[tokio::test]
    async fn account_lookup_maps_absence_to_not_found() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()));
        let err = ledger.account("ghost").await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn stale_anchor_resets_on_first_access_of_new_month() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());

        let mut account = Account::new("a", Tier::Free, at(2026, 7, 4));
        account.fast_used = 150;
        account.premium_used = 30.0;
        store.insert(account).await.unwrap();

        ledger
            .ensure_current_period_at("a", at(2026, 8, 2))
            .await
            .unwrap();

        let account = ledger.account("a").await.unwrap();
        assert_eq!(account.fast_used, 0);
        assert_eq!(account.premium_used, 0.0);
        assert_eq!(
            account.period_anchor,
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn ensure_current_period_is_idempotent_within_a_month() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        store
            .insert(Account::new("a", Tier::Free, at(2026, 8, 1)))
            .await
            .unwrap();

        ledger.try_consume("a", Debit::Fast(3)).await.unwrap();
        ledger
            .ensure_current_period_at("a", at(2026, 8, 15))
            .await
            .unwrap();
        ledger
            .ensure_current_period_at("a", at(2026, 8, 28))
            .await
            .unwrap();

        let account = ledger.account("a").await.unwrap();
        assert_eq!(account.fast_used, 3, "same-month access must not reset");
    }

    #[tokio::test]
    async fn concurrent_period_checks_settle_on_one_reset() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(ledger_with(store.clone()));
        store
            .insert(Account::new("a", Tier::Free, at(2026, 7, 20)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.ensure_current_period_at("a", at(2026, 8, 2)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let account = ledger.account("a").await.unwrap();
        assert_eq!(account.fast_used, 0);
        assert_eq!(
            account.period_anchor,
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
        );
    }

    /// Store double that fails every operation with `Unavailable`.
    struct DownStore;

    impl AccountStore for DownStore {
        fn get<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<Option<Account>>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn insert(&self, _account: Account) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn try_consume<'a>(
            &'a self,
            _id: &'a str,
            _debit: Debit,
        ) -> BoxFuture<'a, Result<DebitOutcome>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn begin_period<'a>(
            &'a self,
            _id: &'a str,
            _anchor: DateTime<Utc>,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn set_tier<'a>(&'a self, _id: &'a str, _tier: Tier) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn reset_usage<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(Error::Unavailable("store down".into())) })
        }
        fn invalidate<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_as_unavailable() {
        let ledger = ledger_with(Arc::new(DownStore));
        let err = ledger.try_consume("a", Debit::Fast(1)).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn reset_usage_zeroes_both_counters() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone());
        let mut account = Account::new("a", Tier::Plus, Utc::now());
        account.fast_used = 7;
        account.premium_used = 2.5;
        store.insert(account).await.unwrap();

        ledger.reset_usage("a").await.unwrap();

        let account = ledger.account("a").await.unwrap();
        assert_eq!(account.fast_used, 0);
        assert_eq!(account.premium_used, 0.0);
    }
}

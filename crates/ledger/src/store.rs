//! Account store contract and implementations
//!
//! `AccountStore` is the persistence seam. `try_consume` must make the
//! balance check and the increment a single indivisible operation from the
//! perspective of concurrent callers — `MemoryStore` holds one write guard
//! across both, so two racing debits can never jointly overdraw a balance.
//!
//! `CachedStore` layers a read-through cache over `get` and evicts the
//! entry on every committed mutation, so balance reads after a debit are
//! always fresh.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::account::{Account, Tier};
use crate::error::{Error, Result};
use crate::ledger::{Debit, DebitOutcome};

/// Boxed future alias for dyn-compatible trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage contract for accounts and their balances.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn AccountStore>` is shared across the service).
pub trait AccountStore: Send + Sync {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Account>>>;

    /// Create an account. Fails with `AlreadyExists` on a duplicate id.
    fn insert(&self, account: Account) -> BoxFuture<'_, Result<()>>;

    /// Atomic conditional debit: `used + amount <= limit` and the increment
    /// happen under one serialization point. Insufficient balance is a
    /// `Rejected` outcome, not an error.
    fn try_consume<'a>(&'a self, id: &'a str, debit: Debit) -> BoxFuture<'a, Result<DebitOutcome>>;

    /// Zero both usage counters and advance the billing anchor.
    fn begin_period<'a>(&'a self, id: &'a str, anchor: DateTime<Utc>) -> BoxFuture<'a, Result<()>>;

    /// Replace both limits from the tier table. Usage counters are untouched.
    fn set_tier<'a>(&'a self, id: &'a str, tier: Tier) -> BoxFuture<'a, Result<()>>;

    /// Administrative override: zero both usage counters.
    fn reset_usage<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Drop any read-through cache entry for the account. No-op for stores
    /// that serve reads directly.
    fn invalidate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()>;
}

impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Account>>> {
        (**self).get(id)
    }

    fn insert(&self, account: Account) -> BoxFuture<'_, Result<()>> {
        (**self).insert(account)
    }

    fn try_consume<'a>(&'a self, id: &'a str, debit: Debit) -> BoxFuture<'a, Result<DebitOutcome>> {
        (**self).try_consume(id, debit)
    }

    fn begin_period<'a>(&'a self, id: &'a str, anchor: DateTime<Utc>) -> BoxFuture<'a, Result<()>> {
        (**self).begin_period(id, anchor)
    }

    fn set_tier<'a>(&'a self, id: &'a str, tier: Tier) -> BoxFuture<'a, Result<()>> {
        (**self).set_tier(id, tier)
    }

    fn reset_usage<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        (**self).reset_usage(id)
    }

    fn invalidate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        (**self).invalidate(id)
    }
}

/// In-process account store backed by a `RwLock`ed map.
///
/// The write guard in `try_consume` is the serialization point the ledger
/// relies on: check and mutation are indivisible for concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a mutation against one account under the write lock.
    async fn with_account<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Account) -> T,
    ) -> Result<T> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        Ok(f(account))
    }
}

impl AccountStore for MemoryStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Account>>> {
        Box::pin(async move { Ok(self.accounts.read().await.get(id).cloned()) })
    }

    fn insert(&self, account: Account) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&account.id) {
                return Err(Error::AlreadyExists(account.id));
            }
            accounts.insert(account.id.clone(), account);
            Ok(())
        })
    }

    fn try_consume<'a>(&'a self, id: &'a str, debit: Debit) -> BoxFuture<'a, Result<DebitOutcome>> {
        Box::pin(async move {
            self.with_account(id, |account| match debit {
                Debit::Fast(amount) => {
                    if account.fast_used + amount <= account.fast_limit {
                        account.fast_used += amount;
                        DebitOutcome::Accepted {
                            used: account.fast_used as f64,
                            limit: account.fast_limit as f64,
                        }
                    } else {
                        // A tier downgrade can leave used above limit.
                        DebitOutcome::Rejected {
                            requested: amount as f64,
                            available: account.fast_limit.saturating_sub(account.fast_used)
                                as f64,
                        }
                    }
                }
                Debit::Premium(amount) => {
                    if amount >= 0.0 && account.premium_used + amount <= account.premium_limit {
                        account.premium_used += amount;
                        DebitOutcome::Accepted {
                            used: account.premium_used,
                            limit: account.premium_limit,
                        }
                    } else {
                        DebitOutcome::Rejected {
                            requested: amount,
                            available: (account.premium_limit - account.premium_used).max(0.0),
                        }
                    }
                }
            })
            .await
        })
    }

    fn begin_period<'a>(&'a self, id: &'a str, anchor: DateTime<Utc>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.with_account(id, |account| {
                account.fast_used = 0;
                account.premium_used = 0.0;
                account.period_anchor = anchor;
            })
            .await
        })
    }

    fn set_tier<'a>(&'a self, id: &'a str, tier: Tier) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.with_account(id, |account| {
                account.tier = tier;
                account.fast_limit = tier.fast_limit();
                account.premium_limit = tier.premium_limit();
            })
            .await
        })
    }

    fn reset_usage<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.with_account(id, |account| {
                account.fast_used = 0;
                account.premium_used = 0.0;
            })
            .await
        })
    }

    fn invalidate<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ()> {
        // Reads come straight from the map; nothing cached to drop.
        Box::pin(async {})
    }
}

/// Read-through cache over another store.
///
/// `get` serves from the cache when possible. Every committed mutation
/// evicts the entry so the next read is fresh; a rejected debit mutates
/// nothing and leaves the cache intact. The epoch counter keeps a read
/// that raced an eviction from re-inserting its pre-mutation snapshot.
pub struct CachedStore<S> {
    inner: S,
    cached: RwLock<HashMap<String, Account>>,
    epoch: AtomicU64,
}

impl<S: AccountStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cached: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    async fn evict(&self, id: &str) {
        let mut cached = self.cached.write().await;
        self.epoch.fetch_add(1, Ordering::Release);
        if cached.remove(id).is_some() {
            debug!(account_id = id, "account read cache invalidated");
        }
    }
}

impl<S: AccountStore> AccountStore for CachedStore<S> {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Account>>> {
        Box::pin(async move {
            if let Some(account) = self.cached.read().await.get(id) {
                return Ok(Some(account.clone()));
            }
            let epoch = self.epoch.load(Ordering::Acquire);
            let account = self.inner.get(id).await?;
            if let Some(ref account) = account {
                let mut cached = self.cached.write().await;
                // An eviction landed while the snapshot was in flight;
                // caching it now would serve a pre-mutation balance.
                if self.epoch.load(Ordering::Acquire) == epoch {
                    cached.insert(id.to_string(), account.clone());
                }
            }
            Ok(account)
        })
    }

    fn insert(&self, account: Account) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let id = account.id.clone();
            self.inner.insert(account).await?;
            self.evict(&id).await;
            Ok(())
        })
    }

    fn try_consume<'a>(&'a self, id: &'a str, debit: Debit) -> BoxFuture<'a, Result<DebitOutcome>> {
        Box::pin(async move {
            let outcome = self.inner.try_consume(id, debit).await?;
            if outcome.accepted() {
                self.evict(id).await;
            }
            Ok(outcome)
        })
    }

    fn begin_period<'a>(&'a self, id: &'a str, anchor: DateTime<Utc>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.inner.begin_period(id, anchor).await?;
            self.evict(id).await;
            Ok(())
        })
    }

    fn set_tier<'a>(&'a self, id: &'a str, tier: Tier) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.inner.set_tier(id, tier).await?;
            self.evict(id).await;
            Ok(())
        })
    }

    fn reset_usage<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.inner.reset_usage(id).await?;
            self.evict(id).await;
            Ok(())
        })
    }

    fn invalidate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.evict(id).await;
            self.inner.invalidate(id).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_account(id: &str) -> Account {
        Account::new(id, Tier::Free, Utc::now())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = MemoryStore::new();
        store.insert(free_account("a")).await.unwrap();
        let err = store.insert(free_account("a")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn try_consume_unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store.try_consume("ghost", Debit::Fast(1)).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn fast_debit_accepts_up_to_the_exact_limit() {
        let store = MemoryStore::new();
        let mut account = free_account("a");
        account.fast_limit = 2;
        store.insert(account).await.unwrap();

        assert!(store.try_consume("a", Debit::Fast(1)).await.unwrap().accepted());
        assert!(store.try_consume("a", Debit::Fast(1)).await.unwrap().accepted());
        let third = store.try_consume("a", Debit::Fast(1)).await.unwrap();
        assert!(!third.accepted());

        let account = store.get("a").await.unwrap().unwrap();
        assert_eq!(account.fast_used, 2);
    }

    #[tokio::test]
    async fn premium_debit_is_fractional_and_bounded() {
        let store = MemoryStore::new();
        let mut account = free_account("a");
        account.premium_limit = 0.25;
        store.insert(account).await.unwrap();

        assert!(
            store
                .try_consume("a", Debit::Premium(0.2))
                .await
                .unwrap()
                .accepted()
        );
        let second = store.try_consume("a", Debit::Premium(0.2)).await.unwrap();
        assert!(!second.accepted(), "0.4 exceeds the 0.25 limit");

        let account = store.get("a").await.unwrap().unwrap();
        assert!((account.premium_used - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejected_debit_reports_remaining_balance() {
        let store = MemoryStore::new();
        let mut account = free_account("a");
        account.fast_limit = 3;
        account.fast_used = 2;
        store.insert(account).await.unwrap();

        match store.try_consume("a", Debit::Fast(5)).await.unwrap() {
            DebitOutcome::Rejected { requested, available } => {
                assert_eq!(requested, 5.0);
                assert_eq!(available, 1.0);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let mut account = free_account("a");
        account.fast_limit = 50;
        store.insert(account).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..120 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_consume("a", Debit::Fast(1)).await.unwrap().accepted()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 50, "exactly limit-many debits may be accepted");
        let account = store.get("a").await.unwrap().unwrap();
        assert_eq!(account.fast_used, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_premium_debits_respect_the_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut account = free_account("a");
        account.premium_limit = 1.0;
        store.insert(account).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_consume("a", Debit::Premium(0.1))
                    .await
                    .unwrap()
                    .accepted()
            }));
        }

        let accepted = {
            let mut n = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    n += 1;
                }
            }
            n
        };

        let account = store.get("a").await.unwrap().unwrap();
        assert!(account.premium_used <= account.premium_limit + 1e-9);
        // 10 debits of 0.1 fit exactly; float accumulation may admit one
        // fewer but never more.
        assert!(accepted <= 10);
        assert!(accepted >= 9);
    }

    #[tokio::test]
    async fn begin_period_zeroes_usage_and_moves_anchor() {
        let store = MemoryStore::new();
        let mut account = free_account("a");
        account.fast_used = 17;
        account.premium_used = 3.5;
        store.insert(account).await.unwrap();

        let anchor = crate::account::month_start(Utc::now());
        store.begin_period("a", anchor).await.unwrap();

        let account = store.get("a").await.unwrap().unwrap();
        assert_eq!(account.fast_used, 0);
        assert_eq!(account.premium_used, 0.0);
        assert_eq!(account.period_anchor, anchor);
    }

    #[tokio::test]
    async fn set_tier_replaces_limits_without_touching_usage() {
        let store = MemoryStore::new();
        let mut account = free_account("a");
        account.fast_used = 42;
        account.premium_used = 1.25;
        store.insert(account).await.unwrap();

        store.set_tier("a", Tier::Plus).await.unwrap();

        let account = store.get("a").await.unwrap().unwrap();
        assert_eq!(account.tier, Tier::Plus);
        assert_eq!(account.fast_limit, Tier::Plus.fast_limit());
        assert_eq!(account.premium_limit, Tier::Plus.premium_limit());
        assert_eq!(account.fast_used, 42);
        assert_eq!(account.premium_used, 1.25);
    }

    #[tokio::test]
    async fn debit_after_downgrade_rejects_with_zero_available() {
        let store = MemoryStore::new();
        let mut account = Account::new("a", Tier::Plus, Utc::now());
        account.fast_used = 500;
        account.premium_used = 100.0;
        store.insert(account).await.unwrap();

        store.set_tier("a", Tier::Free).await.unwrap();

        match store.try_consume("a", Debit::Fast(1)).await.unwrap() {
            DebitOutcome::Rejected { available, .. } => assert_eq!(available, 0.0),
            other => panic!("expected rejection, got {other:?}"),
        }
        match store.try_consume("a", Debit::Premium(0.1)).await.unwrap() {
            DebitOutcome::Rejected { available, .. } => assert_eq!(available, 0.0),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cached_store_serves_reads_from_cache_until_invalidated() {
        let inner = Arc::new(MemoryStore::new());
        inner.insert(free_account("a")).await.unwrap();
        let cached = CachedStore::new(inner.clone());

        // Prime the cache, then mutate behind its back.
        let before = cached.get("a").await.unwrap().unwrap();
        assert_eq!(before.fast_used, 0);
        inner.try_consume("a", Debit::Fast(1)).await.unwrap();

        let stale = cached.get("a").await.unwrap().unwrap();
        assert_eq!(stale.fast_used, 0, "cached read is served as-is");

        cached.invalidate("a").await;
        let fresh = cached.get("a").await.unwrap().unwrap();
        assert_eq!(fresh.fast_used, 1);
    }

    #[tokio::test]
    async fn accepted_debit_through_cached_store_refreshes_reads() {
        let inner = Arc::new(MemoryStore::new());
        inner.insert(free_account("a")).await.unwrap();
        let cached = CachedStore::new(inner);

        let _ = cached.get("a").await.unwrap();
        assert!(cached.try_consume("a", Debit::Fast(1)).await.unwrap().accepted());

        let account = cached.get("a").await.unwrap().unwrap();
        assert_eq!(account.fast_used, 1, "mutation must evict the cached read");
    }

    /// Store that parks the first `get` after taking its snapshot, so a
    /// test can commit a mutation in the gap before releasing it.
    struct GatedStore {
        inner: MemoryStore,
        gate_next: std::sync::atomic::AtomicBool,
        reached: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl GatedStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                gate_next: std::sync::atomic::AtomicBool::new(false),
                reached: tokio::sync::Notify::new(),
                release: tokio::sync::Notify::new(),
            }
        }
    }

    impl AccountStore for GatedStore {
        fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Account>>> {
            Box::pin(async move {
                let snapshot = self.inner.get(id).await?;
                if self.gate_next.swap(false, Ordering::SeqCst) {
                    self.reached.notify_one();
                    self.release.notified().await;
                }
                Ok(snapshot)
            })
        }

        fn insert(&self, account: Account) -> BoxFuture<'_, Result<()>> {
            self.inner.insert(account)
        }

        fn try_consume<'a>(
            &'a self,
            id: &'a str,
            debit: Debit,
        ) -> BoxFuture<'a, Result<DebitOutcome>> {
            self.inner.try_consume(id, debit)
        }

        fn begin_period<'a>(
            &'a self,
            id: &'a str,
            anchor: DateTime<Utc>,
        ) -> BoxFuture<'a, Result<()>> {
            self.inner.begin_period(id, anchor)
        }

        fn set_tier<'a>(&'a self, id: &'a str, tier: Tier) -> BoxFuture<'a, Result<()>> {
            self.inner.set_tier(id, tier)
        }

        fn reset_usage<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
            self.inner.reset_usage(id)
        }

        fn invalidate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
            self.inner.invalidate(id)
        }
    }

    #[tokio::test]
    async fn read_racing_an_eviction_does_not_cache_its_stale_snapshot() {
        let gated = Arc::new(GatedStore::new(MemoryStore::new()));
        gated.insert(free_account("a")).await.unwrap();
        let cached = Arc::new(CachedStore::new(gated.clone()));

        // Reader takes its snapshot, then parks before returning.
        gated.gate_next.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let cached = cached.clone();
            async move { cached.get("a").await }
        });
        gated.reached.notified().await;

        // Debit commits and evicts while the reader holds the old snapshot.
        assert!(cached.try_consume("a", Debit::Fast(1)).await.unwrap().accepted());
        gated.release.notify_one();

        let raced = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(raced.fast_used, 0, "the in-flight read saw the old balance");

        let fresh = cached.get("a").await.unwrap().unwrap();
        assert_eq!(
            fresh.fast_used, 1,
            "the raced snapshot must not have repopulated the cache"
        );
    }
}

//! Per-account credit accounting for the hybrid naming pipeline
//!
//! Two non-fungible credit currencies meter the two resolution paths: an
//! integer counter for fast database lookups and a fractional counter for
//! slow inference compute-time. The `AccountStore` is the single source of
//! truth for balances; `CreditLedger` is the only component that issues
//! mutations against it.
//!
//! Billing periods are calendar months, evaluated lazily: the first access
//! in a new month resets both counters and advances the anchor. There is no
//! background reset job.

pub mod account;
pub mod error;
pub mod ledger;
pub mod store;

pub use account::{Account, Tier, month_start, same_billing_month};
pub use error::{Error, Result};
pub use ledger::{CreditLedger, Currency, Debit, DebitOutcome};
pub use store::{AccountStore, BoxFuture, CachedStore, MemoryStore};

//! Account model and subscription tiers
//!
//! An account carries two independent balances: `fast_used` (integer, one
//! unit per fast-path lookup) and `premium_used` (fractional, apportioned
//! inference seconds / 10). Limits come from the subscription tier and
//! change only through an explicit tier update. `period_anchor` marks the
//! start of the current billing month.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier defining both credit limits.
///
/// New accounts start on `Free`. Limits are replaced wholesale on a tier
/// update; usage counters are untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Plus,
    Max,
}

impl Tier {
    pub fn fast_limit(&self) -> u64 {
        match self {
            Tier::Free => 200,
            Tier::Plus => 1_000,
            Tier::Max => 5_000,
        }
    }

    pub fn premium_limit(&self) -> f64 {
        match self {
            Tier::Free => 35.0,
            Tier::Plus => 200.0,
            Tier::Max => 1_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Plus => "plus",
            Tier::Max => "max",
        }
    }

    /// Parse a tier name as submitted to the admin API.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Tier::Free),
            "plus" => Some(Tier::Plus),
            "max" => Some(Tier::Max),
            _ => None,
        }
    }
}

/// Per-account balances, limits, and billing anchor.
///
/// Invariant after every committed mutation: `fast_used <= fast_limit` and
/// `premium_used <= premium_limit`. The store's `try_consume` is the only
/// operation that increments usage and it enforces the bound atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub tier: Tier,
    pub fast_used: u64,
    pub fast_limit: u64,
    pub premium_used: f64,
    pub premium_limit: f64,
    pub period_anchor: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account on the given tier with zero usage.
    /// The billing anchor starts at the first day of the current month.
    pub fn new(id: impl Into<String>, tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            tier,
            fast_used: 0,
            fast_limit: tier.fast_limit(),
            premium_used: 0.0,
            premium_limit: tier.premium_limit(),
            period_anchor: month_start(now),
            created_at: now,
        }
    }
}

/// First instant of the calendar month containing `t`.
pub fn month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(t)
}

/// Whether two timestamps fall in the same calendar month.
pub fn same_billing_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

//! Per-item resolution lifecycle
//!
//! Pure (state, event) → state transitions with no I/O, so the billing
//! rules stay unit-testable in isolation. A fast-path debit rejection is
//! not terminal: the item falls through to the slow path, where a second
//! rejection against the premium balance is final.

/// Lifecycle of one identifier within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    /// Awaiting the fast lookup.
    Pending,
    /// Fast lookup produced a name; the fast-currency debit is pending.
    FastNamed(String),
    /// Queued for the slow batch.
    SlowPending,
    /// Inference produced a name; the premium-currency debit is pending.
    SlowNamed(String),
    /// Terminal: name returned and paid for.
    Billed(String),
    /// Terminal: named by inference but the premium balance was depleted.
    CreditExceeded,
    /// Terminal: neither path produced a name.
    Failed,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Billed(_) | ItemState::CreditExceeded | ItemState::Failed
        )
    }
}

/// Events the orchestrator feeds into the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    FastHit(String),
    FastMissed,
    FastDebitAccepted,
    FastDebitRejected,
    SlowHit(String),
    SlowFailed,
    SlowDebitAccepted,
    SlowDebitRejected,
}

/// Apply one event. Events that do not apply to the current state leave it
/// unchanged; terminal states absorb everything.
pub fn advance(state: ItemState, event: ItemEvent) -> ItemState {
    match (state, event) {
        (ItemState::Pending, ItemEvent::FastHit(name)) => ItemState::FastNamed(name),
        (ItemState::Pending, ItemEvent::FastMissed) => ItemState::SlowPending,

        (ItemState::FastNamed(name), ItemEvent::FastDebitAccepted) => ItemState::Billed(name),
        // A depleted fast balance sends the item to the slow path rather
        // than rejecting it outright.
        (ItemState::FastNamed(_), ItemEvent::FastDebitRejected) => ItemState::SlowPending,

        (ItemState::SlowPending, ItemEvent::SlowHit(name)) => ItemState::SlowNamed(name),
        (ItemState::SlowPending, ItemEvent::SlowFailed) => ItemState::Failed,

        (ItemState::SlowNamed(name), ItemEvent::SlowDebitAccepted) => ItemState::Billed(name),
        (ItemState::SlowNamed(_), ItemEvent::SlowDebitRejected) => ItemState::CreditExceeded,

        (state, _) => state,
    }
}

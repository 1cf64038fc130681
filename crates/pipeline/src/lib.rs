//! Hybrid resolution pipeline
//!
//! Drives fast lookup, credit debiting, and batched slow inference for one
//! request, preserving input order end to end. The per-item lifecycle is a
//! pure state machine in [`item`]; [`orchestrator`] wires it to the ledger
//! and the resolvers.

pub mod item;
pub mod orchestrator;

pub use item::{ItemEvent, ItemState, advance};
pub use orchestrator::{
    BatchOutcome, BatchTotals, Orchestrator, Resolution, ResolutionItem, credits_per_item,
};

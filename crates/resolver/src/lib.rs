//! Resolution backends for the hybrid naming pipeline
//!
//! Two paths with very different cost profiles resolve a structure
//! identifier to a systematic name:
//!
//! - the fast path checks a read-only local snapshot, then a remote
//!   structured database bounded by a timeout; any failure is a miss
//! - the slow path runs machine inference behind a bounded worker pool,
//!   memoized through a process-wide LRU cache
//!
//! The orchestrator in the `pipeline` crate decides per item which path
//! applies and meters both against the credit ledger.

pub mod cache;
pub mod engine;
pub mod fast;
pub mod local;
pub mod slow;
pub mod validate;

pub use cache::ResultCache;
pub use engine::{BoxFuture, EngineError, HttpInferenceEngine, InferenceEngine};
pub use fast::{FastResolver, RemoteLookup};
pub use local::{LocalLookup, spawn_load_task};
pub use slow::{SlowOutcome, SlowResolver};
pub use validate::{normalize, validate_identifier};

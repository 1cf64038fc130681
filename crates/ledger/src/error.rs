//! Ledger error types
//!
//! Insufficient balance is never an error here — `try_consume` reports it
//! as a `DebitOutcome::Rejected` value. These variants cover the two
//! genuinely exceptional cases: a missing account (fatal for the whole
//! request) and an unreachable store (callers treat it as a rejection,
//! fail closed).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

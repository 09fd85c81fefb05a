//! Error taxonomy shared by the ledger core.

use std::path::PathBuf;

use thiserror::Error;

use crate::blockchain::validator::CorruptionReason;
use crate::economy::Amount;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    UnknownAccount(String),

    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error("account id must not be empty")]
    EmptyAccountId,

    #[error("cannot send a transaction to yourself")]
    SelfTransfer,

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("network supply exhausted: requested {requested}, reserve holds {remaining}")]
    SupplyExhausted { requested: Amount, remaining: Amount },

    #[error("balance arithmetic overflow")]
    AmountOverflow,

    #[error("no pending transactions to mine")]
    NothingToMine,

    #[error("chain corrupted at block {block_index}: {reason}")]
    ChainCorrupted {
        block_index: u64,
        reason: CorruptionReason,
    },

    #[error("proof search stopped after {iterations} iterations")]
    Timeout { iterations: u64 },

    #[error("proof search cancelled")]
    Cancelled,

    #[error("block template is stale: {0}")]
    StaleTemplate(&'static str),

    #[error("proof {proof} does not satisfy difficulty {difficulty}")]
    InvalidProof { proof: u64, difficulty: u32 },

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("failed to persist {}: {source}", path.display())]
    PersistenceFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Validation failures are expected and leave no state behind.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownAccount(_)
                | LedgerError::AlreadyExists(_)
                | LedgerError::EmptyAccountId
                | LedgerError::SelfTransfer
                | LedgerError::NonPositiveAmount
                | LedgerError::InvalidAmount(_)
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::SupplyExhausted { .. }
                | LedgerError::NothingToMine
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

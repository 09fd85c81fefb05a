use serde::Serialize;
use std::fmt;

use super::Block;
use super::pow::{ProofScheme, meets_difficulty};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionReason {
    BadGenesis,
    IndexGap,
    BrokenLink,
    InvalidProof,
    TamperedTransaction,
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorruptionReason::BadGenesis => "genesis block does not carry the sentinel",
            CorruptionReason::IndexGap => "index does not follow the previous block",
            CorruptionReason::BrokenLink => "previous_hash does not match the previous block",
            CorruptionReason::InvalidProof => "proof does not satisfy the puzzle",
            CorruptionReason::TamperedTransaction => {
                "a transaction no longer matches its stored hash"
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainFault {
    pub block_index: u64,
    pub reason: CorruptionReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub length: usize,
    pub failure: Option<ChainFault>,
}

/// Walk the chain checking genesis, index succession, hash links, stored
/// transaction hashes and proofs. Returns the first failure as
/// `ChainCorrupted`.
pub fn validate(chain: &[Block], scheme: ProofScheme, difficulty: u32) -> Result<()> {
    match first_fault(chain, scheme, difficulty) {
        None => Ok(()),
        Some(fault) => Err(LedgerError::ChainCorrupted {
            block_index: fault.block_index,
            reason: fault.reason,
        }),
    }
}

pub fn report(chain: &[Block], scheme: ProofScheme, difficulty: u32) -> ChainReport {
    let failure = first_fault(chain, scheme, difficulty);
    ChainReport {
        valid: failure.is_none(),
        length: chain.len(),
        failure,
    }
}

fn first_fault(chain: &[Block], scheme: ProofScheme, difficulty: u32) -> Option<ChainFault> {
    let genesis = chain.first()?;
    let mut prev_hash = genesis.compute_hash();

    let genesis_ok = genesis.index == scheme.first_index()
        && genesis.previous_hash == scheme.genesis_previous_hash()
        && match scheme {
            ProofScheme::InterBlock => true,
            ProofScheme::ContentHash => meets_difficulty(&prev_hash, difficulty),
        };
    if !genesis_ok {
        return Some(ChainFault {
            block_index: genesis.index,
            reason: CorruptionReason::BadGenesis,
        });
    }
    if has_tampered_transaction(genesis) {
        return Some(ChainFault {
            block_index: genesis.index,
            reason: CorruptionReason::TamperedTransaction,
        });
    }

    for pair in chain.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let fault = |reason| {
            Some(ChainFault {
                block_index: current.index,
                reason,
            })
        };

        if prev.index.checked_add(1) != Some(current.index) {
            return fault(CorruptionReason::IndexGap);
        }
        if current.previous_hash != prev_hash {
            return fault(CorruptionReason::BrokenLink);
        }
        if has_tampered_transaction(current) {
            return fault(CorruptionReason::TamperedTransaction);
        }
        if !scheme.verify(prev, current, difficulty) {
            return fault(CorruptionReason::InvalidProof);
        }
        prev_hash = current.compute_hash();
    }
    None
}

/// Transactions without a stored hash are covered by the block links only.
fn has_tampered_transaction(block: &Block) -> bool {
    block
        .transactions
        .iter()
        .any(|tx| tx.hash.as_ref().is_some_and(|hash| *hash != tx.compute_hash()))
}

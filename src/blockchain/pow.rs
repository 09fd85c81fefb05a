//! Proof-of-Work: puzzle predicates, a bounded search and the miner that
//! seals blocks with it.
//!
//! Two puzzle schemes are supported:
//! - `InterBlock`: `sha256("{last_proof}{proof}")` must start with
//!   `difficulty` hex zeros, chaining each proof to its predecessor's;
//! - `ContentHash`: the block's own hash must start with `difficulty` zeros.
//!
//! Every search is bounded by an iteration cap and an optional deadline and
//! can be cancelled through a shared flag.

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{Block, GENESIS_PROOF};
use crate::error::{LedgerError, Result};

/// Candidates tried between two checks of the deadline and cancel flag.
const POLL_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofScheme {
    InterBlock,
    ContentHash,
}

impl ProofScheme {
    /// Index carried by the genesis block.
    pub fn first_index(self) -> u64 {
        match self {
            ProofScheme::InterBlock => 1,
            ProofScheme::ContentHash => 0,
        }
    }

    /// Sentinel stored as the genesis block's previous hash.
    pub fn genesis_previous_hash(self) -> &'static str {
        match self {
            ProofScheme::InterBlock => "1",
            ProofScheme::ContentHash => "0",
        }
    }

    /// Whether `current` carries a valid proof relative to `previous`.
    pub fn verify(self, previous: &Block, current: &Block, difficulty: u32) -> bool {
        match self {
            ProofScheme::InterBlock => is_proof_valid(previous.proof, current.proof, difficulty),
            ProofScheme::ContentHash => meets_difficulty(&current.compute_hash(), difficulty),
        }
    }
}

impl fmt::Display for ProofScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProofScheme::InterBlock => "inter-block",
            ProofScheme::ContentHash => "content-hash",
        })
    }
}

/// Bounds on a single proof search.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    pub max_iterations: Option<u64>,
    pub timeout: Option<Duration>,
    pub cancel: Arc<AtomicBool>,
}

impl SearchLimits {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinedProof {
    pub proof: u64,
    /// Candidates evaluated, the winning one included.
    pub iterations: u64,
}

/// Check that a hex digest begins with `difficulty` zeros.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|b| b == b'0')
}

/// Digest checked by the inter-block puzzle.
pub fn proof_hash(last_proof: u64, proof: u64) -> String {
    let guess = format!("{last_proof}{proof}");
    hex::encode(Sha256::digest(guess.as_bytes()))
}

pub fn is_proof_valid(last_proof: u64, proof: u64, difficulty: u32) -> bool {
    meets_difficulty(&proof_hash(last_proof, proof), difficulty)
}

/// Smallest proof that satisfies the inter-block puzzle against `last_proof`.
pub fn find_proof(last_proof: u64, difficulty: u32, limits: &SearchLimits) -> Result<MinedProof> {
    search(limits, |proof| is_proof_valid(last_proof, proof, difficulty))
}

/// Search the block's proof until its own hash meets `difficulty`. On
/// success the winning proof is left in `block.proof`.
pub fn mine(block: &mut Block, difficulty: u32, limits: &SearchLimits) -> Result<MinedProof> {
    let mut candidate = block.clone();
    let mined = search(limits, |proof| {
        candidate.proof = proof;
        meets_difficulty(&candidate.compute_hash(), difficulty)
    })?;
    block.proof = mined.proof;
    Ok(mined)
}

fn search(limits: &SearchLimits, mut holds: impl FnMut(u64) -> bool) -> Result<MinedProof> {
    let started = Instant::now();
    let mut proof: u64 = 0;
    loop {
        if limits.max_iterations.is_some_and(|max| proof >= max) {
            return Err(LedgerError::Timeout { iterations: proof });
        }
        if proof % POLL_INTERVAL == 0 {
            if limits.is_cancelled() {
                return Err(LedgerError::Cancelled);
            }
            if limits.timeout.is_some_and(|t| started.elapsed() >= t) {
                return Err(LedgerError::Timeout { iterations: proof });
            }
        }
        if holds(proof) {
            return Ok(MinedProof {
                proof,
                iterations: proof + 1,
            });
        }
        proof = proof
            .checked_add(1)
            .ok_or(LedgerError::Timeout { iterations: proof })?;
    }
}

/// Seals blocks according to the configured scheme and difficulty.
#[derive(Debug, Clone)]
pub struct Miner {
    pub scheme: ProofScheme,
    pub difficulty: u32,
    pub limits: SearchLimits,
}

impl Miner {
    pub fn new(scheme: ProofScheme, difficulty: u32, limits: SearchLimits) -> Self {
        Self {
            scheme,
            difficulty,
            limits,
        }
    }

    /// Find a proof for `block`, which will follow a block whose proof is
    /// `last_proof`.
    pub fn seal(&self, mut block: Block, last_proof: u64) -> Result<(Block, MinedProof)> {
        let t0 = Instant::now();
        let mined = match self.scheme {
            ProofScheme::InterBlock => {
                let mined = find_proof(last_proof, self.difficulty, &self.limits)?;
                block.proof = mined.proof;
                mined
            }
            ProofScheme::ContentHash => mine(&mut block, self.difficulty, &self.limits)?,
        };
        debug!(
            "POW - block #{} sealed with proof {} after {} iterations ({} ms)",
            block.index,
            mined.proof,
            mined.iterations,
            t0.elapsed().as_millis()
        );
        Ok((block, mined))
    }

    /// Build the genesis block: the fixed sentinel proof for the inter-block
    /// scheme, a mined one for the content-hash scheme.
    pub fn seal_genesis(&self) -> Result<Block> {
        let mut genesis = Block::new(
            self.scheme.first_index(),
            self.scheme.genesis_previous_hash().to_string(),
            Vec::new(),
        );
        match self.scheme {
            ProofScheme::InterBlock => genesis.proof = GENESIS_PROOF,
            ProofScheme::ContentHash => {
                mine(&mut genesis, self.difficulty, &self.limits)?;
            }
        }
        Ok(genesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Timestamp;

    #[test]
    fn known_proof_for_last_proof_100() {
        let limits = SearchLimits::default();
        let first = find_proof(100, 4, &limits).unwrap();
        let second = find_proof(100, 4, &limits).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.proof, 35293);
        assert_eq!(first.iterations, 35294);
        assert!(proof_hash(100, first.proof).starts_with("0000"));
        assert!(is_proof_valid(100, 35293, 4));
        assert!(!is_proof_valid(100, 35292, 4));
    }

    #[test]
    fn smallest_proof_wins() {
        let limits = SearchLimits::default();
        assert_eq!(find_proof(100, 2, &limits).unwrap().proof, 226);
        assert_eq!(find_proof(100, 1, &limits).unwrap().proof, 16);
        assert_eq!(find_proof(100, 0, &limits).unwrap().proof, 0);
    }

    #[test]
    fn content_hash_mining_produces_leading_zeros() {
        let mut b = Block::new_with_timestamp(1, "prev".into(), vec![], Timestamp::from_millis(42));
        let mined = mine(&mut b, 2, &SearchLimits::default()).unwrap();
        assert_eq!(b.proof, mined.proof);
        assert!(b.compute_hash().starts_with("00"));
    }

    #[test]
    fn iteration_cap_stops_search() {
        let limits = SearchLimits {
            max_iterations: Some(10),
            ..SearchLimits::default()
        };
        let err = find_proof(100, 6, &limits).unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { iterations: 10 }));
    }

    #[test]
    fn expired_deadline_stops_search() {
        let limits = SearchLimits {
            timeout: Some(Duration::ZERO),
            ..SearchLimits::default()
        };
        let mut b = Block::new(1, "prev".into(), vec![]);
        let before = b.proof;
        assert!(matches!(
            mine(&mut b, 6, &limits),
            Err(LedgerError::Timeout { .. })
        ));
        assert_eq!(b.proof, before);
    }

    #[test]
    fn raised_flag_cancels_search() {
        let limits = SearchLimits::default();
        limits.cancel.store(true, Ordering::Relaxed);
        assert!(matches!(
            find_proof(100, 6, &limits),
            Err(LedgerError::Cancelled)
        ));
    }

    #[test]
    fn seal_respects_scheme() {
        let template = Block::new(2, "prev".into(), vec![]);

        let inter = Miner::new(ProofScheme::InterBlock, 2, SearchLimits::default());
        let (sealed, mined) = inter.seal(template.clone(), 100).unwrap();
        assert_eq!(sealed.proof, mined.proof);
        assert!(is_proof_valid(100, sealed.proof, 2));

        let content = Miner::new(ProofScheme::ContentHash, 2, SearchLimits::default());
        let (sealed, _) = content.seal(template, 100).unwrap();
        assert!(meets_difficulty(&sealed.compute_hash(), 2));
    }

    #[test]
    fn genesis_follows_scheme() {
        let inter = Miner::new(ProofScheme::InterBlock, 3, SearchLimits::default())
            .seal_genesis()
            .unwrap();
        assert_eq!(inter.index, 1);
        assert_eq!(inter.previous_hash, "1");
        assert_eq!(inter.proof, GENESIS_PROOF);

        let content = Miner::new(ProofScheme::ContentHash, 2, SearchLimits::default())
            .seal_genesis()
            .unwrap();
        assert_eq!(content.index, 0);
        assert_eq!(content.previous_hash, "0");
        assert!(content.compute_hash().starts_with("00"));
    }
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::transaction::model::put_field;
use crate::transaction::{Timestamp, Transaction};

/// A single block in the chain holding an ordered batch of transactions.
///
/// The block hash is not stored: it is recomputed from the fields, so a
/// sealed block reloaded from disk hashes exactly as it did when mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: Timestamp,
    pub transactions: Vec<Transaction>,
    pub proof: u64, // Proof-of-Work solution
    pub previous_hash: String,
}

impl Block {
    /// Create a new block (not sealed yet). Proof starts at zero.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self::new_with_timestamp(index, previous_hash, transactions, Timestamp::now())
    }

    pub fn new_with_timestamp(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            index,
            timestamp,
            transactions,
            proof: 0,
            previous_hash,
        }
    }

    /// SHA-256 over a canonical encoding of every field: fixed order,
    /// length-prefixed strings, big-endian integers.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_be_bytes());
        hasher.update(self.timestamp.millis().to_be_bytes());
        put_field(&mut hasher, self.previous_hash.as_bytes());
        hasher.update(self.proof.to_be_bytes());
        hasher.update((self.transactions.len() as u64).to_be_bytes());
        for tx in &self.transactions {
            tx.write_canonical(&mut hasher);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::economy::Amount;
    use crate::transaction::{Timestamp, Transaction};

    fn sample() -> Block {
        let tx = Transaction::new(
            "alice",
            "bob",
            Amount::from_tokens(4),
            Timestamp::from_millis(1_000),
        );
        Block::new_with_timestamp(2, "prev".into(), vec![tx], Timestamp::from_millis(2_000))
    }

    #[test]
    fn hash_is_deterministic() {
        let b = sample();
        assert_eq!(b.compute_hash(), b.compute_hash());
        assert_eq!(b.compute_hash(), b.clone().compute_hash());
        assert_eq!(b.compute_hash().len(), 64);
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = sample();
        let original = base.compute_hash();

        let mut b = base.clone();
        b.index += 1;
        assert_ne!(original, b.compute_hash());

        let mut b = base.clone();
        b.timestamp = Timestamp::from_millis(2_001);
        assert_ne!(original, b.compute_hash());

        let mut b = base.clone();
        b.previous_hash.push('x');
        assert_ne!(original, b.compute_hash());

        let mut b = base.clone();
        b.proof = 7;
        assert_ne!(original, b.compute_hash());

        let mut b = base.clone();
        b.transactions[0].amount = Amount::from_tokens(5);
        assert_ne!(original, b.compute_hash());

        let mut b = base.clone();
        b.transactions[0].hash = None;
        assert_ne!(original, b.compute_hash());

        let mut b = base;
        b.transactions.clear();
        assert_ne!(original, b.compute_hash());
    }

    #[test]
    fn hash_survives_json_round_trip() {
        let b = sample();
        let json = serde_json::to_string(&b).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
        assert_eq!(back.compute_hash(), b.compute_hash());
    }

    #[test]
    fn serialized_fields_follow_snapshot_layout() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["index", "timestamp", "transactions", "proof", "previous_hash"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 5);
    }
}

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::economy::Amount;

/// Wall-clock instant in Unix milliseconds. Serialized as fractional
/// seconds so persisted files keep the `time()`-style numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Next instant strictly after `self`, used to keep timestamps monotonic.
    pub fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() {
            return Err(serde::de::Error::custom("timestamp must be finite"));
        }
        Ok(Self((secs * 1000.0).round() as i64))
    }
}

/// A transfer between two accounts. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
    pub timestamp: Timestamp,
    /// Content hash; older snapshots may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Transaction {
    /// Build a transaction and derive its content hash.
    pub fn new(sender: &str, recipient: &str, amount: Amount, timestamp: Timestamp) -> Self {
        let mut tx = Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
            hash: None,
        };
        tx.hash = Some(tx.compute_hash());
        tx
    }

    /// SHA-256 over (sender, recipient, amount, timestamp).
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        put_field(&mut hasher, self.sender.as_bytes());
        put_field(&mut hasher, self.recipient.as_bytes());
        hasher.update(self.amount.units().to_be_bytes());
        hasher.update(self.timestamp.millis().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Stored hash, or the derived one for transactions loaded without it.
    pub fn id(&self) -> String {
        self.hash.clone().unwrap_or_else(|| self.compute_hash())
    }

    pub fn involves(&self, account: &str) -> bool {
        self.sender == account || self.recipient == account
    }

    /// Feed every field, the optional hash included, into a block preimage.
    pub(crate) fn write_canonical(&self, hasher: &mut Sha256) {
        put_field(hasher, self.sender.as_bytes());
        put_field(hasher, self.recipient.as_bytes());
        hasher.update(self.amount.units().to_be_bytes());
        hasher.update(self.timestamp.millis().to_be_bytes());
        match &self.hash {
            Some(hash) => {
                hasher.update([1u8]);
                put_field(hasher, hash.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
}

/// Length-prefixed field so adjacent strings cannot run into each other.
pub(crate) fn put_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

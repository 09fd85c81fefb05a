use serde::Serialize;

use super::model::{Timestamp, Transaction};
use crate::blockchain::Block;
use crate::economy::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One sealed transaction seen from a given account.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub hash: String,
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
    pub timestamp: Timestamp,
    pub block_index: u64,
    pub block_hash: String,
    #[serde(rename = "type")]
    pub direction: Direction,
}

impl HistoryEntry {
    fn new(account: &str, tx: &Transaction, block: &Block, block_hash: &str) -> Self {
        let direction = if tx.sender == account {
            Direction::Sent
        } else {
            Direction::Received
        };
        Self {
            hash: tx.id(),
            sender: tx.sender.clone(),
            recipient: tx.recipient.clone(),
            amount: tx.amount,
            timestamp: tx.timestamp,
            block_index: block.index,
            block_hash: block_hash.to_string(),
            direction,
        }
    }
}

/// Every transaction in `blocks` touching `account`, newest first. The
/// genesis block carries no transfers and is skipped.
pub fn collect_history(blocks: &[Block], account: &str) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    for block in blocks.iter().skip(1) {
        let mut block_hash = None;
        for tx in block.transactions.iter().filter(|tx| tx.involves(account)) {
            let hash = block_hash.get_or_insert_with(|| block.compute_hash());
            entries.push(HistoryEntry::new(account, tx, block, hash));
        }
    }
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

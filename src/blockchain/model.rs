use log::{debug, error, info, warn};
use serde::Serialize;

use super::pow::{Miner, ProofScheme, SearchLimits};
use super::validator::{self, ChainReport};
use super::{Block, DEFAULT_DIFFICULTY, DEFAULT_MAX_ITERATIONS};
use crate::economy::{Amount, EconomyStats, SupplyPolicy, TokenEconomy};
use crate::error::{LedgerError, Result};
use crate::storage::{ChainSnapshotRef, Store};
use crate::transaction::{HistoryEntry, Timestamp, Transaction, collect_history};

/// When an admitted transfer gets sealed into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SealPolicy {
    /// Wait in the pending queue until a mine request.
    Batched,
    /// Seal every transfer in its own single-transaction block before
    /// confirming it.
    Immediate,
}

/// What a caller learns about an admitted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Confirmation {
    Pending { expected_block: u64 },
    Sealed { block_index: u64, block_hash: String },
}

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    pub miner: Miner,
    pub policy: SealPolicy,
    pub supply: SupplyPolicy,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        let limits = SearchLimits {
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            ..SearchLimits::default()
        };
        Self {
            miner: Miner::new(ProofScheme::InterBlock, DEFAULT_DIFFICULTY, limits),
            policy: SealPolicy::Batched,
            supply: SupplyPolicy::default(),
        }
    }
}

/// Unsealed block on top of the current head, with the proof it chains from.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    pub last_proof: u64,
}

/// Result of admitting a transfer.
#[derive(Debug)]
pub enum Admission {
    /// Applied and persisted.
    Recorded(Confirmation),
    /// Checked but not applied yet. Seal the template and hand the block to
    /// [`Ledger::commit_transfer`].
    Sealing(BlockTemplate),
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    #[serde(flatten)]
    pub economy: EconomyStats,
    pub total_blocks: usize,
    pub pending_transactions: usize,
    pub total_transactions: usize,
    pub difficulty: u32,
    pub scheme: ProofScheme,
    pub policy: SealPolicy,
}

/// The ledger: chain, pending queue and token economy behind one owner.
///
/// Every mutator persists before returning. If anything fails after the
/// balance table has changed, the in-memory state is rolled back so callers
/// never see a transfer that is not on disk.
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    economy: TokenEconomy,
    miner: Miner,
    policy: SealPolicy,
    store: Box<dyn Store>,
    last_timestamp: Timestamp,
}

impl Ledger {
    /// Load persisted state, sealing and saving a genesis block when no
    /// chain exists yet.
    pub fn open(options: LedgerOptions, store: Box<dyn Store>) -> Result<Self> {
        let balances = store.load_balances()?;
        let fresh_balances = balances.is_none();
        let economy = match balances {
            Some(snapshot) => TokenEconomy::from_snapshot(snapshot, options.supply)?,
            None => TokenEconomy::new(options.supply),
        };
        let snapshot = store.load_chain()?.unwrap_or_default();
        let has_transfers = !snapshot.current_transactions.is_empty()
            || snapshot.chain.iter().any(|b| !b.transactions.is_empty());
        if fresh_balances && has_transfers {
            return Err(LedgerError::CorruptSnapshot(
                "chain holds transfers but no balances were saved".to_string(),
            ));
        }
        let last_timestamp = snapshot
            .chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .chain(snapshot.current_transactions.iter())
            .map(|tx| tx.timestamp)
            .max()
            .unwrap_or_default();

        let mut ledger = Self {
            chain: snapshot.chain,
            pending: snapshot.current_transactions,
            economy,
            miner: options.miner,
            policy: options.policy,
            store,
            last_timestamp,
        };

        if ledger.chain.is_empty() {
            let genesis = ledger.miner.seal_genesis()?;
            info!(
                "LEDGER - genesis block #{} sealed (proof={}, hash={})",
                genesis.index,
                genesis.proof,
                genesis.compute_hash()
            );
            ledger.chain.push(genesis);
            ledger.persist_chain()?;
        } else if let Err(e) = ledger.validate() {
            warn!("LEDGER - loaded chain does not validate: {e}");
        }
        if fresh_balances {
            ledger.persist_balances()?;
        }

        info!(
            "LEDGER - opened with {} blocks, {} pending, {} accounts (policy={:?}, scheme={}, difficulty={})",
            ledger.chain.len(),
            ledger.pending.len(),
            ledger.economy.network_stats().active_accounts,
            ledger.policy,
            ledger.miner.scheme,
            ledger.miner.difficulty
        );
        Ok(ledger)
    }

    /// Register an account funded from the reserve.
    pub fn create_account(&mut self, id: &str) -> Result<Amount> {
        let before = self.economy.clone();
        let granted = self.economy.create_account(id)?;
        if let Err(e) = self.persist_balances() {
            self.economy = before;
            error!("LEDGER - account {id} rolled back: {e}");
            return Err(e);
        }
        info!("LEDGER - account {id} created with {granted}");
        Ok(granted)
    }

    /// Boundary form of [`Ledger::admit_transaction`] taking the amount as
    /// text. Returns the parsed amount with the admission.
    pub fn transfer_raw(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: &str,
    ) -> Result<(Amount, Admission)> {
        let amount = amount.trim().parse::<Amount>()?;
        let admission = self.admit_transaction(sender, recipient, amount)?;
        Ok((amount, admission))
    }

    /// Apply a transfer and record it according to the seal policy, running
    /// any proof search inline.
    #[allow(dead_code)] // the HTTP layer searches off the ledger lock instead
    pub fn add_transaction(&mut self, sender: &str, recipient: &str, amount: Amount) -> Result<Confirmation> {
        match self.admit_transaction(sender, recipient, amount)? {
            Admission::Recorded(confirmation) => Ok(confirmation),
            Admission::Sealing(template) => {
                let (sealed, _) = self
                    .miner
                    .seal(template.block, template.last_proof)
                    .inspect_err(|e| warn!("LEDGER - {sender} -> {recipient}: {amount} dropped: {e}"))?;
                self.commit_transfer(sealed)
            }
        }
    }

    /// Admit a transfer.
    ///
    /// Batched: applied, queued and persisted right away. Immediate: only
    /// checked; balances move when the sealed block is committed.
    pub fn admit_transaction(&mut self, sender: &str, recipient: &str, amount: Amount) -> Result<Admission> {
        match self.policy {
            SealPolicy::Batched => self
                .queue_transaction(sender, recipient, amount)
                .map(Admission::Recorded),
            SealPolicy::Immediate => {
                self.economy.check_transfer(sender, recipient, amount)?;
                let tx = Transaction::new(sender, recipient, amount, self.next_timestamp());
                let last = self.last_block();
                let template = BlockTemplate {
                    block: Block::new(last.index + 1, last.compute_hash(), vec![tx]),
                    last_proof: last.proof,
                };
                debug!(
                    "LEDGER - {sender} -> {recipient}: {amount} awaiting proof for block #{}",
                    template.block.index
                );
                Ok(Admission::Sealing(template))
            }
        }
    }

    fn queue_transaction(&mut self, sender: &str, recipient: &str, amount: Amount) -> Result<Confirmation> {
        let economy_before = self.economy.clone();
        self.economy.transfer(sender, recipient, amount)?;
        let timestamp = self.next_timestamp();
        self.pending
            .push(Transaction::new(sender, recipient, amount, timestamp));

        if let Err(e) = self.persist_balances().and_then(|()| self.persist_chain()) {
            self.economy = economy_before;
            self.pending.pop();
            self.resync_store();
            warn!("LEDGER - {sender} -> {recipient}: {amount} rolled back: {e}");
            return Err(e);
        }
        let confirmation = Confirmation::Pending {
            expected_block: self.last_block().index + 1,
        };
        info!("LEDGER - {sender} -> {recipient}: {amount} ({confirmation:?})");
        Ok(confirmation)
    }

    /// Append a sealed transfer block and apply its transfers. Rejected
    /// without side effects if the head moved since the template was taken
    /// or a transfer no longer passes the balance checks.
    pub fn commit_transfer(&mut self, sealed: Block) -> Result<Confirmation> {
        if sealed.transactions.is_empty() {
            return Err(LedgerError::NothingToMine);
        }
        let last = self.last_block();
        if sealed.index != last.index + 1 || sealed.previous_hash != last.compute_hash() {
            return Err(LedgerError::StaleTemplate("chain head moved"));
        }
        if !self.miner.scheme.verify(last, &sealed, self.miner.difficulty) {
            return Err(LedgerError::InvalidProof {
                proof: sealed.proof,
                difficulty: self.miner.difficulty,
            });
        }

        let economy_before = self.economy.clone();
        for tx in &sealed.transactions {
            if let Err(e) = self.economy.transfer(&tx.sender, &tx.recipient, tx.amount) {
                self.economy = economy_before;
                warn!(
                    "LEDGER - {} -> {}: {} dropped at commit: {e}",
                    tx.sender, tx.recipient, tx.amount
                );
                return Err(e);
            }
        }

        let confirmation = Confirmation::Sealed {
            block_index: sealed.index,
            block_hash: sealed.compute_hash(),
        };
        self.chain.push(sealed);
        if let Err(e) = self.persist_balances().and_then(|()| self.persist_chain()) {
            self.economy = economy_before;
            self.chain.pop();
            self.resync_store();
            error!("LEDGER - transfer block commit rolled back: {e}");
            return Err(e);
        }
        info!("LEDGER - transfer sealed ({confirmation:?})");
        Ok(confirmation)
    }

    /// Seal the whole pending queue into a new block.
    #[allow(dead_code)] // the HTTP layer runs the search off the ledger lock
    pub fn mine_block(&mut self) -> Result<Block> {
        let template = self.block_template()?;
        let (sealed, _) = self.miner.seal(template.block, template.last_proof)?;
        self.commit_block(sealed)
    }

    /// First half of [`Ledger::mine_block`]: the block to search a proof for.
    pub fn block_template(&self) -> Result<BlockTemplate> {
        if self.pending.is_empty() {
            return Err(LedgerError::NothingToMine);
        }
        let last = self.last_block();
        Ok(BlockTemplate {
            block: Block::new(last.index + 1, last.compute_hash(), self.pending.clone()),
            last_proof: last.proof,
        })
    }

    /// Second half of [`Ledger::mine_block`]: append a block sealed from a
    /// template if it still extends the current head and covers the front
    /// of the queue.
    pub fn commit_block(&mut self, sealed: Block) -> Result<Block> {
        if sealed.transactions.is_empty() {
            return Err(LedgerError::NothingToMine);
        }
        let last = self.last_block();
        if sealed.index != last.index + 1 || sealed.previous_hash != last.compute_hash() {
            return Err(LedgerError::StaleTemplate("chain head moved"));
        }
        if !self.pending.starts_with(&sealed.transactions) {
            return Err(LedgerError::StaleTemplate("pending queue changed"));
        }
        if !self.miner.scheme.verify(last, &sealed, self.miner.difficulty) {
            return Err(LedgerError::InvalidProof {
                proof: sealed.proof,
                difficulty: self.miner.difficulty,
            });
        }

        let sealed_txs: Vec<Transaction> = self.pending.drain(..sealed.transactions.len()).collect();
        self.chain.push(sealed);
        if let Err(e) = self.persist_chain() {
            self.chain.pop();
            self.pending.splice(0..0, sealed_txs);
            error!("LEDGER - block commit rolled back: {e}");
            return Err(e);
        }

        let block = self.last_block().clone();
        info!(
            "LEDGER - sealed block #{} with {} txs (proof={}, hash={})",
            block.index,
            block.transactions.len(),
            block.proof,
            block.compute_hash()
        );
        Ok(block)
    }

    pub fn balance(&self, id: &str) -> Amount {
        self.economy.balance(id)
    }

    pub fn network_stats(&self) -> NetworkStats {
        NetworkStats {
            economy: self.economy.network_stats(),
            total_blocks: self.chain.len(),
            pending_transactions: self.pending.len(),
            total_transactions: self.chain.iter().map(|b| b.transactions.len()).sum(),
            difficulty: self.miner.difficulty,
            scheme: self.miner.scheme,
            policy: self.policy,
        }
    }

    /// Sealed transactions involving `id`, newest first.
    pub fn transaction_history(&self, id: &str) -> Vec<HistoryEntry> {
        collect_history(&self.chain, id)
    }

    pub fn validate(&self) -> Result<()> {
        validator::validate(&self.chain, self.miner.scheme, self.miner.difficulty)
    }

    pub fn chain_report(&self) -> ChainReport {
        validator::report(&self.chain, self.miner.scheme, self.miner.difficulty)
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger always holds at least the genesis block")
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    #[cfg(test)]
    pub fn economy(&self) -> &TokenEconomy {
        &self.economy
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn scheme(&self) -> ProofScheme {
        self.miner.scheme
    }

    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let ts = if now > self.last_timestamp {
            now
        } else {
            self.last_timestamp.successor()
        };
        self.last_timestamp = ts;
        ts
    }

    fn persist_balances(&self) -> Result<()> {
        self.store.save_balances(&self.economy.to_snapshot())
    }

    fn persist_chain(&self) -> Result<()> {
        self.store.save_chain(&ChainSnapshotRef {
            chain: &self.chain,
            current_transactions: &self.pending,
        })
    }

    /// Best effort to bring the store back in line with memory after a
    /// partial save.
    fn resync_store(&self) {
        if let Err(e) = self.persist_balances().and_then(|()| self.persist_chain()) {
            error!("LEDGER - store may diverge from memory: {e}");
        }
    }
}

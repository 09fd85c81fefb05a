use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{Amount, DEFAULT_INITIAL_BALANCE, DEFAULT_TOTAL_SUPPLY, RESERVE_ACCOUNT};
use crate::error::{LedgerError, Result};
use crate::storage::BalancesSnapshot;

/// Entry key in the balance table. The reserve holds unissued supply and is
/// never a party to user transfers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountKey {
    Reserve,
    User(String),
}

impl AccountKey {
    /// Map a persisted account name to its key.
    pub fn from_name(name: &str) -> Self {
        if name == RESERVE_ACCOUNT {
            AccountKey::Reserve
        } else {
            AccountKey::User(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AccountKey::Reserve => RESERVE_ACCOUNT,
            AccountKey::User(id) => id,
        }
    }
}

/// Supply parameters; fixed for the lifetime of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyPolicy {
    pub total_supply: Amount,
    pub initial_balance: Amount,
}

impl Default for SupplyPolicy {
    fn default() -> Self {
        Self {
            total_supply: DEFAULT_TOTAL_SUPPLY,
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EconomyStats {
    pub total_supply: Amount,
    pub total_distributed: Amount,
    pub network_reserve: Amount,
    pub active_accounts: usize,
}

/// Account balances under a fixed total supply.
///
/// Invariants, checked by [`TokenEconomy::is_conserved`]:
/// - the balances (reserve included) sum to `total_supply`;
/// - `total_distributed == total_supply - reserve`.
#[derive(Debug, Clone)]
pub struct TokenEconomy {
    policy: SupplyPolicy,
    balances: BTreeMap<AccountKey, Amount>,
    total_distributed: Amount,
}

impl TokenEconomy {
    /// Fresh economy with the whole supply sitting in the reserve.
    pub fn new(policy: SupplyPolicy) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(AccountKey::Reserve, policy.total_supply);
        Self {
            policy,
            balances,
            total_distributed: Amount::ZERO,
        }
    }

    #[cfg(test)]
    pub fn policy(&self) -> SupplyPolicy {
        self.policy
    }

    /// Issue the initial balance from the reserve to a new account.
    pub fn create_account(&mut self, id: &str) -> Result<Amount> {
        if id.trim().is_empty() {
            return Err(LedgerError::EmptyAccountId);
        }
        let key = AccountKey::from_name(id);
        if key == AccountKey::Reserve || self.balances.contains_key(&key) {
            return Err(LedgerError::AlreadyExists(id.to_string()));
        }

        let grant = self.policy.initial_balance;
        let reserve = self.reserve_balance();
        let distributed = self
            .total_distributed
            .checked_add(grant)
            .filter(|d| *d <= self.policy.total_supply)
            .ok_or(LedgerError::SupplyExhausted {
                requested: grant,
                remaining: reserve,
            })?;
        let reserve_after = reserve
            .checked_sub(grant)
            .ok_or(LedgerError::SupplyExhausted {
                requested: grant,
                remaining: reserve,
            })?;

        self.balances.insert(AccountKey::Reserve, reserve_after);
        self.balances.insert(key, grant);
        self.total_distributed = distributed;
        debug!("ECONOMY - issued {grant} to {id} (reserve now {reserve_after})");
        Ok(grant)
    }

    /// Stored balance, or zero for an unknown id.
    pub fn balance(&self, id: &str) -> Amount {
        self.balances
            .get(&AccountKey::from_name(id))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Whether `id` names a user account.
    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.user_balance(id).is_some()
    }

    pub fn reserve_balance(&self) -> Amount {
        self.balances
            .get(&AccountKey::Reserve)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    #[cfg(test)]
    pub fn total_distributed(&self) -> Amount {
        self.total_distributed
    }

    /// Move `amount` between two user accounts. All checks run before any
    /// balance is touched.
    pub fn transfer(&mut self, sender: &str, recipient: &str, amount: Amount) -> Result<()> {
        let (sender_after, recipient_after) = self.plan_transfer(sender, recipient, amount)?;
        self.balances
            .insert(AccountKey::User(sender.to_string()), sender_after);
        self.balances
            .insert(AccountKey::User(recipient.to_string()), recipient_after);
        debug!("ECONOMY - {sender} -> {recipient}: {amount}");
        Ok(())
    }

    /// Run the checks of [`TokenEconomy::transfer`] without applying it.
    pub fn check_transfer(&self, sender: &str, recipient: &str, amount: Amount) -> Result<()> {
        self.plan_transfer(sender, recipient, amount).map(|_| ())
    }

    /// Balances of both parties after the transfer.
    fn plan_transfer(&self, sender: &str, recipient: &str, amount: Amount) -> Result<(Amount, Amount)> {
        if sender == recipient {
            return Err(LedgerError::SelfTransfer);
        }
        let available = self
            .user_balance(sender)
            .ok_or_else(|| LedgerError::UnknownAccount(sender.to_string()))?;
        let recipient_balance = self
            .user_balance(recipient)
            .ok_or_else(|| LedgerError::UnknownAccount(recipient.to_string()))?;
        if amount.is_zero() {
            return Err(LedgerError::NonPositiveAmount);
        }
        let sender_after = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            })?;
        let recipient_after = recipient_balance
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        Ok((sender_after, recipient_after))
    }

    pub fn network_stats(&self) -> EconomyStats {
        EconomyStats {
            total_supply: self.policy.total_supply,
            total_distributed: self.total_distributed,
            network_reserve: self.reserve_balance(),
            active_accounts: self.users().count(),
        }
    }

    /// User accounts in id order.
    pub fn users(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.balances.iter().filter_map(|(key, amount)| match key {
            AccountKey::User(id) => Some((id.as_str(), *amount)),
            AccountKey::Reserve => None,
        })
    }

    /// Recompute both supply invariants from the table.
    pub fn is_conserved(&self) -> bool {
        let users = self
            .users()
            .try_fold(Amount::ZERO, |acc, (_, amount)| acc.checked_add(amount));
        let Some(users) = users else {
            return false;
        };
        let reserve = self.reserve_balance();
        users.checked_add(reserve) == Some(self.policy.total_supply)
            && users == self.total_distributed
    }

    pub fn to_snapshot(&self) -> BalancesSnapshot {
        BalancesSnapshot {
            balances: self
                .balances
                .iter()
                .map(|(key, amount)| (key.name().to_string(), *amount))
                .collect(),
            total_distributed: self.total_distributed,
            total_supply: self.policy.total_supply,
            initial_user_balance: self.policy.initial_balance,
        }
    }

    /// Rebuild from a persisted snapshot. A missing reserve entry is
    /// derived from `total_distributed`; anything that then fails the
    /// supply invariants is rejected.
    pub fn from_snapshot(snapshot: BalancesSnapshot, policy: SupplyPolicy) -> Result<Self> {
        if !snapshot.total_supply.is_zero() && snapshot.total_supply != policy.total_supply {
            return Err(LedgerError::CorruptSnapshot(format!(
                "total supply {} does not match configured {}",
                snapshot.total_supply, policy.total_supply
            )));
        }

        let mut balances = BTreeMap::new();
        for (name, amount) in snapshot.balances {
            if name.trim().is_empty() {
                return Err(LedgerError::CorruptSnapshot(
                    "empty account name in balances".to_string(),
                ));
            }
            balances.insert(AccountKey::from_name(&name), amount);
        }
        if !balances.contains_key(&AccountKey::Reserve) {
            let reserve = policy
                .total_supply
                .checked_sub(snapshot.total_distributed)
                .ok_or_else(|| {
                    LedgerError::CorruptSnapshot(
                        "distributed supply exceeds total supply".to_string(),
                    )
                })?;
            balances.insert(AccountKey::Reserve, reserve);
        }

        let economy = Self {
            policy,
            balances,
            total_distributed: snapshot.total_distributed,
        };
        if !economy.is_conserved() {
            return Err(LedgerError::CorruptSnapshot(
                "balances do not sum to the total supply".to_string(),
            ));
        }
        Ok(economy)
    }

    fn user_balance(&self, id: &str) -> Option<Amount> {
        match AccountKey::from_name(id) {
            AccountKey::Reserve => None,
            key => self.balances.get(&key).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn economy_with(ids: &[&str]) -> TokenEconomy {
        let mut economy = TokenEconomy::new(SupplyPolicy::default());
        for id in ids {
            economy.create_account(id).unwrap();
        }
        economy
    }

    #[test]
    fn alice_pays_bob() {
        let mut economy = economy_with(&["alice", "bob"]);
        economy
            .transfer("alice", "bob", Amount::from_tokens(4))
            .unwrap();
        assert_eq!(economy.balance("alice"), Amount::from_tokens(6));
        assert_eq!(economy.balance("bob"), Amount::from_tokens(14));

        let err = economy
            .transfer("alice", "bob", Amount::from_tokens(100))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(economy.balance("alice"), Amount::from_tokens(6));
        assert_eq!(economy.balance("bob"), Amount::from_tokens(14));
        assert!(economy.is_conserved());
    }

    #[test]
    fn create_account_debits_reserve() {
        let mut economy = TokenEconomy::new(SupplyPolicy::default());
        let granted = economy.create_account("carol").unwrap();
        assert_eq!(granted, DEFAULT_INITIAL_BALANCE);
        assert_eq!(
            economy.reserve_balance(),
            DEFAULT_TOTAL_SUPPLY.checked_sub(granted).unwrap()
        );
        assert_eq!(economy.total_distributed(), granted);
        assert!(economy.is_conserved());

        assert!(matches!(
            economy.create_account("carol"),
            Err(LedgerError::AlreadyExists(_))
        ));
        assert!(matches!(
            economy.create_account(RESERVE_ACCOUNT),
            Err(LedgerError::AlreadyExists(_))
        ));
        assert!(matches!(
            economy.create_account("  "),
            Err(LedgerError::EmptyAccountId)
        ));
    }

    #[test]
    fn supply_runs_out() {
        let policy = SupplyPolicy {
            total_supply: Amount::from_tokens(25),
            initial_balance: Amount::from_tokens(10),
        };
        let mut economy = TokenEconomy::new(policy);
        economy.create_account("a").unwrap();
        economy.create_account("b").unwrap();
        let err = economy.create_account("c").unwrap_err();
        assert!(matches!(err, LedgerError::SupplyExhausted { .. }));
        assert!(!economy.contains("c"));
        assert_eq!(economy.reserve_balance(), Amount::from_tokens(5));
        assert!(economy.is_conserved());
    }

    #[test]
    fn rejected_transfers_change_nothing() {
        let mut economy = economy_with(&["alice", "bob"]);
        let cases = [
            ("alice", "alice", Amount::from_tokens(1)),
            ("alice", "nobody", Amount::from_tokens(1)),
            ("nobody", "bob", Amount::from_tokens(1)),
            ("alice", "bob", Amount::ZERO),
            ("alice", "bob", Amount::from_tokens(11)),
            (RESERVE_ACCOUNT, "bob", Amount::from_tokens(1)),
        ];
        for (sender, recipient, amount) in cases {
            assert!(economy.transfer(sender, recipient, amount).is_err());
            assert_eq!(economy.balance("alice"), Amount::from_tokens(10));
            assert_eq!(economy.balance("bob"), Amount::from_tokens(10));
            assert!(economy.is_conserved());
        }
    }

    #[test]
    fn check_transfer_touches_nothing() {
        let economy = economy_with(&["alice", "bob"]);
        economy
            .check_transfer("alice", "bob", Amount::from_tokens(10))
            .unwrap();
        assert!(matches!(
            economy.check_transfer("alice", "bob", Amount::from_tokens(11)),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(economy.balance("alice"), Amount::from_tokens(10));
        assert_eq!(economy.balance("bob"), Amount::from_tokens(10));
    }

    #[test]
    fn rejection_order_follows_checks() {
        let mut economy = economy_with(&["alice", "bob"]);
        assert!(matches!(
            economy.transfer("ghost", "ghost", Amount::ZERO),
            Err(LedgerError::SelfTransfer)
        ));
        assert!(matches!(
            economy.transfer("ghost", "bob", Amount::ZERO),
            Err(LedgerError::UnknownAccount(id)) if id == "ghost"
        ));
        assert!(matches!(
            economy.transfer("alice", "bob", Amount::ZERO),
            Err(LedgerError::NonPositiveAmount)
        ));
    }

    #[test]
    fn conservation_holds_across_many_small_transfers() {
        let mut economy = economy_with(&["a", "b", "c"]);
        let step = "0.01".parse::<Amount>().unwrap();
        let ids = ["a", "b", "c"];
        for i in 0..600 {
            let from = ids[i % 3];
            let to = ids[(i + 1) % 3];
            economy.transfer(from, to, step).unwrap();
            assert!(economy.is_conserved());
        }
        let sum = ids
            .iter()
            .map(|id| economy.balance(id).units())
            .sum::<u64>();
        assert_eq!(sum, Amount::from_tokens(30).units());
    }

    #[test]
    fn unknown_balance_is_zero_without_side_effects() {
        let economy = economy_with(&["alice"]);
        assert_eq!(economy.balance("stranger"), Amount::ZERO);
        assert!(!economy.contains("stranger"));
        assert_eq!(economy.network_stats().active_accounts, 1);
    }

    #[test]
    fn snapshot_round_trip_and_missing_reserve() {
        let mut economy = economy_with(&["alice", "bob"]);
        economy
            .transfer("bob", "alice", "2.5".parse().unwrap())
            .unwrap();
        let snapshot = economy.to_snapshot();
        assert_eq!(
            snapshot.balances.get(RESERVE_ACCOUNT),
            Some(&economy.reserve_balance())
        );

        let reloaded = TokenEconomy::from_snapshot(snapshot.clone(), economy.policy()).unwrap();
        assert_eq!(reloaded.to_snapshot(), snapshot);

        let mut without_reserve = snapshot;
        without_reserve.balances.remove(RESERVE_ACCOUNT);
        let rebuilt = TokenEconomy::from_snapshot(without_reserve, economy.policy()).unwrap();
        assert_eq!(rebuilt.reserve_balance(), economy.reserve_balance());
    }

    #[test]
    fn snapshot_breaking_conservation_is_rejected() {
        let economy = economy_with(&["alice"]);
        let mut snapshot = economy.to_snapshot();
        snapshot
            .balances
            .insert("alice".to_string(), Amount::from_tokens(1_000));
        let err = TokenEconomy::from_snapshot(snapshot, economy.policy()).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptSnapshot(_)));
    }
}

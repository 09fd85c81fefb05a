pub mod amount;
pub mod model;

pub use amount::Amount;
pub use model::{EconomyStats, SupplyPolicy, TokenEconomy};

/// Name under which the reserve is persisted.
pub const RESERVE_ACCOUNT: &str = "NETWORK";

/// Fixed supply across all accounts (reserve included).
pub const DEFAULT_TOTAL_SUPPLY: Amount = Amount::from_tokens(1_000_000);

/// Tokens granted to every newly registered account.
pub const DEFAULT_INITIAL_BALANCE: Amount = Amount::from_tokens(10);

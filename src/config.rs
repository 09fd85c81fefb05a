//! Runtime configuration read from the environment (after `.env` is loaded).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::{
    DEFAULT_DIFFICULTY, DEFAULT_MAX_ITERATIONS, DIFF_MAX, DIFF_MIN, LedgerOptions, Miner,
    ProofScheme, SealPolicy, SearchLimits,
};
use crate::economy::{Amount, DEFAULT_INITIAL_BALANCE, DEFAULT_TOTAL_SUPPLY, SupplyPolicy};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("LEDGER_DIFFICULTY must be within {min}..={max}, got {value}", min = DIFF_MIN, max = DIFF_MAX)]
    DifficultyOutOfRange { value: u32 },

    #[error("initial balance {initial} exceeds total supply {total}")]
    InitialExceedsSupply { initial: Amount, total: Amount },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` keeps the ledger in memory only.
    pub data_dir: Option<PathBuf>,
    pub scheme: ProofScheme,
    pub difficulty: u32,
    pub policy: SealPolicy,
    pub max_iterations: Option<u64>,
    pub mine_timeout: Option<Duration>,
    pub supply: SupplyPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
            scheme: ProofScheme::InterBlock,
            difficulty: DEFAULT_DIFFICULTY,
            policy: SealPolicy::Batched,
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            mine_timeout: None,
            supply: SupplyPolicy {
                total_supply: DEFAULT_TOTAL_SUPPLY,
                initial_balance: DEFAULT_INITIAL_BALANCE,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let host = get("HOST")
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults.host);
        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| invalid("PORT", &v, "not a port number"))?,
            None => defaults.port,
        };
        let data_dir = match get("LEDGER_DATA_DIR") {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => defaults.data_dir,
        };

        let difficulty = match get("LEDGER_DIFFICULTY") {
            Some(v) => v
                .parse()
                .map_err(|_| invalid("LEDGER_DIFFICULTY", &v, "not an integer"))?,
            None => defaults.difficulty,
        };
        if !(DIFF_MIN..=DIFF_MAX).contains(&difficulty) {
            return Err(ConfigError::DifficultyOutOfRange { value: difficulty });
        }

        let scheme = match get("LEDGER_SCHEME").as_deref() {
            None => defaults.scheme,
            Some("inter-block") => ProofScheme::InterBlock,
            Some("content-hash") => ProofScheme::ContentHash,
            Some(other) => {
                return Err(invalid(
                    "LEDGER_SCHEME",
                    other,
                    "expected inter-block or content-hash",
                ));
            }
        };
        let policy = match get("LEDGER_SEAL_POLICY").as_deref() {
            None => defaults.policy,
            Some("batched") => SealPolicy::Batched,
            Some("immediate") => SealPolicy::Immediate,
            Some(other) => {
                return Err(invalid(
                    "LEDGER_SEAL_POLICY",
                    other,
                    "expected batched or immediate",
                ));
            }
        };

        // 0 disables the cap.
        let max_iterations = match get("LEDGER_MAX_ITERATIONS") {
            Some(v) => match v.parse::<u64>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => return Err(invalid("LEDGER_MAX_ITERATIONS", &v, "not an integer")),
            },
            None => defaults.max_iterations,
        };
        let mine_timeout = match get("LEDGER_MINE_TIMEOUT_MS") {
            Some(v) => match v.parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => return Err(invalid("LEDGER_MINE_TIMEOUT_MS", &v, "not an integer")),
            },
            None => defaults.mine_timeout,
        };

        let total_supply = amount_var(&get, "LEDGER_TOTAL_SUPPLY")?
            .unwrap_or(defaults.supply.total_supply);
        let initial_balance = amount_var(&get, "LEDGER_INITIAL_BALANCE")?
            .unwrap_or(defaults.supply.initial_balance);
        if initial_balance > total_supply {
            return Err(ConfigError::InitialExceedsSupply {
                initial: initial_balance,
                total: total_supply,
            });
        }

        Ok(Self {
            host,
            port,
            data_dir,
            scheme,
            difficulty,
            policy,
            max_iterations,
            mine_timeout,
            supply: SupplyPolicy {
                total_supply,
                initial_balance,
            },
        })
    }

    /// Options for [`crate::blockchain::Ledger::open`]. Searches stop once
    /// `limits.cancel` is raised.
    pub fn ledger_options(&self, limits: SearchLimits) -> LedgerOptions {
        let limits = SearchLimits {
            max_iterations: self.max_iterations,
            timeout: self.mine_timeout,
            ..limits
        };
        LedgerOptions {
            miner: Miner::new(self.scheme, self.difficulty, limits),
            policy: self.policy,
            supply: self.supply,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason,
    }
}

fn amount_var(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Amount>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(v) => match v.parse::<Amount>() {
            Ok(amount) if !amount.is_zero() => Ok(Some(amount)),
            _ => Err(invalid(key, &v, "expected a positive amount")),
        },
    }
}

pub mod block;
pub mod model;
pub mod pow;
pub mod validator;

pub use block::Block;
pub use model::{Admission, Confirmation, Ledger, LedgerOptions, SealPolicy};
pub use pow::{Miner, ProofScheme, SearchLimits};

/// Proof carried by the inter-block genesis block.
pub const GENESIS_PROOF: u64 = 100;

/// Default Proof-of-Work difficulty (number of leading hex zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Iteration cap for a single proof search unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: u64 = 50_000_000;

/// Difficulty bounds (keep low in dev to avoid long waits)
pub const DIFF_MIN: u32 = 1;
pub const DIFF_MAX: u32 = 6;

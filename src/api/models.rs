use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::blockchain::validator::ChainReport;
use crate::blockchain::{Block, Confirmation, Ledger, ProofScheme};
use crate::economy::Amount;
use crate::error::LedgerError;
use crate::transaction::{HistoryEntry, Transaction};

/// Shared application state: one ledger behind one lock.
pub struct AppState {
    pub ledger: Mutex<Ledger>,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    pub fn ledger(&self) -> Result<MutexGuard<'_, Ledger>, ApiError> {
        self.ledger.lock().map_err(|_| ApiError::Poisoned)
    }
}

/* ---------- Errors ---------- */

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("mining worker failed")]
    Worker,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        use LedgerError::*;
        match self {
            ApiError::Ledger(e) => match e {
                UnknownAccount(_) => StatusCode::NOT_FOUND,
                AlreadyExists(_) | StaleTemplate(_) => StatusCode::CONFLICT,
                Timeout { .. } | Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                EmptyAccountId | SelfTransfer | NonPositiveAmount | InvalidAmount(_)
                | InsufficientFunds { .. } | SupplyExhausted { .. } | AmountOverflow
                | NothingToMine | InvalidProof { .. } => StatusCode::BAD_REQUEST,
                ChainCorrupted { .. } | CorruptSnapshot(_) | PersistenceFailure { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Poisoned | ApiError::Worker => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Ledger(e) if e.is_rejection() => debug!("API - rejected: {e}"),
            other => warn!("API - {other}"),
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/* ---------- Account API Models ---------- */

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct CreateAccountResponse {
    pub message: String,
    pub username: String,
    pub balance: Amount,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub username: String,
    pub balance: Amount,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub username: String,
    pub total_transactions: usize,
    pub transactions: Vec<HistoryEntry>,
}

/* ---------- Transfer API Models ---------- */

/// `amount` may be a JSON number or a decimal string.
#[derive(Deserialize)]
pub struct TransferRequest {
    pub sender: String,
    pub recipient: String,
    pub amount: serde_json::Value,
}

#[derive(Serialize)]
pub struct TransferResponse {
    pub message: &'static str,
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
    pub sender_new_balance: Amount,
    pub recipient_new_balance: Amount,
    #[serde(flatten)]
    pub confirmation: Confirmation,
}

#[derive(Serialize)]
pub struct PendingResponse<'a> {
    pub size: usize,
    pub transactions: &'a [Transaction],
}

/* ---------- Chain API Models ---------- */

/// A block as stored plus its recomputed hash.
#[derive(Serialize)]
pub struct BlockView<'a> {
    #[serde(flatten)]
    pub block: &'a Block,
    pub hash: String,
}

impl<'a> From<&'a Block> for BlockView<'a> {
    fn from(block: &'a Block) -> Self {
        Self {
            hash: block.compute_hash(),
            block,
        }
    }
}

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub length: usize,
    pub difficulty: u32,
    pub scheme: ProofScheme,
    pub chain: Vec<BlockView<'a>>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    #[serde(flatten)]
    pub report: ChainReport,
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: &'static str,
    pub index: u64,
    pub hash: String,
    pub proof: u64,
    pub iterations: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
}

use actix_web::{HttpResponse, get, post, web};
use log::{debug, info};
use serde_json::Value;
use std::time::Instant;

use super::models::{ApiError, AppState, PendingResponse, TransferRequest, TransferResponse};
use crate::blockchain::Admission;
use crate::economy::Amount;
use crate::error::LedgerError;

/// A transfer whose template went stale during the search is admitted
/// again at most this many times in total.
const SEAL_ATTEMPTS: u32 = 3;

/// Move tokens between two accounts.
///
/// Under the immediate policy the proof search runs on the blocking pool
/// with the ledger lock released, like `POST /mine`.
#[post("/transfer")]
pub async fn post_transfer(
    state: web::Data<AppState>,
    body: web::Json<TransferRequest>,
) -> Result<HttpResponse, ApiError> {
    let t0 = Instant::now();
    let TransferRequest {
        sender,
        recipient,
        amount,
    } = body.into_inner();
    debug!("POST /transfer - {sender} -> {recipient}: {amount}");

    let (amount, mut admission) = {
        let mut ledger = state.ledger()?;
        match &amount {
            Value::String(text) => ledger.transfer_raw(&sender, &recipient, text)?,
            other => {
                let amount = number_amount(other)?;
                (amount, ledger.admit_transaction(&sender, &recipient, amount)?)
            }
        }
    };

    let mut attempts = 0;
    let confirmation = loop {
        let template = match admission {
            Admission::Recorded(confirmation) => break confirmation,
            Admission::Sealing(template) => template,
        };
        attempts += 1;

        let miner = state.ledger()?.miner().clone();
        let (sealed, mined) = web::block(move || miner.seal(template.block, template.last_proof))
            .await
            .map_err(|_| ApiError::Worker)??;
        debug!(
            "POST /transfer - proof {} found after {} iterations",
            sealed.proof, mined.iterations
        );

        let mut ledger = state.ledger()?;
        match ledger.commit_transfer(sealed) {
            Err(LedgerError::StaleTemplate(reason)) if attempts < SEAL_ATTEMPTS => {
                debug!("POST /transfer - {reason}, admitting again");
                admission = ledger.admit_transaction(&sender, &recipient, amount)?;
            }
            result => break result?,
        }
    };

    let ledger = state.ledger()?;
    let resp = TransferResponse {
        message: "Transfer successful",
        amount,
        sender_new_balance: ledger.balance(&sender),
        recipient_new_balance: ledger.balance(&recipient),
        sender,
        recipient,
        confirmation,
    };
    info!(
        "POST /transfer - {} -> {} OK ({} ms)",
        resp.sender,
        resp.recipient,
        t0.elapsed().as_millis()
    );
    Ok(HttpResponse::Ok().json(resp))
}

/// JSON numbers must be exact at eight decimals, same as decimal strings.
fn number_amount(value: &Value) -> Result<Amount, LedgerError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| LedgerError::InvalidAmount(n.to_string()))
            .and_then(Amount::from_f64_exact),
        other => Err(LedgerError::InvalidAmount(other.to_string())),
    }
}

/// Transactions admitted but not sealed yet.
#[get("/pending")]
pub async fn get_pending(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger()?;
    let pending = ledger.pending();
    Ok(HttpResponse::Ok().json(PendingResponse {
        size: pending.len(),
        transactions: pending,
    }))
}

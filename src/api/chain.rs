use actix_web::{HttpResponse, get, post, web};
use log::{debug, info, warn};

use super::models::{ApiError, AppState, BlockView, ChainResponse, MineResponse, ValidateResponse};

/// Get the full blockchain, each block with its recomputed hash.
#[get("/blockchain")]
pub async fn get_chain(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger()?;
    let resp = ChainResponse {
        length: ledger.len(),
        difficulty: ledger.difficulty(),
        scheme: ledger.scheme(),
        chain: ledger.chain().iter().map(BlockView::from).collect(),
    };
    Ok(HttpResponse::Ok().json(resp))
}

/// Validate the whole chain.
#[get("/validate")]
pub async fn validate_chain(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger()?;
    let report = ledger.chain_report();
    if let Some(fault) = &report.failure {
        warn!(
            "VALIDATE - chain fails at block #{}: {}",
            fault.block_index, fault.reason
        );
    }
    Ok(HttpResponse::Ok().json(ValidateResponse {
        report,
        difficulty: ledger.difficulty(),
    }))
}

/// Seal the pending queue into a new block:
/// - take a template under the lock
/// - search the proof on the blocking pool, lock released
/// - commit under the lock (rejected if the head or queue moved meanwhile)
#[post("/mine")]
pub async fn mine_block(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let (template, miner) = {
        let ledger = state.ledger()?;
        (ledger.block_template()?, ledger.miner().clone())
    };
    debug!(
        "MINER - template for block #{} with {} txs",
        template.block.index,
        template.block.transactions.len()
    );

    let (sealed, mined) = web::block(move || miner.seal(template.block, template.last_proof))
        .await
        .map_err(|_| ApiError::Worker)??;

    let block = state.ledger()?.commit_block(sealed)?;
    let resp = MineResponse {
        message: "New block forged",
        index: block.index,
        hash: block.compute_hash(),
        proof: block.proof,
        iterations: mined.iterations,
        previous_hash: block.previous_hash,
        transactions: block.transactions,
    };
    info!(
        "MINER - sealed block #{} (hash={}, proof={}, iterations={})",
        resp.index, resp.hash, resp.proof, resp.iterations
    );
    Ok(HttpResponse::Ok().json(resp))
}

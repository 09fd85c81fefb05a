use actix_web::{HttpResponse, get, web};

use super::models::{ApiError, AppState, BalanceResponse, HistoryResponse};

/// Balance of an account; unknown accounts read as zero.
#[get("/balance/{username}")]
pub async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    let balance = state.ledger()?.balance(&username);
    Ok(HttpResponse::Ok().json(BalanceResponse { username, balance }))
}

/// Sealed transactions involving an account, newest first.
#[get("/transactions/{username}")]
pub async fn get_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let username = path.into_inner();
    let transactions = state.ledger()?.transaction_history(&username);
    Ok(HttpResponse::Ok().json(HistoryResponse {
        total_transactions: transactions.len(),
        username,
        transactions,
    }))
}

use actix_web::{HttpResponse, post, web};
use log::debug;

use super::models::{ApiError, AppState, CreateAccountRequest, CreateAccountResponse};

/// Register an account funded with the initial balance from the reserve.
#[post("/accounts")]
pub async fn create_account(
    state: web::Data<AppState>,
    body: web::Json<CreateAccountRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = body.into_inner().username.trim().to_string();
    debug!("POST /accounts - username={username}");

    let balance = state.ledger()?.create_account(&username)?;
    Ok(HttpResponse::Created().json(CreateAccountResponse {
        message: format!("Account created with {balance} tokens"),
        username,
        balance,
    }))
}

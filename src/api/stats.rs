use actix_web::{HttpResponse, get, web};

use super::models::{ApiError, AppState};

/// Supply figures merged with chain counters.
#[get("/network/stats")]
pub async fn get_stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = state.ledger()?.network_stats();
    Ok(HttpResponse::Ok().json(stats))
}

mod accounts;
mod balance;
mod chain;
mod health;
pub mod models;
mod stats;
mod tx;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .service(accounts::create_account)
            .service(tx::post_transfer)
            .service(tx::get_pending)
            .service(balance::get_balance)
            .service(balance::get_history)
            .service(stats::get_stats)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::mine_block),
    );
}

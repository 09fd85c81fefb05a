mod api;
mod blockchain;
mod config;
mod economy;
mod error;
mod storage;
mod transaction;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use std::io;
use std::sync::atomic::Ordering;

use api::AppState;
use blockchain::{Ledger, SearchLimits};
use config::Config;
use storage::{JsonFileStore, MemoryStore, Store};

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        error!("CONFIG - {e}");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let store: Box<dyn Store> = match &config.data_dir {
        Some(dir) => Box::new(JsonFileStore::open(dir).map_err(io::Error::other)?),
        None => Box::new(MemoryStore::new()),
    };
    let limits = SearchLimits::default();
    let cancel = limits.cancel.clone();
    let ledger = Ledger::open(config.ledger_options(limits), store).map_err(|e| {
        error!("LEDGER - failed to open: {e}");
        io::Error::other(e)
    })?;

    info!(
        "⛓️ Starting token ledger API at http://{}:{} (data: {})",
        config.host,
        config.port,
        config
            .data_dir
            .as_deref()
            .map_or("in-memory".to_string(), |d| d.display().to_string())
    );

    let state = web::Data::new(AppState::new(ledger));

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    // Stop any proof search still running on the blocking pool.
    cancel.store(true, Ordering::Relaxed);
    info!("Shutting down");
    result
}

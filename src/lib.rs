//! Personal finance tracking backend: accounts, transactions, budgets, and
//! the recurring-transaction scheduling engine that materializes due entries
//! and keeps account balances consistent under concurrency and retries.

pub mod background;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::EngineError;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use services::notifier::Notifier;
use store::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/accounts", post(handlers::create_account))
        .route("/api/accounts", get(handlers::get_accounts))
        .route("/api/accounts/:id", get(handlers::get_account))
        .route("/api/accounts/:id/default", put(handlers::set_default_account))
        .route("/api/transactions", post(handlers::create_transaction))
        .route("/api/transactions/bulk-delete", post(handlers::bulk_delete_transactions))
        .route("/api/transactions/:id", get(handlers::get_transaction))
        .route("/api/transactions/:id", put(handlers::update_transaction))
        .route("/api/transactions/:id", delete(handlers::delete_transaction))
        .route("/api/budget", get(handlers::get_budget))
        .route("/api/budget", put(handlers::upsert_budget))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

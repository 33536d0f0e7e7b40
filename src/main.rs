use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use finance_tracker_api::background::scheduler::BackgroundScheduler;
use finance_tracker_api::services::notifier::Notifier;
use finance_tracker_api::services::{seed_data, EmailNotifier};
use finance_tracker_api::store::{LedgerStore, PgLedgerStore};
use finance_tracker_api::{database, router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finance_tracker_api=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting Finance Tracker API server...");

    let config = Arc::new(Config::from_env()?);
    info!("Configuration loaded");

    let pool = database::create_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;
    info!("Database connection pool created");

    seed_data::seed_demo_user(&pool).await?;

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool));
    let notifier: Arc<dyn Notifier> = Arc::new(EmailNotifier::from_config(&config)?);

    // Background scheduler starts its jobs immediately
    let scheduler = Arc::new(
        BackgroundScheduler::new(store.clone(), notifier.clone(), config.clone()).await?,
    );

    let app_state = AppState {
        store,
        notifier,
        config: config.clone(),
    };
    let app = router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Graceful shutdown
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down gracefully...");
            scheduler.shutdown().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

//! catering-server binary
//!
//! HTTP API for quotes, invoices, change requests and payments, plus the
//! periodic overdue sweep.

use std::time::Duration;

use catering_server::config::Config;
use catering_server::state::AppState;
use catering_server::{api, logger};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    let _log_guard = logger::init_logger(&config.log_level, config.log_json, config.log_dir.as_deref());

    tracing::info!("Starting catering-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;

    // Overdue sweep
    let workflow = state.workflow.clone();
    let sweep_every = Duration::from_secs(config.overdue_sweep_secs.max(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let today = chrono::Utc::now().date_naive();
            if let Err(e) = workflow.mark_overdue(today).await {
                tracing::error!(error = %e, "Overdue sweep failed");
            }
        }
    });

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("catering-server HTTP listening on {http_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("catering-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ingest::config::load_config;
use ingest::orchestrator::Orchestrator;
use ingest::status_http::{self, ReadinessState};
use ingest::db;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config.logging.level.clone())).init();

    info!("connecting to database...");
    let pool = db::create_pool(&config.database.connection_string()).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let orchestrator = match Orchestrator::start(&config, pool).await {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "failed to start ingest pipeline");
            return ExitCode::FAILURE;
        }
    };

    let readiness = ReadinessState::default();
    readiness.mark_ready();
    let status_bind = config.status_http.bind.clone();
    let status_readiness = readiness.clone();
    tokio::spawn(async move {
        status_http::serve(&status_bind, status_readiness, shutdown_signal()).await;
    });

    shutdown_signal().await;
    info!("shutdown signal received, closing wire client");
    orchestrator.shutdown();

    ExitCode::SUCCESS
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}

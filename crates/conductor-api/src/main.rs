//! Conductor API Server

use clap::Parser;
use conductor_api::telemetry::init_tracing;
use conductor_api::{AppState, routes};
use conductor_clients::{GitLabClient, IssueDefaults, RedmineClient, SonarQubeClient};
use conductor_config::ServiceConfig;
use conductor_coordinator::{CoordinatorSettings, MonitorService, PipelineCoordinator};
use conductor_db::{Ledger, create_pool, run_migrations};
use conductor_lock::WorkspaceLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "conductor-server")]
#[command(about = "Conductor pipeline coordinator server", long_about = None)]
struct Args {
    /// Path to the service configuration
    #[arg(long, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;
    init_tracing(config.log.format);

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    run_migrations(&pool).await?;
    info!("Database connected");
    let ledger = Ledger::postgres(pool);

    let build = GitLabClient::new(
        &config.build_system.url,
        config.build_system.token(),
        config.build_system.timeout,
    )?;
    let quality = SonarQubeClient::new(
        &config.quality_service.url,
        config.quality_service.token(),
        config.quality_service.timeout,
    )?;
    let tracker = RedmineClient::new(
        &config.issue_tracker.url,
        config.issue_tracker.api_key(),
        config.issue_tracker.timeout,
        IssueDefaults {
            tracker_id: config.issue_tracker.tracker_id,
            priority_id: config.issue_tracker.priority_id,
        },
    )?;
    for (system, present) in [
        ("build-system", config.build_system.token().is_some()),
        ("quality-service", config.quality_service.token().is_some()),
        ("issue-tracker", config.issue_tracker.api_key().is_some()),
    ] {
        if !present {
            warn!(system, "No credential in the environment, requests will be anonymous");
        }
    }

    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::new(build),
        Arc::new(quality),
        Arc::new(tracker),
        ledger,
        CoordinatorSettings::from_config(&config),
    ));
    if config.monitor.rehydrate {
        coordinator.rehydrate().await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = MonitorService::new(
        coordinator.clone(),
        config.monitor.interval,
        config.monitor.error_backoff,
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    let lock = WorkspaceLock::new(&config.lock.path).with_retry_interval(config.lock.retry_interval);
    let state = AppState::new(coordinator, lock);
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.server.listen);
    let listener = TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send_replace(true);
    monitor_handle.await?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

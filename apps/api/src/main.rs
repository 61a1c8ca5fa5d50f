use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use calendar_sync_cell::services::PeriodicTask;
use shared_config::AppConfig;

use router::AppServices;

const TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting practice calendar sync API server");

    let config = AppConfig::from_env();
    if !config.is_configured() {
        warn!("Supabase is not fully configured; store calls will fail");
    }
    if !config.is_calendar_configured() {
        warn!("Calendar provider is not fully configured; provisioning and sync will fail");
    }
    let config = Arc::new(config);

    let services = AppServices::from_config(config.clone());
    let tasks = spawn_background_tasks(&services, &config);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(&services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for task in tasks {
        info!("Stopping background task '{}'", task.name());
        task.shutdown().await;
    }
    Ok(())
}

fn spawn_background_tasks(services: &AppServices, config: &AppConfig) -> Vec<PeriodicTask> {
    let lifecycle = services.calendar.lifecycle.clone();
    let renewal = PeriodicTask::spawn(
        "channel-renewal",
        Duration::from_secs(config.channel_renewal_interval_seconds.max(60)),
        move || {
            let lifecycle = lifecycle.clone();
            async move {
                match lifecycle.renew_expiring().await {
                    Ok(report) => info!(
                        "Channel renewal: {} examined, {} renewed, {} failed",
                        report.examined,
                        report.succeeded.len(),
                        report.failed.len()
                    ),
                    Err(e) => warn!("Channel renewal pass failed: {}", e),
                }
            }
        },
    );

    let registry = services.calendar.registry.clone();
    let sweep = PeriodicTask::spawn("sync-token-sweep", TOKEN_SWEEP_INTERVAL, move || {
        let registry = registry.clone();
        async move {
            let purged = registry.purge_expired();
            if purged > 0 {
                info!("Purged {} expired cached sync tokens", purged);
            }
        }
    });

    vec![renewal, sweep]
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

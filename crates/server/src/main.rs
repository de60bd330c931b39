mod api;
mod bootstrap;
mod error;
mod events;
mod health;
mod service;
mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eapproval_core::config::{AppConfig, LoadOptions};
use eapproval_db::repositories::{SqlAuditEventRepository, SqlRequestRepository};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::ApiState;
use crate::events::ChangeFeed;
use crate::service::RequestService;
use crate::session::ApiToken;

fn init_logging(config: &AppConfig) {
    use eapproval_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging follows the loaded config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let feed = ChangeFeed::new(app.config.workflow.event_buffer);
    let service = RequestService::new(
        Arc::new(SqlRequestRepository::new(app.db_pool.clone())),
        Arc::new(SqlAuditEventRepository::new(app.db_pool.clone())),
        feed,
        app.config.workflow.default_sla_hours,
    );
    let token = ApiToken::new(app.config.server.api_token.clone());
    let router = api::router(ApiState::new(Arc::new(service)), token)
        .merge(health::router(app.db_pool.clone()))
        .layer(TraceLayer::new_for_http());

    let address = app.config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        api_token_required = app.config.server.api_token.is_some(),
        "eapproval-server listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "eapproval-server stopping"
    );
    let _ = stop_tx.send(());

    // Open event streams never finish on their own, so draining is bounded.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "connections still open after the grace period"
        ),
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

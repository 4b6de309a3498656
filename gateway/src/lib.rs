pub mod api;
pub mod auth;
pub mod config;
pub mod csv_reader;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod export;
pub mod job;
pub mod metrics_defs;
pub mod pipeline;
pub mod products;
pub mod rate_gate;
pub mod transactions;

#[cfg(test)]
mod testutils;

use shared::admin_service::AdminService;
use shared::http::{bind_listener, serve_connections};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use upstream::{CoreClient, ProductClient};

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Serves the client API and the admin endpoints until either listener fails.
pub async fn run(config: config::Config) -> Result<(), GatewayError> {
    config.validate()?;

    let client = reqwest::Client::builder().build()?;
    let core = Arc::new(CoreClient::new(
        client.clone(),
        config.upstreams.core_url.clone(),
        config.timeouts.control_plane(),
    ));
    let products = Arc::new(ProductClient::new(
        client,
        config.upstreams.product_catalog_url.clone(),
        config.upstreams.scoring_url.clone(),
        config.timeouts.product(),
    ));
    let state = api::AppState::new(core, products, &config.bulk, &config.auth);

    let ready = Arc::new(AtomicBool::new(false));
    let probe = ready.clone();
    let admin_listener =
        bind_listener(&config.admin_listener.host, config.admin_listener.port).await?;
    let admin_task = serve_connections(
        admin_listener,
        AdminService::new(move || probe.load(Ordering::Relaxed)),
    );

    let listener = bind_listener(&config.listener.host, config.listener.port).await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        admin_port = config.admin_listener.port,
        "gateway listening"
    );
    ready.store(true, Ordering::Relaxed);
    let api_task = async { axum::serve(listener, api::router(state)).await };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use simplerp_api::app::{self, services};
use simplerp_auth::{Argon2Verifier, CredentialVerifier};
use simplerp_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simplerp_observability::init();

    let config = Arc::new(AppConfig::from_env().context("loading configuration")?);
    info!(environment = ?config.environment, "starting simplerp-api");

    let store = services::open_store(&config).await?;
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(Argon2Verifier::new());

    if config.seed.on_start {
        let report = services::run_seed(&store, &config, verifier.as_ref())
            .await
            .context("seeding on start")?;
        info!(?report, "seed on start finished");
    }

    let router = app::build_app(services::AppServices::new(config.clone(), store, verifier));

    let listener = TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

//! Runs the RBAC seed (and the optional admin bootstrap) once, then exits.

use std::process::ExitCode;

use tracing::{error, info};

use simplerp_api::app::services;
use simplerp_auth::Argon2Verifier;
use simplerp_infra::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    simplerp_observability::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("seed failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    if config.database.is_none() {
        anyhow::bail!("DATABASE_URL must be set to seed a database");
    }

    let store = services::open_store(&config).await?;
    let report = services::run_seed(&store, &config, &Argon2Verifier::new()).await?;
    info!(
        roles = report.roles_created,
        permissions = report.permissions_created,
        links = report.links_created,
        warnings = report.warnings.len(),
        "seed complete"
    );
    Ok(())
}

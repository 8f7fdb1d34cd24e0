//! slavealloc
//!
//! Allocates build slaves to masters. A booting slave fetches
//! `/gettac/{slave}` and runs with the `buildbot.tac` it receives.

use anyhow::Result;
use buildfarm_slavealloc::{api, config, db::Database, state::AppState};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to SLAVEALLOC_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(listen_addr = %config.listen_addr, "Starting slavealloc");

    let db = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    if config.run_migrations {
        if let Err(e) = db.migrate(&config.database).await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let app = api::create_router(AppState::new(db));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("slavealloc shutdown complete");
    Ok(())
}

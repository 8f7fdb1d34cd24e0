//! reboot-idle-slaves
//!
//! One-shot maintenance job: reboots production build slaves that have been
//! idle for longer than the idle threshold, via the slave control API.

use std::sync::Arc;

use anyhow::Result;
use buildfarm_idle_rebooter::{cli::Args, Coordinator};
use buildfarm_slaveapi::{RetryPolicy, SlaveApiClient};
use chrono::Utc;
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Fail fast, before any network call.
    let config = match args.coordinator_config() {
        Ok(config) => config,
        Err(e) => Args::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_filter().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Every idle decision in this run is relative to this instant.
    let now = Utc::now();

    let client = SlaveApiClient::new(&args.server, RetryPolicy::default())?;
    info!(
        server = %client.base_url(),
        workers = config.workers,
        excludes = ?config.exclusions.patterns(),
        dry_run = config.workflow.dry_run,
        "Starting idle slave reboot pass"
    );

    let coordinator = Coordinator::new(Arc::new(client), config);

    tokio::select! {
        result = coordinator.run(now) => {
            let summary = result?;
            info!(
                rebooted = summary.rebooted,
                errored = summary.errored + summary.panicked,
                "Done"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; shutdown and reboot requests already issued will still be carried out");
            std::process::exit(130);
        }
    }

    Ok(())
}

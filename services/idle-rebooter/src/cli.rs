//! Command-line surface for `reboot-idle-slaves`.

use clap::Parser;
use thiserror::Error;

pub use crate::coordinator::MAX_WORKERS;

use crate::coordinator::CoordinatorConfig;
use crate::exclusion::ExclusionFilter;
use crate::workflow::WorkflowSettings;

/// Startup validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Number of workers requested ({requested}) exceeds maximum ({max})")]
    TooManyWorkers { requested: usize, max: usize },

    #[error("Number of workers must be at least 1")]
    ZeroWorkers,
}

/// Idle slave rebooter.
///
/// Reboots production slaves whose last job ended more than five hours ago,
/// after asking their buildslave to shut down gracefully.
#[derive(Debug, Parser)]
#[command(name = "reboot-idle-slaves")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// SlaveAPI server to speak with.
    #[arg(short, long, env = "SLAVEAPI_URL")]
    pub server: String,

    /// Maximum number of slaves to kick at once.
    #[arg(short, long, default_value_t = MAX_WORKERS)]
    pub workers: usize,

    /// Ignore slaves whose name contains this pattern (repeatable).
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Don't do any reboots, just log what would have been done.
    #[arg(long)]
    pub dryrun: bool,

    /// More verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the arguments and build the coordinator configuration.
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                requested: self.workers,
                max: MAX_WORKERS,
            });
        }

        Ok(CoordinatorConfig {
            workers: self.workers,
            exclusions: ExclusionFilter::new(self.exclude.iter().cloned()),
            workflow: WorkflowSettings {
                dry_run: self.dryrun,
                ..WorkflowSettings::default()
            },
        })
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info,reqwest=warn,hyper_util=warn"
        }
    }
}

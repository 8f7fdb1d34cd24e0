//! Fleet-wide fan-out of reboot workflows.
//!
//! Admission is bounded by a semaphore sized to the worker count: the
//! coordinator waits for a permit before spawning the next slave's
//! workflow, and each task releases its permit when it finishes. Tasks live
//! in a `JoinSet` so the coordinator can join all of them before returning
//! and so a panicking workflow is observed without affecting its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use buildfarm_slaveapi::{ControlApi, SlaveApiError};
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::exclusion::ExclusionFilter;
use crate::workflow::{RebootOutcome, RebootWorkflow, WorkflowSettings};

/// Hard cap on concurrent workflows.
pub const MAX_WORKERS: usize = 4;

/// Coordinator configuration, validated by the CLI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum number of workflows in flight at once.
    pub workers: usize,
    pub exclusions: ExclusionFilter,
    pub workflow: WorkflowSettings,
}

/// Tally of one coordinator run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub considered: usize,
    pub excluded: usize,
    pub dispatched: usize,
    pub skipped_no_history: usize,
    pub skipped_recent: usize,
    pub dry_run: usize,
    pub shutdown_failed: usize,
    pub rebooted: usize,
    pub errored: usize,
    pub panicked: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &RebootOutcome) {
        match outcome {
            RebootOutcome::SkippedNoHistory => self.skipped_no_history += 1,
            RebootOutcome::SkippedRecent { .. } => self.skipped_recent += 1,
            RebootOutcome::DryRun { .. } => self.dry_run += 1,
            RebootOutcome::ShutdownFailed { .. } => self.shutdown_failed += 1,
            RebootOutcome::RebootQueued { .. } => self.rebooted += 1,
            RebootOutcome::Errored { .. } => self.errored += 1,
        }
    }

    /// Number of workflows that reached a terminal state (including panics).
    pub fn completed(&self) -> usize {
        self.skipped_no_history
            + self.skipped_recent
            + self.dry_run
            + self.shutdown_failed
            + self.rebooted
            + self.errored
            + self.panicked
    }
}

/// Dispatches one [`RebootWorkflow`] per eligible slave.
pub struct Coordinator<A: ?Sized> {
    api: Arc<A>,
    config: CoordinatorConfig,
}

impl<A: ControlApi + ?Sized + 'static> Coordinator<A> {
    /// Worker counts outside `1..=MAX_WORKERS` are clamped into range.
    pub fn new(api: Arc<A>, mut config: CoordinatorConfig) -> Self {
        let workers = config.workers.clamp(1, MAX_WORKERS);
        if workers != config.workers {
            warn!(requested = config.workers, workers, "Worker count out of range, clamping");
            config.workers = workers;
        }
        Self { api, config }
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Run one pass over the production fleet, judging idleness against `now`.
    ///
    /// Only a failure to list the fleet is returned as an error; per-slave
    /// failures are reflected in the summary.
    #[instrument(skip(self), fields(workers = self.config.workers, dry_run = self.config.workflow.dry_run))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, SlaveApiError> {
        let slaves = self.api.production_slaves().await?;
        info!(slave_count = slaves.len(), "Fetched production slaves");

        let workflow = Arc::new(RebootWorkflow::new(
            Arc::clone(&self.api),
            self.config.workflow.clone(),
            now,
        ));
        let slots = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut summary = RunSummary::default();

        for slave in slaves {
            summary.considered += 1;
            let name = slave.name;

            if let Some(pattern) = self.config.exclusions.matching_pattern(&name) {
                debug!(slave = %name, pattern, "Excluding because it matches an excluded pattern");
                summary.excluded += 1;
                continue;
            }

            // The semaphore is owned here and never closed.
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                break;
            };

            while let Some(joined) = tasks.try_join_next_with_id() {
                reap(joined, &mut in_flight, &mut summary);
            }

            let workflow = Arc::clone(&workflow);
            let task_name = name.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                workflow.process(&task_name).await
            });
            in_flight.insert(handle.id(), name);
            summary.dispatched += 1;
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            reap(joined, &mut in_flight, &mut summary);
        }

        info!(
            considered = summary.considered,
            excluded = summary.excluded,
            rebooted = summary.rebooted,
            shutdown_failed = summary.shutdown_failed,
            skipped = summary.skipped_no_history + summary.skipped_recent,
            dry_run = summary.dry_run,
            errored = summary.errored + summary.panicked,
            "Reboot pass complete"
        );

        Ok(summary)
    }
}

fn reap(
    joined: Result<(tokio::task::Id, RebootOutcome), JoinError>,
    in_flight: &mut HashMap<tokio::task::Id, String>,
    summary: &mut RunSummary,
) {
    match joined {
        Ok((id, outcome)) => {
            in_flight.remove(&id);
            summary.record(&outcome);
        }
        Err(e) => {
            let slave = in_flight.remove(&e.id()).unwrap_or_default();
            error!(slave = %slave, error = %e, "Reboot workflow task failed");
            summary.panicked += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_records_each_outcome() {
        let mut summary = RunSummary::default();
        summary.record(&RebootOutcome::SkippedNoHistory);
        summary.record(&RebootOutcome::RebootQueued { request_id: 1 });
        summary.record(&RebootOutcome::RebootQueued { request_id: 2 });
        summary.record(&RebootOutcome::Errored {
            error: "boom".into(),
        });

        assert_eq!(summary.skipped_no_history, 1);
        assert_eq!(summary.rebooted, 2);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.completed(), 4);
    }
}

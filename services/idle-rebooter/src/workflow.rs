//! Per-slave reboot workflow.
//!
//! ```text
//! fetch history ─┬─ no jobs ─────────────────────────────► SkippedNoHistory
//!                ├─ idle <= threshold ───────────────────► SkippedRecent
//!                ├─ dry run ─────────────────────────────► DryRun
//!                └─ graceful shutdown ─► poll until done ─┬─ FAILURE ─► ShutdownFailed
//!                                                         └─ SUCCESS ─► reboot ─► RebootQueued
//! ```
//!
//! The graceful shutdown closes the window in which a slave picks up a new
//! job between the idle check and the reboot. Any error ends the workflow
//! for that slave only ([`RebootOutcome::Errored`]); it is never propagated.

use std::sync::Arc;
use std::time::Duration;

use buildfarm_slaveapi::{ActionState, ControlApi, SlaveApiError};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

/// Minimum time since the last job before a slave may be rebooted.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60 * 60);

/// How long the buildslave may keep running before shutdown is forced.
pub const SHUTDOWN_WAITTIME: Duration = Duration::from_secs(30);

/// Interval between shutdown status polls.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Tunables for the reboot workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub idle_threshold: Duration,
    pub shutdown_waittime: Duration,
    pub poll_interval: Duration,
    /// Log decisions without issuing any mutating call.
    pub dry_run: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            idle_threshold: IDLE_THRESHOLD,
            shutdown_waittime: SHUTDOWN_WAITTIME,
            poll_interval: SHUTDOWN_POLL_INTERVAL,
            dry_run: false,
        }
    }
}

/// Terminal state of one slave's workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootOutcome {
    /// The slave has never run a job; idleness cannot be established.
    SkippedNoHistory,
    /// The last job ended within the idle threshold.
    SkippedRecent { last_job_end: DateTime<Utc> },
    /// Idle, but running in dry-run mode.
    DryRun { last_job_end: DateTime<Utc> },
    /// The control API reported the graceful shutdown as failed.
    ShutdownFailed { request_id: i64 },
    /// Graceful shutdown succeeded and a reboot was queued.
    RebootQueued { request_id: i64 },
    /// Something went wrong talking to the control API.
    Errored { error: String },
}

/// Runs the idle-check/shutdown/reboot sequence for individual slaves.
///
/// `now` is captured once per run so every slave is judged against the same
/// instant.
pub struct RebootWorkflow<A: ?Sized> {
    api: Arc<A>,
    settings: WorkflowSettings,
    now: DateTime<Utc>,
}

impl<A: ControlApi + ?Sized> RebootWorkflow<A> {
    pub fn new(api: Arc<A>, settings: WorkflowSettings, now: DateTime<Utc>) -> Self {
        Self { api, settings, now }
    }

    /// Process one slave. Errors are logged with the slave name and folded
    /// into [`RebootOutcome::Errored`].
    pub async fn process(&self, slave: &str) -> RebootOutcome {
        match self.run(slave).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(slave = %slave, error = %e, "Caught error while processing");
                RebootOutcome::Errored {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, slave: &str) -> Result<RebootOutcome, SlaveApiError> {
        let info = self.api.slave_info(slave).await?;

        let Some(last_job_end) = info.last_job_end() else {
            info!(slave = %slave, "Skipping reboot because no recent jobs found");
            return Ok(RebootOutcome::SkippedNoHistory);
        };

        if !idle_longer_than(self.now, last_job_end, self.settings.idle_threshold) {
            info!(
                slave = %slave,
                last_job_end = %format_job_time(last_job_end),
                "Skipping reboot because last job ended recently"
            );
            return Ok(RebootOutcome::SkippedRecent { last_job_end });
        }

        if self.settings.dry_run {
            info!(
                slave = %slave,
                last_job_end = %format_job_time(last_job_end),
                "Last job ended long ago, would have rebooted"
            );
            return Ok(RebootOutcome::DryRun { last_job_end });
        }

        info!(
            slave = %slave,
            last_job_end = %format_job_time(last_job_end),
            "Last job ended long ago, rebooting"
        );

        debug!(slave = %slave, "Setting graceful shutdown");
        let waittime = self.settings.shutdown_waittime;
        let mut status = self.api.request_graceful_shutdown(slave, waittime).await?;
        let request_id = status.requestid;

        while !status.state.is_terminal() {
            debug!(
                slave = %slave,
                request_id,
                state = %status.state,
                "Graceful shutdown still in progress"
            );
            tokio::time::sleep(self.settings.poll_interval).await;
            status = self.api.shutdown_status(slave, waittime, request_id).await?;
        }

        if status.state == ActionState::Failure {
            info!(
                slave = %slave,
                request_id,
                "Graceful shutdown failed, aborting reboot"
            );
            return Ok(RebootOutcome::ShutdownFailed { request_id });
        }

        info!(slave = %slave, request_id, "Graceful shutdown finished, rebooting");
        self.api.request_reboot(slave).await?;
        info!(slave = %slave, "Reboot queued");

        Ok(RebootOutcome::RebootQueued { request_id })
    }
}

/// Strictly greater than `threshold`; a job end in the future is never idle.
fn idle_longer_than(now: DateTime<Utc>, last_job_end: DateTime<Utc>, threshold: Duration) -> bool {
    match now.signed_duration_since(last_job_end).to_std() {
        Ok(elapsed) => elapsed > threshold,
        Err(_) => false,
    }
}

fn format_job_time(t: DateTime<Utc>) -> String {
    t.format("%A, %B %d, %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap()
    }

    #[rstest]
    #[case(at(6, 0), false)] // exactly 5h: not beyond the threshold
    #[case(at(5, 59), true)]
    #[case(at(9, 0), false)]
    #[case(at(12, 0), false)] // in the future
    fn test_idle_threshold_is_strict(#[case] last_job_end: DateTime<Utc>, #[case] idle: bool) {
        assert_eq!(idle_longer_than(at(11, 0), last_job_end, IDLE_THRESHOLD), idle);
    }

    #[test]
    fn test_job_time_format() {
        assert_eq!(format_job_time(at(14, 7)), "Tuesday, March 05, 14:07 UTC");
    }

    #[test]
    fn test_default_settings() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.idle_threshold, Duration::from_secs(18_000));
        assert_eq!(settings.shutdown_waittime, Duration::from_secs(30));
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert!(!settings.dry_run);
    }
}

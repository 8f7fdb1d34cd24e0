//! Slave control API.
//!
//! The control API is the system of record for build slaves: it lists the
//! fleet, reports each slave's recent job history, and accepts asynchronous
//! actions (graceful buildslave shutdown, reboot). This crate provides the
//! wire types, the [`ControlApi`] seam used by the maintenance tools, and a
//! reqwest-backed [`SlaveApiClient`] that wraps every call in a retry policy.

mod client;
mod error;
mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use buildfarm_retry::{BackoffPolicy, RetryPolicy};
pub use client::SlaveApiClient;
pub use error::SlaveApiError;
pub use types::{ActionResponse, ActionState, JobRecord, SlaveInfo, SlaveList, SlaveSummary};

/// Operations the maintenance tools need from the control API.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Enabled slaves in the production environment.
    async fn production_slaves(&self) -> Result<Vec<SlaveSummary>, SlaveApiError>;

    /// Status and recent job history of one slave.
    async fn slave_info(&self, name: &str) -> Result<SlaveInfo, SlaveApiError>;

    /// Ask the slave's buildslave to shut down once idle, forcing it after
    /// `waittime`.
    async fn request_graceful_shutdown(
        &self,
        name: &str,
        waittime: Duration,
    ) -> Result<ActionResponse, SlaveApiError>;

    /// Current state of a previously issued graceful shutdown request.
    async fn shutdown_status(
        &self,
        name: &str,
        waittime: Duration,
        request_id: i64,
    ) -> Result<ActionResponse, SlaveApiError>;

    /// Queue a reboot. The control API owns the reboot from here on,
    /// including escalation, so there is nothing to poll.
    async fn request_reboot(&self, name: &str) -> Result<(), SlaveApiError>;
}

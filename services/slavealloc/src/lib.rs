//! Slave allocator.
//!
//! Assigns build slaves to buildbot masters and serves each slave the
//! `buildbot.tac` that points it at its master.

pub mod allocation;
pub mod api;
pub mod config;
pub mod db;
pub mod service;
pub mod state;
pub mod tac;

pub use allocation::{
    Allocation, AllocationError, AllocationStore, Master, MasterCandidate, NoAllocationReason,
    PendingAllocation, PgAllocationStore, SlaveRecord,
};
pub use service::AllocatorService;
pub use tac::{render_buildbot_tac, TacContext};

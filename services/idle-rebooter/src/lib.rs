//! Idle slave rebooter.
//!
//! Walks the production fleet reported by the control API and reboots every
//! slave whose last job ended more than the idle threshold ago. Each slave
//! runs through its own [`workflow::RebootWorkflow`]; the
//! [`coordinator::Coordinator`] fans those out under a hard concurrency
//! limit so the control plane is never asked to shut down more than a
//! handful of slaves at once.
//!
//! ## Modules
//!
//! - `cli`: command-line surface and startup validation
//! - `exclusion`: name-pattern exclusion filter
//! - `workflow`: per-slave idle check, graceful shutdown and reboot
//! - `coordinator`: bounded fan-out across the fleet

pub mod cli;
pub mod coordinator;
pub mod exclusion;
pub mod workflow;

pub use coordinator::{Coordinator, CoordinatorConfig, RunSummary};
pub use exclusion::ExclusionFilter;
pub use workflow::{RebootOutcome, RebootWorkflow, WorkflowSettings};

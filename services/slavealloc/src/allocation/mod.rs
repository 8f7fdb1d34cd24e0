//! Slave-to-master allocation.
//!
//! An allocation pairs a slave with one master of its pool, along with a
//! freshly generated password. At most one allocation exists per slave;
//! allocating again replaces the previous row in the same transaction.

pub mod policy;
pub mod store;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

pub use policy::select_master;
pub use store::PgAllocationStore;

/// Length in bytes of generated slave passwords (before hex encoding).
const PASSWORD_BYTES: usize = 16;

/// The master half of an allocation: where the slave should connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Master {
    pub master_id: i32,
    pub nickname: String,
    pub fqdn: String,
    pub pb_port: i32,
}

/// A master as seen by the selection policy, with its current load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterCandidate {
    pub master: Master,
    pub pool_id: i32,
    pub enabled: bool,
    /// `None` means unlimited.
    pub max_slaves: Option<i32>,
    /// Slaves currently allocated to this master, not counting the slave
    /// being allocated.
    pub current_slaves: i64,
}

impl MasterCandidate {
    pub fn has_capacity(&self) -> bool {
        match self.max_slaves {
            None => true,
            Some(max) => self.current_slaves < i64::from(max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRecord {
    pub name: String,
    pub basedir: String,
    pub pool_id: i32,
    pub enabled: bool,
    pub locked_master_id: Option<i32>,
}

/// A committed (or about to be committed) slave allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub slave_name: String,
    pub master: Master,
    pub password: String,
    pub basedir: String,
    pub allocated_at: DateTime<Utc>,
}

/// Why a slave could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAllocationReason {
    UnknownSlave,
    SlaveDisabled,
    NoEligibleMaster,
    LockedMasterUnavailable,
}

impl NoAllocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoAllocationReason::UnknownSlave => "unknown slave",
            NoAllocationReason::SlaveDisabled => "slave is disabled",
            NoAllocationReason::NoEligibleMaster => "no eligible master",
            NoAllocationReason::LockedMasterUnavailable => "locked master is unavailable",
        }
    }
}

impl fmt::Display for NoAllocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AllocationError {
    /// Expected rejection: nothing was written.
    #[error("no allocation possible for slave '{slave}': {reason}")]
    NoAllocation {
        slave: String,
        reason: NoAllocationReason,
    },

    #[error(transparent)]
    Store(#[from] DbError),
}

impl AllocationError {
    pub fn no_allocation(slave: impl Into<String>, reason: NoAllocationReason) -> Self {
        AllocationError::NoAllocation {
            slave: slave.into(),
            reason,
        }
    }

    pub fn is_no_allocation(&self) -> bool {
        matches!(self, AllocationError::NoAllocation { .. })
    }
}

/// Generate a fresh slave password.
pub fn generate_password() -> String {
    let mut bytes = [0u8; PASSWORD_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Persistent allocation state.
///
/// `begin_allocation` selects a master and writes the allocation inside a
/// transaction that stays open until the returned [`PendingAllocation`] is
/// committed. Dropping the pending allocation discards the write.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    type Pending: PendingAllocation;

    async fn begin_allocation(&self, slave: &str) -> Result<Self::Pending, AllocationError>;
}

#[async_trait]
pub trait PendingAllocation: Send {
    fn allocation(&self) -> &Allocation;

    async fn commit(self) -> Result<Allocation, AllocationError>;
}

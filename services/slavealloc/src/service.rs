//! The allocator service: allocate a slave, render its tac, commit.

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::allocation::{AllocationError, AllocationStore, PendingAllocation};
use crate::tac::{render_buildbot_tac, TacContext};

/// Hands out `buildbot.tac` files.
///
/// Requests are processed one at a time. Within one process the async
/// mutex keeps allocations from interleaving; across processes the store's
/// transaction lock does the same.
pub struct AllocatorService<S> {
    store: S,
    write_path: Mutex<()>,
}

impl<S: AllocationStore> AllocatorService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_path: Mutex::new(()),
        }
    }

    /// Allocate `slave` and return its rendered `buildbot.tac`.
    pub async fn get_buildbot_tac(&self, slave: &str) -> Result<String, AllocationError> {
        self.get_buildbot_tac_with(slave, &TacContext::current())
            .await
    }

    pub async fn get_buildbot_tac_with(
        &self,
        slave: &str,
        context: &TacContext,
    ) -> Result<String, AllocationError> {
        let _write = self.write_path.lock().await;

        let pending = match self.store.begin_allocation(slave).await {
            Ok(pending) => pending,
            Err(AllocationError::NoAllocation { slave, reason }) => {
                info!(slave = %slave, reason = %reason, "Rejecting slave");
                return Err(AllocationError::NoAllocation { slave, reason });
            }
            Err(e) => {
                warn!(slave = %slave, error = %e, "Allocation failed");
                return Err(e);
            }
        };

        let tac = render_buildbot_tac(pending.allocation(), context);
        let allocation = pending.commit().await?;

        info!(
            slave = %allocation.slave_name,
            master = %allocation.master.nickname,
            fqdn = %allocation.master.fqdn,
            port = allocation.master.pb_port,
            "Allocated slave"
        );

        Ok(tac)
    }
}

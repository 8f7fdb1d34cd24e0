//! Application state shared across request handlers.

use std::sync::Arc;

use crate::allocation::PgAllocationStore;
use crate::db::Database;
use crate::service::AllocatorService;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    allocator: AllocatorService<PgAllocationStore>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let allocator = AllocatorService::new(PgAllocationStore::new(db.pool().clone()));
        Self {
            inner: Arc::new(AppStateInner { db, allocator }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn allocator(&self) -> &AllocatorService<PgAllocationStore> {
        &self.inner.allocator
    }
}

//! Postgres-backed allocation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{
    generate_password, policy, Allocation, AllocationError, AllocationStore, Master,
    MasterCandidate, NoAllocationReason, PendingAllocation, SlaveRecord,
};
use crate::db::DbError;

/// Advisory lock key shared by every allocator process.
///
/// Master selection depends on the load of every master in a pool, so
/// allocations are serialized cluster-wide rather than per slave.
pub const ALLOCATION_LOCK_KEY: i64 = 0x5_1a7e_a110c;

#[derive(Clone)]
pub struct PgAllocationStore {
    pool: PgPool,
}

impl PgAllocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The committed allocation for `slave`, if any.
    pub async fn current_allocation(&self, slave: &str) -> Result<Option<Allocation>, DbError> {
        let row = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT a.slave_name, a.password, a.basedir, a.allocated_at,
                   m.master_id, m.nickname, m.fqdn, m.pb_port
            FROM allocations a
            JOIN masters m ON m.master_id = a.master_id
            WHERE a.slave_name = $1
            "#,
        )
        .bind(slave)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(Allocation::from))
    }
}

#[async_trait]
impl AllocationStore for PgAllocationStore {
    type Pending = PgPendingAllocation;

    async fn begin_allocation(&self, slave: &str) -> Result<PgPendingAllocation, AllocationError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(DbError::Query)?;

        let slave_row = sqlx::query_as::<_, SlaveRow>(
            r#"
            SELECT name, basedir, pool_id, enabled, locked_master_id
            FROM slaves
            WHERE name = $1
            FOR UPDATE
            "#,
        )
        .bind(slave)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(slave_row) = slave_row else {
            return Err(AllocationError::no_allocation(
                slave,
                NoAllocationReason::UnknownSlave,
            ));
        };
        let record = SlaveRecord::from(slave_row);

        let candidates: Vec<MasterCandidate> = sqlx::query_as::<_, MasterCandidateRow>(
            r#"
            SELECT m.master_id, m.nickname, m.fqdn, m.pb_port, m.pool_id,
                   m.enabled, m.max_slaves,
                   (SELECT COUNT(*)
                      FROM allocations a
                     WHERE a.master_id = m.master_id
                       AND a.slave_name <> $1) AS current_slaves
            FROM masters m
            WHERE m.pool_id = $2 OR m.master_id = $3
            ORDER BY m.master_id
            "#,
        )
        .bind(&record.name)
        .bind(record.pool_id)
        .bind(record.locked_master_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::Query)?
        .into_iter()
        .map(MasterCandidate::from)
        .collect();

        debug!(slave = %record.name, candidates = candidates.len(), "Selecting master");

        let master = policy::select_master(&record, &candidates)
            .map_err(|reason| AllocationError::no_allocation(slave, reason))?
            .master
            .clone();

        let password = generate_password();
        let allocated_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO allocations (slave_name, master_id, password, basedir, allocated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (slave_name) DO UPDATE
               SET master_id = EXCLUDED.master_id,
                   password = EXCLUDED.password,
                   basedir = EXCLUDED.basedir,
                   allocated_at = EXCLUDED.allocated_at
            RETURNING allocated_at
            "#,
        )
        .bind(&record.name)
        .bind(master.master_id)
        .bind(&password)
        .bind(&record.basedir)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        Ok(PgPendingAllocation {
            tx,
            allocation: Allocation {
                slave_name: record.name,
                master,
                password,
                basedir: record.basedir,
                allocated_at,
            },
        })
    }
}

/// An allocation written inside an open transaction. Dropping it rolls the
/// transaction back.
pub struct PgPendingAllocation {
    tx: Transaction<'static, Postgres>,
    allocation: Allocation,
}

#[async_trait]
impl PendingAllocation for PgPendingAllocation {
    fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    async fn commit(self) -> Result<Allocation, AllocationError> {
        self.tx.commit().await.map_err(DbError::Query)?;
        Ok(self.allocation)
    }
}

struct SlaveRow {
    name: String,
    basedir: String,
    pool_id: i32,
    enabled: bool,
    locked_master_id: Option<i32>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SlaveRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            name: row.try_get("name")?,
            basedir: row.try_get("basedir")?,
            pool_id: row.try_get("pool_id")?,
            enabled: row.try_get("enabled")?,
            locked_master_id: row.try_get("locked_master_id")?,
        })
    }
}

impl From<SlaveRow> for SlaveRecord {
    fn from(row: SlaveRow) -> Self {
        SlaveRecord {
            name: row.name,
            basedir: row.basedir,
            pool_id: row.pool_id,
            enabled: row.enabled,
            locked_master_id: row.locked_master_id,
        }
    }
}

struct MasterCandidateRow {
    master_id: i32,
    nickname: String,
    fqdn: String,
    pb_port: i32,
    pool_id: i32,
    enabled: bool,
    max_slaves: Option<i32>,
    current_slaves: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for MasterCandidateRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            master_id: row.try_get("master_id")?,
            nickname: row.try_get("nickname")?,
            fqdn: row.try_get("fqdn")?,
            pb_port: row.try_get("pb_port")?,
            pool_id: row.try_get("pool_id")?,
            enabled: row.try_get("enabled")?,
            max_slaves: row.try_get("max_slaves")?,
            current_slaves: row.try_get("current_slaves")?,
        })
    }
}

impl From<MasterCandidateRow> for MasterCandidate {
    fn from(row: MasterCandidateRow) -> Self {
        MasterCandidate {
            master: Master {
                master_id: row.master_id,
                nickname: row.nickname,
                fqdn: row.fqdn,
                pb_port: row.pb_port,
            },
            pool_id: row.pool_id,
            enabled: row.enabled,
            max_slaves: row.max_slaves,
            current_slaves: row.current_slaves,
        }
    }
}

struct AllocationRow {
    slave_name: String,
    password: String,
    basedir: String,
    allocated_at: DateTime<Utc>,
    master_id: i32,
    nickname: String,
    fqdn: String,
    pb_port: i32,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AllocationRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            slave_name: row.try_get("slave_name")?,
            password: row.try_get("password")?,
            basedir: row.try_get("basedir")?,
            allocated_at: row.try_get("allocated_at")?,
            master_id: row.try_get("master_id")?,
            nickname: row.try_get("nickname")?,
            fqdn: row.try_get("fqdn")?,
            pb_port: row.try_get("pb_port")?,
        })
    }
}

impl From<AllocationRow> for Allocation {
    fn from(row: AllocationRow) -> Self {
        Allocation {
            slave_name: row.slave_name,
            master: Master {
                master_id: row.master_id,
                nickname: row.nickname,
                fqdn: row.fqdn,
                pb_port: row.pb_port,
            },
            password: row.password,
            basedir: row.basedir,
            allocated_at: row.allocated_at,
        }
    }
}

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::storage::clock::{self, Clock, SystemClock};
use crate::storage::sqlite::{self, PoolLimits, PoolProbe};
use crate::storage::startup::{wait_until_ready, RetryPolicy};
use crate::storage::{schema, ClickStore};
use crate::types::{BannerId, ClickStat};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use deadpool_sqlite::Pool;
use rusqlite::{params, Connection, TransactionBehavior};
use std::sync::Arc;
use std::time::{Duration, Instant};

const UPSERT_CLICK: &str = "
    INSERT INTO banner_clicks (banner_id, click_time, minute_bucket, clicks)
    VALUES (?1, ?2, ?3, 1)
    ON CONFLICT (banner_id, minute_bucket) DO UPDATE SET
        clicks     = clicks + 1,
        click_time = excluded.click_time";

const SELECT_RANGE: &str = "
    SELECT minute_bucket, clicks
    FROM banner_clicks
    WHERE banner_id = ?1
      AND minute_bucket >= ?2
      AND minute_bucket <= ?3
    ORDER BY minute_bucket ASC";

/// VM steps between deadline checks.
const PROGRESS_STEPS: i32 = 1_000;

/// Absolute end of one store call, checked from inside the blocking closure.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Instant);

impl Deadline {
    fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Fail with `SQLITE_INTERRUPT` once the deadline has passed. An open
    /// transaction is rolled back when the error drops it.
    pub(crate) fn check(&self) -> rusqlite::Result<()> {
        if self.remaining().is_zero() {
            Err(interrupted())
        } else {
            Ok(())
        }
    }
}

fn interrupted() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        None,
    )
}

fn is_busy(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(rusqlite::ErrorCode::DatabaseBusy)
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub op_timeout: Duration,
    /// Lock wait granted to a call, further capped by what is left of `op_timeout`.
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
    pub limits: PoolLimits,
    pub maintenance_interval: Duration,
}

impl StoreOptions {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            op_timeout: config.op_timeout(),
            busy_timeout: config.busy_timeout(),
            retry: RetryPolicy::new(config.connect_attempts, config.connect_delay()),
            limits: PoolLimits::from_config(config),
            maintenance_interval: config.maintenance_interval(),
        }
    }
}

/// [`ClickStore`] backed by a pooled SQLite database.
///
/// Holds no mutable state besides the pool: the one-row-per-minute
/// invariant is enforced by the `banner_clicks_unique` constraint and the
/// upsert, never by in-process locking.
pub struct SqliteClickStore {
    pool: Pool,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
}

impl SqliteClickStore {
    /// Create the pool from config and open the store on it.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = sqlite::create_pool(config)?;
        Self::open(pool, StoreOptions::from_config(config)).await
    }

    pub async fn open(pool: Pool, options: StoreOptions) -> StoreResult<Self> {
        Self::open_with_clock(pool, options, Arc::new(SystemClock)).await
    }

    /// Take ownership of `pool`: wait for the backend, provision the schema,
    /// and start connection maintenance. The pool is closed if any step fails.
    pub async fn open_with_clock(
        pool: Pool,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        if let Err(e) = wait_until_ready(&PoolProbe(&pool), options.retry).await {
            pool.close();
            return Err(e);
        }

        let store = Self {
            pool,
            clock,
            options,
        };
        store
            .run("provision_schema", |conn, _| schema::provision(conn))
            .await?;

        tokio::spawn(sqlite::maintenance_loop(
            store.pool.clone(),
            options.limits,
            options.maintenance_interval,
        ));

        Ok(store)
    }

    /// Run `f` on a pooled connection within the per-call deadline, logging failures.
    async fn run<T, F>(&self, op: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Deadline) -> rusqlite::Result<T> + Send + 'static,
    {
        let result = self.execute(f).await;
        if let Err(ref e) = result {
            tracing::warn!(op, error = %e, "click store operation failed");
        }
        result
    }

    /// Only the pool wait is abandoned on expiry. Once `f` holds a
    /// connection its outcome is always awaited: lock waits are capped at
    /// the remaining budget, long statements are interrupted by SQLite, and
    /// writers call [`Deadline::check`] before committing. A reported
    /// timeout never hides a committed write.
    async fn execute<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Deadline) -> rusqlite::Result<T> + Send + 'static,
    {
        let budget = self.options.op_timeout;
        let busy_timeout = self.options.busy_timeout;
        let deadline = Deadline(Instant::now() + budget);

        let conn = match tokio::time::timeout(budget, self.pool.get()).await {
            Ok(conn) => conn.map_err(|e| StoreError::from_pool(e, budget))?,
            Err(_) => return Err(StoreError::Timeout(budget)),
        };

        conn.interact(move |conn| {
            deadline.check()?;
            let lock_wait = deadline.remaining().min(busy_timeout);
            let capped = lock_wait < busy_timeout;
            conn.busy_timeout(lock_wait)?;
            conn.progress_handler(PROGRESS_STEPS, Some(move || deadline.check().is_err()));

            let result = f(conn, deadline)
                .map_err(|e| if capped && is_busy(&e) { interrupted() } else { e });

            conn.progress_handler(0, None::<fn() -> bool>);
            conn.busy_timeout(busy_timeout).and(result)
        })
        .await?
        .map_err(|e| StoreError::from_sqlite(e, budget))
    }
}

#[async_trait]
impl ClickStore for SqliteClickStore {
    async fn record_event(&self, banner_id: BannerId) -> StoreResult<()> {
        let click_ms = clock::to_millis(self.clock.now());
        let bucket_ms = clock::minute_bucket_millis(click_ms);

        self.run("record_event", move |conn, deadline| {
            // Write lock up front so busy_timeout covers contending writers.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            deadline.check()?;
            tx.prepare_cached(UPSERT_CLICK)?
                .execute(params![banner_id, click_ms, bucket_ms])?;
            deadline.check()?;
            tx.commit()
        })
        .await
    }

    async fn query_range(
        &self,
        banner_id: BannerId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<ClickStat>> {
        let from_ms = clock::to_millis(from);
        let to_ms = clock::to_millis(to);

        let rows = self
            .run("query_range", move |conn, _| {
                let mut stmt = conn.prepare_cached(SELECT_RANGE)?;
                let rows = stmt
                    .query_map(params![banner_id, from_ms, to_ms], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(bucket_ms, clicks)| {
                let minute =
                    clock::from_millis(bucket_ms).ok_or(StoreError::InvalidTimestamp(bucket_ms))?;
                Ok(ClickStat { minute, clicks })
            })
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        self.run("ping", |conn, _| conn.execute_batch("SELECT 1")).await
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.pool.is_closed() {
            self.pool.close();
            tracing::info!("click store closed");
        }
        Ok(())
    }
}

impl Drop for SqliteClickStore {
    fn drop(&mut self) {
        self.pool.close();
    }
}

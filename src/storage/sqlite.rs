use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::storage::startup::Probe;
use async_trait::async_trait;
use deadpool_sqlite::{Config, Hook, HookError, Pool, PoolConfig, Runtime};
use rusqlite::Connection;
use std::time::Duration;
use tokio::time;

/// Apply per-connection PRAGMAs. Runs once for every connection the pool opens.
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -16384;
        PRAGMA temp_store = MEMORY;
        PRAGMA wal_autocheckpoint = 1000;
        ",
    )
}

/// Create a deadpool-sqlite connection pool bounded by `max_open_conns`.
pub fn create_pool(config: &DatabaseConfig) -> StoreResult<Pool> {
    let db_path = config.path.clone();

    // Set restrictive file permissions on the database file (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            if let Err(e) =
                std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "failed to set database file permissions");
            }
        }
    }

    let mut pool_config = PoolConfig::new(config.max_open_conns);
    pool_config.timeouts.wait = Some(config.op_timeout());
    pool_config.timeouts.create = Some(config.op_timeout());

    let mut cfg = Config::new(db_path);
    cfg.pool = Some(pool_config);

    let busy_timeout = config.busy_timeout();
    cfg.builder(Runtime::Tokio1)
        .map_err(|e| StoreError::Pool(e.to_string()))?
        .post_create(Hook::async_fn(move |conn, _| {
            Box::pin(async move {
                conn.interact(move |conn| apply_pragmas(conn, busy_timeout))
                    .await
                    .map_err(|e| HookError::Message(e.to_string().into()))?
                    .map_err(HookError::Backend)
            })
        }))
        .build()
        .map_err(|e| StoreError::Pool(e.to_string()))
}

/// Reachability check used while starting up: open (or reuse) a connection and run `SELECT 1`.
pub struct PoolProbe<'a>(pub &'a Pool);

#[async_trait]
impl Probe for PoolProbe<'_> {
    async fn probe(&self) -> StoreResult<()> {
        let conn = self
            .0
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        conn.interact(|conn| conn.execute_batch("SELECT 1"))
            .await??;
        Ok(())
    }
}

/// Recycling limits for idle connections.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub max_idle: usize,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl PoolLimits {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_idle: config.max_idle_conns,
            max_lifetime: config.conn_max_lifetime(),
            max_idle_time: config.conn_max_idle(),
        }
    }
}

/// Close idle connections that are too old, idle too long, or beyond the idle cap.
/// Returns the number of connections closed.
pub fn prune_idle(pool: &Pool, limits: &PoolLimits) -> usize {
    let mut kept = 0;
    let result = pool.retain(|_, metrics| {
        let keep = metrics.age() < limits.max_lifetime
            && metrics.last_used() < limits.max_idle_time
            && kept < limits.max_idle;
        if keep {
            kept += 1;
        }
        keep
    });
    result.removed.len()
}

/// Shortest period the maintenance loop will tick at.
const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(10);

/// Background task enforcing [`PoolLimits`]. Exits once the pool is closed.
pub async fn maintenance_loop(pool: Pool, limits: PoolLimits, every: Duration) {
    let mut interval = time::interval(every.max(MIN_MAINTENANCE_INTERVAL));
    interval.tick().await; // skip first immediate tick

    loop {
        interval.tick().await;

        if pool.is_closed() {
            tracing::debug!("pool closed, stopping maintenance");
            return;
        }

        let removed = prune_idle(&pool, &limits);
        if removed > 0 {
            tracing::debug!(removed, "closed expired idle connections");
        }
    }
}

//! Bounded MariaDB/MySQL connection pool.
//!
//! Wraps `sqlx`'s pool with:
//! - a FIFO semaphore of `max_connections` permits, so excess callers wait
//!   in an unbounded queue instead of timing out while the pool is busy;
//! - a scoped [`PooledConnection`] that returns both the connection and the
//!   permit on every exit path;
//! - a keep-alive task that pings idle connections on a fixed interval,
//!   taking a permit for each so it never competes with callers for a slot;
//! - a never-failing [`DbPool::is_healthy`] probe.
//!
//! `sqlx`'s own acquire timeout is set to the connect timeout. Holding a
//! permit guarantees a free slot, so that timeout only bounds establishing
//! a single connection.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Connection, Executor, MySql, MySqlConnection, MySqlPool};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::{DbError, PoolConfig};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// A positional `?` parameter for [`DbPool::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Param {
    fn bind_to<'q>(
        &self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match self {
            Self::Null => query.bind(None::<String>),
            Self::Bool(v) => query.bind(*v),
            Self::Int(v) => query.bind(*v),
            Self::Text(v) => query.bind(v.clone()),
            Self::Timestamp(v) => query.bind(*v),
        }
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Scoped connection
// ---------------------------------------------------------------------------

/// A connection checked out of [`DbPool`].
///
/// Dropping it hands the connection back to the pool and then releases the
/// permit. The driver finishes returning the connection on a background
/// task, so the next waiter may briefly wait on the inner pool, but the
/// permit count guarantees a slot for it.
pub struct PooledConnection {
    conn: PoolConnection<MySql>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = MySqlConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        debug!("Database pool: connection released");
    }
}

// ---------------------------------------------------------------------------
// Keep-alive
// ---------------------------------------------------------------------------

struct KeepAlive(JoinHandle<()>);

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Outcome of one keep-alive sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Sweep {
    pub probed: usize,
    pub dead: usize,
}

fn spawn_keep_alive(
    pool: MySqlPool,
    permits: Arc<Semaphore>,
    every: Duration,
    ping_timeout: Duration,
) -> KeepAlive {
    KeepAlive(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                break;
            }
            probe_idle(&pool, &permits, ping_timeout).await;
        }
    }))
}

/// Ping the connections that are idle right now, one at a time.
///
/// Each probe holds a permit like any other checkout and gives it back
/// with the connection before the next one is taken. A busy pool is left
/// alone: the sweep stops as soon as no permit is free.
async fn probe_idle(
    pool: &MySqlPool,
    permits: &Arc<Semaphore>,
    ping_timeout: Duration,
) -> Sweep {
    let mut sweep = Sweep::default();
    for _ in 0..pool.num_idle() {
        let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
            break;
        };
        let Some(mut conn) = pool.try_acquire() else {
            break;
        };
        sweep.probed += 1;

        let failure = match tokio::time::timeout(ping_timeout, conn.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!("no reply within {ping_timeout:?}")),
        };
        if let Some(reason) = failure {
            warn!(error = %reason, "Keep-alive ping failed; closing connection");
            sweep.dead += 1;
            // No graceful close: the peer may be gone.
            drop(conn.detach());
        } else {
            drop(conn);
        }
        drop(permit);
    }
    if sweep.probed > 0 {
        debug!(probed = sweep.probed, dead = sweep.dead, "Keep-alive sweep complete");
    }
    sweep
}

// ---------------------------------------------------------------------------
// DbPool
// ---------------------------------------------------------------------------

/// Shared handle to the pool. Cheap to clone.
///
/// Construct it once at startup with [`DbPool::connect`] and inject it into
/// whatever needs database access. Call [`DbPool::shutdown`] on exit.
#[derive(Clone)]
pub struct DbPool {
    inner: MySqlPool,
    permits: Arc<Semaphore>,
    config: Arc<PoolConfig>,
    keep_alive: Arc<KeepAlive>,
}

impl DbPool {
    /// Build the pool. No connection is opened until first use, so this
    /// succeeds even while the database is still starting.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn connect(config: PoolConfig) -> Result<Self, DbError> {
        config.validate()?;
        info!(
            host = config.host(),
            port = config.port(),
            database = config.database(),
            "Configuring database pool (max_connections={})",
            config.max_connections()
        );

        let inner = MySqlPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(config.connect_timeout())
            .test_before_acquire(true)
            .after_connect(|_conn, _meta| {
                Box::pin(async move {
                    info!("Database pool: new connection established");
                    Ok(())
                })
            })
            .connect_lazy_with(config.connect_options());

        let permits = usize::try_from(config.max_connections()).unwrap_or(usize::MAX);
        let permits = Arc::new(Semaphore::new(permits));
        let keep_alive = spawn_keep_alive(
            inner.clone(),
            Arc::clone(&permits),
            config.keep_alive_interval(),
            config.connect_timeout(),
        );

        Ok(Self {
            inner,
            permits,
            config: Arc::new(config),
            keep_alive: Arc::new(keep_alive),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        let max = usize::try_from(self.config.max_connections()).unwrap_or(usize::MAX);
        max.saturating_sub(self.permits.available_permits())
    }

    /// Check out a connection, waiting as long as it takes for a free slot.
    ///
    /// # Errors
    /// Returns the driver error if a new connection cannot be established
    /// within the connect timeout, or `PoolClosed` after [`shutdown`](Self::shutdown).
    pub async fn acquire(&self) -> Result<PooledConnection, DbError> {
        let permit = self.permit().await?;
        self.checkout(permit).await
    }

    /// Wait in FIFO order for a free slot.
    async fn permit(&self) -> Result<OwnedSemaphorePermit, DbError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DbError::Sqlx(sqlx::Error::PoolClosed))
    }

    async fn checkout(&self, permit: OwnedSemaphorePermit) -> Result<PooledConnection, DbError> {
        let conn = self.inner.acquire().await?;
        Ok(PooledConnection {
            conn,
            _permit: permit,
        })
    }

    /// Idle connections currently held by the pool.
    pub fn idle_connections(&self) -> usize {
        self.inner.num_idle()
    }

    /// Run a parameterised statement and return every row. No retry.
    pub async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<MySqlRow>, DbError> {
        let mut conn = self.acquire().await?;
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, param| param.bind_to(query));
        Ok(query.fetch_all(&mut *conn).await?)
    }

    /// Run a parameter-less statement over the text protocol and return the
    /// affected row count. DDL goes through here.
    pub async fn execute(&self, sql: &str) -> Result<u64, DbError> {
        let mut conn = self.acquire().await?;
        let result = (&mut *conn).execute(sql).await?;
        Ok(result.rows_affected())
    }

    /// Acquire, ping, release. Errors propagate.
    pub async fn test_connection(&self) -> Result<(), DbError> {
        let mut conn = self.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    /// Liveness probe: `true` iff a connection could be pinged. Never fails.
    ///
    /// The probe queues for a slot like any other caller. Only the checkout
    /// and the ping are bounded by the connect timeout, so a pool saturated
    /// by slow queries does not read as a dead database.
    #[instrument(skip(self))]
    pub async fn is_healthy(&self) -> bool {
        match self.probe().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Database health check failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<(), DbError> {
        let permit = self.permit().await?;
        let ping = async {
            let mut conn = self.checkout(permit).await?;
            conn.ping().await?;
            Ok::<_, DbError>(())
        };
        tokio::time::timeout(self.config.connect_timeout(), ping)
            .await
            .map_err(|_| DbError::Sqlx(sqlx::Error::PoolTimedOut))?
    }

    /// Stop keep-alive, refuse new acquisitions and close every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down database pool");
        self.permits.close();
        self.keep_alive.0.abort();
        self.inner.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
impl DbPool {
    pub(crate) fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    #[cfg(feature = "integration")]
    pub(crate) async fn sweep_idle(&self) -> Sweep {
        probe_idle(&self.inner, &self.permits, self.config.connect_timeout()).await
    }
}

//! The single shared database session and the serialization primitive the
//! award transaction relies on.
//!
//! The pool is capped at one connection; `with_transaction` additionally
//! funnels every transactional caller through one async mutex, so two
//! transaction bodies can never interleave statements on that connection.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{error, info, warn};

use tenderd_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database session unavailable; reconnect in progress")]
    Unavailable,
    #[error("database session is down; reconnect attempts exhausted")]
    Down,
    #[error("transaction failed: {0}")]
    TransactionFailed(#[source] sqlx::Error),
    #[error("transaction exceeded {0:?} and was rolled back")]
    TransactionTimeout(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Up,
    Retrying,
    Down,
}

#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub busy_timeout: Duration,
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub transaction_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            connect_retries: 3,
            retry_delay: Duration::from_millis(500),
            transaction_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&DatabaseConfig> for ConnectionSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            connect_retries: config.connect_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            transaction_timeout: Duration::from_secs(config.transaction_timeout_secs),
        }
    }
}

struct Inner {
    database_url: String,
    settings: ConnectionSettings,
    pool: RwLock<DbPool>,
    state: Mutex<ManagerState>,
    tx_slot: tokio::sync::Mutex<()>,
}

/// Cheap to clone; all clones share the one session and the one
/// transaction slot.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub async fn connect(
        database_url: &str,
        settings: ConnectionSettings,
    ) -> Result<Self, ConnectionError> {
        let pool = build_pool(database_url, &settings).await.map_err(ConnectionError::Connect)?;
        info!(event_name = "db.connected", url = database_url, "database session established");
        Ok(Self {
            inner: Arc::new(Inner {
                database_url: database_url.to_string(),
                settings,
                pool: RwLock::new(pool),
                state: Mutex::new(ManagerState::Up),
                tx_slot: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub async fn connect_with_config(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        Self::connect(&config.url, ConnectionSettings::from(config)).await
    }

    pub fn state(&self) -> ManagerState {
        *self.state_guard()
    }

    /// Handle for non-transactional reads. Rejected while the manager is
    /// reconnecting or down, so callers fail fast instead of hanging.
    pub fn pool(&self) -> Result<DbPool, ConnectionError> {
        match self.state() {
            ManagerState::Up => Ok(self.pool_snapshot()),
            ManagerState::Retrying => Err(ConnectionError::Unavailable),
            ManagerState::Down => Err(ConnectionError::Down),
        }
    }

    /// Runs `f` inside one transaction on the shared session.
    ///
    /// Callers are fully serialized; the body is bounded by the configured
    /// transaction timeout; any error (including the timeout) rolls the
    /// whole transaction back. Statement-level failures are not retried
    /// here: a failed statement aborts its transaction, and retrying is the
    /// caller's decision.
    pub async fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<ConnectionError> + Send,
        F: for<'t> FnOnce(&'t mut SqliteConnection) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        let pool = self.pool().map_err(E::from)?;
        let _slot = self.inner.tx_slot.lock().await;

        let mut tx = pool.begin().await.map_err(|e| E::from(self.classify(e)))?;
        let body = tokio::time::timeout(self.inner.settings.transaction_timeout, f(&mut tx)).await;

        match body {
            Err(_elapsed) => {
                if let Err(rollback_error) = tx.rollback().await {
                    let _ = self.classify(rollback_error);
                }
                warn!(
                    event_name = "db.transaction_timeout",
                    timeout = ?self.inner.settings.transaction_timeout,
                    "transaction exceeded its budget and was rolled back"
                );
                Err(E::from(ConnectionError::TransactionTimeout(
                    self.inner.settings.transaction_timeout,
                )))
            }
            Ok(Err(error)) => {
                // A statement that died with the session takes the rollback
                // down with it; that rollback failure is what flags the
                // loss and starts the bounded reconnect.
                if let Err(rollback_error) = tx.rollback().await {
                    let _ = self.classify(rollback_error);
                }
                Err(error)
            }
            Ok(Ok(value)) => {
                tx.commit().await.map_err(|e| E::from(self.classify(e)))?;
                Ok(value)
            }
        }
    }

    /// Flags the session as lost and starts the bounded reconnect loop.
    /// Idempotent while recovery is already running.
    pub fn begin_recovery(&self) {
        {
            let mut state = self.state_guard();
            if *state != ManagerState::Up {
                return;
            }
            *state = ManagerState::Retrying;
        }
        warn!(event_name = "db.session_lost", "database session lost; entering bounded reconnect");
        let manager = self.clone();
        tokio::spawn(async move { manager.run_reconnect().await });
    }

    async fn run_reconnect(self) {
        let settings = self.inner.settings.clone();
        for attempt in 1..=settings.connect_retries {
            tokio::time::sleep(settings.retry_delay).await;
            match build_pool(&self.inner.database_url, &settings).await {
                Ok(pool) => {
                    self.swap_pool(pool);
                    *self.state_guard() = ManagerState::Up;
                    info!(event_name = "db.reconnected", attempt, "database session re-established");
                    return;
                }
                Err(error) => {
                    warn!(
                        event_name = "db.reconnect_failed",
                        attempt,
                        %error,
                        "reconnect attempt failed"
                    );
                }
            }
        }
        *self.state_guard() = ManagerState::Down;
        error!(
            event_name = "db.down",
            attempts = settings.connect_retries,
            "reconnect attempts exhausted; refusing further work"
        );
    }

    fn classify(&self, error: sqlx::Error) -> ConnectionError {
        if is_session_loss(&error) {
            self.begin_recovery();
        }
        ConnectionError::TransactionFailed(error)
    }

    fn state_guard(&self) -> MutexGuard<'_, ManagerState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pool_snapshot(&self) -> DbPool {
        match self.inner.pool.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn swap_pool(&self, pool: DbPool) {
        match self.inner.pool.write() {
            Ok(mut guard) => *guard = pool,
            Err(poisoned) => *poisoned.into_inner() = pool,
        }
    }
}

fn is_session_loss(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)
    )
}

async fn build_pool(url: &str, settings: &ConnectionSettings) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = settings.busy_timeout.as_millis() as u64;
    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                let busy = format!("PRAGMA busy_timeout = {busy_timeout_ms}");
                sqlx::query(&busy).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}

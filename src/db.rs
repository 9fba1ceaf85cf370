//! Database connection setup.
//!
//! [`connect`] is the one place a SQLite pool is built. [`LazyConnection`]
//! wraps any connect routine so that the first caller triggers it and
//! callers arriving while it runs share that attempt's result. A failed
//! attempt is dropped once settled, so the next call starts over.

use anyhow::{anyhow, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::DbConfig;
use crate::migrate;

pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = &config.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Connects and makes sure the schema exists.
pub async fn connect_and_migrate(config: &DbConfig) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    migrate::run_migrations(&pool).await?;
    Ok(pool)
}

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
type ConnectFn<T> = Box<dyn Fn() -> ConnectFuture<T> + Send + Sync>;
type Attempt<T> = Shared<BoxFuture<'static, Result<Arc<T>, Arc<anyhow::Error>>>>;

enum Slot<T> {
    Idle,
    Connecting { attempt_no: usize, attempt: Attempt<T> },
    Connected(Arc<T>),
}

/// A resource that is established on first use and shared afterwards.
///
/// At most one connect attempt runs at a time. Every caller that arrives
/// while it runs awaits that same attempt and receives its outcome, success
/// or error. A failed attempt is then forgotten, so the next
/// [`get`](Self::get) starts a fresh one. A single call never retries.
pub struct LazyConnection<T> {
    slot: Mutex<Slot<T>>,
    connect: ConnectFn<T>,
    attempts: AtomicUsize,
    label: &'static str,
}

impl<T: Send + Sync + 'static> LazyConnection<T> {
    pub fn new<F, Fut>(label: &'static str, connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            slot: Mutex::new(Slot::Idle),
            connect: Box::new(move || -> ConnectFuture<T> { Box::pin(connect()) }),
            attempts: AtomicUsize::new(0),
            label,
        }
    }

    /// Returns the shared resource, connecting first if needed.
    pub async fn get(&self) -> Result<Arc<T>> {
        let (attempt_no, attempt) = {
            let mut slot = self.lock_slot()?;
            match *slot {
                Slot::Connected(ref value) => return Ok(value.clone()),
                Slot::Connecting {
                    attempt_no,
                    ref attempt,
                } => (attempt_no, attempt.clone()),
                Slot::Idle => {
                    let attempt_no = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let attempt = self.start(attempt_no);
                    *slot = Slot::Connecting {
                        attempt_no,
                        attempt: attempt.clone(),
                    };
                    (attempt_no, attempt)
                }
            }
        };

        let outcome = attempt.await;

        // Only the attempt still occupying the slot may settle it.
        let mut slot = self.lock_slot()?;
        if matches!(&*slot, Slot::Connecting { attempt_no: current, .. } if *current == attempt_no)
        {
            *slot = match &outcome {
                Ok(value) => Slot::Connected(value.clone()),
                Err(_) => Slot::Idle,
            };
        }
        drop(slot);

        outcome.map_err(|e| anyhow!("{e:#}"))
    }

    fn start(&self, attempt_no: usize) -> Attempt<T> {
        let label = self.label;
        let connecting = (self.connect)();
        async move {
            info!(target: "deskbot::db", label, attempt = attempt_no, "connecting");
            match connecting.await {
                Ok(value) => {
                    info!(target: "deskbot::db", label, "connected");
                    Ok(Arc::new(value))
                }
                Err(e) => {
                    warn!(
                        target: "deskbot::db",
                        label,
                        error = %e,
                        "connect failed; attempt discarded"
                    );
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, Slot<T>>> {
        self.slot
            .lock()
            .map_err(|_| anyhow!("{} connection state lock poisoned", self.label))
    }

    pub fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(&*slot, Slot::Connected(_)))
            .unwrap_or(false)
    }

    /// Number of connect attempts started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// A lazily connected, migrated SQLite pool for the given settings.
pub fn lazy_pool(config: &DbConfig) -> LazyConnection<SqlitePool> {
    let config = config.clone();
    LazyConnection::new("sqlite", move || {
        let config = config.clone();
        async move { connect_and_migrate(&config).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_first_access_connects_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conn = Arc::new(LazyConnection::new("test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(42u32)
            }
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { *conn.get().await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(conn.attempts(), 1);
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn failed_attempt_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conn = LazyConnection::new("test", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    anyhow::bail!("store unreachable");
                }
                Ok("pool")
            }
        });

        let err = conn.get().await.unwrap_err();
        assert!(err.to_string().contains("store unreachable"));
        assert!(!conn.is_connected());

        assert_eq!(*conn.get().await.unwrap(), "pool");
        assert_eq!(*conn.get().await.unwrap(), "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_failed_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let conn = Arc::new(LazyConnection::new("test", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if n == 0 {
                    anyhow::bail!("store unreachable");
                }
                Ok(7u32)
            }
        }));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.get().await.map(|value| *value) })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("store unreachable"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(conn.attempts(), 1);
        assert!(!conn.is_connected());

        assert_eq!(*conn.get().await.unwrap(), 7);
        assert_eq!(conn.attempts(), 2);
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn lazy_pool_creates_database_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DbConfig {
            path: tmp.path().join("nested").join("deskbot.sqlite"),
            max_connections: 2,
        };
        let lazy = lazy_pool(&config);
        assert!(!lazy.is_connected());

        let pool = lazy.get().await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='chat_configurations'",
        )
        .fetch_one(&*pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert!(config.path.exists());
    }
}

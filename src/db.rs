//! Document store connection management.
//!
//! [`ConnectionManager`] owns the process-wide SQLite connection pool. No
//! connection is attempted when the manager is built; the first call to
//! [`acquire`](ConnectionManager::acquire) establishes the pool and every
//! later (or concurrent) call observes the same pool.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode is enabled for all connections, which allows concurrent
//! readers and a single writer without blocking.
//!
//! # Connection Pool
//!
//! Uses `sqlx::SqlitePool` bounded by `store.min_pool_size` and
//! `store.max_pool_size`. The pool bounds the number of concurrently
//! outstanding store operations.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::OnceCell;

use asset_catalog_core::error::{StoreError, StoreResult};

use crate::config::StoreSettings;
use crate::sqlite_store::classify_sqlx_error;

/// Lazily created, memoized connection pool.
pub struct ConnectionManager {
    settings: StoreSettings,
    pool: OnceCell<SqlitePool>,
}

impl ConnectionManager {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            pool: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Return the shared pool, connecting on first use.
    ///
    /// Initialization is single-flight: concurrent callers wait for the
    /// first connection attempt. A failed attempt leaves the cell empty so
    /// a later call tries again.
    pub async fn acquire(&self) -> StoreResult<&SqlitePool> {
        self.pool.get_or_try_init(|| self.connect()).await
    }

    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    /// Close the pool if it was ever established.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::debug!("document store connection closed");
        }
    }

    async fn connect(&self) -> StoreResult<SqlitePool> {
        let url = &self.settings.url;
        if !url.starts_with("sqlite:") {
            return Err(StoreError::Backend(format!(
                "unsupported store url '{}': expected a sqlite: url",
                url
            )));
        }
        ensure_parent_dir(url)?;

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(format!("invalid store url '{}': {}", url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .min_connections(self.settings.min_pool_size)
            .max_connections(self.settings.max_pool_size)
            .connect_with(options)
            .await
            .map_err(|e| classify_sqlx_error("<connect>", e))?;

        tracing::info!(
            url = %url,
            min_pool_size = self.settings.min_pool_size,
            max_pool_size = self.settings.max_pool_size,
            "connected to document store"
        );
        Ok(pool)
    }
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_parent_dir(url: &str) -> StoreResult<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_for(url: String) -> StoreSettings {
        StoreSettings {
            url,
            min_pool_size: 1,
            max_pool_size: 2,
        }
    }

    #[tokio::test]
    async fn test_no_connection_until_first_acquire() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("nested").join("assets.sqlite");
        let manager = ConnectionManager::new(settings_for(format!("sqlite://{}", db.display())));
        assert!(!manager.is_connected());
        assert!(!db.exists());

        manager.acquire().await.unwrap();
        assert!(manager.is_connected());
        assert!(db.exists());
        manager.close().await;
    }

    #[tokio::test]
    async fn test_acquire_returns_same_pool() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("assets.sqlite");
        let manager = ConnectionManager::new(settings_for(format!("sqlite://{}", db.display())));
        let a = manager.acquire().await.unwrap() as *const SqlitePool;
        let b = manager.acquire().await.unwrap() as *const SqlitePool;
        assert_eq!(a, b);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let manager = ConnectionManager::new(settings_for("sqlite://./never.sqlite".into()));
        manager.close().await;
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_unsupported_url_is_fatal() {
        let manager = ConnectionManager::new(settings_for("postgres://nope".into()));
        let err = manager.acquire().await.unwrap_err();
        assert!(!err.is_transient());
        assert!(!manager.is_connected());
    }
}

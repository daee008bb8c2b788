//! Connection pool.
//!
//! Each operation checks out its own connection so that requests touching
//! different doctors or medicines never wait on a shared connection lock.

use std::path::PathBuf;

use tracing::debug;

use super::{Database, DbError, DbResult};
use crate::config::StoreConfig;

enum Source {
    File(PathBuf),
    /// A single shared in-memory database; it cannot be reopened.
    Memory,
}

/// Opens [`Database`] connections for the pool.
pub struct DatabaseManager {
    source: Source,
    config: StoreConfig,
}

impl r2d2::ManageConnection for DatabaseManager {
    type Connection = Database;
    type Error = DbError;

    fn connect(&self) -> DbResult<Database> {
        match &self.source {
            Source::File(path) => {
                debug!(path = %path.display(), "opening pooled connection");
                Database::open_with(path, &self.config)
            }
            Source::Memory => Database::open_in_memory(),
        }
    }

    fn is_valid(&self, db: &mut Database) -> DbResult<()> {
        db.conn().execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _db: &mut Database) -> bool {
        false
    }
}

/// A checked-out connection; returns to the pool on drop.
pub type PooledDatabase = r2d2::PooledConnection<DatabaseManager>;

/// Pool of [`Database`] connections to one database.
pub struct DatabasePool {
    inner: r2d2::Pool<DatabaseManager>,
}

impl DatabasePool {
    /// Pool over a database file, opening connections lazily.
    ///
    /// One connection is opened eagerly so schema errors surface here.
    pub fn open(path: impl Into<PathBuf>, config: &StoreConfig) -> DbResult<Self> {
        let manager = DatabaseManager {
            source: Source::File(path.into()),
            config: config.clone(),
        };
        let max_size = u32::try_from(config.max_connections.max(1)).unwrap_or(u32::MAX);
        let inner = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(config.checkout_timeout())
            .build(manager)
            .map_err(unavailable)?;
        Ok(Self { inner })
    }

    /// Pool holding exactly one in-memory connection, kept for its lifetime.
    pub fn in_memory() -> DbResult<Self> {
        Self::in_memory_with(&StoreConfig::default())
    }

    fn in_memory_with(config: &StoreConfig) -> DbResult<Self> {
        let manager = DatabaseManager {
            source: Source::Memory,
            config: config.clone(),
        };
        let inner = r2d2::Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .max_lifetime(None)
            .idle_timeout(None)
            .test_on_check_out(false)
            .connection_timeout(config.checkout_timeout())
            .build(manager)
            .map_err(unavailable)?;
        Ok(Self { inner })
    }

    /// Check out a connection, waiting up to the configured checkout timeout.
    pub fn get(&self) -> DbResult<PooledDatabase> {
        self.inner.get().map_err(unavailable)
    }

    /// Connections currently idle in the pool.
    pub fn idle_count(&self) -> u32 {
        self.inner.state().idle_connections
    }
}

fn unavailable(e: r2d2::Error) -> DbError {
    DbError::Unavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_pool_reuses_single_connection() {
        let pool = DatabasePool::in_memory().unwrap();
        {
            let db = pool.get().unwrap();
            db.conn()
                .execute(
                    "INSERT INTO accounts (id, role, name) VALUES ('d1', 'doctor', 'Dr. Rao')",
                    [],
                )
                .unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        // Same database seen through the next checkout
        let db = pool.get().unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let pool = DatabasePool::in_memory_with(&StoreConfig {
            checkout_timeout_ms: 20,
            ..Default::default()
        })
        .unwrap();
        let _held = pool.get().unwrap();
        assert!(matches!(pool.get(), Err(DbError::Unavailable(_))));
    }

    #[test]
    fn test_file_pool_opens_up_to_max() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            max_connections: 2,
            checkout_timeout_ms: 20,
            ..Default::default()
        };
        let pool = DatabasePool::open(dir.path().join("pool.db"), &config).unwrap();

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert!(matches!(pool.get(), Err(DbError::Unavailable(_))));
        drop(a);
        assert!(pool.get().is_ok());
        drop(b);
    }
}

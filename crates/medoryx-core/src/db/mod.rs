//! Database layer for Medoryx.

mod schema;
mod pool;
mod accounts;
mod medicines;
mod appointments;
mod queue;

pub use schema::*;
pub use pool::*;
#[allow(unused_imports)]
pub use accounts::*;
#[allow(unused_imports)]
pub use medicines::*;
#[allow(unused_imports)]
pub use appointments::*;
#[allow(unused_imports)]
pub use queue::*;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

use crate::config::StoreConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path with default store settings, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open database at path, creating if needed.
    pub fn open_with<P: AsRef<Path>>(path: P, config: &StoreConfig) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(config.busy_timeout())?;
        // Readers never block the single writer.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the write lock up front.
    ///
    /// Every statement issued through this `Database` until the transaction
    /// is committed or dropped belongs to it; dropping rolls back.
    pub fn write_transaction(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Begin a read transaction so several queries observe one snapshot.
    pub fn read_transaction(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medoryx.db");
        let db = Database::open(&path).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        // Re-opening applies the schema idempotently.
        drop(db);
        assert!(Database::open(&path).is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"medicines".to_string()));
        assert!(tables.contains(&"appointments".to_string()));
        assert!(tables.contains(&"doctor_queues".to_string()));
    }

    #[test]
    fn test_dropped_write_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        {
            let _tx = db.write_transaction().unwrap();
            db.conn()
                .execute(
                    "INSERT INTO accounts (id, role, name) VALUES ('d1', 'doctor', 'Dr. Rao')",
                    [],
                )
                .unwrap();
        }
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

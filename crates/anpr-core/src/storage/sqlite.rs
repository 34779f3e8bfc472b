use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Error, Result};

const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed report store. The single connection is serialized behind a
/// mutex so the database can be shared between the scheduler and ingestion.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        debug!("Opened report database at {}", path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.connection()?.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    /// Check schema version and create the report table if needed.
    fn migrate_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(Error::Other(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Lock the connection. A poisoned lock is reported as a store error.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Lock(format!("report database: {}", e)))
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.connection()?.execute_batch(
            "DELETE FROM report;
             DELETE FROM sqlite_sequence WHERE name = 'report';",
        )?;
        debug!("All tables truncated");
        Ok(())
    }
}

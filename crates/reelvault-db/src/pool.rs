//! Database connection pool management.
//!
//! This module provides connection pooling for SQLite using r2d2, plus the
//! read-only handles that background readers open so the primary pool stays
//! free for interactive writes.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use reelvault_common::{Error, Result};
use rusqlite::{Connection, OpenFlags};

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize a new database pool with the given file path.
///
/// This function will:
/// - Create the SQLite database file if it doesn't exist
/// - Switch the database to WAL so readers never block the writer
/// - Enable foreign key constraints on all connections
/// - Run pending database migrations
///
/// # Arguments
///
/// * `db_path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(DbPool)` - Initialized connection pool
/// * `Err(Error)` - If pool creation or migration fails
pub fn init_pool(db_path: &Path) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });

    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;

    let conn = get_conn(&pool)?;

    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|e| Error::database(format!("Failed to enable WAL: {}", e)))?;
    tracing::debug!(path = %db_path.display(), journal_mode = %mode, "Opened catalog");

    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

    Ok(pool)
}

/// Initialize an in-memory database pool for testing.
///
/// Every SQLite in-memory connection is its own database, so this pool holds
/// exactly one connection. Callers must release it before asking for another.
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create in-memory pool: {}", e)))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

    Ok(pool)
}

/// Get a connection from the pool.
///
/// This is a convenience wrapper around `pool.get()` that converts the
/// r2d2 error into our common Error type.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}

/// Open a read-only connection to an existing catalog file.
///
/// Used by background page and count queries. The connection is private to
/// the calling thread and never touches the primary pool.
pub fn open_read_only(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::database(format!("Failed to open read-only catalog: {}", e)))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(conn)
}

/// A connection used for reads off the coordination thread.
pub enum ReadHandle {
    /// Dedicated read-only connection to the catalog file.
    ReadOnly(Connection),
    /// Connection borrowed from the primary pool (in-memory catalogs only).
    Pooled(PooledConnection),
}

impl Deref for ReadHandle {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::ReadOnly(conn) => conn,
            Self::Pooled(conn) => conn,
        }
    }
}

/// Handle to the catalog store: the read-write pool plus where it lives.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct Catalog {
    pool: DbPool,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open (creating and migrating if needed) the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let pool = init_pool(path)?;
        Ok(Self {
            pool,
            path: Some(path.to_path_buf()),
        })
    }

    /// An in-memory catalog backed by [`init_memory_pool`].
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            pool: init_memory_pool()?,
            path: None,
        })
    }

    /// The read-write pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Location of the catalog file, `None` for in-memory catalogs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A read-write connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection> {
        get_conn(&self.pool)
    }

    /// A connection for background reads.
    pub fn reader(&self) -> Result<ReadHandle> {
        match &self.path {
            Some(path) => open_read_only(path).map(ReadHandle::ReadOnly),
            None => self.conn().map(ReadHandle::Pooled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_memory_pool() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);

        let conn = get_conn(&pool).unwrap();
        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_file_pool_uses_wal_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("nested").join("library.db")).unwrap();
        let conn = catalog.conn().unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reader_sees_committed_rows_and_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("library.db")).unwrap();

        let writer = catalog.conn().unwrap();
        writer
            .execute(
                "INSERT INTO entries (file_path, title, added_at) VALUES ('/m/a.mkv', 'A', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let reader = catalog.reader().unwrap();
        assert!(matches!(reader, ReadHandle::ReadOnly(_)));
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let write = reader.execute("DELETE FROM entries", []);
        assert!(write.is_err());
    }
}

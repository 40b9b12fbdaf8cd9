//! Read connection pool for live and point queries.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode lets these readers run alongside the writer thread, and
//! each statement sees every transaction committed before it started.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use std::time::Duration;

use super::schema::apply_reader_pragmas;
use crate::error::{InventoryError, Result};

pub type ReaderConnection = PooledConnection<SqliteConnectionManager>;

/// Pool of read-only connections.
///
/// The database file must already exist (the writer creates it), because
/// connections are opened without `SQLITE_OPEN_CREATE`.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    /// * `busy_timeout` - Lock wait applied to every connection
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidConfig`] if `max_size` is zero.
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32, busy_timeout: Duration) -> Result<Self> {
        if max_size == 0 {
            return Err(InventoryError::InvalidConfig(
                "reader pool size must be at least 1".into(),
            ));
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ReaderConnectionCustomizer { busy_timeout }))
            .build(manager)?;

        tracing::debug!(max_size, "Reader pool ready");
        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<ReaderConnection> {
        Ok(self.pool.get()?)
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Get a connection, waiting at most `timeout` for one to free up.
    pub fn get_timeout(&self, timeout: Duration) -> Result<ReaderConnection> {
        Ok(self.pool.get_timeout(timeout)?)
    }

    /// How long [`ReaderPool::get`] waits before giving up.
    pub fn connection_timeout(&self) -> Duration {
        self.pool.connection_timeout()
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn, self.busy_timeout)
    }
}

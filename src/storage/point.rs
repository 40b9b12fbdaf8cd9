//! Point query executor: one cancellable read against the reader pool.
//!
//! The read runs on tokio's blocking pool. Cancellation is cooperative:
//! a SQLite progress handler polls a shared flag every few hundred VM
//! instructions and aborts the running statement once it is set, and the
//! wait for a pooled connection re-checks the same flag. On
//! cancellation the executor waits for the read to unwind, so the cursor is
//! finalized and the pooled connection returned before `Cancelled` is
//! reported.

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::reader::{ReaderConnection, ReaderPool};
use crate::error::{InventoryError, Result};

/// VM instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 500;

/// Longest wait for a pooled connection between cancellation checks.
const ACQUIRE_SLICE: Duration = Duration::from_millis(25);

/// Runs one-shot reads, independent of the invalidation tracker.
#[derive(Clone)]
pub struct PointQueryExecutor {
    readers: ReaderPool,
}

impl PointQueryExecutor {
    pub fn new(readers: ReaderPool) -> Self {
        Self { readers }
    }

    /// Execute `read` once on a pooled connection.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Cancelled`] if `cancel` fires before the read
    /// completes; otherwise whatever `read` or the pool returns.
    pub async fn execute<T, F>(&self, cancel: &CancellationToken, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(InventoryError::Cancelled);
        }

        let abort = Arc::new(AtomicBool::new(false));
        let abort_on_drop = AbortOnDrop(Arc::clone(&abort));
        let readers = self.readers.clone();
        let task_abort = Arc::clone(&abort);

        let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = acquire(&readers, &task_abort)?;
            let guard = ProgressGuard::install(&conn, task_abort);
            if guard.aborted() {
                return Err(InventoryError::Cancelled);
            }
            read(&conn)
        });

        let outcome = tokio::select! {
            biased;
            joined = &mut task => joined?.map_err(|e| {
                if e.is_interrupt() {
                    InventoryError::Cancelled
                } else {
                    e
                }
            }),
            () = cancel.cancelled() => {
                abort.store(true, Ordering::SeqCst);
                // Cursor and connection are released when the task returns.
                let _ = task.await;
                tracing::debug!("Point query cancelled");
                Err(InventoryError::Cancelled)
            }
        };

        drop(abort_on_drop);
        outcome
    }
}

/// Take a connection from `readers`, giving up once `abort` is set.
///
/// The wait is split into short slices so a cancelled read never sits out
/// the pool's full connection timeout.
fn acquire(readers: &ReaderPool, abort: &AtomicBool) -> Result<ReaderConnection> {
    let deadline = Instant::now() + readers.connection_timeout();
    loop {
        if abort.load(Ordering::SeqCst) {
            return Err(InventoryError::Cancelled);
        }
        match readers.get_timeout(ACQUIRE_SLICE) {
            Ok(conn) => return Ok(conn),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => {}
        }
    }
}

/// Interrupts an in-flight read if the awaiting future is dropped.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Installs the cancellation progress handler for the guard's lifetime.
///
/// The handler is removed on every exit path so the connection goes back to
/// the pool clean.
struct ProgressGuard<'c> {
    conn: &'c Connection,
    abort: Arc<AtomicBool>,
}

impl<'c> ProgressGuard<'c> {
    fn install(conn: &'c Connection, abort: Arc<AtomicBool>) -> Self {
        let flag = Arc::clone(&abort);
        conn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || flag.load(Ordering::SeqCst)),
        );
        Self { conn, abort }
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

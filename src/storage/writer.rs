//! Dedicated writer thread: the transaction executor.
//!
//! Every mutation is shipped to one thread owning the only read-write
//! connection, so statement sequences from different callers never
//! interleave. Each unit of work runs inside an IMMEDIATE transaction:
//!
//! 1. begin
//! 2. run the work through a [`WriteScope`], which records every table the
//!    bound statements declare
//! 3. commit, or roll back on any error (the transaction rolls back on drop)
//! 4. after a successful commit, notify the invalidation tracker of the
//!    declared tables before replying to the caller
//!
//! Because step 4 happens on the writer thread, notifications are delivered
//! in commit order.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::adapter::BoundStatement;
use super::schema::{apply_pragmas, initialize_schema};
use crate::error::{InventoryError, Result};
use crate::flow::invalidation::InvalidationTracker;

type Job = Box<dyn FnOnce(&mut Connection, &InvalidationTracker) + Send>;

enum WriteCommand {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Statement sink for one transaction.
///
/// Tracks the tables declared by executed statements.
pub struct WriteScope<'a> {
    tx: &'a Transaction<'a>,
    touched: BTreeSet<&'static str>,
}

impl<'a> WriteScope<'a> {
    fn new(tx: &'a Transaction<'a>) -> Self {
        Self {
            tx,
            touched: BTreeSet::new(),
        }
    }

    /// Execute a bound statement, returning the rows it affected.
    ///
    /// The statement's table is marked for invalidation even when no row
    /// changed.
    pub fn execute(&mut self, stmt: &BoundStatement<'_>) -> Result<usize> {
        let rows = stmt.execute(self.tx)?;
        self.touched.insert(stmt.table);
        tracing::trace!(table = stmt.table, rows, "Statement executed");
        Ok(rows)
    }

    /// The transaction's connection, for reads that must see uncommitted work.
    pub fn connection(&self) -> &Connection {
        self.tx
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.tx.last_insert_rowid()
    }
}

fn execute_transaction<R, F>(
    conn: &mut Connection,
    tracker: &InvalidationTracker,
    work: F,
) -> Result<R>
where
    F: FnOnce(&mut WriteScope<'_>) -> Result<R>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (value, touched) = {
        let mut scope = WriteScope::new(&tx);
        match work(&mut scope) {
            Ok(value) => (value, scope.touched),
            Err(e) => {
                tracing::debug!(error = %e, "Transaction rolled back");
                return Err(e);
            }
        }
    };
    tx.commit()?;

    if !touched.is_empty() {
        let woken = tracker.notify(touched.iter().copied());
        tracing::debug!(tables = ?touched, woken, "Transaction committed");
    }
    Ok(value)
}

/// Cloneable handle for submitting work to the writer thread.
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Run `work` atomically on the writer thread.
    ///
    /// The tracker is notified of the tables `work` wrote before this
    /// returns, so a read started afterwards sees the commit and every live
    /// query depending on those tables has been woken.
    ///
    /// # Errors
    ///
    /// Errors from `work` or from commit are returned unchanged after the
    /// rollback. [`InventoryError::Closed`] if the writer has shut down.
    pub async fn run_in_transaction<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut WriteScope<'_>) -> Result<R> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn: &mut Connection, tracker: &InvalidationTracker| {
            let result = execute_transaction(conn, tracker, work);
            // Caller may have gone away; the commit stands regardless.
            let _ = reply_tx.send(result);
        });

        self.sender
            .send(WriteCommand::Run(job))
            .await
            .map_err(|_| InventoryError::Closed)?;

        reply_rx.await.map_err(|_| InventoryError::WriterPanic)?
    }

    /// Ask the writer thread to stop after draining queued work.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.send(WriteCommand::Shutdown(ack_tx)).await.is_err() {
            // Already stopped.
            return Ok(());
        }
        let _ = ack_rx.await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Owner of the writer thread.
pub struct Writer {
    handle: WriterHandle,
    thread: JoinHandle<()>,
}

impl Writer {
    /// Open (creating if needed) the database and start the writer thread.
    ///
    /// The schema exists by the time this returns, so read-only connections
    /// can be opened right after.
    pub fn spawn<P: AsRef<Path>>(
        db_path: P,
        tracker: InvalidationTracker,
        channel_size: usize,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn, busy_timeout)?;
        initialize_schema(&conn)?;

        let (sender, receiver) = mpsc::channel(channel_size.max(1));
        let thread = thread::Builder::new()
            .name("inventory-writer".into())
            .spawn(move || run_writer(conn, receiver, tracker))?;

        tracing::info!(path = %db_path.display(), "Writer thread started");
        Ok(Self {
            handle: WriterHandle { sender },
            thread,
        })
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Wait for the thread to exit. Call after [`WriterHandle::shutdown`].
    pub fn join(self) -> Result<()> {
        drop(self.handle);
        self.thread.join().map_err(|_| InventoryError::WriterPanic)
    }
}

fn run_writer(
    mut conn: Connection,
    mut receiver: mpsc::Receiver<WriteCommand>,
    tracker: InvalidationTracker,
) {
    while let Some(command) = receiver.blocking_recv() {
        match command {
            WriteCommand::Run(job) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut conn, &tracker)));
                if outcome.is_err() {
                    tracing::error!("Write job panicked; transaction rolled back");
                }
            }
            WriteCommand::Shutdown(ack) => {
                receiver.close();
                // Finish anything queued before the shutdown request.
                while let Ok(WriteCommand::Run(job)) = receiver.try_recv() {
                    let _ = panic::catch_unwind(AssertUnwindSafe(|| job(&mut conn, &tracker)));
                }
                let _ = ack.send(());
                break;
            }
        }
    }

    if let Err((_, e)) = conn.close() {
        tracing::warn!(error = %e, "Failed to close writer connection cleanly");
    }
    tracing::info!("Writer thread stopped");
}

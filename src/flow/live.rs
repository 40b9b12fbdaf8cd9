//! Live query subscriptions.
//!
//! A [`LiveQuery`] is a `Stream` of query results. Opening one registers its
//! table set with the [`InvalidationTracker`], runs the read once right away,
//! then re-runs it every time a commit touches one of those tables. The
//! stream never ends on its own: it ends when the caller cancels or drops it,
//! when the layer is closed, or after emitting a read error.
//!
//! Protocol of the background task driving each subscription:
//! 1. registration happens before the first read, so no commit is missed
//! 2. read, emit, then wait for a wake-up or cancellation
//! 3. wake-ups arriving during a read or a blocked emit coalesce into one
//!    re-run against the latest committed state
//!
//! The output channel holds a single result, so a slow consumer applies
//! backpressure instead of queueing stale snapshots.

use futures::Stream;
use rusqlite::Connection;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::invalidation::{InvalidationTracker, Registration, SubscriptionId};
use crate::error::Result;
use crate::storage::reader::ReaderPool;

type ReadFn<T> = Arc<dyn Fn(&Connection) -> Result<T> + Send + Sync>;

/// A query with a fixed table dependency set, ready to be subscribed to.
///
/// Each call to [`LiveSource::subscribe`] opens an independent subscription.
pub struct LiveSource<T> {
    tables: Arc<[&'static str]>,
    read: ReadFn<T>,
    readers: ReaderPool,
    tracker: InvalidationTracker,
}

impl<T> Clone for LiveSource<T> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            read: Arc::clone(&self.read),
            readers: self.readers.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<T: Send + 'static> LiveSource<T> {
    pub fn new<F>(
        tables: &[&'static str],
        readers: ReaderPool,
        tracker: InvalidationTracker,
        read: F,
    ) -> Self
    where
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            tables: tables.into(),
            read: Arc::new(read),
            readers,
            tracker,
        }
    }

    /// Open a subscription. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Closed`](crate::InventoryError::Closed) if the
    /// tracker has been closed.
    pub fn subscribe(&self) -> Result<LiveQuery<T>> {
        let registration = self.tracker.register(&self.tables)?;
        let id = registration.id();
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        tokio::spawn(drive(self.clone(), registration, tx, cancel.clone()));

        Ok(LiveQuery {
            id,
            inner: ReceiverStream::new(rx),
            cancel,
            cancelled: false,
            source: self.clone(),
        })
    }

    async fn run_read(&self) -> Result<T> {
        let readers = self.readers.clone();
        let read = Arc::clone(&self.read);
        tokio::task::spawn_blocking(move || {
            let conn = readers.get()?;
            read(&conn)
        })
        .await?
    }
}

async fn drive<T: Send + 'static>(
    source: LiveSource<T>,
    mut registration: Registration,
    tx: mpsc::Sender<Result<T>>,
    cancel: CancellationToken,
) {
    let id = registration.id();
    let mut runs: u64 = 0;

    loop {
        // A read still in flight at cancellation finishes on the blocking
        // pool and its result is discarded.
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = source.run_read() => result,
        };
        runs += 1;

        let failed = result.is_err();
        if let Err(e) = &result {
            tracing::warn!(subscription = %id, error = %e, "Live query read failed");
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = tx.send(result) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        if failed {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = registration.changed() => {
                match changed {
                    Ok(commit) => {
                        tracing::trace!(subscription = %id, commit, "Live query invalidated");
                    }
                    // Tracker closed: the layer is shutting down.
                    Err(_) => break,
                }
            }
        }
    }

    tracing::debug!(subscription = %id, runs, "Live query stopped");
}

/// A running live query.
///
/// Yields `Ok(result)` for the initial read and after every relevant commit;
/// yields a single `Err` and ends if a re-run fails. Dropping the value
/// cancels the subscription.
pub struct LiveQuery<T> {
    id: SubscriptionId,
    inner: ReceiverStream<Result<T>>,
    cancel: CancellationToken,
    cancelled: bool,
    source: LiveSource<T>,
}

impl<T> LiveQuery<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop the subscription.
    ///
    /// Nothing is yielded after this returns, including results already
    /// buffered. Deregistration happens as soon as the driving task observes
    /// the cancellation.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.cancel.cancel();
            self.inner.close();
            tracing::debug!(subscription = %self.id, "Live query cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T: Send + 'static> LiveQuery<T> {
    /// Cancel this subscription and open a fresh one on the same query.
    ///
    /// The restarted query emits a new initial result.
    pub fn restart(&mut self) -> Result<()> {
        let fresh = self.source.subscribe()?;
        // The replaced query cancels itself on drop.
        drop(std::mem::replace(self, fresh));
        Ok(())
    }
}

impl<T> Stream for LiveQuery<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

impl<T> Unpin for LiveQuery<T> {}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("id", &self.id)
            .field("tables", &self.source.tables)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::storage::schema::{apply_pragmas, initialize_schema};
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        _temp_dir: TempDir,
        writer: Connection,
        tracker: InvalidationTracker,
        source: LiveSource<i64>,
    }

    fn harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let writer = Connection::open(&db_path).unwrap();
        apply_pragmas(&writer, Duration::from_millis(100)).unwrap();
        initialize_schema(&writer).unwrap();

        let readers = ReaderPool::new(&db_path, 2, Duration::from_millis(100)).unwrap();
        let tracker = InvalidationTracker::new();
        let source = LiveSource::new(&["items"], readers, tracker.clone(), |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
        });
        Harness {
            _temp_dir: temp_dir,
            writer,
            tracker,
            source,
        }
    }

    impl Harness {
        fn insert_and_notify(&self) {
            self.writer
                .execute(
                    "INSERT INTO items (name, price, quantity) VALUES ('Bolt', 0.5, 1)",
                    [],
                )
                .unwrap();
            self.tracker.notify(["items"]);
        }
    }

    async fn next<T: Send + 'static>(query: &mut LiveQuery<T>) -> Option<Result<T>> {
        timeout(WAIT, query.next()).await.expect("live query stalled")
    }

    #[tokio::test]
    async fn test_emits_initial_result_then_reruns() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();

        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);
        h.insert_and_notify();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_table_does_not_rerun() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);

        h.tracker.notify(["orders"]);
        assert!(timeout(Duration::from_millis(50), query.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_backlog_coalesces_but_ends_fresh() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);

        for _ in 0..5 {
            h.insert_and_notify();
        }

        let mut last = 0;
        while last < 5 {
            let value = next(&mut query).await.unwrap().unwrap();
            assert!(value >= last, "emissions must never go backwards");
            last = value;
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_cancel_stops_emission_and_deregisters() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);

        h.insert_and_notify();
        query.cancel();
        assert!(query.is_cancelled());
        assert!(next(&mut query).await.is_none());

        let tracker = h.tracker.clone();
        let deregistered = timeout(WAIT, async move {
            while tracker.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(deregistered.is_ok());
    }

    #[tokio::test]
    async fn test_tracker_close_ends_stream() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);

        h.tracker.close();
        assert!(next(&mut query).await.is_none());
        assert!(matches!(h.source.subscribe(), Err(InventoryError::Closed)));
    }

    #[tokio::test]
    async fn test_read_error_terminates_with_error() {
        let h = harness();
        let failing: LiveSource<i64> = LiveSource::new(
            &["items"],
            h.source.readers.clone(),
            h.tracker.clone(),
            |conn| Ok(conn.query_row("SELECT nope FROM items", [], |row| row.get(0))?),
        );
        let mut query = failing.subscribe().unwrap();

        assert!(matches!(
            next(&mut query).await,
            Some(Err(InventoryError::Store(_)))
        ));
        assert!(next(&mut query).await.is_none());
    }

    #[tokio::test]
    async fn test_restart_emits_fresh_initial_result() {
        let h = harness();
        let mut query = h.source.subscribe().unwrap();
        let first_id = query.id();
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 0);

        h.insert_and_notify();
        query.restart().unwrap();
        assert_ne!(query.id(), first_id);
        assert_eq!(next(&mut query).await.unwrap().unwrap(), 1);
    }
}

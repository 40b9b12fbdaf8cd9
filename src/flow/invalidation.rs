//! Invalidation tracker: routes committed table writes to live queries.
//!
//! The registry maps each table name to the subscriptions that read it. The
//! writer thread calls [`InvalidationTracker::notify`] after every commit;
//! each dependent subscription is woken once per commit, however many of
//! its tables the commit touched.
//!
//! Wake-ups travel over a per-subscription `tokio::sync::watch` channel
//! carrying the commit sequence number. A slow subscriber that misses several
//! commits sees a single change holding the latest sequence, so backlogs
//! coalesce on their own.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::error::{InventoryError, Result};

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber {
    tables: Vec<String>,
    waker: watch::Sender<u64>,
}

#[derive(Default)]
struct TrackerState {
    by_table: HashMap<String, HashSet<SubscriptionId>>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_id: u64,
    commit_seq: u64,
    closed: bool,
}

impl TrackerState {
    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };
        for table in &subscriber.tables {
            if let Some(ids) = self.by_table.get_mut(table) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_table.remove(table);
                }
            }
        }
        true
    }
}

/// Registry of live subscriptions keyed by table name.
///
/// Cloning is cheap and every clone shares one registry. All registry
/// mutation happens under a single mutex that is never held across an await.
#[derive(Clone, Default)]
pub struct InvalidationTracker {
    inner: Arc<Mutex<TrackerState>>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `tables`.
    ///
    /// The returned [`Registration`] deregisters itself when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Closed`] once the tracker has been closed.
    pub fn register(&self, tables: &[&str]) -> Result<Registration> {
        let mut state = self.state();
        if state.closed {
            return Err(InventoryError::Closed);
        }

        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        let (waker, wake) = watch::channel(state.commit_seq);

        let tables: Vec<String> = tables
            .iter()
            .map(|t| (*t).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for table in &tables {
            state.by_table.entry(table.clone()).or_default().insert(id);
        }
        tracing::debug!(subscription = %id, tables = ?tables, "Registered live query");
        state.subscribers.insert(id, Subscriber { tables, waker });

        Ok(Registration {
            id,
            wake,
            tracker: self.clone(),
        })
    }

    /// Wake every subscription depending on any of `tables`.
    ///
    /// Called by the writer thread after a commit. Each subscription is woken
    /// at most once per call.
    ///
    /// # Returns
    ///
    /// The number of subscriptions woken.
    pub fn notify<'a, I>(&self, tables: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state();
        if state.closed {
            return 0;
        }
        state.commit_seq += 1;
        let seq = state.commit_seq;

        let targets: BTreeSet<SubscriptionId> = tables
            .into_iter()
            .filter_map(|table| state.by_table.get(table))
            .flatten()
            .copied()
            .collect();

        for id in &targets {
            if let Some(subscriber) = state.subscribers.get(id) {
                subscriber.waker.send_replace(seq);
            }
        }

        tracing::trace!(commit = seq, woken = targets.len(), "Invalidation delivered");
        targets.len()
    }

    /// Remove a registration. Unknown or already-removed ids are ignored.
    ///
    /// Returns true if the registration was still present.
    pub fn deregister(&self, id: SubscriptionId) -> bool {
        let removed = self.state().remove(id);
        if removed {
            tracing::debug!(subscription = %id, "Deregistered live query");
        }
        removed
    }

    /// Close the registry and end every live subscription.
    ///
    /// Dropping each wake sender makes the subscription's next wait fail,
    /// which closes its output stream. Later registrations are refused.
    ///
    /// Returns the number of subscriptions that were force-cancelled.
    pub fn close(&self) -> usize {
        let mut state = self.state();
        state.closed = true;
        let cancelled = state.subscribers.len();
        state.subscribers.clear();
        state.by_table.clear();
        if cancelled > 0 {
            tracing::info!(cancelled, "Closed invalidation tracker with live subscriptions");
        }
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Number of registrations depending on `table`.
    pub fn subscribers_for(&self, table: &str) -> usize {
        self.state().by_table.get(table).map_or(0, HashSet::len)
    }
}

/// A live registration with its wake-up channel.
///
/// Dropping it deregisters from the tracker.
pub struct Registration {
    id: SubscriptionId,
    wake: watch::Receiver<u64>,
    tracker: InvalidationTracker,
}

impl Registration {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next invalidation.
    ///
    /// Returns the latest commit sequence; several commits since the last call
    /// are reported once.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Closed`] when the tracker was closed.
    pub async fn changed(&mut self) -> Result<u64> {
        self.wake
            .changed()
            .await
            .map_err(|_| InventoryError::Closed)?;
        Ok(*self.wake.borrow_and_update())
    }

    /// True if an invalidation arrived that `changed` has not yet reported.
    pub fn has_pending(&self) -> bool {
        self.wake.has_changed().unwrap_or(false)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tracker.deregister(self.id);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

//! The inventory data-access layer.
//!
//! [`Inventory`] owns the writer thread, the reader pool and the invalidation
//! tracker for one database. It is constructed explicitly and passed to
//! whatever needs it; there is no global handle.

pub mod order;

use std::fs;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::flow::invalidation::InvalidationTracker;
use crate::flow::live::{LiveQuery, LiveSource};
use crate::model::{Item, WriteOutcome};
use crate::storage::adapter::{ItemAdapters, StatementAdapter};
use crate::storage::point::PointQueryExecutor;
use crate::storage::queries;
use crate::storage::reader::ReaderPool;
use crate::storage::schema::ITEMS_TABLE;
use crate::storage::writer::{Writer, WriterHandle};

/// Reactive CRUD over the `items` table.
///
/// Dropping the layer without [`Inventory::close`] still ends every live
/// query; queued writes are then finished by the writer thread on its own.
pub struct Inventory {
    writer: Option<Writer>,
    writer_handle: WriterHandle,
    readers: ReaderPool,
    tracker: InvalidationTracker,
    point: PointQueryExecutor,
    adapters: Arc<ItemAdapters>,
}

impl Inventory {
    /// Open (creating if needed) the database under `config.data_dir`.
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let db_path = config.db_path();

        let tracker = InvalidationTracker::new();
        let writer = Writer::spawn(
            &db_path,
            tracker.clone(),
            config.write_channel_size,
            config.busy_timeout(),
        )?;
        let writer_handle = writer.handle();
        let readers = ReaderPool::new(&db_path, config.reader_pool_size, config.busy_timeout())?;

        tracing::info!(path = %db_path.display(), "Inventory opened");
        Ok(Self {
            writer: Some(writer),
            writer_handle,
            point: PointQueryExecutor::new(readers.clone()),
            readers,
            tracker,
            adapters: Arc::new(ItemAdapters::new()),
        })
    }

    /// Insert `item`. An id of `0` is auto-assigned; an id that already
    /// exists leaves the stored row untouched and affects zero rows.
    #[tracing::instrument(skip(self, item), fields(name = %item.name))]
    pub async fn insert(&self, item: &Item) -> Result<WriteOutcome> {
        item.validate()?;
        let item = item.clone();
        let adapters = Arc::clone(&self.adapters);
        self.writer_handle
            .run_in_transaction(move |scope| {
                let rows_affected = scope.execute(&adapters.insert.bind(&item))?;
                Ok(WriteOutcome {
                    rows_affected,
                    inserted_id: (rows_affected > 0).then(|| scope.last_insert_rowid()),
                })
            })
            .await
    }

    /// Overwrite the row with `item.id`. A missing id commits and affects
    /// zero rows.
    #[tracing::instrument(skip(self, item), fields(id = item.id))]
    pub async fn update(&self, item: &Item) -> Result<WriteOutcome> {
        item.validate()?;
        self.apply(item, |adapters| &adapters.update).await
    }

    /// Delete the row with `item.id`. A missing id affects zero rows.
    #[tracing::instrument(skip(self, item), fields(id = item.id))]
    pub async fn delete(&self, item: &Item) -> Result<WriteOutcome> {
        self.apply(item, |adapters| &adapters.delete).await
    }

    async fn apply(
        &self,
        item: &Item,
        adapter: fn(&ItemAdapters) -> &StatementAdapter<Item>,
    ) -> Result<WriteOutcome> {
        let item = item.clone();
        let adapters = Arc::clone(&self.adapters);
        self.writer_handle
            .run_in_transaction(move |scope| {
                let rows_affected = scope.execute(&adapter(&adapters).bind(&item))?;
                Ok(WriteOutcome {
                    rows_affected,
                    inserted_id: None,
                })
            })
            .await
    }

    /// Every item, ascending by name, re-emitted after each committed write.
    pub fn live_all(&self) -> Result<LiveQuery<Vec<Item>>> {
        self.live(|conn| Ok(queries::all_items(conn)?)).subscribe()
    }

    /// The item with `id`, or `None` while no such row exists.
    pub fn live_by_id(&self, id: i64) -> Result<LiveQuery<Option<Item>>> {
        self.live(move |conn| Ok(queries::item_by_id(conn, id)?)).subscribe()
    }

    fn live<T, F>(&self, read: F) -> LiveSource<T>
    where
        T: Send + 'static,
        F: Fn(&rusqlite::Connection) -> Result<T> + Send + Sync + 'static,
    {
        LiveSource::new(
            &[ITEMS_TABLE],
            self.readers.clone(),
            self.tracker.clone(),
            read,
        )
    }

    /// One-shot read of the item with `id`.
    pub async fn get_by_id(&self, id: i64, cancel: &CancellationToken) -> Result<Option<Item>> {
        self.point
            .execute(cancel, move |conn| Ok(queries::item_by_id(conn, id)?))
            .await
    }

    /// One-shot read of the first item (lowest id) whose name contains
    /// `name`, ignoring case.
    pub async fn get_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Item>> {
        let name = name.to_owned();
        self.point
            .execute(cancel, move |conn| Ok(queries::item_by_name(conn, &name)?))
            .await
    }

    /// Number of open live queries.
    pub fn active_subscriptions(&self) -> usize {
        self.tracker.subscriber_count()
    }

    /// Reader pool state, for checking that no connection is leaked.
    pub fn reader_state(&self) -> r2d2::State {
        self.readers.state()
    }

    /// Close the layer.
    ///
    /// Every live query stream ends, queued writes are drained, and the
    /// writer thread is joined.
    pub async fn close(mut self) -> Result<()> {
        let cancelled = self.tracker.close();
        tracing::info!(cancelled, "Closing inventory");

        self.writer_handle.shutdown().await?;
        if let Some(writer) = self.writer.take() {
            writer.join()?;
        }

        tracing::info!("Inventory closed");
        Ok(())
    }
}

impl Drop for Inventory {
    fn drop(&mut self) {
        let cancelled = self.tracker.close();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Inventory dropped with live queries open");
        }
    }
}

//! Inventory: a reactive SQLite data-access layer.
//!
//! Typed CRUD over a single `items` table, live queries that re-emit whenever
//! a committed write touches the tables they depend on, and cancellable
//! one-shot reads.
//!
//! # Architecture
//!
//! - **Single writer**: every mutation runs inside a transaction on one
//!   dedicated writer thread, so writers never interleave
//! - **Commit-then-notify**: the writer reports touched tables to the
//!   invalidation tracker only after a durable commit
//! - **Pooled readers**: live and point queries read through an r2d2 pool of
//!   read-only WAL connections
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy shared by every operation
//! - [`flow`]: Invalidation tracker and live query subscriptions
//! - [`model`]: The `Item` record and write outcomes
//! - [`observability`]: Tracing setup
//! - [`service`]: The `Inventory` layer exposed to application code
//! - [`storage`]: SQLite schema, statement adapters, writer and readers
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use inventory_db::{Config, Inventory, Item};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> inventory_db::Result<()> {
//! let inventory = Inventory::open(&Config::default())?;
//! let mut all = inventory.live_all()?;
//!
//! inventory.insert(&Item::new("Bolt", 0.5, 100)).await?;
//! while let Some(snapshot) = all.next().await {
//!     println!("{} item(s)", snapshot?.len());
//! }
//!
//! let bolt = inventory.get_by_name("bolt", &CancellationToken::new()).await?;
//! assert!(bolt.is_some());
//! inventory.close().await
//! # }
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::reader::ReaderPool is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod error;
pub mod flow;
pub mod model;
pub mod observability;
pub mod service;
pub mod storage;

pub use config::Config;
pub use error::{InventoryError, Result};
pub use flow::live::LiveQuery;
pub use model::{Item, OrderOutcome, OrderReceipt, WriteOutcome};
pub use service::Inventory;

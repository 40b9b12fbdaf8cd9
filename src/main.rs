//! inventory: command-line front end for the inventory data-access layer.
//!
//! # Usage
//!
//! ```bash
//! inventory --data-dir ./data add "Bolt" 0.5 100
//! inventory list
//! inventory find bolt
//! inventory watch          # prints every change until Ctrl+C
//! ```
//!
//! Environment variables can also be used:
//! - `INVENTORY_DATA_DIR`: Data directory for SQLite
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inventory_db::observability::tracing::init_tracing;
use inventory_db::{Config, Inventory};

/// Command-line interface for the inventory store.
#[derive(Parser)]
#[command(name = "inventory")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add an item
    Add {
        name: String,
        #[arg(allow_negative_numbers = true)]
        price: f64,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
        /// Explicit id (0 = auto-assign; an existing id is left untouched)
        #[arg(long, default_value_t = 0)]
        id: i64,
    },
    /// Replace every field of an existing item
    Update {
        id: i64,
        name: String,
        #[arg(allow_negative_numbers = true)]
        price: f64,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove an item by id
    Remove { id: i64 },
    /// Show one item by id
    Get { id: i64 },
    /// Find the first item whose name contains the text (case-insensitive)
    Find { name: String },
    /// List all items by name
    List,
    /// Order units of an item, decrementing its stock
    Order { id: i64, quantity: i64 },
    /// Print the item list (or one item) every time it changes
    Watch {
        /// Watch a single item instead of the whole list
        #[arg(long)]
        id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.config.log_level);

    let inventory = Inventory::open(&cli.config).with_context(|| {
        format!("failed to open inventory in {}", cli.config.data_dir.display())
    })?;

    let result = commands::run(&inventory, cli.command, cli.output).await;

    inventory
        .close()
        .await
        .context("failed to close inventory")?;
    result
}

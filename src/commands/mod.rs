//! Subcommand implementations.

mod items;
mod watch;

use anyhow::Result;
use inventory_db::Inventory;

use crate::{Commands, OutputFormat};

pub async fn run(inventory: &Inventory, command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Add {
            name,
            price,
            quantity,
            id,
        } => items::add(inventory, name, price, quantity, id, format).await,
        Commands::Update {
            id,
            name,
            price,
            quantity,
        } => items::update(inventory, id, name, price, quantity, format).await,
        Commands::Remove { id } => items::remove(inventory, id, format).await,
        Commands::Get { id } => items::get(inventory, id, format).await,
        Commands::Find { name } => items::find(inventory, &name, format).await,
        Commands::List => items::list(inventory, format).await,
        Commands::Order { id, quantity } => items::order(inventory, id, quantity, format).await,
        Commands::Watch { id } => watch::run(inventory, id, format).await,
    }
}

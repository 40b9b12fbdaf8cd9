//! One-shot item commands.

use anyhow::{Context, Result};
use futures::StreamExt;
use inventory_db::{Inventory, Item, OrderOutcome, WriteOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::OutputFormat;

#[derive(Serialize)]
struct ItemsOutput<'a> {
    items: &'a [Item],
    total: usize,
    stock_value: f64,
}

pub fn print_item_table(items: &[Item]) {
    println!("{:>6}  {:<30} {:>12} {:>10}", "ID", "NAME", "PRICE", "QUANTITY");
    println!("{}", "-".repeat(62));
    for item in items {
        println!(
            "{:>6}  {:<30} {:>12} {:>10}",
            item.id,
            item.name,
            item.formatted_price(),
            item.quantity
        );
    }
}

fn print_item(item: Option<&Item>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => match item {
            Some(item) => print_item_table(std::slice::from_ref(item)),
            None => println!("No item found."),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&item)?),
    }
    Ok(())
}

fn print_outcome(action: &str, outcome: &WriteOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => match (outcome.changed(), outcome.inserted_id) {
            (true, Some(id)) => println!("{action}: item {id}"),
            (true, None) => println!("{action}: {} row(s)", outcome.rows_affected),
            (false, _) => println!("Nothing {action}: no matching or new row."),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

pub async fn add(
    inventory: &Inventory,
    name: String,
    price: f64,
    quantity: i64,
    id: i64,
    format: OutputFormat,
) -> Result<()> {
    let item = Item::new(name, price, quantity).with_id(id);
    let outcome = inventory.insert(&item).await.context("insert failed")?;
    print_outcome("added", &outcome, format)
}

pub async fn update(
    inventory: &Inventory,
    id: i64,
    name: String,
    price: f64,
    quantity: i64,
    format: OutputFormat,
) -> Result<()> {
    let item = Item::new(name, price, quantity).with_id(id);
    let outcome = inventory.update(&item).await.context("update failed")?;
    print_outcome("updated", &outcome, format)
}

pub async fn remove(inventory: &Inventory, id: i64, format: OutputFormat) -> Result<()> {
    // Delete matches by id only.
    let item = Item::new("", 0.0, 0).with_id(id);
    let outcome = inventory.delete(&item).await.context("delete failed")?;
    print_outcome("removed", &outcome, format)
}

pub async fn get(inventory: &Inventory, id: i64, format: OutputFormat) -> Result<()> {
    let item = inventory.get_by_id(id, &CancellationToken::new()).await?;
    print_item(item.as_ref(), format)
}

pub async fn find(inventory: &Inventory, name: &str, format: OutputFormat) -> Result<()> {
    let item = inventory
        .get_by_name(name, &CancellationToken::new())
        .await?;
    print_item(item.as_ref(), format)
}

pub async fn list(inventory: &Inventory, format: OutputFormat) -> Result<()> {
    // The first emission of a live query is the current snapshot.
    let mut live = inventory.live_all()?;
    let items = live
        .next()
        .await
        .context("item list ended before the first snapshot")??;
    live.cancel();

    let output = ItemsOutput {
        items: &items,
        total: items.len(),
        stock_value: items.iter().map(Item::total_value).sum(),
    };

    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No items found.");
            } else {
                print_item_table(&items);
                println!();
                println!(
                    "Total: {} item(s), stock value ${:.2}",
                    output.total, output.stock_value
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

pub async fn order(
    inventory: &Inventory,
    id: i64,
    quantity: i64,
    format: OutputFormat,
) -> Result<()> {
    let outcome = inventory
        .place_order(id, quantity)
        .await
        .context("order failed")?;

    match format {
        OutputFormat::Text => match &outcome {
            OrderOutcome::Placed(receipt) => println!(
                "Ordered {} x {} for ${:.2}; {} left in stock.",
                receipt.quantity_ordered, receipt.item.name, receipt.total_cost, receipt.remaining
            ),
            OrderOutcome::InsufficientStock { available } => {
                println!("Not enough stock: {available} available.");
            }
            OrderOutcome::NotFound => println!("No item with id {id}."),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

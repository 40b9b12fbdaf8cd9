//! Watch command: print live query emissions until interrupted.

use anyhow::Result;
use futures::StreamExt;
use inventory_db::{Inventory, LiveQuery};
use serde::Serialize;

use super::items::print_item_table;
use crate::OutputFormat;

pub async fn run(inventory: &Inventory, id: Option<i64>, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Text {
        eprintln!("Watching for changes. Press Ctrl+C to stop...\n");
    }

    let received = match id {
        Some(id) => {
            let query = inventory.live_by_id(id)?;
            watch(query, format, |item| match item {
                Some(item) => print_item_table(std::slice::from_ref(item)),
                None => println!("Item {id} does not exist."),
            })
            .await?
        }
        None => {
            let query = inventory.live_all()?;
            watch(query, format, |items| {
                print_item_table(items);
                println!();
            })
            .await?
        }
    };

    if format == OutputFormat::Text {
        eprintln!("\nReceived {} update(s)", received);
    }
    Ok(())
}

async fn watch<T, F>(mut query: LiveQuery<T>, format: OutputFormat, print_text: F) -> Result<u64>
where
    T: Serialize + Send + 'static,
    F: Fn(&T),
{
    let mut received: u64 = 0;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            next = query.next() => match next {
                Some(Ok(value)) => {
                    received += 1;
                    match format {
                        OutputFormat::Text => print_text(&value),
                        OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    if format == OutputFormat::Text {
                        eprintln!("Stream ended");
                    }
                    break;
                }
            },
        }
    }

    query.cancel();
    Ok(received)
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("Received SIGINT (Ctrl+C), stopping watch"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, stopping watch"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("Received Ctrl+C, stopping watch");
    }
}


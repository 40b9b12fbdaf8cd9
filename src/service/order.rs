//! Order placement: check stock and decrement it in one transaction.

use std::sync::Arc;

use super::Inventory;
use crate::error::{InventoryError, Result};
use crate::model::{OrderOutcome, OrderReceipt};
use crate::storage::queries;

impl Inventory {
    /// Take `quantity` units of item `id` out of stock.
    ///
    /// The stock check and the decrement share one transaction, so two
    /// concurrent orders can never both consume the last units. Orders that
    /// cannot be filled leave the table untouched and wake no live query.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvariantViolation`] if `quantity` is not positive.
    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, id: i64, quantity: i64) -> Result<OrderOutcome> {
        if quantity <= 0 {
            return Err(InventoryError::InvariantViolation(format!(
                "order quantity must be positive, got {quantity}"
            )));
        }

        let adapters = Arc::clone(&self.adapters);
        let outcome = self
            .writer_handle
            .run_in_transaction(move |scope| {
                let Some(item) = queries::item_by_id(scope.connection(), id)? else {
                    return Ok(OrderOutcome::NotFound);
                };
                if item.quantity < quantity {
                    return Ok(OrderOutcome::InsufficientStock {
                        available: item.quantity,
                    });
                }

                let mut updated = item.clone();
                updated.quantity -= quantity;
                scope.execute(&adapters.update.bind(&updated))?;

                Ok(OrderOutcome::Placed(OrderReceipt {
                    total_cost: item.price * quantity as f64,
                    remaining: updated.quantity,
                    quantity_ordered: quantity,
                    item,
                }))
            })
            .await?;

        match &outcome {
            OrderOutcome::Placed(receipt) => {
                tracing::debug!(remaining = receipt.remaining, "Order placed");
            }
            OrderOutcome::InsufficientStock { available } => {
                tracing::debug!(available, "Order rejected: insufficient stock");
            }
            OrderOutcome::NotFound => tracing::debug!("Order rejected: unknown item"),
        }
        Ok(outcome)
    }
}

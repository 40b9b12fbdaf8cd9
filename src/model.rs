//! Record types persisted and returned by the inventory layer.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// One row of the `items` table.
///
/// An `id` of `0` asks the store to assign one on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

impl Item {
    /// Create an item whose id will be assigned on insert.
    pub fn new(name: impl Into<String>, price: f64, quantity: i64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            price,
            quantity,
        }
    }

    /// Same item, with an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Reject values the store must never see.
    ///
    /// Price must be finite and non-negative, quantity non-negative.
    pub fn validate(&self) -> Result<()> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(InventoryError::InvariantViolation(format!(
                "price must be a non-negative number, got {}",
                self.price
            )));
        }
        if self.quantity < 0 {
            return Err(InventoryError::InvariantViolation(format!(
                "quantity must be non-negative, got {}",
                self.quantity
            )));
        }
        if self.id < 0 {
            return Err(InventoryError::InvariantViolation(format!(
                "id must be zero (auto-assign) or positive, got {}",
                self.id
            )));
        }
        Ok(())
    }

    /// Value of the stock on hand.
    pub fn total_value(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// Price rendered with two decimals, e.g. `$4.50`.
    pub fn formatted_price(&self) -> String {
        format!("${:.2}", self.price)
    }

    /// Map a row selected as `id, name, price, quantity`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            price: row.get("price")?,
            quantity: row.get("quantity")?,
        })
    }
}

/// Result of a committed mutation.
///
/// Zero rows affected is a successful outcome: an ignored insert conflict,
/// or an update/delete whose id matched nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub rows_affected: usize,
    /// Row id assigned by an insert that wrote a row.
    pub inserted_id: Option<i64>,
}

impl WriteOutcome {
    pub fn changed(&self) -> bool {
        self.rows_affected > 0
    }
}

/// Summary of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderReceipt {
    /// The item as it was before the order was taken.
    pub item: Item,
    pub quantity_ordered: i64,
    pub total_cost: f64,
    pub remaining: i64,
}

/// What happened when an order was placed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    Placed(OrderReceipt),
    InsufficientStock { available: i64 },
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_requests_auto_id() {
        let item = Item::new("Bolt", 0.5, 100);
        assert_eq!(item.id, 0);
        assert_eq!(item.with_id(7).id, 7);
    }

    #[test]
    fn test_validate_rejects_negative_values() {
        assert!(Item::new("Bolt", 0.5, 100).validate().is_ok());
        assert!(Item::new("Free sample", 0.0, 0).validate().is_ok());

        let negative_price = Item::new("Bolt", -1.0, 1).validate();
        assert!(matches!(
            negative_price,
            Err(InventoryError::InvariantViolation(_))
        ));

        let negative_quantity = Item::new("Bolt", 1.0, -1).validate();
        assert!(matches!(
            negative_quantity,
            Err(InventoryError::InvariantViolation(_))
        ));

        let nan_price = Item::new("Bolt", f64::NAN, 1).validate();
        assert!(nan_price.is_err());
    }

    #[test]
    fn test_total_value_and_price_formatting() {
        let item = Item::new("Anvil", 20.0, 3);
        assert!((item.total_value() - 60.0).abs() < f64::EPSILON);
        assert_eq!(Item::new("Bolt", 4.5, 1).formatted_price(), "$4.50");
    }

    #[test]
    fn test_order_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(OrderOutcome::InsufficientStock { available: 2 }).unwrap();
        assert_eq!(json["status"], "insufficient_stock");
        assert_eq!(json["available"], 2);
    }
}

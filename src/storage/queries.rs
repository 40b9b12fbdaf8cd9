//! Read queries over the `items` table.
//!
//! Each function takes a plain `&Connection`, so the same query runs on a
//! pooled reader or inside a writer transaction.

use rusqlite::{Connection, OptionalExtension};

use crate::model::Item;

const SELECT_ALL: &str = "SELECT id, name, price, quantity FROM items ORDER BY name ASC";
const SELECT_BY_ID: &str = "SELECT id, name, price, quantity FROM items WHERE id = ?1";
const SELECT_BY_NAME: &str = r#"SELECT id, name, price, quantity FROM items
WHERE LOWER(name) LIKE LOWER(?1) ESCAPE '\'
ORDER BY id ASC
LIMIT 1"#;

/// All items, ascending by name.
pub fn all_items(conn: &Connection) -> rusqlite::Result<Vec<Item>> {
    let mut stmt = conn.prepare_cached(SELECT_ALL)?;
    let rows = stmt
        .query_map([], Item::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn item_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Item>> {
    let mut stmt = conn.prepare_cached(SELECT_BY_ID)?;
    stmt.query_row([id], Item::from_row).optional()
}

/// First item (lowest id) whose name contains `name`, ignoring case.
///
/// `%` and `_` in `name` match literally. Blank input matches nothing.
pub fn item_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Item>> {
    if name.trim().is_empty() {
        return Ok(None);
    }
    let pattern = format!("%{}%", escape_like(name));
    let mut stmt = conn.prepare_cached(SELECT_BY_NAME)?;
    stmt.query_row([pattern], Item::from_row).optional()
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

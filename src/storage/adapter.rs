//! Statement adapters: bind a record onto an INSERT, UPDATE or DELETE.
//!
//! Each record type declares its field-to-column mapping once, as a static
//! [`Column`] table. [`StatementAdapter`] derives the SQL text from that table
//! at construction and binds values through [`bind_columns`], so no per-type
//! binding code is written by hand.
//!
//! Conflict policies:
//! - insert: `OR IGNORE`, a key of `0` is bound as NULL so SQLite assigns one
//! - update: `OR ABORT`, matched by key; no match affects zero rows
//! - delete: matched by key only

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::fmt;
use std::marker::PhantomData;

use crate::model::Item;
use crate::storage::schema::ITEMS_TABLE;

/// One field-to-column mapping entry.
pub struct Column<E> {
    pub name: &'static str,
    pub value: fn(&E) -> Value,
}

impl<E> Clone for Column<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Column<E> {}

impl<E> fmt::Debug for Column<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column").field("name", &self.name).finish()
    }
}

/// A record type persisted in one table.
pub trait Entity: Sized + 'static {
    const TABLE: &'static str;

    /// Identity column, used as the match key for update and delete.
    fn key() -> &'static Column<Self>;

    /// Every persisted column in bind order, key included.
    fn columns() -> &'static [Column<Self>];
}

/// Read every mapped field of `entity` in column order.
pub fn bind_columns<E>(entity: &E, columns: &[Column<E>]) -> Vec<Value> {
    columns.iter().map(|column| (column.value)(entity)).collect()
}

/// Mutation kind handled by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// A statement ready to execute: SQL, its parameters and the table it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement<'a> {
    pub sql: &'a str,
    pub table: &'static str,
    pub params: Vec<Value>,
}

impl BoundStatement<'_> {
    /// Execute through the connection's statement cache, returning rows affected.
    pub fn execute(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(self.sql)?;
        stmt.execute(params_from_iter(self.params.iter()))
    }
}

/// Stateless builder of bound statements for one mutation kind of `E`.
pub struct StatementAdapter<E> {
    kind: MutationKind,
    sql: String,
    _entity: PhantomData<fn(&E)>,
}

impl<E: Entity> StatementAdapter<E> {
    pub fn new(kind: MutationKind) -> Self {
        let sql = match kind {
            MutationKind::Insert => insert_sql::<E>(),
            MutationKind::Update => update_sql::<E>(),
            MutationKind::Delete => format!(
                "DELETE FROM {} WHERE {} = ?1",
                E::TABLE,
                E::key().name
            ),
        };
        Self {
            kind,
            sql,
            _entity: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind `entity` onto this adapter's statement.
    pub fn bind(&self, entity: &E) -> BoundStatement<'_> {
        let key = (E::key().value)(entity);
        let params = match self.kind {
            MutationKind::Insert => bind_columns(entity, E::columns()),
            MutationKind::Update => {
                let mut params = bind_columns(entity, E::columns());
                params.push(key);
                params
            }
            MutationKind::Delete => vec![key],
        };
        BoundStatement {
            sql: &self.sql,
            table: E::TABLE,
            params,
        }
    }
}

impl<E> fmt::Debug for StatementAdapter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementAdapter")
            .field("kind", &self.kind)
            .field("sql", &self.sql)
            .finish()
    }
}

fn insert_sql<E: Entity>() -> String {
    let columns = E::columns();
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if c.name == E::key().name {
                format!("nullif(?{}, 0)", i + 1)
            } else {
                format!("?{}", i + 1)
            }
        })
        .collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        E::TABLE,
        names.join(", "),
        placeholders.join(", ")
    )
}

fn update_sql<E: Entity>() -> String {
    let columns = E::columns();
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
        .collect();
    format!(
        "UPDATE OR ABORT {} SET {} WHERE {} = ?{}",
        E::TABLE,
        assignments.join(", "),
        E::key().name,
        columns.len() + 1
    )
}

// Item mapping

const ITEM_ID: Column<Item> = Column {
    name: "id",
    value: |item: &Item| Value::Integer(item.id),
};

static ITEM_COLUMNS: [Column<Item>; 4] = [
    ITEM_ID,
    Column {
        name: "name",
        value: |item: &Item| Value::Text(item.name.clone()),
    },
    Column {
        name: "price",
        value: |item: &Item| Value::Real(item.price),
    },
    Column {
        name: "quantity",
        value: |item: &Item| Value::Integer(item.quantity),
    },
];

static ITEM_KEY: Column<Item> = ITEM_ID;

impl Entity for Item {
    const TABLE: &'static str = ITEMS_TABLE;

    fn key() -> &'static Column<Self> {
        &ITEM_KEY
    }

    fn columns() -> &'static [Column<Self>] {
        &ITEM_COLUMNS
    }
}

/// The three adapters for [`Item`], built once per layer.
#[derive(Debug)]
pub struct ItemAdapters {
    pub insert: StatementAdapter<Item>,
    pub update: StatementAdapter<Item>,
    pub delete: StatementAdapter<Item>,
}

impl ItemAdapters {
    pub fn new() -> Self {
        Self {
            insert: StatementAdapter::new(MutationKind::Insert),
            update: StatementAdapter::new(MutationKind::Update),
            delete: StatementAdapter::new(MutationKind::Delete),
        }
    }
}

impl Default for ItemAdapters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::initialize_schema;

    fn bolt() -> Item {
        Item::new("Bolt", 0.5, 100)
    }

    #[test]
    fn test_generated_sql() {
        let adapters = ItemAdapters::new();
        assert_eq!(
            adapters.insert.sql(),
            "INSERT OR IGNORE INTO items (id, name, price, quantity) VALUES (nullif(?1, 0), ?2, ?3, ?4)"
        );
        assert_eq!(
            adapters.update.sql(),
            "UPDATE OR ABORT items SET id = ?1, name = ?2, price = ?3, quantity = ?4 WHERE id = ?5"
        );
        assert_eq!(adapters.delete.sql(), "DELETE FROM items WHERE id = ?1");
    }

    #[test]
    fn test_bind_parameter_layout() {
        let adapters = ItemAdapters::new();
        let item = bolt().with_id(3);

        let insert = adapters.insert.bind(&item);
        assert_eq!(insert.table, "items");
        assert_eq!(
            insert.params,
            vec![
                Value::Integer(3),
                Value::Text("Bolt".into()),
                Value::Real(0.5),
                Value::Integer(100),
            ]
        );

        let update = adapters.update.bind(&item);
        assert_eq!(update.params.len(), 5);
        assert_eq!(update.params[4], Value::Integer(3));

        let delete = adapters.delete.bind(&item);
        assert_eq!(delete.params, vec![Value::Integer(3)]);
    }

    #[test]
    fn test_insert_ignores_conflicting_id() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let adapters = ItemAdapters::new();

        let first = adapters.insert.bind(&bolt().with_id(1));
        assert_eq!(first.execute(&conn).unwrap(), 1);

        let clash = Item::new("Nut", 0.1, 5).with_id(1);
        let second = adapters.insert.bind(&clash);
        assert_eq!(second.execute(&conn).unwrap(), 0);

        let name: String = conn
            .query_row("SELECT name FROM items WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Bolt");
    }

    #[test]
    fn test_zero_id_is_auto_assigned() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let adapters = ItemAdapters::new();

        adapters.insert.bind(&bolt()).execute(&conn).unwrap();
        adapters.insert.bind(&bolt()).execute(&conn).unwrap();

        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM items ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_update_and_delete_missing_id_affect_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let adapters = ItemAdapters::new();
        let ghost = bolt().with_id(42);

        assert_eq!(adapters.update.bind(&ghost).execute(&conn).unwrap(), 0);
        assert_eq!(adapters.delete.bind(&ghost).execute(&conn).unwrap(), 0);
    }
}

//! SQLite storage layer.
//!
//! Provides:
//! - Schema initialization and connection pragmas
//! - Statement adapters binding records onto INSERT/UPDATE/DELETE
//! - Dedicated writer thread running each unit of work in a transaction
//! - Read connection pool, read queries and cancellable point reads

pub mod adapter;
pub mod point;
pub mod queries;
pub mod reader;
pub mod schema;
pub mod writer;

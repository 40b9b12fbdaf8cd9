//! Change propagation from committed writes to live queries.
//!
//! Provides:
//! - Invalidation tracker mapping tables to dependent subscriptions
//! - Live query streams re-run on invalidation

pub mod invalidation;
pub mod live;

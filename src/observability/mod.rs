//! Observability infrastructure.
//!
//! Provides structured tracing via `tracing-subscriber`.

pub mod tracing;

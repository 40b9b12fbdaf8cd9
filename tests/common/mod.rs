//! Test utilities shared by the integration tests.
//!
//! Provides:
//! - A temporary data directory with a matching `Config`
//! - Bounded waits on live query streams

#![allow(dead_code)]

use futures::StreamExt;
use inventory_db::{Config, Inventory, LiveQuery, Result};
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        inventory_db::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = Config::for_data_dir(temp_dir.path());
        Self { temp_dir, config }
    }

    /// Open an inventory on the fixture's directory.
    pub fn open(&self) -> Inventory {
        Inventory::open(&self.config).expect("failed to open inventory")
    }

    /// Get the data directory as a string.
    pub fn data_dir_str(&self) -> &str {
        self.temp_dir.path().to_str().expect("invalid path")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Next emission of `query`, failing the test if none arrives within [`WAIT`].
pub async fn next_emission<T: Send + 'static>(query: &mut LiveQuery<T>) -> Option<Result<T>> {
    tokio::time::timeout(WAIT, query.next())
        .await
        .expect("live query did not emit in time")
}

/// Read emissions until one satisfies `done`, returning it.
///
/// Intermediate emissions may be skipped when wake-ups coalesce, so tests
/// that care about the final state wait for it rather than counting.
pub async fn emission_matching<T, F>(query: &mut LiveQuery<T>, mut done: F) -> T
where
    T: Send + 'static,
    F: FnMut(&T) -> bool,
{
    loop {
        let value = next_emission(query)
            .await
            .expect("live query ended")
            .expect("live query failed");
        if done(&value) {
            return value;
        }
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture
            .config
            .db_path()
            .to_str()
            .unwrap()
            .contains(fixture.data_dir_str()));
    }
}

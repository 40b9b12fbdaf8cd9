//! Configuration parsing for the inventory layer.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the SQLite database inside the data directory.
pub const DATABASE_FILE: &str = "inventory.db";

/// Storage and logging settings for an [`Inventory`](crate::Inventory).
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Data directory for the SQLite database
    #[arg(short, long, env = "INVENTORY_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Size of the read-only connection pool
    #[arg(
        long,
        env = "INVENTORY_READER_POOL_SIZE",
        default_value_t = 4,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub reader_pool_size: u32,

    /// Size of the write channel (backpressure control)
    #[arg(long, env = "INVENTORY_WRITE_CHANNEL_SIZE", default_value_t = 256)]
    pub write_channel_size: usize,

    /// How long a connection waits on a locked database before failing
    #[arg(long, env = "INVENTORY_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
}

impl Config {
    /// Configuration rooted at `data_dir` with small pools, for tests and tools.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_level: "debug".into(),
            reader_pool_size: 2,
            write_channel_size: 16,
            ..Self::default()
        }
    }

    /// Path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            reader_pool_size: 4,
            write_channel_size: 256,
            busy_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reader_pool_size, 4);
        assert_eq!(config.db_path(), PathBuf::from("./data/inventory.db"));
    }

    #[test]
    fn test_for_data_dir_keeps_busy_timeout() {
        let config = Config::for_data_dir("/tmp/inv");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/inv/inventory.db"));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_reader_pool_size_must_be_positive() {
        assert!(TestCli::try_parse_from(["inventory", "--reader-pool-size", "0"]).is_err());

        let cli = TestCli::try_parse_from(["inventory", "--reader-pool-size", "2"]).unwrap();
        assert_eq!(cli.config.reader_pool_size, 2);
    }
}

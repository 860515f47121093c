use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for a WAL-backed ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    /// Journal appends after which the compactor rewrites the WAL.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    /// Queue depth in front of the WAL writer task.
    pub wal_channel_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            wal_channel_capacity: 4096,
        }
    }
}

impl LedgerConfig {
    pub const WAL_FILE: &'static str = "ledger.wal";

    /// Read `DAYBOOK_*` environment variables; unset or unparseable ones keep
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("DAYBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: lookup("DAYBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("DAYBOOK_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            wal_channel_capacity: lookup("DAYBOOK_WAL_CHANNEL_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.wal_channel_capacity),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(Self::WAL_FILE)
    }
}

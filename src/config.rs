//! Configuration for seencache
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default number of entries a slot holds before rotation
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Default number of slots in a group's ring
pub const DEFAULT_NUM_SLOTS: usize = 3;

/// Registry-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all groups
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {group}/
    ///           ├── map_0.bin ... map_{n-1}.bin
    ///           └── txn.log
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Group Defaults
    // -------------------------------------------------------------------------
    /// Slot policy applied to groups created without explicit options
    pub group: GroupOptions,

    // -------------------------------------------------------------------------
    // Flush Scheduling
    // -------------------------------------------------------------------------
    /// How often the host scheduler invokes the periodic flush
    pub flush_interval: Duration,

    /// Minimum time since a group's last sync before a tick flushes it
    pub group_sync_interval: Duration,

    /// Number of ticks over which every group is visited at least once
    pub flush_spread_ticks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./seencache_data"),
            group: GroupOptions::default(),
            flush_interval: Duration::from_secs(10),
            group_sync_interval: Duration::from_secs(60),
            flush_spread_ticks: 60,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the cache cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.flush_spread_ticks == 0 {
            return Err(CacheError::Config(
                "flush_spread_ticks must be at least 1".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(CacheError::Config(
                "flush_interval must be non-zero".to_string(),
            ));
        }
        self.group.validate()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all groups)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the default per-slot entry limit
    pub fn max_entries(mut self, count: usize) -> Self {
        self.config.group.max_entries = count;
        self
    }

    /// Set the default number of slots per group
    pub fn num_slots(mut self, count: usize) -> Self {
        self.config.group.num_slots = count;
        self
    }

    /// Set the default slot age limit
    pub fn max_age(mut self, age: Duration) -> Self {
        self.config.group.max_age = Some(age);
        self
    }

    /// Set the periodic flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the minimum time between syncs of one group
    pub fn group_sync_interval(mut self, interval: Duration) -> Self {
        self.config.group_sync_interval = interval;
        self
    }

    /// Set how many ticks it takes to visit every group
    pub fn flush_spread_ticks(mut self, ticks: usize) -> Self {
        self.config.flush_spread_ticks = ticks;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Per-group rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    /// Entries the active slot may hold before rotating
    pub max_entries: usize,

    /// Number of slots in the ring (at least 2)
    pub num_slots: usize,

    /// Age after which the active slot rotates (`None` disables it)
    pub max_age: Option<Duration>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            num_slots: DEFAULT_NUM_SLOTS,
            max_age: None,
        }
    }
}

impl GroupOptions {
    pub fn new(max_entries: usize, num_slots: usize) -> Self {
        Self {
            max_entries,
            num_slots,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    pub fn validate(&self) -> Result<()> {
        // Rotation recycles the next slot; with one slot that is the
        // slot just written
        if self.num_slots < 2 {
            return Err(CacheError::Config(
                "num_slots must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

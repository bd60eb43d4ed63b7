//! Registry Module
//!
//! Process-wide map from group name to group, plus the periodic flush
//! entry point invoked by the host scheduler.
//!
//! The registry only holds `Weak` handles: it never keeps a group alive.
//! Dead handles are pruned when a flush tick or a lookup runs into them.
//!
//! Each name also owns a directory lease. A live group holds it until its
//! final sync on drop has finished, and reopening the name waits for it,
//! so two groups never work on one directory at the same time.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{as_millis, Clock, SystemClock, Timestamp};
use crate::config::{Config, GroupOptions};
use crate::error::{CacheError, Result};
use crate::group::{Group, SharedGroup};

/// Registry of named groups
///
/// ## Concurrency:
/// - `inner`: a `Mutex` distinct from every group lock. It is never held
///   while a group lock is taken; opens, flushes and `last_sync` reads
///   happen after it is released.
/// - `opening`: serializes group opens so one name is opened at most once.
pub struct Registry {
    /// `None` if the base directory could not be created
    base_dir: Option<PathBuf>,

    defaults: GroupOptions,

    group_sync_interval: Duration,

    flush_spread_ticks: usize,

    clock: Arc<dyn Clock>,

    inner: Mutex<RegistryInner>,

    opening: Mutex<()>,
}

#[derive(Default)]
struct RegistryInner {
    groups: BTreeMap<String, GroupHandle>,

    /// Last group visited by a flush tick; the next tick resumes after it
    cursor: Option<String>,
}

struct GroupHandle {
    group: Weak<Group>,

    /// Locked for as long as a group for this name exists
    lease: Arc<Mutex<()>>,
}

impl GroupHandle {
    fn vacant() -> Self {
        Self {
            group: Weak::new(),
            lease: Arc::new(Mutex::new(())),
        }
    }

    fn upgrade(&self) -> Option<SharedGroup> {
        self.group.upgrade()
    }

    /// No group is alive or still syncing on drop
    fn is_released(&self) -> bool {
        self.group.strong_count() == 0 && !self.lease.is_locked()
    }
}

impl Registry {
    /// Create a registry rooted at `config.data_dir` on the wall clock
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry rooted at `config.data_dir`
    ///
    /// A base directory that cannot be created does not fail here; every
    /// later `get_or_create` fails instead.
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let base_dir = match fs::create_dir_all(&config.data_dir) {
            Ok(()) => Some(config.data_dir.clone()),
            Err(e) => {
                warn!(path = %config.data_dir.display(), error = %e, "cannot create cache base directory");
                None
            }
        };

        Self {
            base_dir,
            defaults: config.group,
            group_sync_interval: config.group_sync_interval,
            flush_spread_ticks: config.flush_spread_ticks.max(1),
            clock,
            inner: Mutex::new(RegistryInner::default()),
            opening: Mutex::new(()),
        }
    }

    // =========================================================================
    // Group Lookup
    // =========================================================================

    /// Return the live group `name`, opening it if needed
    ///
    /// `max_entries` and `num_slots` only apply when the group is created;
    /// an existing group is returned as is.
    pub fn get_or_create(&self, name: &str, max_entries: usize, num_slots: usize) -> Result<SharedGroup> {
        let options = GroupOptions {
            max_entries,
            num_slots,
            ..self.defaults
        };
        self.get_or_create_with(name, options)
    }

    /// Like [`Registry::get_or_create`] with the registry's default policy
    pub fn get_or_create_default(&self, name: &str) -> Result<SharedGroup> {
        self.get_or_create_with(name, self.defaults)
    }

    /// Like [`Registry::get_or_create`] with an explicit policy
    ///
    /// If the previous group of this name is still running its final sync,
    /// this waits for it to finish before reopening the directory.
    pub fn get_or_create_with(&self, name: &str, options: GroupOptions) -> Result<SharedGroup> {
        let base_dir = self.base_dir.as_deref().ok_or_else(|| {
            CacheError::BaseDirUnavailable("registry base directory was not created".to_string())
        })?;

        if let Some(group) = self.get(name) {
            return Ok(group);
        }

        let _opening = self.opening.lock();

        let lease = {
            let mut inner = self.inner.lock();
            let handle = inner
                .groups
                .entry(name.to_string())
                .or_insert_with(GroupHandle::vacant);
            if let Some(group) = handle.upgrade() {
                return Ok(group);
            }
            Arc::clone(&handle.lease)
        };

        let guard = lease.lock_arc();
        let mut group = match Group::open_with_clock(name, base_dir, options, Arc::clone(&self.clock)) {
            Ok(group) => group,
            Err(e) => {
                drop(guard);
                let mut inner = self.inner.lock();
                if inner.groups.get(name).is_some_and(GroupHandle::is_released) {
                    inner.groups.remove(name);
                }
                return Err(e);
            }
        };
        group.hold_lease(guard);
        let group = Arc::new(group);

        self.inner.lock().groups.insert(
            name.to_string(),
            GroupHandle {
                group: Arc::downgrade(&group),
                lease,
            },
        );
        debug!(group = name, "group registered");

        Ok(group)
    }

    /// The live group `name`, if any
    pub fn get(&self, name: &str) -> Option<SharedGroup> {
        let mut inner = self.inner.lock();
        let handle = inner.groups.get(name)?;
        let group = handle.upgrade();
        if group.is_none() && handle.is_released() {
            inner.groups.remove(name);
        }
        group
    }

    // =========================================================================
    // Periodic Flush
    // =========================================================================

    /// Pick the groups one flush tick should sync at `now`
    ///
    /// Visits `ceil(registered / flush_spread_ticks)` groups, resuming after
    /// the last group visited, so every group is seen within
    /// `flush_spread_ticks` ticks. Dead handles are pruned as they are
    /// visited. Of the live ones, only those whose last sync is older than
    /// the group sync interval are returned.
    pub fn due_for_flush(&self, now: Timestamp) -> Vec<SharedGroup> {
        let visited = self.visit_quota();

        // Group locks are only taken once the registry mutex is released
        let interval = as_millis(self.group_sync_interval);
        visited
            .into_iter()
            .filter(|group| now.saturating_sub(group.last_sync()) > interval)
            .collect()
    }

    /// One host-scheduler tick: sync every group that is due
    ///
    /// Returns the number of groups synced.
    pub fn periodic_flush(&self) -> usize {
        let due = self.due_for_flush(self.clock.now());
        for group in &due {
            group.write_to_disk();
        }
        if !due.is_empty() {
            debug!(groups = due.len(), "periodic flush");
        }
        due.len()
    }

    /// Sync every live group regardless of quota or interval
    pub fn flush_all(&self) -> usize {
        let groups: Vec<SharedGroup> = {
            let inner = self.inner.lock();
            inner.groups.values().filter_map(GroupHandle::upgrade).collect()
        };
        for group in &groups {
            group.write_to_disk();
        }
        groups.len()
    }

    fn visit_quota(&self) -> Vec<SharedGroup> {
        let mut inner = self.inner.lock();

        let registered = inner.groups.len();
        if registered == 0 {
            inner.cursor = None;
            return Vec::new();
        }
        let quota = registered.div_ceil(self.flush_spread_ticks);

        // Names after the cursor, then wrap around to the start
        let names: Vec<String> = {
            let start = match inner.cursor.as_deref() {
                Some(cursor) => Bound::Excluded(cursor),
                None => Bound::Unbounded,
            };
            inner
                .groups
                .range::<str, _>((start, Bound::Unbounded))
                .chain(inner.groups.iter())
                .take(quota.min(registered))
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut live = Vec::with_capacity(names.len());
        for name in &names {
            let Some(handle) = inner.groups.get(name) else {
                continue;
            };
            if let Some(group) = handle.upgrade() {
                live.push(group);
            } else if handle.is_released() {
                inner.groups.remove(name);
                debug!(group = %name, "pruned dropped group");
            }
        }
        inner.cursor = names.last().cloned();

        live
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Registered names, live or not yet pruned
    pub fn len(&self) -> usize {
        self.inner.lock().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of groups that are still alive
    pub fn live_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .groups
            .iter()
            .filter(|(_, handle)| handle.group.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

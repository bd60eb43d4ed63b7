//! Group Module
//!
//! One named instance of the rotating cache: a ring of slots plus a WAL.
//!
//! ## Responsibilities
//! - Insert / refresh keys in the active slot and log them to the WAL
//! - Answer "seen at or after `age`?" newest slot first
//! - Rotate the active slot on capacity or age limits
//! - Sync dirty slots to disk and recover them on open
//!
//! No operation here returns an error once the group is open. Disk
//! failures are logged and only cost durability.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ArcMutexGuard, RawMutex, RwLock};
use tracing::{debug, warn};

use crate::clock::{as_millis, Clock, SystemClock, Timestamp};
use crate::config::GroupOptions;
use crate::entry::KeyFingerprint;
use crate::error::{CacheError, Result};
use crate::slot::Slot;
use crate::wal::{WriteAheadLog, WAL_FILENAME};

/// Owning handle to a group, as handed out by the registry
pub type SharedGroup = Arc<Group>;

/// Exclusive claim on a group directory, released once the group's final
/// sync has finished
pub(crate) type DirLease = ArcMutexGuard<RawMutex, ()>;

/// A named, rotating, disk-backed existence cache
///
/// ## Concurrency Model
///
/// A single `RwLock` covers every slot, the WAL, the policy and the
/// timestamps. Lookups take it shared; insert, rotation, sync and load
/// take it exclusively. Disk I/O during sync and load happens with the
/// exclusive lock held.
///
/// `active_index` is only written under the exclusive lock.
pub struct Group {
    name: String,

    /// `{base_dir}/{name}`
    dir: PathBuf,

    clock: Arc<dyn Clock>,

    active_index: AtomicUsize,

    state: RwLock<GroupState>,

    /// Dropped after `Drop::drop` has synced
    lease: Option<DirLease>,
}

struct GroupState {
    slots: Vec<Slot>,
    wal: WriteAheadLog,
    max_entries: usize,
    max_age: Option<Duration>,
    last_sync: Timestamp,
}

/// Outcome of [`Group::write_to_disk`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub slots_persisted: usize,
    pub slots_failed: usize,
    pub wal_cleared: bool,
}

/// Point-in-time view of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub active_index: usize,
    /// Entry count per slot, in ring order
    pub slot_entries: Vec<usize>,
    pub total_entries: usize,
    pub last_sync: Timestamp,
}

impl Group {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Open (or create) the group `name` under `base_dir` on the wall clock
    pub fn open(name: &str, base_dir: &Path, options: GroupOptions) -> Result<Self> {
        Self::open_with_clock(name, base_dir, options, Arc::new(SystemClock))
    }

    /// Open (or create) the group `name` under `base_dir`
    ///
    /// On open:
    /// 1. Create `{base_dir}/{name}` if absent
    /// 2. Build `num_slots` slots backed by `map_<i>.bin`
    /// 3. Load slot files and replay the WAL
    pub fn open_with_clock(
        name: &str,
        base_dir: &Path,
        options: GroupOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_name(name)?;
        options.validate()?;

        let dir = base_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| {
            CacheError::BaseDirUnavailable(format!("{}: {}", dir.display(), e))
        })?;

        let now = clock.now();
        let slots = (0..options.num_slots)
            .map(|i| Slot::new(dir.join(slot_filename(i)), now))
            .collect();

        let group = Self {
            name: name.to_string(),
            dir: dir.clone(),
            clock,
            active_index: AtomicUsize::new(0),
            state: RwLock::new(GroupState {
                slots,
                wal: WriteAheadLog::new(dir.join(WAL_FILENAME)),
                max_entries: options.max_entries,
                max_age: options.max_age,
                last_sync: now,
            }),
            lease: None,
        };

        group.load_from_disk();
        group.state.write().last_sync = group.clock.now();

        Ok(group)
    }

    pub(crate) fn hold_lease(&mut self, lease: DirLease) {
        self.lease = Some(lease);
    }

    // =========================================================================
    // Policy
    // =========================================================================

    /// Change the per-slot entry limit; applies at the next rotation check
    pub fn set_max_entries(&self, max_entries: usize) {
        self.state.write().max_entries = max_entries;
    }

    /// Change the slot age limit; applies at the next rotation check
    pub fn set_max_age(&self, max_age: Duration) {
        self.state.write().max_age = Some(max_age);
    }

    pub fn max_entries(&self) -> usize {
        self.state.read().max_entries
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.state.read().max_age
    }

    // =========================================================================
    // Insert / Lookup
    // =========================================================================

    /// Record `key` as seen now
    pub fn insert(&self, key: impl AsRef<[u8]>) {
        let fingerprint = KeyFingerprint::of(key);
        let mut state = self.state.write();
        self.insert_locked(&mut state, fingerprint);
    }

    /// Record every key in `keys` as seen now
    pub fn insert_many<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut state = self.state.write();
        for key in keys {
            self.insert_locked(&mut state, KeyFingerprint::of(key));
        }
    }

    /// True if `key` was inserted at or after `age`
    pub fn lookup(&self, key: impl AsRef<[u8]>, age: Timestamp) -> bool {
        let fingerprint = KeyFingerprint::of(key);
        let state = self.state.read();
        self.lookup_locked(&state, &fingerprint, age)
    }

    /// True if any key in `keys` was inserted at or after `age`
    pub fn lookup_any<I>(&self, keys: I, age: Timestamp) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let state = self.state.read();
        keys.into_iter()
            .any(|key| self.lookup_locked(&state, &KeyFingerprint::of(key), age))
    }

    /// True if `key` was inserted within the last `window`
    pub fn lookup_within(&self, key: impl AsRef<[u8]>, window: Duration) -> bool {
        let age = self.clock.now().saturating_sub(as_millis(window));
        self.lookup(key, age)
    }

    fn insert_locked(&self, state: &mut GroupState, fingerprint: KeyFingerprint) {
        let now = self.clock.now();
        let active = self.active_index.load(Ordering::Acquire);

        let entry = state.slots[active].upsert(fingerprint, now);
        state.wal.append(&entry);

        self.rotate_if_needed(state, now);
    }

    /// Scan slots from the active one backward (newest first)
    fn lookup_locked(&self, state: &GroupState, fingerprint: &KeyFingerprint, age: Timestamp) -> bool {
        let n = state.slots.len();
        let active = self.active_index.load(Ordering::Acquire);

        (0..n)
            .map(|step| &state.slots[(active + n - step) % n])
            .filter(|slot| slot.last_write() >= age)
            .filter_map(|slot| slot.get(fingerprint.hash))
            .any(|entry| entry.timestamp >= age && entry.matches(fingerprint))
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    fn rotate_if_needed(&self, state: &mut GroupState, now: Timestamp) {
        let active = self.active_index.load(Ordering::Acquire);
        let current = &state.slots[active];

        let over_capacity = current.len() > state.max_entries;
        let too_old = state
            .max_age
            .is_some_and(|age| now.saturating_sub(current.created()) > as_millis(age));

        if !over_capacity && !too_old {
            return;
        }

        let next = (active + 1) % state.slots.len();
        let slot = &mut state.slots[next];

        if slot.is_dirty() && !slot.is_empty() {
            warn!(
                group = %self.name,
                slot = next,
                entries = slot.len(),
                "rotating over a slot with unsynced writes; they are discarded"
            );
        }

        slot.reset(now);
        // Persist the empty generation now so a crash cannot resurrect
        // the previous one from the old file
        if let Err(e) = slot.persist(now) {
            warn!(group = %self.name, path = %slot.path().display(), error = %e, "failed to persist rotated slot");
        }

        self.active_index.store(next, Ordering::Release);
        debug!(group = %self.name, from = active, to = next, over_capacity, too_old, "rotated active slot");
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persist every dirty slot, then drop the WAL if all of them made it
    ///
    /// If any slot fails to persist the WAL is kept, since it may be the
    /// only durable copy of that slot's recent inserts.
    pub fn write_to_disk(&self) -> SyncReport {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.last_sync = now;

        let mut report = SyncReport::default();
        for slot in state.slots.iter_mut().filter(|slot| slot.is_dirty()) {
            match slot.persist(now) {
                Ok(()) => report.slots_persisted += 1,
                Err(e) => {
                    warn!(group = %self.name, path = %slot.path().display(), error = %e, "failed to sync slot");
                    report.slots_failed += 1;
                }
            }
        }

        if report.slots_failed == 0 {
            report.wal_cleared = state.wal.clear();
        } else {
            warn!(group = %self.name, failed = report.slots_failed, "keeping WAL until every slot syncs");
        }

        debug!(group = %self.name, persisted = report.slots_persisted, "group synced");
        report
    }

    /// Reload every slot file and replay the WAL into the active slot
    ///
    /// A corrupt or truncated slot file only affects that slot. After
    /// loading, slots are ordered newest first: index 0 becomes active,
    /// index 1 holds the oldest generation (the next to be recycled).
    pub fn load_from_disk(&self) {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut seen = HashSet::new();
        for slot in state.slots.iter_mut() {
            match slot.load(&mut seen) {
                Ok(report) => {
                    if report.was_truncated {
                        warn!(group = %self.name, path = %slot.path().display(), loaded = report.entries_loaded, "slot file truncated; kept complete records");
                    }
                    if report.entries_loaded > 0 || report.duplicates_skipped > 0 {
                        debug!(
                            group = %self.name,
                            path = %slot.path().display(),
                            loaded = report.entries_loaded,
                            duplicates = report.duplicates_skipped,
                            "slot loaded"
                        );
                    }
                }
                Err(e) => {
                    warn!(group = %self.name, path = %slot.path().display(), error = %e, "slot file unreadable; treating slot as empty");
                }
            }
        }

        order_ring(&mut state.slots);
        self.active_index.store(0, Ordering::Release);

        let active = &mut state.slots[0];
        active.ensure_started(now);

        let Some(replay) = state.wal.replay(active) else {
            return;
        };

        if replay.entries_replayed == 0 {
            state.wal.clear();
            return;
        }

        debug!(group = %self.name, entries = replay.entries_replayed, "WAL replayed");

        // Make the replayed inserts durable before dropping the log
        match active.persist(now) {
            Ok(()) => {
                state.wal.clear();
            }
            Err(e) => {
                warn!(group = %self.name, error = %e, "failed to persist replayed WAL; keeping it");
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this group's slot files and WAL
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Time of the last `write_to_disk` (or of opening)
    pub fn last_sync(&self) -> Timestamp {
        self.state.read().last_sync
    }

    pub fn active_index(&self) -> usize {
        self.active_index.load(Ordering::Acquire)
    }

    pub fn num_slots(&self) -> usize {
        self.state.read().slots.len()
    }

    /// Entries across all slots
    pub fn len(&self) -> usize {
        self.state.read().slots.iter().map(Slot::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> GroupStats {
        let state = self.state.read();
        let slot_entries: Vec<usize> = state.slots.iter().map(Slot::len).collect();
        GroupStats {
            active_index: self.active_index.load(Ordering::Acquire),
            total_entries: slot_entries.iter().sum(),
            slot_entries,
            last_sync: state.last_sync,
        }
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        self.write_to_disk();
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("active_index", &self.active_index())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// "map_3.bin"
fn slot_filename(index: usize) -> String {
    format!("map_{}.bin", index)
}

/// Group names become directory names: one plain path component
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Order loaded slots so the ring runs oldest → newest ending at index 0
///
/// After sorting by `created` descending, the tail is reversed:
/// `[newest, oldest, ..., second newest]`. Scanning backward from 0
/// visits generations newest first and advancing from 0 recycles the
/// oldest.
fn order_ring(slots: &mut [Slot]) {
    slots.sort_by(|a, b| b.created().cmp(&a.created()));
    if slots.len() > 2 {
        slots[1..].reverse();
    }
}

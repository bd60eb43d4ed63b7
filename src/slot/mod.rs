//! Slot Module
//!
//! One generation of a group's rotating map, mirrored to one file.
//!
//! ## Responsibilities
//! - Hold entries keyed by fingerprint hash
//! - Track created / last write / last sync times
//! - Persist via write-temp-then-rename
//! - Load with corruption and truncation tolerance

pub mod format;

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::clock::Timestamp;
use crate::entry::{Entry, KeyFingerprint, RECORD_SIZE};
use crate::error::Result;

use self::format::{SlotHeader, HEADER_SIZE};

/// Result of loading one slot file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries inserted into the map
    pub entries_loaded: u64,

    /// Entries skipped because an earlier slot already held their hash
    pub duplicates_skipped: u64,

    /// Whether the file ended before `count` records
    pub was_truncated: bool,
}

/// A single generation of the rotating map
#[derive(Debug)]
pub struct Slot {
    map: HashMap<u64, Entry>,
    path: PathBuf,
    created: Timestamp,
    last_write: Timestamp,
    last_sync: Timestamp,
    /// Set by every mutation, cleared by a successful persist
    dirty: bool,
}

impl Slot {
    /// Create an empty slot backed by `path`
    pub fn new(path: impl Into<PathBuf>, now: Timestamp) -> Self {
        Self {
            map: HashMap::new(),
            path: path.into(),
            created: now,
            last_write: now,
            last_sync: now,
            dirty: false,
        }
    }

    // =========================================================================
    // In-memory Operations
    // =========================================================================

    pub fn get(&self, hash: u64) -> Option<&Entry> {
        self.map.get(&hash)
    }

    /// Insert or refresh `fingerprint` at `now`, returning the stored entry
    ///
    /// A hash collision with a different length or prefix overwrites the
    /// stored entry.
    pub fn upsert(&mut self, fingerprint: KeyFingerprint, now: Timestamp) -> Entry {
        let entry = match self.map.get_mut(&fingerprint.hash) {
            Some(existing) if existing.matches(&fingerprint) => {
                existing.timestamp = now;
                *existing
            }
            _ => {
                let entry = Entry::new(fingerprint, now);
                self.map.insert(fingerprint.hash, entry);
                entry
            }
        };
        self.mark_written(now);
        entry
    }

    /// Insert a recovered entry, overwriting by hash
    pub fn insert_entry(&mut self, entry: Entry) {
        self.map.insert(entry.hash, entry);
        self.dirty = true;
    }

    /// Recycle this slot as a fresh, empty generation
    pub fn reset(&mut self, now: Timestamp) {
        self.map.clear();
        self.created = now;
        self.last_write = now;
        self.dirty = true;
    }

    /// Give a never-persisted slot a creation time so age rotation works
    pub fn ensure_started(&mut self, now: Timestamp) {
        if self.created == 0 {
            self.created = now;
        }
    }

    pub fn mark_written(&mut self, now: Timestamp) {
        self.last_write = self.last_write.max(now);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.map.values()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn last_write(&self) -> Timestamp {
        self.last_write
    }

    pub fn last_sync(&self) -> Timestamp {
        self.last_sync
    }

    /// True if the slot holds writes not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the slot to a temp file and rename it over the canonical path
    ///
    /// On failure the temp file is removed and the previous file, if any,
    /// is left untouched; the slot stays dirty.
    pub fn persist(&mut self, now: Timestamp) -> Result<()> {
        let temp_path = self.temp_path();

        if let Err(e) = self.write_file(&temp_path, now) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        // Make the rename itself durable
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        self.last_sync = now;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.map.len(), "slot persisted");
        Ok(())
    }

    fn write_file(&self, temp_path: &Path, now: Timestamp) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(temp_path)?;

        let header = SlotHeader {
            created: self.created,
            last_write: self.last_write,
            last_sync: now,
            count: self.map.len() as u64,
        };

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.map.len() * RECORD_SIZE);
        header.encode(&mut buf);
        for entry in self.map.values() {
            entry.encode(&mut buf);
        }

        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// Replace the in-memory contents with the slot file
    ///
    /// A missing file leaves the slot empty. A bad magic or short header
    /// also leaves it empty and is returned as `Corruption`. A file that
    /// ends mid-records keeps every complete record. Hashes already in
    /// `seen` are skipped; loaded hashes are added to it.
    pub fn load(&mut self, seen: &mut HashSet<u64>) -> Result<LoadReport> {
        self.map.clear();
        self.created = 0;
        self.last_write = 0;
        self.last_sync = 0;
        self.dirty = false;

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadReport::default()),
            Err(e) => return Err(e.into()),
        };

        let mut buf = data.as_slice();
        let header = SlotHeader::decode(&mut buf)?;

        self.created = header.created;
        self.last_write = header.last_write;
        self.last_sync = header.last_sync;

        let mut report = LoadReport::default();
        for _ in 0..header.count {
            let Some(entry) = Entry::decode(&mut buf) else {
                report.was_truncated = true;
                break;
            };
            if seen.insert(entry.hash) {
                self.map.insert(entry.hash, entry);
                report.entries_loaded += 1;
            } else {
                report.duplicates_skipped += 1;
            }
        }

        Ok(report)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}


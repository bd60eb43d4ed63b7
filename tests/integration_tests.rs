//! Integration tests for seencache
//!
//! End-to-end flows through the registry: a proxy-style caller asks for
//! a group by name, inserts and looks up keys, the host ticks the
//! periodic flush, and the process restarts (cleanly or not).

use std::fs;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use seencache::{Clock, Config, ManualClock, Registry, SharedGroup};
use tempfile::TempDir;

const START: u64 = 9_000_000;

// =============================================================================
// Helper Functions
// =============================================================================

struct Process {
    clock: Arc<ManualClock>,
    registry: Registry,
}

impl Process {
    fn start(dir: &TempDir, now: u64) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let config = Config::builder()
            .data_dir(dir.path())
            .group_sync_interval(Duration::from_secs(60))
            .build();
        let registry = Registry::with_clock(&config, clock.clone());
        Self { clock, registry }
    }

    fn group(&self, name: &str) -> SharedGroup {
        self.registry.get_or_create(name, 4, 3).unwrap()
    }
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_clean_restart_keeps_every_group() {
    let temp = TempDir::new().unwrap();
    {
        let process = Process::start(&temp, START);
        process.group("promote").insert("/a.js");
        process.group("negative").insert("/missing.png");
    }

    let process = Process::start(&temp, START + 1_000);
    assert!(process.group("promote").lookup("/a.js", START));
    assert!(!process.group("promote").lookup("/missing.png", 0));
    assert!(process.group("negative").lookup("/missing.png", START));
}

#[test]
fn test_crash_between_ticks_recovers_from_wal() {
    let temp = TempDir::new().unwrap();
    {
        let process = Process::start(&temp, START);
        let group = process.group("promote");
        group.insert("/synced");

        process.clock.advance(Duration::from_secs(61));
        assert_eq!(process.registry.periodic_flush(), 1);

        group.insert("/unsynced");
        mem::forget(group);
    }

    let process = Process::start(&temp, START + 120_000);
    let group = process.group("promote");
    assert!(group.lookup("/synced", 0));
    assert!(group.lookup("/unsynced", 0));
}

#[test]
fn test_rotation_bounds_memory_across_restarts() {
    let temp = TempDir::new().unwrap();
    let process = Process::start(&temp, START);
    let group = process.group("bounded");

    for i in 0..100 {
        process.clock.advance(Duration::from_millis(1));
        group.insert(format!("/item/{}", i));
    }

    // 3 slots, each rotated once it exceeds 4 entries
    assert!(group.len() <= 3 * 5);
    assert!(group.lookup("/item/99", 0));
    assert!(!group.lookup("/item/0", 0));

    drop(group);
    drop(process);

    let process = Process::start(&temp, START + 1_000);
    let group = process.group("bounded");
    assert!(group.len() <= 3 * 5);
    assert!(group.lookup("/item/99", 0));
}

#[test]
fn test_corrupt_group_directory_does_not_block_others() {
    let temp = TempDir::new().unwrap();
    {
        let process = Process::start(&temp, START);
        process.group("a").insert("k");
        process.group("b").insert("k");
    }

    for entry in fs::read_dir(temp.path().join("a")).unwrap() {
        fs::write(entry.unwrap().path(), b"garbage").unwrap();
    }

    let process = Process::start(&temp, START);
    assert!(!process.group("a").lookup("k", 0));
    assert!(process.group("b").lookup("k", 0));

    let a = process.group("a");
    a.insert("fresh");
    assert!(a.lookup("fresh", 0));
}

// =============================================================================
// Freshness Tests
// =============================================================================

#[test]
fn test_freshness_window_as_seen_by_a_proxy() {
    let temp = TempDir::new().unwrap();
    let process = Process::start(&temp, START);
    let group = process.group("promote");

    group.insert("GET /video.mp4");
    process.clock.advance(Duration::from_secs(90));

    let one_minute_ago = process.clock.now() - 60_000;
    let two_minutes_ago = process.clock.now() - 120_000;

    assert!(!group.lookup("GET /video.mp4", one_minute_ago));
    assert!(group.lookup("GET /video.mp4", two_minutes_ago));

    group.insert("GET /video.mp4");
    assert!(group.lookup("GET /video.mp4", one_minute_ago));
}

#[test]
fn test_batch_lookup_matches_individual_lookups() {
    let temp = TempDir::new().unwrap();
    let process = Process::start(&temp, START);
    let group = process.group("batch");
    group.insert_many(["k1", "k3"]);

    let batches: [&[&str]; 4] = [&["k1", "k2"], &["k2"], &["k2", "k4"], &["k3"]];
    for keys in batches {
        let expected = keys.iter().any(|k| group.lookup(k, 0));
        assert_eq!(group.lookup_any(keys.iter(), 0), expected, "{:?}", keys);
    }
}

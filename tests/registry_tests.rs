//! Tests for Registry
//!
//! These tests verify:
//! - One live group per name, shared between callers
//! - The registry never keeps a group alive
//! - Reopening a name waits for the previous group's final sync
//! - Base directory failures surface as "no handle"
//! - Per-tick flush quota, round-robin coverage and sync interval
//! - Dead handles are pruned

use std::collections::HashSet;
use std::fs::File;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use seencache::wal::WAL_FILENAME;
use seencache::{CacheError, Clock, Config, ManualClock, Registry};
use tempfile::TempDir;

const START: u64 = 5_000_000;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_registry() -> (TempDir, Arc<ManualClock>, Registry) {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .group_sync_interval(Duration::from_secs(60))
        .flush_spread_ticks(60)
        .build();
    let registry = Registry::with_clock(&config, clock.clone());
    (temp_dir, clock, registry)
}

// =============================================================================
// Get / Create Tests
// =============================================================================

#[test]
fn test_same_name_shares_one_group() {
    let (_temp, _clock, registry) = setup_registry();

    let first = registry.get_or_create("alpha", 1024, 3).unwrap();
    let second = registry.get_or_create("alpha", 10, 5).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    // Creation parameters of the first call win
    assert_eq!(second.max_entries(), 1024);
    assert_eq!(second.num_slots(), 3);
}

#[test]
fn test_different_names_are_independent() {
    let (temp, _clock, registry) = setup_registry();

    let alpha = registry.get_or_create("alpha", 1024, 3).unwrap();
    let beta = registry.get_or_create("beta", 1024, 3).unwrap();
    alpha.insert("k");

    assert!(alpha.lookup("k", 0));
    assert!(!beta.lookup("k", 0));
    assert!(temp.path().join("alpha").is_dir());
    assert!(temp.path().join("beta").is_dir());
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_default_options_come_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .max_entries(7)
        .num_slots(4)
        .max_age(Duration::from_secs(30))
        .build();
    let registry = Registry::new(&config);

    let group = registry.get_or_create_default("g").unwrap();

    assert_eq!(group.max_entries(), 7);
    assert_eq!(group.num_slots(), 4);
    assert_eq!(group.max_age(), Some(Duration::from_secs(30)));
}

#[test]
fn test_registry_does_not_keep_groups_alive() {
    let (temp, _clock, registry) = setup_registry();

    let group = registry.get_or_create("alpha", 1024, 3).unwrap();
    group.insert("k");
    drop(group);

    assert!(registry.get("alpha").is_none());
    assert!(registry.live_names().is_empty());
    // Dropping the last handle flushed it
    assert!(!temp.path().join("alpha").join(WAL_FILENAME).exists());

    let reopened = registry.get_or_create("alpha", 1024, 3).unwrap();
    assert!(reopened.lookup("k", 0));
}

#[test]
fn test_reopen_while_last_handle_drops_elsewhere() {
    let (_temp, _clock, registry) = setup_registry();

    for i in 0..50 {
        let name = format!("g{}", i);
        let group = registry.get_or_create(&name, 1024, 3).unwrap();
        group.insert("before");

        // The final sync on drop races with the reopen below
        let dropper = thread::spawn(move || drop(group));
        let reopened = registry.get_or_create(&name, 1024, 3).unwrap();
        reopened.insert("after");
        dropper.join().unwrap();

        assert!(reopened.lookup("before", 0), "{}", name);
        // The old group's sync must not delete the new group's log
        assert!(reopened.dir().join(WAL_FILENAME).exists(), "{}", name);
    }
}

#[test]
fn test_unavailable_base_dir_gives_no_handle() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("file");
    File::create(&blocker).unwrap();

    let config = Config::builder().data_dir(blocker.join("cache")).build();
    let registry = Registry::new(&config);

    assert!(registry.base_dir().is_none());
    assert!(matches!(
        registry.get_or_create("alpha", 1024, 3),
        Err(CacheError::BaseDirUnavailable(_))
    ));
}

#[test]
fn test_invalid_name_gives_no_handle() {
    let (_temp, _clock, registry) = setup_registry();

    assert!(matches!(
        registry.get_or_create("../escape", 1024, 3),
        Err(CacheError::InvalidName(_))
    ));
    assert!(registry.is_empty());
}

// =============================================================================
// Periodic Flush Tests
// =============================================================================

#[test]
fn test_recently_synced_groups_are_not_due() {
    let (_temp, clock, registry) = setup_registry();
    let _group = registry.get_or_create("alpha", 1024, 3).unwrap();

    clock.advance(Duration::from_secs(30));
    assert!(registry.due_for_flush(clock.now()).is_empty());

    clock.advance(Duration::from_secs(31));
    let due = registry.due_for_flush(clock.now());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].name(), "alpha");
}

#[test]
fn test_quota_spreads_groups_over_ticks() {
    let (_temp, clock, registry) = setup_registry();
    let groups: Vec<_> = (0..120)
        .map(|i| registry.get_or_create(&format!("g{:03}", i), 16, 2).unwrap())
        .collect();

    clock.advance(Duration::from_secs(120));

    let mut visited = HashSet::new();
    for _ in 0..60 {
        let due = registry.due_for_flush(clock.now());
        // ceil(120 / 60)
        assert_eq!(due.len(), 2);
        for group in due {
            visited.insert(group.name().to_string());
        }
    }

    assert_eq!(visited.len(), groups.len());
}

#[test]
fn test_small_registry_visits_one_group_per_tick() {
    let (_temp, clock, registry) = setup_registry();
    let _a = registry.get_or_create("a", 16, 2).unwrap();
    let _b = registry.get_or_create("b", 16, 2).unwrap();

    clock.advance(Duration::from_secs(120));

    let first = registry.due_for_flush(clock.now());
    let second = registry.due_for_flush(clock.now());
    let third = registry.due_for_flush(clock.now());

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name(), "a");
    assert_eq!(second[0].name(), "b");
    assert_eq!(third[0].name(), "a");
}

#[test]
fn test_dead_groups_are_pruned() {
    let (_temp, clock, registry) = setup_registry();
    let alive = registry.get_or_create("alive", 16, 2).unwrap();
    let dead = registry.get_or_create("dead", 16, 2).unwrap();
    drop(dead);

    clock.advance(Duration::from_secs(120));
    for _ in 0..2 {
        registry.due_for_flush(clock.now());
    }

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.live_names(), vec!["alive".to_string()]);
    drop(alive);
}

#[test]
fn test_periodic_flush_syncs_due_groups() {
    let (temp, clock, registry) = setup_registry();
    let group = registry.get_or_create("alpha", 1024, 3).unwrap();
    group.insert("k");

    let wal_path = temp.path().join("alpha").join(WAL_FILENAME);
    assert!(wal_path.exists());

    assert_eq!(registry.periodic_flush(), 0);
    assert!(wal_path.exists());

    clock.advance(Duration::from_secs(61));
    assert_eq!(registry.periodic_flush(), 1);
    assert!(!wal_path.exists());
    assert_eq!(group.last_sync(), clock.now());
}

#[test]
fn test_flush_all_ignores_quota_and_interval() {
    let (_temp, _clock, registry) = setup_registry();
    let a = registry.get_or_create("a", 16, 2).unwrap();
    let b = registry.get_or_create("b", 16, 2).unwrap();
    a.insert("x");
    b.insert("y");

    assert_eq!(registry.flush_all(), 2);
}

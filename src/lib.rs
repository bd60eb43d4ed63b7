//! # seencache
//!
//! A named, rotating, disk-backed existence cache answering
//! "has key K been seen at or after time T?" with:
//! - Bounded memory (a ring of fixed-capacity slots)
//! - Bounded staleness (age-threshold lookups, age-based rotation)
//! - Write-Ahead Logging (WAL) between slot syncs
//! - Crash recovery tolerant of corrupt or truncated files
//!
//! Only a fingerprint of each key is kept, so lookups can return false
//! positives on fingerprint collisions. Never false negatives for keys
//! still held in a slot.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Runtime (process-wide, lazy)                  │
//! │          Registry  ◄── FlushTask (periodic tick)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ name → Weak<Group>
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Group (RwLock)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │     WAL     │          │ Slot ring        │
//!   │  txn.log    │          │ map_0..n-1.bin   │
//!   └─────────────┘          └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;

pub mod entry;
pub mod group;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod slot;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{Config, GroupOptions};
pub use entry::{Entry, KeyFingerprint};
pub use error::{CacheError, Result};
pub use group::{Group, GroupStats, SharedGroup, SyncReport};
pub use registry::Registry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of seencache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! WAL Recovery
//!
//! Replays the log into a slot after a restart.

use std::path::Path;

use crate::clock::Timestamp;
use crate::error::Result;
use crate::slot::Slot;

use super::WalReader;

/// Result of a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayResult {
    /// Number of records applied to the slot
    pub entries_replayed: u64,

    /// Newest record timestamp seen (0 if none)
    pub max_timestamp: Timestamp,

    /// Whether the log ended in a partial record
    pub was_truncated: bool,
}

/// Apply every complete record in `path` to `slot`
///
/// Records overwrite by hash. The slot's last write time is raised to the
/// newest record timestamp. A missing log replays nothing.
pub fn replay_into(path: &Path, slot: &mut Slot) -> Result<ReplayResult> {
    let mut result = ReplayResult::default();

    let Some(mut reader) = WalReader::open(path)? else {
        return Ok(result);
    };

    while let Some(entry) = reader.next_entry()? {
        result.max_timestamp = result.max_timestamp.max(entry.timestamp);
        result.entries_replayed += 1;
        slot.insert_entry(entry);
    }
    result.was_truncated = reader.hit_partial_tail();

    if result.entries_replayed > 0 {
        slot.mark_written(result.max_timestamp);
    }

    Ok(result)
}

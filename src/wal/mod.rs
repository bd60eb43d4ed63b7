//! Write-Ahead Log (WAL) Module
//!
//! Makes inserts recoverable between slot syncs.
//!
//! ## Responsibilities
//! - Append one record per insert, flushed immediately
//! - Replay complete records into a slot on recovery
//! - Delete the log once its contents are durable in slot files
//!
//! ## File Format
//! Headerless. A bare sequence of 24-byte entry records:
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────────┐
//! │ Record 1     │ Record 2     │ ... │ Record N     │
//! └──────────────┴──────────────┴─────┴──────────────┘
//! ```
//! A trailing partial record (torn write) is ignored on replay.

mod reader;
mod recovery;
mod writer;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::slot::Slot;

pub use reader::WalReader;
pub use recovery::{replay_into, ReplayResult};
pub use writer::WalWriter;

/// File name of the log inside a group directory
pub const WAL_FILENAME: &str = "txn.log";

/// A group's write-ahead log
///
/// Failures are logged and absorbed: the in-memory insert stays valid
/// and becomes durable at the next successful slot sync.
pub struct WriteAheadLog {
    path: PathBuf,
    /// Opened lazily on first append, dropped on failure so the next
    /// append retries the open
    writer: Option<WalWriter>,
}

impl WriteAheadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Append one record; returns whether it reached the log
    pub fn append(&mut self, entry: &Entry) -> bool {
        if self.writer.is_none() {
            match WalWriter::open(&self.path) {
                Ok(writer) => self.writer = Some(writer),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to open WAL; insert not durable until next sync");
                    return false;
                }
            }
        }

        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        match writer.append(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to append to WAL; insert not durable until next sync");
                self.writer = None;
                false
            }
        }
    }

    /// Replay the log into `slot`
    ///
    /// `None` means a read error stopped the replay early; whatever was
    /// applied stays applied and the log should be kept.
    pub fn replay(&mut self, slot: &mut Slot) -> Option<ReplayResult> {
        match replay_into(&self.path, slot) {
            Ok(result) => {
                if result.was_truncated {
                    debug!(path = %self.path.display(), "WAL ends in a partial record; ignored");
                }
                Some(result)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "WAL replay stopped early");
                None
            }
        }
    }

    /// Close and delete the log; returns whether it is gone
    pub fn clear(&mut self) -> bool {
        self.writer = None;
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to delete WAL");
                false
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

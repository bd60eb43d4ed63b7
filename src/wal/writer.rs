//! WAL Writer
//!
//! Appends fixed-width entry records to the log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::entry::{Entry, RECORD_SIZE};
use crate::error::Result;

/// Appends records to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,
}

impl WalWriter {
    /// Open or create a WAL file for appending
    ///
    /// A torn record left at the end of an existing log is cut off first,
    /// so new records start on a record boundary.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let len = file.metadata()?.len();
        let torn = len % RECORD_SIZE as u64;
        if torn != 0 {
            warn!(path = %path.display(), bytes = torn, "dropping torn record at end of WAL");
            file.set_len(len - torn)?;
        }

        Ok(Self {
            writer: BufWriter::with_capacity(RECORD_SIZE * 64, file),
        })
    }

    /// Append one record and flush it to the OS
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        self.writer.write_all(&entry.to_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

//! WAL Reader
//!
//! Sequential iteration over WAL records.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::entry::{Entry, RECORD_SIZE};
use crate::error::Result;

/// Reads records from the WAL file
///
/// Iteration ends at EOF or at a partial trailing record, whichever comes
/// first. A partial tail is reported by [`WalReader::hit_partial_tail`],
/// never as an error.
pub struct WalReader {
    reader: BufReader<File>,
    partial_tail: bool,
    done: bool,
}

impl WalReader {
    /// Open a WAL file for reading; `Ok(None)` if it does not exist
    pub fn open(path: &Path) -> Result<Option<Self>> {
        match File::open(path) {
            Ok(file) => Ok(Some(Self {
                reader: BufReader::new(file),
                partial_tail: false,
                done: false,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the next complete record
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }

        let mut record = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        }

        if filled < RECORD_SIZE {
            self.done = true;
            self.partial_tail = filled > 0;
            return Ok(None);
        }

        Ok(Entry::decode(&mut &record[..]))
    }

    /// True once iteration stopped on a record cut short
    pub fn hit_partial_tail(&self) -> bool {
        self.partial_tail
    }
}

impl Iterator for WalReader {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

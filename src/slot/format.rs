//! Slot file format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (40 bytes, little-endian)                             │
//! │   Magic (8) | Created (8) | LastWrite (8) | LastSync (8)     │
//! │   Count (8)                                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Records (Count × 24 bytes)                                   │
//! │   [Timestamp: u64][Length: u32][Prefix: u32][Hash: u64]      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::clock::Timestamp;
use crate::entry::RECORD_SIZE;
use crate::error::{CacheError, Result};

/// Magic identifying a slot file, doubling as the format version
pub const VERSION_MAGIC: u64 = u64::from_le_bytes(*b"SEENv001");

/// Header size: Magic + Created + LastWrite + LastSync + Count
pub const HEADER_SIZE: usize = 40;

/// Decoded slot file header (magic already checked)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotHeader {
    pub created: Timestamp,
    pub last_write: Timestamp,
    pub last_sync: Timestamp,
    pub count: u64,
}

impl SlotHeader {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(VERSION_MAGIC);
        buf.put_u64_le(self.created);
        buf.put_u64_le(self.last_write);
        buf.put_u64_le(self.last_sync);
        buf.put_u64_le(self.count);
    }

    /// Decode and validate a header
    ///
    /// The magic is checked before anything else so a foreign file is
    /// reported as such even when it is also short.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(CacheError::Corruption(format!(
                "truncated header: {} bytes",
                buf.remaining()
            )));
        }

        let magic = buf.get_u64_le();
        if magic != VERSION_MAGIC {
            return Err(CacheError::Corruption(format!(
                "bad version magic {:#018x}",
                magic
            )));
        }

        if buf.remaining() < HEADER_SIZE - 8 {
            return Err(CacheError::Corruption(format!(
                "truncated header: {} bytes",
                buf.remaining() + 8
            )));
        }

        Ok(Self {
            created: buf.get_u64_le(),
            last_write: buf.get_u64_le(),
            last_sync: buf.get_u64_le(),
            count: buf.get_u64_le(),
        })
    }
}

/// What a slot file on disk contains, without loading it into a map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSummary {
    pub header: SlotHeader,

    /// Complete records actually present (may be below `header.count`)
    pub records_present: u64,
}

impl SlotSummary {
    pub fn is_truncated(&self) -> bool {
        self.records_present < self.header.count
    }
}

/// Read just enough of a slot file to describe it
pub fn inspect(path: &Path) -> Result<SlotSummary> {
    let data = fs::read(path)?;
    let mut buf = data.as_slice();
    let header = SlotHeader::decode(&mut buf)?;

    let available = (buf.len() / RECORD_SIZE) as u64;
    Ok(SlotSummary {
        header,
        records_present: available.min(header.count),
    })
}

//! Entry definitions
//!
//! The compact per-key record. The original key is never stored: an entry
//! keeps a 64-bit fingerprint plus the key length and its first four
//! bytes as cheap secondary checks.
//!
//! ## Record Format (24 bytes, little-endian)
//! ```text
//! ┌───────────────┬────────────┬────────────┬──────────────┐
//! │ Timestamp (8) │ Length (4) │ Prefix (4) │   Hash (8)   │
//! └───────────────┴────────────┴────────────┴──────────────┘
//! ```

use std::hash::Hasher;

use bytes::{Buf, BufMut};
use twox_hash::XxHash64;

use crate::clock::Timestamp;

/// Size of one encoded entry record
pub const RECORD_SIZE: usize = 24;

/// Seed for the key fingerprint; changing it invalidates every file on disk
const FINGERPRINT_SEED: u64 = 0;

/// Identity of a normalized key: hash, length and prefix must all agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint {
    pub hash: u64,
    pub length: u32,
    pub prefix: u32,
}

impl KeyFingerprint {
    /// Normalize `key` and fingerprint the result
    pub fn of(key: impl AsRef<[u8]>) -> Self {
        let key = normalize_key(key.as_ref());

        let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
        hasher.write(key);

        let mut prefix = [0u8; 4];
        let n = key.len().min(4);
        prefix[..n].copy_from_slice(&key[..n]);

        Self {
            hash: hasher.finish(),
            length: u32::try_from(key.len()).unwrap_or(u32::MAX),
            prefix: u32::from_le_bytes(prefix),
        }
    }
}

/// Strip surrounding whitespace, then one pair of matching quotes
///
/// `  "abc" ` → `abc`, `'abc'` → `abc`, `"abc'` is left as is.
pub fn normalize_key(key: &[u8]) -> &[u8] {
    let key = key.trim_ascii();
    match key {
        [first @ (b'"' | b'\''), inner @ .., last] if first == last => inner,
        _ => key,
    }
}

/// A single cached record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Time (unix millis) the key was last inserted
    pub timestamp: Timestamp,
    pub length: u32,
    pub prefix: u32,
    pub hash: u64,
}

impl Entry {
    pub fn new(fingerprint: KeyFingerprint, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            length: fingerprint.length,
            prefix: fingerprint.prefix,
            hash: fingerprint.hash,
        }
    }

    pub fn fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint {
            hash: self.hash,
            length: self.length,
            prefix: self.prefix,
        }
    }

    /// True if this entry is the same logical key as `fingerprint`
    pub fn matches(&self, fingerprint: &KeyFingerprint) -> bool {
        self.hash == fingerprint.hash
            && self.length == fingerprint.length
            && self.prefix == fingerprint.prefix
    }

    /// Append the 24-byte record to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.length);
        buf.put_u32_le(self.prefix);
        buf.put_u64_le(self.hash);
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Read one record, or `None` if fewer than 24 bytes remain
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < RECORD_SIZE {
            return None;
        }
        Some(Self {
            timestamp: buf.get_u64_le(),
            length: buf.get_u32_le(),
            prefix: buf.get_u32_le(),
            hash: buf.get_u64_le(),
        })
    }
}

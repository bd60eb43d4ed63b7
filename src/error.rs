//! Error types for seencache
//!
//! Only construction paths surface these to callers. Insert, lookup and
//! sync absorb failures locally and log them.

use thiserror::Error;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for seencache operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // On-disk Format Errors
    // -------------------------------------------------------------------------
    #[error("Slot file corrupted: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Environment Errors
    // -------------------------------------------------------------------------
    #[error("Invalid group name: {0:?}")]
    InvalidName(String),

    #[error("Base directory unavailable: {0}")]
    BaseDirUnavailable(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

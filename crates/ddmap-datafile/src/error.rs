//! Error types for datafile parsing.

use thiserror::Error;

/// Errors that can occur when reading a datafile.
#[derive(Debug, Error)]
pub enum Error {
    /// Magic, version or header size fields are invalid.
    #[error("corrupt datafile header: {0}")]
    CorruptHeader(String),

    /// The buffer ends before the region the header declares.
    #[error("truncated datafile: needed {needed} bytes but only {available} available")]
    TruncatedFile { needed: usize, available: usize },

    /// Item type runs or item records are inconsistent.
    #[error("malformed item table: {0}")]
    MalformedItemTable(String),

    /// Data offsets or uncompressed sizes are inconsistent.
    #[error("malformed data table: {0}")]
    MalformedDataTable(String),

    /// An item referenced a data block that does not exist.
    #[error("data index {index} out of range ({count} data blocks)")]
    DataIndexOutOfRange { index: i32, count: usize },

    /// A data block failed to inflate or inflated to the wrong size.
    #[error("decompression error in data block {index}: {message}")]
    Decompression { index: usize, message: String },

    /// A data block exceeds the configured [`Limits`](crate::Limits).
    #[error("data block {index} needs {size} bytes, limit is {limit}")]
    BlockTooLarge {
        index: usize,
        size: usize,
        limit: usize,
    },
}

/// Result type for datafile operations.
pub type Result<T> = std::result::Result<T, Error>;

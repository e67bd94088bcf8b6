//! Resource limits applied while inflating data blocks.

/// Upper bounds on decompressed data for a single parse.
///
/// Checked against the declared sizes before any buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Largest uncompressed size accepted for one data block.
    pub max_block_size: usize,
    /// Largest sum of uncompressed block sizes inflated by one datafile.
    pub max_total_size: usize,
}

impl Limits {
    pub const DEFAULT_MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;
    pub const DEFAULT_MAX_TOTAL_SIZE: usize = 512 * 1024 * 1024;

    /// Limits that never reject anything.
    pub const fn unlimited() -> Self {
        Self {
            max_block_size: usize::MAX,
            max_total_size: usize::MAX,
        }
    }

    /// Override the per-block limit.
    pub const fn with_max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Override the per-datafile limit.
    pub const fn with_max_total_size(mut self, size: usize) -> Self {
        self.max_total_size = size;
        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_block_size: Self::DEFAULT_MAX_BLOCK_SIZE,
            max_total_size: Self::DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

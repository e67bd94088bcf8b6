//! Error types for map parsing.

use thiserror::Error;

use crate::TileLayerKind;

/// Errors that can occur when loading a map.
#[derive(Debug, Error)]
pub enum Error {
    /// The datafile container itself is malformed.
    #[error(transparent)]
    Datafile(#[from] ddmap_datafile::Error),

    /// Reading the map file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A layer's data block does not hold exactly `width * height` records.
    #[error("{kind} layer data is {actual} bytes, expected {expected}")]
    LayerSizeMismatch {
        kind: TileLayerKind,
        expected: usize,
        actual: usize,
    },

    /// A layer that must share the game layer's dimensions does not.
    #[error("{kind} layer is {actual:?}, game layer is {expected:?}")]
    LayerDimensionMismatch {
        kind: TileLayerKind,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// No usable game layer.
    #[error("map has no game layer")]
    MissingGameLayer,

    /// A layer item is structurally unusable.
    #[error("invalid layer {index}: {reason}")]
    InvalidLayer { index: usize, reason: String },
}

/// Result type for map operations.
pub type Result<T> = std::result::Result<T, Error>;

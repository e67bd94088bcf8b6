//! On-disk tile records and the owned per-field grids built from them.

use zerocopy::byteorder::little_endian::I16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Fixed-size record stored in a tile layer data block.
pub trait TileRecord: FromBytes + Immutable + KnownLayout + Copy {
    const SIZE: usize = std::mem::size_of::<Self>();
}

/// Plain tile used by game, front and design layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Tile {
    pub index: u8,
    pub flags: u8,
    /// Number of following copies of this tile (tilemap version 4+).
    pub skip: u8,
    pub reserved: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TeleTile {
    pub number: u8,
    pub tile_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SpeedupTile {
    pub force: u8,
    pub max_speed: u8,
    pub tile_type: u8,
    pub padding: u8,
    pub angle: I16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SwitchTile {
    pub number: u8,
    pub tile_type: u8,
    pub flags: u8,
    pub delay: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TuneTile {
    pub number: u8,
    pub tile_type: u8,
}

impl TileRecord for Tile {}
impl TileRecord for TeleTile {}
impl TileRecord for SpeedupTile {}
impl TileRecord for SwitchTile {}
impl TileRecord for TuneTile {}

/// Row-major `width * height` grid of one tile field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub(crate) fn from_cells(width: usize, height: usize, cells: Vec<T>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            width,
            height,
            cells,
        }
    }

    pub(crate) fn filled(width: usize, height: usize, value: T) -> Self {
        Self::from_cells(width, height, vec![value; width * height])
    }

    /// Project one field out of a record slice.
    pub(crate) fn project<R>(
        width: usize,
        height: usize,
        records: &[R],
        field: impl Fn(&R) -> T,
    ) -> Self {
        Self::from_cells(width, height, records.iter().map(field).collect())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    /// One slice per row, `height` in total. Rows of a zero-width grid are
    /// empty.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.height).map(move |y| &self.cells[y * self.width..(y + 1) * self.width])
    }
}

impl<T> AsRef<[T]> for Grid<T> {
    fn as_ref(&self) -> &[T] {
        &self.cells
    }
}

/// Expand run-length encoded tiles: each tile is repeated `skip + 1` times
/// with `skip` cleared.
///
/// Stops once the output exceeds `limit`, so a caller comparing against
/// `limit` detects overlong data without unbounded allocation.
pub(crate) fn expand_skip(packed: &[Tile], limit: usize) -> Vec<Tile> {
    let mut out = Vec::with_capacity(limit.min(packed.len().saturating_mul(256)));
    for tile in packed {
        let room = limit.saturating_add(1) - out.len();
        let run = (usize::from(tile.skip) + 1).min(room);
        out.extend(std::iter::repeat(Tile { skip: 0, ..*tile }).take(run));
        if out.len() > limit {
            break;
        }
    }
    out
}

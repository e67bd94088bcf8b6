//! Datafile header and table record structures.

use zerocopy::byteorder::little_endian::I32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// Largest type id that fits in the upper half of a packed item word.
pub const MAX_TYPE_ID: i32 = 0xffff;

/// On-disk datafile header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawHeader {
    /// Signature, `DATA` or `ATAD`.
    pub magic: [u8; 4],
    /// Format version (3 or 4).
    pub version: I32,
    /// Number of bytes following the first 16 bytes of the header.
    pub size: I32,
    /// Number of bytes that are stored as 32-bit words (header rest + tables + items).
    pub swaplen: I32,
    /// Number of item type runs.
    pub num_item_types: I32,
    /// Number of items.
    pub num_items: I32,
    /// Number of data blocks.
    pub num_raw_data: I32,
    /// Size of the item pool in bytes.
    pub item_size: I32,
    /// Size of the data pool in bytes.
    pub data_size: I32,
}

impl RawHeader {
    /// Signature written by little-endian writers.
    pub const MAGIC: &'static [u8; 4] = b"DATA";

    /// Signature written by big-endian writers.
    pub const MAGIC_SWAPPED: &'static [u8; 4] = b"ATAD";

    /// Header size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Bytes of the header not counted by the `size` field.
    pub const SIZE_OFFSET: usize = 16;
}

/// One run of the item type table.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawItemType {
    pub type_id: I32,
    pub start: I32,
    pub num: I32,
}

/// The two header words in front of every item payload.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawItemHeader {
    /// `type_id << 16 | id`.
    pub type_and_id: I32,
    /// Payload size in bytes.
    pub size: I32,
}

impl RawItemHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Type id from the packed word.
    pub fn type_id(&self) -> u16 {
        ((self.type_and_id.get() >> 16) & 0xffff) as u16
    }

    /// Item id from the packed word.
    pub fn id(&self) -> u16 {
        (self.type_and_id.get() & 0xffff) as u16
    }
}

/// Datafile format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Version {
    /// Data blocks stored raw, no uncompressed size table.
    V3,
    /// Data blocks zlib-compressed, followed by an uncompressed size table.
    V4,
}

impl Version {
    /// Whether data blocks are stored compressed and the size table is present.
    pub fn is_compressed(self) -> bool {
        matches!(self, Version::V4)
    }
}

impl TryFrom<i32> for Version {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            3 => Ok(Version::V3),
            4 => Ok(Version::V4),
            other => Err(Error::CorruptHeader(format!(
                "unsupported version {other}, expected 3 or 4"
            ))),
        }
    }
}

/// Validated datafile header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatafileHeader {
    pub magic: [u8; 4],
    pub version: Version,
    pub size: usize,
    pub swaplen: usize,
    pub num_item_types: usize,
    pub num_items: usize,
    pub num_raw_data: usize,
    pub item_size: usize,
    pub data_size: usize,
}

impl DatafileHeader {
    /// Validate the signature, version and size fields of a raw header.
    ///
    /// Length checks against the actual buffer happen in [`Self::layout`].
    pub fn from_raw(raw: &RawHeader) -> Result<Self> {
        if &raw.magic != RawHeader::MAGIC && &raw.magic != RawHeader::MAGIC_SWAPPED {
            return Err(Error::CorruptHeader(format!(
                "invalid magic {:?}, expected \"DATA\" or \"ATAD\"",
                raw.magic
            )));
        }

        let version = Version::try_from(raw.version.get())?;

        let field = |name: &str, value: I32| -> Result<usize> {
            usize::try_from(value.get())
                .map_err(|_| Error::CorruptHeader(format!("negative {name}: {}", value.get())))
        };

        let header = Self {
            magic: raw.magic,
            version,
            size: field("size", raw.size)?,
            swaplen: field("swaplen", raw.swaplen)?,
            num_item_types: field("item type count", raw.num_item_types)?,
            num_items: field("item count", raw.num_items)?,
            num_raw_data: field("data count", raw.num_raw_data)?,
            item_size: field("item pool size", raw.item_size)?,
            data_size: field("data pool size", raw.data_size)?,
        };

        if header.swaplen > header.size {
            return Err(Error::CorruptHeader(format!(
                "swaplen {} exceeds size {}",
                header.swaplen, header.size
            )));
        }
        if header.item_size % 4 != 0 {
            return Err(Error::CorruptHeader(format!(
                "item pool size {} is not a multiple of 4",
                header.item_size
            )));
        }
        if header.num_item_types > MAX_TYPE_ID as usize + 1 {
            return Err(Error::CorruptHeader(format!(
                "too many item types: {}",
                header.num_item_types
            )));
        }

        Ok(header)
    }

    /// Compute the absolute position of every table and check it against the
    /// buffer length.
    pub fn layout(&self, file_len: usize) -> Result<Layout> {
        let overflow = || Error::CorruptHeader("table sizes overflow".to_string());
        let words = |count: usize| count.checked_mul(4).ok_or_else(overflow);

        let item_types = RawHeader::SIZE;
        let item_offsets = item_types
            .checked_add(self.num_item_types.checked_mul(12).ok_or_else(overflow)?)
            .ok_or_else(overflow)?;
        let data_offsets = item_offsets
            .checked_add(words(self.num_items)?)
            .ok_or_else(overflow)?;
        let data_sizes = data_offsets
            .checked_add(words(self.num_raw_data)?)
            .ok_or_else(overflow)?;
        let items = if self.version.is_compressed() {
            data_sizes.checked_add(words(self.num_raw_data)?).ok_or_else(overflow)?
        } else {
            data_sizes
        };
        let data = items.checked_add(self.item_size).ok_or_else(overflow)?;
        let end = data.checked_add(self.data_size).ok_or_else(overflow)?;

        let declared_end = RawHeader::SIZE_OFFSET
            .checked_add(self.size)
            .ok_or_else(overflow)?;
        if declared_end < end {
            return Err(Error::CorruptHeader(format!(
                "declared size {} is smaller than the {} bytes its tables need",
                declared_end, end
            )));
        }
        if declared_end > file_len {
            return Err(Error::TruncatedFile {
                needed: declared_end,
                available: file_len,
            });
        }

        Ok(Layout {
            item_types,
            item_offsets,
            data_offsets,
            data_sizes: self.version.is_compressed().then_some(data_sizes),
            items,
            data,
            end,
        })
    }
}

/// Absolute byte offsets of the datafile sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub item_types: usize,
    pub item_offsets: usize,
    pub data_offsets: usize,
    /// Present for version 4 only.
    pub data_sizes: Option<usize>,
    pub items: usize,
    pub data: usize,
    pub end: usize,
}

//! Datafile container parsing.

use std::cell::{Cell, OnceCell};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};
use zerocopy::FromBytes;

use crate::decompress::decompress_zlib_sized;
use crate::header::{DatafileHeader, RawHeader, RawItemHeader, RawItemType, Version, MAX_TYPE_ID};
use crate::{BinaryReader, Error, Limits, Result};

/// A contiguous run of items sharing one type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTypeEntry {
    pub type_id: u16,
    pub start: usize,
    pub num: usize,
}

impl ItemTypeEntry {
    /// Index one past the last item of this run.
    pub fn end(&self) -> usize {
        self.start + self.num
    }
}

/// One record of the item table.
///
/// The payload borrows from the buffer the datafile was parsed from and is a
/// sequence of little-endian 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<'a> {
    type_id: u16,
    id: u16,
    payload: &'a [u8],
}

impl<'a> Item<'a> {
    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Raw payload bytes, without the two header words.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Number of 32-bit words in the payload.
    pub fn len_words(&self) -> usize {
        self.payload.len() / 4
    }

    /// Payload word at `index`, if the item is long enough.
    pub fn word(&self, index: usize) -> Option<i32> {
        let start = index.checked_mul(4)?;
        self.payload
            .get(start..start.checked_add(4)?)
            .map(LittleEndian::read_i32)
    }

    /// Payload word at `index`, or `default` for items written by older
    /// format revisions that end before it.
    pub fn word_or(&self, index: usize, default: i32) -> i32 {
        self.word(index).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Copy)]
struct DataBlock<'a> {
    stored: &'a [u8],
    uncompressed_size: usize,
}

/// A parsed datafile.
///
/// Parsing resolves the header and all tables up front. Data blocks are
/// inflated lazily on first access through [`Datafile::data`] and cached for
/// the lifetime of this value, so several items may share one block.
#[derive(Debug)]
pub struct Datafile<'a> {
    header: DatafileHeader,
    item_types: Vec<ItemTypeEntry>,
    items: Vec<Item<'a>>,
    blocks: Vec<DataBlock<'a>>,
    cache: Vec<OnceCell<Vec<u8>>>,
    inflated: Cell<usize>,
    limits: Limits,
}

impl<'a> Datafile<'a> {
    /// Parse a datafile with default [`Limits`].
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        Self::parse_with(data, Limits::default())
    }

    /// Parse a datafile from the complete file contents.
    pub fn parse_with(data: &'a [u8], limits: Limits) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let raw: RawHeader = reader.read_struct()?;
        let header = DatafileHeader::from_raw(&raw)?;
        let layout = header.layout(data.len())?;

        debug!(
            version = ?header.version,
            item_types = header.num_item_types,
            items = header.num_items,
            data_blocks = header.num_raw_data,
            "read datafile header"
        );

        let mut raw_types = Vec::with_capacity(header.num_item_types);
        for _ in 0..header.num_item_types {
            raw_types.push(reader.read_struct::<RawItemType>()?);
        }
        let item_offsets = reader.read_i32_array(header.num_items)?;
        let data_offsets = reader.read_i32_array(header.num_raw_data)?;
        let data_sizes = match layout.data_sizes {
            Some(_) => Some(reader.read_i32_array(header.num_raw_data)?),
            None => None,
        };
        debug_assert_eq!(reader.position(), layout.items);

        let item_pool = &data[layout.items..layout.data];
        let data_pool = &data[layout.data..layout.end];

        let item_types = read_item_types(&raw_types, header.num_items)?;
        let items = read_items(item_pool, &item_offsets, &item_types)?;
        let blocks = read_blocks(data_pool, &data_offsets, data_sizes.as_deref())?;

        Ok(Self {
            header,
            item_types,
            items,
            cache: blocks.iter().map(|_| OnceCell::new()).collect(),
            blocks,
            inflated: Cell::new(0),
            limits,
        })
    }

    pub fn header(&self) -> &DatafileHeader {
        &self.header
    }

    pub fn version(&self) -> Version {
        self.header.version
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The item type table, in on-disk order.
    pub fn item_types(&self) -> &[ItemTypeEntry] {
        &self.item_types
    }

    /// All items, in on-disk order.
    pub fn items(&self) -> &[Item<'a>] {
        &self.items
    }

    /// All items of one type. Empty when the type is not present.
    pub fn items_of_type(&self, type_id: u16) -> &[Item<'a>] {
        self.item_types
            .iter()
            .find(|entry| entry.type_id == type_id)
            .map(|entry| &self.items[entry.start..entry.end()])
            .unwrap_or(&[])
    }

    /// Look up an item by type and id.
    pub fn find_item(&self, type_id: u16, id: u16) -> Option<&Item<'a>> {
        self.items_of_type(type_id).iter().find(|item| item.id == id)
    }

    /// Number of data blocks.
    pub fn num_data(&self) -> usize {
        self.blocks.len()
    }

    /// Declared uncompressed size of a data block.
    pub fn data_size(&self, index: i32) -> Option<usize> {
        let index = usize::try_from(index).ok()?;
        self.blocks.get(index).map(|block| block.uncompressed_size)
    }

    /// Uncompressed contents of a data block.
    ///
    /// The block is inflated on first access; later calls return the cached
    /// buffer.
    pub fn data(&self, index: i32) -> Result<&[u8]> {
        let slot = usize::try_from(index)
            .ok()
            .filter(|&slot| slot < self.blocks.len())
            .ok_or(Error::DataIndexOutOfRange {
                index,
                count: self.blocks.len(),
            })?;

        let cell = &self.cache[slot];
        if let Some(bytes) = cell.get() {
            return Ok(bytes);
        }
        let bytes = self.inflate(slot)?;
        Ok(cell.get_or_init(|| bytes))
    }

    fn inflate(&self, index: usize) -> Result<Vec<u8>> {
        let block = self.blocks[index];
        let size = block.uncompressed_size;

        if size > self.limits.max_block_size {
            return Err(Error::BlockTooLarge {
                index,
                size,
                limit: self.limits.max_block_size,
            });
        }
        let total = self.inflated.get().saturating_add(size);
        if total > self.limits.max_total_size {
            return Err(Error::BlockTooLarge {
                index,
                size: total,
                limit: self.limits.max_total_size,
            });
        }

        let bytes = if self.header.version.is_compressed() {
            decompress_zlib_sized(block.stored, size).map_err(|e| Error::Decompression {
                index,
                message: e.to_string(),
            })?
        } else {
            block.stored.to_vec()
        };
        self.inflated.set(total);

        trace!(index, stored = block.stored.len(), size, "inflated data block");
        Ok(bytes)
    }
}

fn read_item_types(raw: &[RawItemType], num_items: usize) -> Result<Vec<ItemTypeEntry>> {
    let mut entries = Vec::with_capacity(raw.len());
    for (index, run) in raw.iter().enumerate() {
        let type_id = run.type_id.get();
        if !(0..=MAX_TYPE_ID).contains(&type_id) {
            return Err(Error::MalformedItemTable(format!(
                "type run {index} has invalid type id {type_id}"
            )));
        }
        let (Ok(start), Ok(num)) = (
            usize::try_from(run.start.get()),
            usize::try_from(run.num.get()),
        ) else {
            return Err(Error::MalformedItemTable(format!(
                "type run {index} has negative bounds ({}, {})",
                run.start.get(),
                run.num.get()
            )));
        };
        entries.push(ItemTypeEntry {
            type_id: type_id as u16,
            start,
            num,
        });
    }

    let mut sorted: Vec<&ItemTypeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.start);
    let mut next = 0usize;
    for entry in &sorted {
        if entry.start != next {
            return Err(Error::MalformedItemTable(format!(
                "type run for type {} starts at item {}, expected {}",
                entry.type_id, entry.start, next
            )));
        }
        next = entry.start.checked_add(entry.num).ok_or_else(|| {
            Error::MalformedItemTable(format!("type run for type {} overflows", entry.type_id))
        })?;
    }
    if next != num_items {
        return Err(Error::MalformedItemTable(format!(
            "type runs cover {next} items, header declares {num_items}"
        )));
    }

    let mut type_ids: Vec<u16> = entries.iter().map(|entry| entry.type_id).collect();
    type_ids.sort_unstable();
    if let Some(pair) = type_ids.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(Error::MalformedItemTable(format!(
            "type {} appears in more than one run",
            pair[0]
        )));
    }

    Ok(entries)
}

fn read_items<'a>(
    pool: &'a [u8],
    offsets: &[i32],
    types: &[ItemTypeEntry],
) -> Result<Vec<Item<'a>>> {
    let mut expected_type = vec![0u16; offsets.len()];
    for entry in types {
        expected_type[entry.start..entry.end()].fill(entry.type_id);
    }

    let mut items = Vec::with_capacity(offsets.len());
    for (index, &offset) in offsets.iter().enumerate() {
        let start = slot_bound(offset, index)?;
        let end = match offsets.get(index + 1) {
            Some(&next) => slot_bound(next, index + 1)?,
            None => pool.len(),
        };
        if start > end || end > pool.len() {
            return Err(Error::MalformedItemTable(format!(
                "item {index} slot {start}..{end} lies outside the {} byte item pool",
                pool.len()
            )));
        }

        let slot = &pool[start..end];
        if slot.len() < RawItemHeader::SIZE {
            return Err(Error::MalformedItemTable(format!(
                "item {index} slot is {} bytes, too small for an item header",
                slot.len()
            )));
        }
        let (head, payload) = slot.split_at(RawItemHeader::SIZE);
        let header = RawItemHeader::read_from_bytes(head).map_err(|_| {
            Error::MalformedItemTable(format!("item {index} header is unreadable"))
        })?;

        let size = header.size.get();
        if usize::try_from(size).ok() != Some(payload.len()) || size % 4 != 0 {
            return Err(Error::MalformedItemTable(format!(
                "item {index} declares {size} payload bytes but its slot holds {}",
                payload.len()
            )));
        }
        if header.type_id() != expected_type[index] {
            return Err(Error::MalformedItemTable(format!(
                "item {index} has type {} inside the run of type {}",
                header.type_id(),
                expected_type[index]
            )));
        }

        items.push(Item {
            type_id: header.type_id(),
            id: header.id(),
            payload,
        });
    }

    Ok(items)
}

fn slot_bound(offset: i32, index: usize) -> Result<usize> {
    usize::try_from(offset).map_err(|_| {
        Error::MalformedItemTable(format!("item {index} has negative offset {offset}"))
    })
}

fn read_blocks<'a>(
    pool: &'a [u8],
    offsets: &[i32],
    sizes: Option<&[i32]>,
) -> Result<Vec<DataBlock<'a>>> {
    let bound = |offset: i32, index: usize| {
        usize::try_from(offset).map_err(|_| {
            Error::MalformedDataTable(format!("data block {index} has negative offset {offset}"))
        })
    };

    let mut blocks = Vec::with_capacity(offsets.len());
    for (index, &offset) in offsets.iter().enumerate() {
        let start = bound(offset, index)?;
        let end = match offsets.get(index + 1) {
            Some(&next) => bound(next, index + 1)?,
            None => pool.len(),
        };
        if start > end || end > pool.len() {
            return Err(Error::MalformedDataTable(format!(
                "data block {index} spans {start}..{end} outside the {} byte data pool",
                pool.len()
            )));
        }

        let stored = &pool[start..end];
        let uncompressed_size = match sizes {
            Some(sizes) => usize::try_from(sizes[index]).map_err(|_| {
                Error::MalformedDataTable(format!(
                    "data block {index} has negative uncompressed size {}",
                    sizes[index]
                ))
            })?,
            None => stored.len(),
        };

        blocks.push(DataBlock {
            stored,
            uncompressed_size,
        });
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::DatafileBuilder;

    fn sample(version: i32) -> Vec<u8> {
        let mut builder = DatafileBuilder::new();
        builder.set_version(version);
        let text = builder.add_data(b"hello\0");
        let blob = builder.add_data(&[9u8; 40]);
        builder.add_item(5, 0, &[1, 2, blob]);
        builder.add_item(1, 0, &[1, text]);
        builder.add_item(5, 1, &[3, 4]);
        builder.add_item(0xffff, 7, &[]);
        builder.build().unwrap()
    }

    #[test]
    fn test_items_grouped_by_type() {
        let bytes = sample(4);
        let file = Datafile::parse(&bytes).unwrap();

        assert_eq!(file.version(), Version::V4);
        assert_eq!(file.items().len(), 4);
        assert_eq!(file.item_types().len(), 3);

        let layers = file.items_of_type(5);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].word(2), Some(1));
        assert_eq!(layers[1].len_words(), 2);
        assert_eq!(layers[1].word(2), None);
        assert_eq!(layers[1].word_or(2, -1), -1);

        assert!(file.items_of_type(3).is_empty());
        assert_eq!(file.find_item(0xffff, 7).map(|item| item.len_words()), Some(0));
        assert!(file.find_item(1, 1).is_none());
    }

    #[test]
    fn test_data_is_cached_and_deterministic() {
        let bytes = sample(4);
        let file = Datafile::parse(&bytes).unwrap();

        let first = file.data(1).unwrap();
        let second = file.data(1).unwrap();
        assert_eq!(first, &[9u8; 40][..]);
        assert_eq!(first.as_ptr(), second.as_ptr());

        let other = Datafile::parse(&bytes).unwrap();
        assert_eq!(other.data(1).unwrap(), first);
    }

    #[test]
    fn test_version_3_blocks_are_raw() {
        let bytes = sample(3);
        let file = Datafile::parse(&bytes).unwrap();

        assert_eq!(file.version(), Version::V3);
        assert_eq!(file.data(0).unwrap(), b"hello\0");
        assert_eq!(file.data_size(1), Some(40));
    }

    #[test]
    fn test_data_index_out_of_range() {
        let bytes = sample(4);
        let file = Datafile::parse(&bytes).unwrap();

        assert!(matches!(
            file.data(2),
            Err(Error::DataIndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            file.data(-1),
            Err(Error::DataIndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn test_declared_size_mismatch() {
        let mut builder = DatafileBuilder::new();
        let index = builder.add_data_with_declared_size(&[1u8; 16], 20);
        builder.add_item(5, 0, &[index]);
        let bytes = builder.build().unwrap();
        let file = Datafile::parse(&bytes).unwrap();

        assert!(matches!(
            file.data(index),
            Err(Error::Decompression { index: 0, .. })
        ));
    }

    #[test]
    fn test_limits_checked_before_inflating() {
        let bytes = sample(4);
        let file = Datafile::parse_with(&bytes, Limits::default().with_max_block_size(32)).unwrap();

        assert_eq!(file.data(0).unwrap(), b"hello\0");
        assert!(matches!(
            file.data(1),
            Err(Error::BlockTooLarge { index: 1, size: 40, limit: 32 })
        ));

        let file = Datafile::parse_with(&bytes, Limits::default().with_max_total_size(42)).unwrap();
        file.data(0).unwrap();
        assert!(matches!(file.data(1), Err(Error::BlockTooLarge { .. })));
    }

    #[test]
    fn test_corrupt_magic() {
        let mut bytes = sample(4);
        bytes[0] = b'X';

        assert!(matches!(Datafile::parse(&bytes), Err(Error::CorruptHeader(_))));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = sample(4);

        for len in [0, 20, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(
                    Datafile::parse(&bytes[..len]),
                    Err(Error::TruncatedFile { .. })
                ),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_item_size_inconsistent_with_slot() {
        let mut builder = DatafileBuilder::new();
        builder.add_item(4, 0, &[1, 2, 3]);
        builder.add_item(5, 0, &[4]);
        let mut bytes = builder.build().unwrap();

        // First item's size word sits right after the two tables.
        let items_start = 36 + 2 * 12 + 2 * 4;
        bytes[items_start + 4..items_start + 8].copy_from_slice(&8i32.to_le_bytes());

        assert!(matches!(
            Datafile::parse(&bytes),
            Err(Error::MalformedItemTable(_))
        ));
    }

    #[test]
    fn test_type_runs_must_cover_items() {
        let mut builder = DatafileBuilder::new();
        builder.add_item(4, 0, &[1]);
        builder.add_item(5, 0, &[2]);
        let mut bytes = builder.build().unwrap();

        // Second run's start field: header + one run + type id word.
        let run_start = 36 + 12 + 4;
        bytes[run_start..run_start + 4].copy_from_slice(&2i32.to_le_bytes());

        assert!(matches!(
            Datafile::parse(&bytes),
            Err(Error::MalformedItemTable(_))
        ));
    }
}

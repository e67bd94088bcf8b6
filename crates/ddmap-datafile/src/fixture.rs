//! Synthetic datafile construction for tests.
//!
//! Writes the same layout the reader expects: items sorted into type runs,
//! offset tables, and data blocks that are zlib-compressed for version 4 and
//! stored raw for version 3.

use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::header::RawHeader;

#[derive(Debug, Clone)]
struct FixtureItem {
    type_id: u16,
    id: u16,
    words: Vec<i32>,
}

#[derive(Debug, Clone)]
enum FixtureBlock {
    /// Compressed at build time when the version calls for it.
    Plain {
        bytes: Vec<u8>,
        declared_size: Option<i32>,
    },
    /// Written exactly as given.
    Stored { bytes: Vec<u8>, declared_size: i32 },
}

/// Builder for in-memory datafiles.
#[derive(Debug, Clone)]
pub struct DatafileBuilder {
    magic: [u8; 4],
    version: i32,
    items: Vec<FixtureItem>,
    blocks: Vec<FixtureBlock>,
}

impl DatafileBuilder {
    pub fn new() -> Self {
        Self {
            magic: *RawHeader::MAGIC,
            version: 4,
            items: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn set_magic(&mut self, magic: [u8; 4]) -> &mut Self {
        self.magic = magic;
        self
    }

    pub fn set_version(&mut self, version: i32) -> &mut Self {
        self.version = version;
        self
    }

    /// Append an item; items are regrouped by type when building.
    pub fn add_item(&mut self, type_id: u16, id: u16, words: &[i32]) -> &mut Self {
        self.items.push(FixtureItem {
            type_id,
            id,
            words: words.to_vec(),
        });
        self
    }

    /// Append a data block and return its index.
    pub fn add_data(&mut self, bytes: &[u8]) -> i32 {
        self.push_block(FixtureBlock::Plain {
            bytes: bytes.to_vec(),
            declared_size: None,
        })
    }

    /// Append a data block whose uncompressed size field lies.
    pub fn add_data_with_declared_size(&mut self, bytes: &[u8], declared_size: i32) -> i32 {
        self.push_block(FixtureBlock::Plain {
            bytes: bytes.to_vec(),
            declared_size: Some(declared_size),
        })
    }

    /// Append pre-encoded block bytes.
    pub fn add_stored_data(&mut self, bytes: &[u8], declared_size: i32) -> i32 {
        self.push_block(FixtureBlock::Stored {
            bytes: bytes.to_vec(),
            declared_size,
        })
    }

    fn push_block(&mut self, block: FixtureBlock) -> i32 {
        self.blocks.push(block);
        (self.blocks.len() - 1) as i32
    }

    /// Serialize to datafile bytes.
    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut order: Vec<&FixtureItem> = self.items.iter().collect();
        order.sort_by_key(|item| item.type_id);

        let mut runs: Vec<(u16, i32, i32)> = Vec::new();
        for (index, item) in order.iter().enumerate() {
            match runs.last_mut() {
                Some(run) if run.0 == item.type_id => run.2 += 1,
                _ => runs.push((item.type_id, index as i32, 1)),
            }
        }

        let mut item_pool = Vec::new();
        let mut item_offsets = Vec::with_capacity(order.len());
        for item in &order {
            item_offsets.push(item_pool.len() as i32);
            put(&mut item_pool, (i32::from(item.type_id) << 16) | i32::from(item.id));
            put(&mut item_pool, (item.words.len() * 4) as i32);
            for &word in &item.words {
                put(&mut item_pool, word);
            }
        }

        let mut data_pool = Vec::new();
        let mut data_offsets = Vec::with_capacity(self.blocks.len());
        let mut data_sizes = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            data_offsets.push(data_pool.len() as i32);
            match block {
                FixtureBlock::Plain {
                    bytes,
                    declared_size,
                } => {
                    data_sizes.push(declared_size.unwrap_or(bytes.len() as i32));
                    if self.version == 4 {
                        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                        encoder.write_all(bytes)?;
                        data_pool.extend_from_slice(&encoder.finish()?);
                    } else {
                        data_pool.extend_from_slice(bytes);
                    }
                }
                FixtureBlock::Stored {
                    bytes,
                    declared_size,
                } => {
                    data_sizes.push(*declared_size);
                    data_pool.extend_from_slice(bytes);
                }
            }
        }

        let mut tables = Vec::new();
        for &(type_id, start, num) in &runs {
            put(&mut tables, i32::from(type_id));
            put(&mut tables, start);
            put(&mut tables, num);
        }
        item_offsets.iter().for_each(|&v| put(&mut tables, v));
        data_offsets.iter().for_each(|&v| put(&mut tables, v));
        if self.version == 4 {
            data_sizes.iter().for_each(|&v| put(&mut tables, v));
        }

        let swap_end = RawHeader::SIZE + tables.len() + item_pool.len();
        let file_len = swap_end + data_pool.len();

        let mut out = Vec::with_capacity(file_len);
        out.extend_from_slice(&self.magic);
        put(&mut out, self.version);
        put(&mut out, (file_len - RawHeader::SIZE_OFFSET) as i32);
        put(&mut out, (swap_end - RawHeader::SIZE_OFFSET) as i32);
        put(&mut out, runs.len() as i32);
        put(&mut out, order.len() as i32);
        put(&mut out, self.blocks.len() as i32);
        put(&mut out, item_pool.len() as i32);
        put(&mut out, data_pool.len() as i32);
        out.extend_from_slice(&tables);
        out.extend_from_slice(&item_pool);
        out.extend_from_slice(&data_pool);

        Ok(out)
    }
}

impl Default for DatafileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn put(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

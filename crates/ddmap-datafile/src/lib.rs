//! Reader for the Teeworlds/DDNet datafile container.
//!
//! Map files (`.map`) are datafiles: a generic container of typed items and
//! compressed data blocks. This crate resolves the container without
//! interpreting item payloads; map semantics live in the `ddmap` crate.
//!
//! # File Format
//!
//! All words are little-endian 32-bit integers.
//!
//! - 4 bytes: Magic (`DATA`, or `ATAD` from big-endian writers)
//! - Header words: version, size, swaplen, item type count, item count,
//!   data block count, item pool size, data pool size
//! - Item type table: `(type_id, start, num)` per run
//! - Item offsets: one word per item, relative to the item pool
//! - Data offsets: one word per block, relative to the data pool
//! - Version 4 only: uncompressed size per block
//! - Item pool: `type_id << 16 | id`, payload size, payload words
//! - Data pool: blocks, zlib-compressed in version 4, raw in version 3
//!
//! # Example
//!
//! ```no_run
//! use ddmap_datafile::Datafile;
//!
//! let bytes = std::fs::read("Kobra 4.map")?;
//! let file = Datafile::parse(&bytes)?;
//!
//! for item in file.items() {
//!     println!("type {} id {}: {} words", item.type_id(), item.id(), item.len_words());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod datafile;
mod error;
mod limits;
mod reader;

pub mod decompress;
pub mod header;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

pub use datafile::{Datafile, Item, ItemTypeEntry};
pub use error::{Error, Result};
pub use header::{DatafileHeader, Version};
pub use limits::Limits;
pub use reader::BinaryReader;

//! Bounds-checked cursor over the raw datafile bytes.

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::{Error, Result};

/// A cursor that reads little-endian values from a byte slice without copying.
///
/// Every read is bounds-checked; running off the end yields
/// [`Error::TruncatedFile`] with the absolute number of bytes that would have
/// been needed.
///
/// # Example
///
/// ```
/// use ddmap_datafile::BinaryReader;
///
/// let data = [0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_i32().unwrap(), 1);
/// assert_eq!(reader.read_i32().unwrap(), -1);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::TruncatedFile {
                needed: self.position.saturating_add(count),
                available: self.data.len(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_bytes(4).map(LittleEndian::read_i32)
    }

    /// Read `count` consecutive little-endian i32 values.
    pub fn read_i32_array(&mut self, count: usize) -> Result<Vec<i32>> {
        let len = count.checked_mul(4).ok_or(Error::TruncatedFile {
            needed: usize::MAX,
            available: self.data.len(),
        })?;
        let bytes = self.read_bytes(len)?;
        let mut values = vec![0i32; count];
        LittleEndian::read_i32_into(bytes, &mut values);
        Ok(values)
    }

    /// Read a struct using zerocopy.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::TruncatedFile {
            needed: self.position,
            available: self.data.len(),
        })
    }
}

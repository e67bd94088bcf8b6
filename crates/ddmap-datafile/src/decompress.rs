//! Decompression of datafile data blocks.

use std::io::{self, Read};

use flate2::read::ZlibDecoder;

/// Inflate a zlib stream that must produce exactly `expected_size` bytes.
///
/// At most `expected_size + 1` bytes are ever produced, so a stream that
/// inflates past its declared size is detected without unbounded allocation.
pub fn decompress_zlib_sized(data: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size);
    ZlibDecoder::new(data)
        .take(expected_size as u64 + 1)
        .read_to_end(&mut output)?;

    if output.len() != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "inflated to {} bytes, expected {}",
                output.len(),
                expected_size
            ),
        ));
    }

    Ok(output)
}

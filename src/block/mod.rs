//! The raw Snappy block codec: a varint length prefix followed by tagged
//! literal and copy opcodes.

pub(crate) mod compress;
pub(crate) mod decompress;

pub use compress::{compress_with_context, max_compressed_length, CompressionContext};
pub use decompress::{decompress_into, get_uncompressed_length};

use crate::errors::{Error, Result};

/// One-shot compression. Allocates the worst-case buffer and trims it to the
/// bytes written.
///
/// Fails only for inputs whose length does not fit the 32-bit prefix.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let mut ctx = CompressionContext::new();
    let mut out = vec![0u8; max_compressed_length(input.len())];
    let written = compress_with_context(input, &mut out, &mut ctx)?;
    out.truncate(written);
    Ok(out)
}

/// Compresses into a caller-supplied buffer with a throwaway scratch table.
/// Callers compressing repeatedly should hold a [`CompressionContext`] and
/// use [`compress_with_context`] instead.
pub fn compress_into(input: &[u8], output: &mut [u8]) -> Result<usize> {
    compress_with_context(input, output, &mut CompressionContext::new())
}

/// One-shot decompression. Reads the declared length, allocates exactly that
/// much, and verifies the block fills it.
pub fn uncompress(input: &[u8]) -> Result<Vec<u8>> {
    let (declared, _) = get_uncompressed_length(input)?;
    let mut out = vec![0u8; declared as usize];
    let written = decompress_into(input, &mut out)?;
    if written != declared as usize {
        return Err(Error::corruption(
            input.len(),
            format!("decoded {} bytes, header declared {}", written, declared),
        ));
    }
    Ok(out)
}

/// Decompresses into a caller-supplied buffer, returning the bytes written.
pub fn uncompress_into(input: &[u8], output: &mut [u8]) -> Result<usize> {
    decompress_into(input, output)
}

//! Snappy block compression plus the two stream formats that frame it: the
//! standard `x-snappy-framed` format and the older `"snappy\0"` stream.
//!
//! The block API ([`compress`], [`uncompress`]) works on whole byte slices;
//! the stream types ([`FramedWriter`], [`FramedReader`], [`LegacyWriter`],
//! [`LegacyReader`]) implement [`std::io::Write`]/[`std::io::Read`] and
//! segment data into checksummed chunks. [`detect_reader`] picks the right
//! reader for a stream of unknown format.
//!
//! ```no_run
//! use std::io::{Read, Write};
//!
//! # fn main() -> snappy_framed::Result<()> {
//! let mut encoded = Vec::new();
//! let mut writer = snappy_framed::FramedWriter::new(&mut encoded)?;
//! writer.write_all(b"some bytes worth keeping")?;
//! writer.finish()?;
//! drop(writer);
//!
//! let mut decoded = Vec::new();
//! let mut reader = snappy_framed::FramedReader::new(&encoded[..], true)?;
//! reader.read_to_end(&mut decoded)?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate lazy_static;

mod block;
mod byte_util;
mod checksum;
pub mod errors;
mod pool;
mod stream;
mod varint;

pub use block::{
    compress, compress_into, compress_with_context, get_uncompressed_length,
    max_compressed_length, uncompress, uncompress_into, CompressionContext,
};
pub use checksum::masked_crc32c;
pub use errors::{Error, Result};
pub use pool::{default_pool, BufferPool, CachingPool, NoopPool};
pub use stream::{
    detect_reader, Framed, FramedReader, FramedWriter, Legacy, LegacyReader, LegacyWriter,
    SnappyReader, WireFormat, WriterConfig,
};

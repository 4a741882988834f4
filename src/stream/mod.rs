//! Stream framing: segmentation of user bytes into checksummed chunks and
//! reassembly on the way back.
//!
//! Two wire formats share one reader and one writer skeleton. The standard
//! `x-snappy-framed` format carries a little-endian 24-bit chunk length and
//! stores the checksum as the first four payload bytes; the legacy format
//! carries a big-endian 16-bit length with the checksum inside the chunk
//! header. Everything else — buffering, the ratio decision, checksum
//! verification, close semantics — is common.

pub(crate) mod read;
pub(crate) mod write;

use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::{Buf, BufMut};

use crate::errors::{Error, Result};

pub use read::{FramedReader, LegacyReader};
pub use write::{FramedWriter, LegacyWriter, WriterConfig};

/// `0xff 0x06 0x00 0x00` followed by "sNaPpY": a stream-identifier chunk.
pub(crate) const FRAMED_STREAM_HEADER: [u8; 10] =
    [0xFF, 0x06, 0x00, 0x00, b's', b'N', b'a', b'P', b'p', b'Y'];
pub(crate) const FRAMED_STREAM_BODY: [u8; 6] = *b"sNaPpY";
pub(crate) const LEGACY_STREAM_HEADER: [u8; 7] = *b"snappy\0";

pub(crate) const COMPRESSED_DATA_FLAG: u8 = 0x00;
pub(crate) const UNCOMPRESSED_DATA_FLAG: u8 = 0x01;
pub(crate) const STREAM_IDENTIFIER_FLAG: u8 = 0xFF;

pub(crate) const MAX_FRAME_HEADER_SIZE: usize = 7;
pub(crate) const MAX_STREAM_HEADER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameAction {
    /// Deliver the payload bytes as they are.
    Raw,
    /// Decompress the payload before delivering.
    Uncompress,
    /// Consume and drop the payload.
    Skip,
    /// Consume the payload and require it to match the stream-identifier
    /// body; repeated identifiers act as resynchronization markers.
    Identifier,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameMeta {
    pub(crate) flag: u8,
    pub(crate) action: FrameAction,
    pub(crate) length: usize,
}

/// Where a data chunk keeps its checksum and where its payload begins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameCrc {
    pub(crate) checksum: u32,
    pub(crate) payload_start: usize,
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Framed {}
    impl Sealed for super::Legacy {}
}

/// The per-format half of the stream layer: header shapes and limits. Two
/// implementations exist and the trait is sealed; everything stateful lives
/// in the shared reader/writer.
pub trait WireFormat: private::Sealed {
    #[doc(hidden)]
    const STREAM_HEADER: &'static [u8];
    #[doc(hidden)]
    const FRAME_HEADER_SIZE: usize;
    #[doc(hidden)]
    const MAX_BLOCK_SIZE: usize;
    #[doc(hidden)]
    const DEFAULT_MIN_COMPRESSION_RATIO: f64;

    #[doc(hidden)]
    fn parse_frame_header(header: &[u8]) -> Result<FrameMeta>;

    /// Only called for `Raw`/`Uncompress` frames, whose payload is always
    /// long enough to hold the checksum.
    #[doc(hidden)]
    fn extract_crc(header: &[u8], payload: &[u8]) -> FrameCrc;

    #[doc(hidden)]
    fn write_block<W: Write>(
        sink: &mut W,
        payload: &[u8],
        compressed: bool,
        crc: u32,
    ) -> io::Result<()>;
}

/// The `x-snappy-framed` wire format.
#[derive(Debug)]
pub enum Framed {}

/// The `"snappy\0"` stream format that predates `x-snappy-framed`.
#[derive(Debug)]
pub enum Legacy {}

impl WireFormat for Framed {
    const STREAM_HEADER: &'static [u8] = &FRAMED_STREAM_HEADER;
    const FRAME_HEADER_SIZE: usize = 4;
    const MAX_BLOCK_SIZE: usize = 65536;
    const DEFAULT_MIN_COMPRESSION_RATIO: f64 = 0.85;

    fn parse_frame_header(header: &[u8]) -> Result<FrameMeta> {
        let flag = header[0];
        let length = (&header[1..4]).get_uint_le(3) as u32;
        let (action, min_length) = match flag {
            COMPRESSED_DATA_FLAG => (FrameAction::Uncompress, 5),
            UNCOMPRESSED_DATA_FLAG => (FrameAction::Raw, 5),
            STREAM_IDENTIFIER_FLAG => {
                if length != FRAMED_STREAM_BODY.len() as u32 {
                    return Err(Error::InvalidChunkLength { flag, length });
                }
                (FrameAction::Identifier, 6)
            }
            // Reserved unskippable chunks.
            0x02..=0x7F => return Err(Error::UnsupportedChunk { flag }),
            // What remains is the reserved skippable range 0x80..=0xfe.
            _ => (FrameAction::Skip, 0),
        };
        if length < min_length {
            return Err(Error::InvalidChunkLength { flag, length });
        }
        Ok(FrameMeta {
            flag,
            action,
            length: length as usize,
        })
    }

    fn extract_crc(_header: &[u8], payload: &[u8]) -> FrameCrc {
        FrameCrc {
            checksum: (&payload[..4]).get_u32_le(),
            payload_start: 4,
        }
    }

    fn write_block<W: Write>(
        sink: &mut W,
        payload: &[u8],
        compressed: bool,
        crc: u32,
    ) -> io::Result<()> {
        let mut header = [0u8; 8];
        {
            let mut cursor = &mut header[..];
            cursor.put_u8(if compressed {
                COMPRESSED_DATA_FLAG
            } else {
                UNCOMPRESSED_DATA_FLAG
            });
            // The stored length covers the checksum and the payload.
            cursor.put_uint_le(payload.len() as u64 + 4, 3);
            cursor.put_u32_le(crc);
        }
        sink.write_all(&header)?;
        sink.write_all(payload)
    }
}

impl WireFormat for Legacy {
    const STREAM_HEADER: &'static [u8] = &LEGACY_STREAM_HEADER;
    const FRAME_HEADER_SIZE: usize = 7;
    const MAX_BLOCK_SIZE: usize = 32768;
    const DEFAULT_MIN_COMPRESSION_RATIO: f64 = 7.0 / 8.0;

    fn parse_frame_header(header: &[u8]) -> Result<FrameMeta> {
        let flag = header[0];
        let length = (&header[1..3]).get_u16() as u32;
        let action = match flag {
            // Flags are reversed relative to x-snappy-framed.
            0x00 => FrameAction::Raw,
            0x01 => FrameAction::Uncompress,
            b's' => {
                // A whole stream header embedded mid-stream marks the start
                // of a concatenated stream; skip it.
                if header != LEGACY_STREAM_HEADER {
                    return Err(Error::UnsupportedChunk { flag });
                }
                return Ok(FrameMeta {
                    flag,
                    action: FrameAction::Skip,
                    length: 0,
                });
            }
            _ => return Err(Error::UnsupportedChunk { flag }),
        };
        if length == 0 || length > Self::MAX_BLOCK_SIZE as u32 {
            return Err(Error::InvalidChunkLength { flag, length });
        }
        Ok(FrameMeta {
            flag,
            action,
            length: length as usize,
        })
    }

    fn extract_crc(header: &[u8], _payload: &[u8]) -> FrameCrc {
        FrameCrc {
            checksum: (&header[3..7]).get_u32(),
            payload_start: 0,
        }
    }

    fn write_block<W: Write>(
        sink: &mut W,
        payload: &[u8],
        compressed: bool,
        crc: u32,
    ) -> io::Result<()> {
        let mut header = [0u8; 7];
        {
            let mut cursor = &mut header[..];
            cursor.put_u8(if compressed { 0x01 } else { 0x00 });
            cursor.put_u16(payload.len() as u16);
            cursor.put_u32(crc);
        }
        sink.write_all(&header)?;
        sink.write_all(payload)
    }
}

/// A reader of either stream format, picked by [`detect_reader`].
pub enum SnappyReader<R: Read> {
    Framed(FramedReader<R>),
    Legacy(LegacyReader<R>),
}

impl<R: Read> std::fmt::Debug for SnappyReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnappyReader::Framed(r) => f.debug_tuple("Framed").field(r).finish(),
            SnappyReader::Legacy(r) => f.debug_tuple("Legacy").field(r).finish(),
        }
    }
}

impl<R: Read> SnappyReader<R> {
    /// Bytes left in the current chunk.
    pub fn available(&self) -> usize {
        match self {
            SnappyReader::Framed(r) => r.available(),
            SnappyReader::Legacy(r) => r.available(),
        }
    }

    pub fn close(&mut self) {
        match self {
            SnappyReader::Framed(r) => r.close(),
            SnappyReader::Legacy(r) => r.close(),
        }
    }
}

impl<R: Read> Read for SnappyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SnappyReader::Framed(r) => r.read(buf),
            SnappyReader::Legacy(r) => r.read(buf),
        }
    }
}

/// Sniffs the stream format from the first header byte and returns the
/// matching reader. The source is rewound before the reader takes over, so
/// it must support seeking.
pub fn detect_reader<R: Read + Seek>(
    mut source: R,
    verify_checksums: bool,
) -> Result<SnappyReader<R>> {
    let start = source.stream_position()?;
    let mut header = [0u8; FRAMED_STREAM_HEADER.len()];
    let got = read_fully(&mut source, &mut header)?;
    source.seek(SeekFrom::Start(start))?;
    if got == 0 {
        return Err(Error::UnexpectedEof);
    }
    match header[0] {
        STREAM_IDENTIFIER_FLAG => Ok(SnappyReader::Framed(FramedReader::new(
            source,
            verify_checksums,
        )?)),
        b's' => Ok(SnappyReader::Legacy(LegacyReader::new(
            source,
            verify_checksums,
        )?)),
        _ => Err(Error::InvalidStreamHeader),
    }
}

/// Reads until `buf` is full or the source ends, returning the bytes read.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Discards exactly `len` bytes from the source.
pub(crate) fn skip_exact<R: Read>(reader: &mut R, len: usize) -> Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())?;
    if copied < len as u64 {
        return Err(Error::UnexpectedEof);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_header_parsing() {
        let meta = Framed::parse_frame_header(&[0x00, 0x17, 0x00, 0x00]).unwrap();
        assert_eq!(meta.action, FrameAction::Uncompress);
        assert_eq!(meta.length, 0x17);

        let meta = Framed::parse_frame_header(&[0x01, 0x05, 0x00, 0x00]).unwrap();
        assert_eq!(meta.action, FrameAction::Raw);

        let meta = Framed::parse_frame_header(&[0xFF, 0x06, 0x00, 0x00]).unwrap();
        assert_eq!(meta.action, FrameAction::Identifier);

        let meta = Framed::parse_frame_header(&[0x80, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(meta.action, FrameAction::Skip);
        assert_eq!(meta.length, 0);
    }

    #[test]
    fn framed_data_chunk_must_hold_crc_and_a_byte() {
        let err = Framed::parse_frame_header(&[0x00, 0x04, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidChunkLength { flag: 0x00, length: 4 }
        ));
    }

    #[test]
    fn framed_identifier_length_is_fixed() {
        let err = Framed::parse_frame_header(&[0xFF, 0x07, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkLength { flag: 0xFF, .. }));
    }

    #[test]
    fn framed_unskippable_range() {
        for flag in [0x02u8, 0x40, 0x7F] {
            let err = Framed::parse_frame_header(&[flag, 0x05, 0x00, 0x00]).unwrap_err();
            assert!(matches!(err, Error::UnsupportedChunk { flag: f } if f == flag));
        }
    }

    #[test]
    fn legacy_header_parsing() {
        let meta = Legacy::parse_frame_header(&[0x01, 0x00, 0x13, 0, 0, 0, 0]).unwrap();
        assert_eq!(meta.action, FrameAction::Uncompress);
        assert_eq!(meta.length, 0x13);

        let meta = Legacy::parse_frame_header(&LEGACY_STREAM_HEADER).unwrap();
        assert_eq!(meta.action, FrameAction::Skip);
        assert_eq!(meta.length, 0);
    }

    #[test]
    fn legacy_rejects_zero_and_oversized_blocks() {
        let err = Legacy::parse_frame_header(&[0x00, 0x00, 0x00, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkLength { length: 0, .. }));
        // 55555 > 32768.
        let err = Legacy::parse_frame_header(&[0x00, 0xD9, 0x03, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkLength { length: 55555, .. }));
    }

    #[test]
    fn legacy_rejects_unknown_flags() {
        let err = Legacy::parse_frame_header(&[b'A', 0x00, 0x01, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChunk { flag: 0x41 }));
        // 's' that is not a full stream header is just as invalid.
        let err = Legacy::parse_frame_header(&[b's', b'n', b'a', b'p', b'p', b'z', 0]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChunk { flag: 0x73 }));
    }

    #[test]
    fn crc_extraction() {
        let payload = [0xA8, 0xCD, 0x74, 0x92, b'x'];
        let crc = Framed::extract_crc(&[0x00, 0x05, 0x00, 0x00], &payload);
        assert_eq!(crc.checksum, 0x9274_CDA8);
        assert_eq!(crc.payload_start, 4);

        let header = [0x01, 0x00, 0x13, 0x92, 0x74, 0xCD, 0xA8];
        let crc = Legacy::extract_crc(&header, &[]);
        assert_eq!(crc.checksum, 0x9274_CDA8);
        assert_eq!(crc.payload_start, 0);
    }
}

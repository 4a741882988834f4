use std::io::{self, Read};
use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;

use crate::block;
use crate::checksum::masked_crc32c;
use crate::errors::{Error, Result};
use crate::pool::{default_pool, BufferPool};
use crate::stream::{
    read_fully, skip_exact, FrameAction, Framed, Legacy, WireFormat, FRAMED_STREAM_BODY,
    MAX_FRAME_HEADER_SIZE, MAX_STREAM_HEADER_SIZE,
};

/// Decodes a framed `x-snappy-framed` stream.
pub type FramedReader<R> = StreamReader<R, Framed>;

/// Decodes a legacy `"snappy\0"` stream.
pub type LegacyReader<R> = StreamReader<R, Legacy>;

/// The shared chunk-reader skeleton behind both formats.
///
/// Reads one chunk ahead of the caller: a `read` that finds the current
/// chunk exhausted pulls the next header, dispatches on its flag, fills the
/// frame buffer, decompresses if needed, and verifies the checksum. Scratch
/// buffers come from the pool at construction, grow to the largest chunk
/// seen, and go back to the pool on close.
pub struct StreamReader<R: Read, F: WireFormat> {
    inner: R,
    pool: Arc<dyn BufferPool>,
    verify_checksums: bool,
    max_frame_size: usize,
    header_buf: [u8; MAX_FRAME_HEADER_SIZE],
    /// Raw frame bytes as read from the source.
    frame: Option<Vec<u8>>,
    /// Decompressed bytes of the current frame, when it was compressed.
    decoded: Option<Vec<u8>>,
    /// Whether the bytes being delivered live in `decoded` or in `frame`.
    delivering_decoded: bool,
    position: usize,
    valid: usize,
    eof: bool,
    closed: bool,
    _format: PhantomData<F>,
}

impl<R: Read, F: WireFormat> std::fmt::Debug for StreamReader<R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("verify_checksums", &self.verify_checksums)
            .field("max_frame_size", &self.max_frame_size)
            .field("position", &self.position)
            .field("valid", &self.valid)
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<R: Read> StreamReader<R, Framed> {
    /// Reads and validates the stream identifier before returning.
    pub fn new(inner: R, verify_checksums: bool) -> Result<Self> {
        Self::with_pool(inner, verify_checksums, default_pool())
    }

    pub fn with_pool(inner: R, verify_checksums: bool, pool: Arc<dyn BufferPool>) -> Result<Self> {
        Self::open(inner, verify_checksums, pool)
    }

    /// Caps the declared length this reader will buffer for a single chunk,
    /// guarding against memory-exhaustion via forged headers. The wire
    /// format's own limit is 16 MiB.
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.max_frame_size = limit;
        self
    }
}

impl<R: Read> StreamReader<R, Legacy> {
    /// Reads and validates the `"snappy\0"` header before returning.
    pub fn new(inner: R, verify_checksums: bool) -> Result<Self> {
        Self::with_pool(inner, verify_checksums, default_pool())
    }

    pub fn with_pool(inner: R, verify_checksums: bool, pool: Arc<dyn BufferPool>) -> Result<Self> {
        Self::open(inner, verify_checksums, pool)
    }
}

impl<R: Read, F: WireFormat> StreamReader<R, F> {
    fn open(mut inner: R, verify_checksums: bool, pool: Arc<dyn BufferPool>) -> Result<Self> {
        let mut actual = [0u8; MAX_STREAM_HEADER_SIZE];
        let expected = F::STREAM_HEADER;
        let actual = &mut actual[..expected.len()];
        if read_fully(&mut inner, actual)? < expected.len() {
            return Err(Error::UnexpectedEof);
        }
        if &*actual != expected {
            return Err(Error::InvalidStreamHeader);
        }

        // Sized for a full uncompressed block plus its checksum; compressed
        // chunks that expand past this grow the buffer on demand.
        let initial = F::MAX_BLOCK_SIZE + 5;
        Ok(StreamReader {
            inner,
            frame: Some(pool.alloc_input(initial)),
            decoded: Some(pool.alloc_decode(initial)),
            pool,
            verify_checksums,
            max_frame_size: usize::MAX,
            header_buf: [0u8; MAX_FRAME_HEADER_SIZE],
            delivering_decoded: false,
            position: 0,
            valid: 0,
            eof: false,
            closed: false,
            _format: PhantomData,
        })
    }

    /// Bytes still deliverable from the current chunk.
    pub fn available(&self) -> usize {
        if self.closed {
            0
        } else {
            self.valid - self.position
        }
    }

    /// Releases the scratch buffers back to the pool. Safe to call any
    /// number of times; reads after close report end-of-stream.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(buf) = self.frame.take() {
            self.pool.release_input(buf);
        }
        if let Some(buf) = self.decoded.take() {
            self.pool.release_decode(buf);
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Advances past frames until bytes are deliverable. `Ok(false)` means a
    /// clean end of stream.
    fn ensure_buffer(&mut self) -> Result<bool> {
        loop {
            if self.position < self.valid {
                return Ok(true);
            }
            if self.eof {
                return Ok(false);
            }

            let header = &mut self.header_buf[..F::FRAME_HEADER_SIZE];
            match read_fully(&mut self.inner, header)? {
                0 => {
                    self.eof = true;
                    return Ok(false);
                }
                n if n < header.len() => return Err(Error::UnexpectedEof),
                _ => {}
            }

            let meta = F::parse_frame_header(header)?;
            trace!(
                "chunk flag {:#04x}, length {}, action {:?}",
                meta.flag,
                meta.length,
                meta.action
            );
            match meta.action {
                FrameAction::Skip => {
                    skip_exact(&mut self.inner, meta.length)?;
                    continue;
                }
                FrameAction::Identifier => {
                    let mut body = [0u8; FRAMED_STREAM_BODY.len()];
                    if read_fully(&mut self.inner, &mut body)? < body.len() {
                        return Err(Error::UnexpectedEof);
                    }
                    if body != FRAMED_STREAM_BODY {
                        return Err(Error::InvalidStreamHeader);
                    }
                    continue;
                }
                FrameAction::Raw | FrameAction::Uncompress => {}
            }
            if meta.length > self.max_frame_size {
                return Err(Error::InvalidChunkLength {
                    flag: meta.flag,
                    length: meta.length as u32,
                });
            }

            let frame = self.frame.as_mut().ok_or(Error::Closed)?;
            if meta.length > frame.len() {
                self.pool.release_input(std::mem::take(frame));
                *frame = self.pool.alloc_input(meta.length);
            }
            let frame = &mut frame[..meta.length];
            if read_fully(&mut self.inner, frame)? < meta.length {
                return Err(Error::UnexpectedEof);
            }

            let crc = F::extract_crc(&self.header_buf[..F::FRAME_HEADER_SIZE], frame);
            match meta.action {
                FrameAction::Uncompress => {
                    let compressed = &frame[crc.payload_start..];
                    let (declared, _) = block::get_uncompressed_length(compressed)?;
                    // Honest streams never declare more than a block; this
                    // stops forged prefixes from driving huge allocations.
                    if declared as usize > self.max_frame_size.max(F::MAX_BLOCK_SIZE) {
                        return Err(Error::InvalidChunkLength {
                            flag: meta.flag,
                            length: meta.length as u32,
                        });
                    }
                    let decoded = self.decoded.as_mut().ok_or(Error::Closed)?;
                    if declared as usize > decoded.len() {
                        self.pool.release_decode(std::mem::take(decoded));
                        *decoded = self.pool.alloc_decode(declared as usize);
                    }
                    self.valid = block::decompress_into(compressed, decoded)?;
                    self.position = 0;
                    self.delivering_decoded = true;
                }
                FrameAction::Raw => {
                    self.position = crc.payload_start;
                    self.valid = meta.length;
                    self.delivering_decoded = false;
                }
                _ => unreachable!(),
            }

            if self.verify_checksums {
                let data = self.current_bytes()?;
                let actual = masked_crc32c(data);
                if actual != crc.checksum {
                    return Err(Error::CorruptChecksum {
                        expected: crc.checksum,
                        actual,
                    });
                }
            }
            return Ok(true);
        }
    }

    fn current_bytes(&self) -> Result<&[u8]> {
        let buf = if self.delivering_decoded {
            self.decoded.as_ref()
        } else {
            self.frame.as_ref()
        };
        Ok(&buf.ok_or(Error::Closed)?[self.position..self.valid])
    }
}

impl<R: Read, F: WireFormat> Read for StreamReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed || buf.is_empty() {
            return Ok(0);
        }
        if !self.ensure_buffer().map_err(Error::into_io)? {
            return Ok(0);
        }
        let n = buf.len().min(self.valid - self.position);
        let src = self.current_bytes().map_err(Error::into_io)?;
        buf[..n].copy_from_slice(&src[..n]);
        self.position += n;
        Ok(n)
    }
}

impl<R: Read, F: WireFormat> Drop for StreamReader<R, F> {
    fn drop(&mut self) {
        self.close();
    }
}

use std::io::{self, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;

use crate::block::{compress_with_context, max_compressed_length, CompressionContext};
use crate::checksum::masked_crc32c;
use crate::errors::{Error, Result};
use crate::pool::{default_pool, BufferPool};
use crate::stream::{Framed, Legacy, WireFormat};

/// Emits an `x-snappy-framed` stream.
pub type FramedWriter<W> = StreamWriter<W, Framed>;

/// Emits a legacy `"snappy\0"` stream.
pub type LegacyWriter<W> = StreamWriter<W, Legacy>;

/// Tunables for a stream writer. Unset fields fall back to the format's
/// defaults (64 KiB blocks at ratio 0.85 framed, 32 KiB at 7/8 legacy).
#[derive(Default)]
pub struct WriterConfig {
    block_size: Option<usize>,
    min_compression_ratio: Option<f64>,
    pool: Option<Arc<dyn BufferPool>>,
}

impl WriterConfig {
    pub fn new() -> WriterConfig {
        WriterConfig::default()
    }

    /// Raw bytes buffered before a chunk is emitted.
    pub fn set_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// A block is written compressed only when `compressed_len / raw_len`
    /// stays at or below this ratio; otherwise the raw bytes go out.
    pub fn set_min_compression_ratio(mut self, ratio: f64) -> Self {
        self.min_compression_ratio = Some(ratio);
        self
    }

    pub fn set_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// The shared buffering skeleton behind both stream writers.
///
/// User bytes accumulate up to the block size; each full block (or explicit
/// flush) becomes one chunk: checksum over the raw bytes, a compression
/// attempt, and the format's header in front of whichever representation
/// won the ratio test. The stream header goes out at construction.
pub struct StreamWriter<W: Write, F: WireFormat> {
    inner: W,
    pool: Arc<dyn BufferPool>,
    ctx: CompressionContext,
    block_size: usize,
    min_compression_ratio: f64,
    write_checksums: bool,
    /// Accumulates raw user bytes up to `block_size`.
    buffer: Option<Vec<u8>>,
    /// Scratch for the per-block compression attempt.
    encoded: Option<Vec<u8>>,
    position: usize,
    closed: bool,
    _format: PhantomData<F>,
}

impl<W: Write> StreamWriter<W, Framed> {
    /// A framed writer with the default block size and ratio. Writes the
    /// stream identifier immediately.
    pub fn new(inner: W) -> Result<Self> {
        Self::with_config(inner, WriterConfig::new())
    }

    pub fn with_config(inner: W, config: WriterConfig) -> Result<Self> {
        Self::open(inner, config, true)
    }
}

impl<W: Write> StreamWriter<W, Legacy> {
    /// A legacy writer (32 KiB blocks, ratio 7/8). Writes the `"snappy\0"`
    /// header immediately.
    pub fn new(inner: W) -> Result<Self> {
        Self::with_config(inner, WriterConfig::new())
    }

    pub fn with_config(inner: W, config: WriterConfig) -> Result<Self> {
        Self::open(inner, config, true)
    }

    /// A legacy writer that stores zero checksums, for comparing against
    /// compressors that do not checksum at all.
    pub fn without_checksums(inner: W) -> Result<Self> {
        Self::open(inner, WriterConfig::new(), false)
    }
}

impl<W: Write, F: WireFormat> StreamWriter<W, F> {
    fn open(mut inner: W, config: WriterConfig, write_checksums: bool) -> Result<Self> {
        let block_size = config.block_size.unwrap_or(F::MAX_BLOCK_SIZE);
        if block_size == 0 || block_size > F::MAX_BLOCK_SIZE {
            return Err(Error::invalid_argument(format!(
                "block size {} outside (0, {}]",
                block_size,
                F::MAX_BLOCK_SIZE
            )));
        }
        let min_compression_ratio = config
            .min_compression_ratio
            .unwrap_or(F::DEFAULT_MIN_COMPRESSION_RATIO);
        if !(min_compression_ratio > 0.0 && min_compression_ratio <= 1.0) {
            return Err(Error::invalid_argument(format!(
                "min compression ratio {} outside (0, 1]",
                min_compression_ratio
            )));
        }
        let pool = config.pool.unwrap_or_else(default_pool);

        inner.write_all(F::STREAM_HEADER)?;

        Ok(StreamWriter {
            buffer: Some(pool.alloc_output(block_size)),
            encoded: Some(pool.alloc_encode(max_compressed_length(block_size))),
            pool,
            ctx: CompressionContext::new(),
            block_size,
            min_compression_ratio,
            write_checksums,
            inner,
            position: 0,
            closed: false,
            _format: PhantomData,
        })
    }

    /// Emits any buffered bytes, flushes the sink, and releases the scratch
    /// buffers. Idempotent; the first call's result stands.
    pub fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self
            .flush_buffer()
            .and_then(|_| self.inner.flush().map_err(Error::from));
        self.closed = true;
        if let Some(buf) = self.buffer.take() {
            self.pool.release_output(buf);
        }
        if let Some(buf) = self.encoded.take() {
            self.pool.release_encode(buf);
        }
        result
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Compresses and writes out the buffered bytes, if any.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.position == 0 {
            return Ok(());
        }
        let buffer = self.buffer.as_ref().ok_or(Error::Closed)?;
        let encoded = self.encoded.as_mut().ok_or(Error::Closed)?;
        emit_block::<W, F>(
            &mut self.inner,
            &mut self.ctx,
            encoded,
            &buffer[..self.position],
            self.min_compression_ratio,
            self.write_checksums,
        )?;
        self.position = 0;
        Ok(())
    }

    fn write_inner(&mut self, input: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }

        let buffer = self.buffer.as_mut().ok_or(Error::Closed)?;
        let free = self.block_size - self.position;

        // Enough room for everything: just buffer it.
        if free >= input.len() {
            buffer[self.position..self.position + input.len()].copy_from_slice(input);
            self.position += input.len();
            return Ok(input.len());
        }

        // Top up and drain the partial block first.
        let mut offset = 0;
        if self.position > 0 {
            buffer[self.position..self.block_size].copy_from_slice(&input[..free]);
            self.position = self.block_size;
            self.flush_buffer()?;
            offset = free;
        }

        // Whole blocks go out straight from the caller's slice.
        while input.len() - offset >= self.block_size {
            let encoded = self.encoded.as_mut().ok_or(Error::Closed)?;
            emit_block::<W, F>(
                &mut self.inner,
                &mut self.ctx,
                encoded,
                &input[offset..offset + self.block_size],
                self.min_compression_ratio,
                self.write_checksums,
            )?;
            offset += self.block_size;
        }

        // The tail lands in the now-empty buffer.
        let buffer = self.buffer.as_mut().ok_or(Error::Closed)?;
        buffer[..input.len() - offset].copy_from_slice(&input[offset..]);
        self.position = input.len() - offset;
        Ok(input.len())
    }
}

fn emit_block<W: Write, F: WireFormat>(
    sink: &mut W,
    ctx: &mut CompressionContext,
    encoded: &mut [u8],
    data: &[u8],
    min_compression_ratio: f64,
    write_checksums: bool,
) -> Result<()> {
    // The checksum always covers the raw user bytes, whichever
    // representation goes out.
    let crc = if write_checksums {
        masked_crc32c(data)
    } else {
        0
    };
    let compressed_len = compress_with_context(data, encoded, ctx)?;
    let compressed = (compressed_len as f64) / (data.len() as f64) <= min_compression_ratio;
    trace!(
        "block of {} bytes -> {} compressed, emitting {}",
        data.len(),
        compressed_len,
        if compressed { "compressed" } else { "raw" }
    );
    if compressed {
        F::write_block(sink, &encoded[..compressed_len], true, crc)?;
    } else {
        F::write_block(sink, data, false, crc)?;
    }
    Ok(())
}

impl<W: Write, F: WireFormat> Write for StreamWriter<W, F> {
    fn write(&mut self, input: &[u8]) -> io::Result<usize> {
        self.write_inner(input).map_err(Error::into_io)
    }

    /// Forces the buffered partial block out as its own chunk and flushes
    /// the sink. A no-op at the framing layer when nothing is buffered.
    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(Error::Closed.into_io());
        }
        self.flush_buffer().map_err(Error::into_io)?;
        self.inner.flush()
    }
}

impl<W: Write, F: WireFormat> Drop for StreamWriter<W, F> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

//! Variable-size reads on top of a fixed-block producer.

use super::{FixedBlockAdapter, FixedBlockProcessor};
use crate::BlockError;

/// Serves reads of any size from a processor that only produces whole blocks.
///
/// Reads of at least one block go straight into the caller's buffer; the
/// tail of a request is served from a staged block, and whatever is left of
/// that block is handed out by the next `read`.
///
/// # Example
///
/// ```
/// use stream_transport::{BlockError, FixedBlockProcessor, FixedBlockReader};
///
/// struct Zeros;
///
/// impl FixedBlockProcessor for Zeros {
///     fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError> {
///         block.fill(0);
///         Ok(block.len())
///     }
/// }
///
/// let mut reader = FixedBlockReader::new(Zeros);
/// reader.open(64)?;
/// let mut buf = [1u8; 100];
/// assert_eq!(reader.read(&mut buf)?, 100);
/// # Ok::<(), BlockError>(())
/// ```
pub struct FixedBlockReader<P> {
    adapter: FixedBlockAdapter,
    processor: P,
}

impl<P: FixedBlockProcessor> FixedBlockReader<P> {
    /// Creates a closed reader around `processor`.
    pub fn new(processor: P) -> Self {
        Self {
            adapter: FixedBlockAdapter::new(),
            processor,
        }
    }

    /// Opens the reader with the given block size, discarding staged data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockSize` if `block_size` is zero.
    pub fn open(&mut self, block_size: usize) -> Result<(), BlockError> {
        self.adapter.open(block_size)
    }

    /// Closes the reader and releases its staging buffer.
    pub fn close(&mut self) {
        self.adapter.close();
    }

    /// Returns the shared adapter state.
    pub fn adapter(&self) -> &FixedBlockAdapter {
        &self.adapter
    }

    /// Returns the number of staged bytes not yet read.
    pub fn staged(&self) -> usize {
        self.adapter.valid_len - self.adapter.position
    }

    /// Returns a reference to the processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Consumes the reader and returns the processor.
    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes read. A value smaller than `buf.len()`
    /// means the processor reached the end of its stream. Short blocks from
    /// the processor are not terminal; only a block of zero bytes is.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` if the reader is closed, or the processor's error
    /// unchanged. Bytes copied into `buf` before the error are not reported.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, BlockError> {
        self.adapter.ensure_open()?;
        let block_size = self.adapter.block_size;
        let mut served = 0;

        while served < buf.len() {
            let adapter = &mut self.adapter;

            if adapter.position < adapter.valid_len {
                let n = (buf.len() - served).min(adapter.valid_len - adapter.position);
                buf[served..served + n]
                    .copy_from_slice(&adapter.staging[adapter.position..adapter.position + n]);
                adapter.position += n;
                served += n;
                continue;
            }

            let got = if buf.len() - served >= block_size {
                let got = self
                    .processor
                    .process_fixed_block(&mut buf[served..served + block_size])?
                    .min(block_size);
                served += got;
                got
            } else {
                let got = self
                    .processor
                    .process_fixed_block(&mut adapter.staging[..block_size])?
                    .min(block_size);
                adapter.position = 0;
                adapter.valid_len = got;
                got
            };

            if got == 0 {
                break;
            }
        }

        Ok(served)
    }
}

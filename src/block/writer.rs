//! Variable-size writes on top of a fixed-block consumer.

use super::{FixedBlockAdapter, FixedBlockProcessor};
use crate::BlockError;

/// Accepts writes of any size and forwards them to a processor in whole blocks.
///
/// Whole blocks are handed to the processor directly from the caller's
/// buffer, which is why `write` takes `&mut [u8]`: processors such as
/// in-place encoders are allowed to scribble over the block they are given.
/// A trailing partial block is staged until a later write completes it or
/// [`close`](Self::close) flushes it zero-padded.
///
/// # Example
///
/// ```
/// use stream_transport::{BlockError, FixedBlockProcessor, FixedBlockWriter};
///
/// #[derive(Default)]
/// struct Collect(Vec<u8>);
///
/// impl FixedBlockProcessor for Collect {
///     fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError> {
///         self.0.extend_from_slice(block);
///         Ok(block.len())
///     }
/// }
///
/// let mut writer = FixedBlockWriter::new(Collect::default());
/// writer.open(4)?;
/// writer.write(&mut [1, 2, 3, 4, 5, 6])?;
/// assert_eq!(writer.close()?, 2);
/// assert_eq!(writer.into_processor().0, vec![1, 2, 3, 4, 5, 6, 0, 0]);
/// # Ok::<(), BlockError>(())
/// ```
pub struct FixedBlockWriter<P> {
    adapter: FixedBlockAdapter,
    processor: P,
}

impl<P: FixedBlockProcessor> FixedBlockWriter<P> {
    /// Creates a closed writer around `processor`.
    pub fn new(processor: P) -> Self {
        Self {
            adapter: FixedBlockAdapter::new(),
            processor,
        }
    }

    /// Opens the writer with the given block size.
    ///
    /// Any staged bytes from a previous session are discarded; call
    /// [`close`](Self::close) first to flush them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockSize` if `block_size` is zero.
    pub fn open(&mut self, block_size: usize) -> Result<(), BlockError> {
        self.adapter.open(block_size)
    }

    /// Returns the shared adapter state.
    pub fn adapter(&self) -> &FixedBlockAdapter {
        &self.adapter
    }

    /// Returns the number of bytes staged towards the next block.
    pub fn pending(&self) -> usize {
        self.adapter.position
    }

    /// Returns a reference to the processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Consumes the writer and returns the processor.
    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Writes all of `buf`, flushing every completed block.
    ///
    /// Returns the number of bytes accepted, which is `buf.len()` unless an
    /// error occurs.
    ///
    /// # Errors
    ///
    /// - `NotOpen` if the writer is closed
    /// - `ShortWrite` if the processor accepted only part of a staged block
    /// - `Stalled` if the processor accepted nothing of a direct block
    /// - the processor's own error, unchanged
    pub fn write(&mut self, buf: &mut [u8]) -> Result<usize, BlockError> {
        self.adapter.ensure_open()?;
        let block_size = self.adapter.block_size;
        let adapter = &mut self.adapter;
        let mut consumed = 0;

        if adapter.position > 0 {
            let n = (block_size - adapter.position).min(buf.len());
            adapter.staging[adapter.position..adapter.position + n].copy_from_slice(&buf[..n]);
            adapter.position += n;
            consumed = n;

            if adapter.position == block_size {
                adapter.position = 0;
                let written = self
                    .processor
                    .process_fixed_block(&mut adapter.staging[..block_size])?;
                if written < block_size {
                    return Err(BlockError::ShortWrite {
                        expected: block_size,
                        written,
                    });
                }
            }
        }

        while buf.len() - consumed >= block_size {
            let written = self
                .processor
                .process_fixed_block(&mut buf[consumed..consumed + block_size])?;
            if written == 0 {
                return Err(BlockError::Stalled);
            }
            consumed += written.min(block_size);
        }

        let remainder = buf.len() - consumed;
        if remainder > 0 {
            let start = adapter.position;
            adapter.staging[start..start + remainder].copy_from_slice(&buf[consumed..]);
            adapter.position += remainder;
        }

        Ok(buf.len())
    }

    /// Flushes any staged partial block, zero-padded to the block size, and
    /// closes the writer.
    ///
    /// Returns the number of payload bytes that were flushed. Closing a
    /// writer that is not open returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns `ShortWrite` or the processor's error if the final flush
    /// fails; the writer is closed either way.
    pub fn close(&mut self) -> Result<usize, BlockError> {
        if !self.adapter.is_open() {
            return Ok(0);
        }
        let block_size = self.adapter.block_size;
        let pending = self.adapter.position;

        let result = if pending > 0 {
            self.adapter.staging[pending..block_size].fill(0);
            match self
                .processor
                .process_fixed_block(&mut self.adapter.staging[..block_size])
            {
                Ok(written) if written < block_size => Err(BlockError::ShortWrite {
                    expected: block_size,
                    written,
                }),
                Ok(_) => Ok(pending),
                Err(e) => Err(e),
            }
        } else {
            Ok(0)
        };

        self.adapter.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::test_support::VecConsumer;

    fn bytes(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_write_requires_open() {
        let mut writer = FixedBlockWriter::new(VecConsumer::new());
        assert!(matches!(
            writer.write(&mut [1, 2, 3]),
            Err(BlockError::NotOpen)
        ));
    }

    #[test]
    fn test_small_writes_are_staged_until_block_completes() {
        let mut writer = FixedBlockWriter::new(VecConsumer::new());
        writer.open(8).unwrap();

        assert_eq!(writer.write(&mut [1, 2, 3]).unwrap(), 3);
        assert_eq!(writer.pending(), 3);
        assert!(writer.processor().calls.is_empty());

        assert_eq!(writer.write(&mut [4, 5, 6, 7, 8, 9]).unwrap(), 6);
        assert_eq!(writer.processor().calls, vec![8]);
        assert_eq!(writer.processor().data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(writer.pending(), 1);
    }

    #[test]
    fn test_full_blocks_are_written_directly() {
        let mut writer = FixedBlockWriter::new(VecConsumer::new());
        writer.open(4).unwrap();

        let mut data = bytes(10);
        assert_eq!(writer.write(&mut data).unwrap(), 10);
        assert_eq!(writer.processor().calls, vec![4, 4]);
        assert_eq!(writer.pending(), 2);
    }

    #[test]
    fn test_exact_block_is_not_staged() {
        let mut writer = FixedBlockWriter::new(VecConsumer::new());
        writer.open(4).unwrap();

        writer.write(&mut [1, 2, 3, 4]).unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.processor().calls, vec![4]);
    }

    #[test]
    fn test_partial_acceptance_on_direct_blocks() {
        let mut consumer = VecConsumer::new();
        consumer.accept_limit = Some(3);
        let mut writer = FixedBlockWriter::new(consumer);
        writer.open(4).unwrap();

        let mut data = bytes(9);
        writer.write(&mut data).unwrap();
        // 3 + 3 accepted directly, the last 3 bytes no longer fill a block
        assert_eq!(writer.processor().data, bytes(6));
        assert_eq!(writer.pending(), 3);
    }

    #[test]
    fn test_short_write_of_staged_block_is_an_error() {
        let mut consumer = VecConsumer::new();
        consumer.accept_limit = Some(2);
        let mut writer = FixedBlockWriter::new(consumer);
        writer.open(4).unwrap();

        writer.write(&mut [1]).unwrap();
        assert!(matches!(
            writer.write(&mut [2, 3, 4]),
            Err(BlockError::ShortWrite {
                expected: 4,
                written: 2
            })
        ));
    }

    #[test]
    fn test_zero_progress_is_stalled() {
        let mut consumer = VecConsumer::new();
        consumer.accept_limit = Some(0);
        let mut writer = FixedBlockWriter::new(consumer);
        writer.open(2).unwrap();

        assert!(matches!(
            writer.write(&mut [1, 2, 3]),
            Err(BlockError::Stalled)
        ));
    }

    #[test]
    fn test_close_flushes_zero_padded_tail() {
        let mut writer = FixedBlockWriter::new(VecConsumer::new());
        writer.open(4).unwrap();
        writer.write(&mut [9, 8, 7, 6, 5]).unwrap();

        assert_eq!(writer.close().unwrap(), 1);
        assert!(!writer.adapter().is_open());
        assert_eq!(writer.processor().data, vec![9, 8, 7, 6, 5, 0, 0, 0]);
        assert_eq!(writer.close().unwrap(), 0);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let data = bytes(1000);
        let mut outputs = Vec::new();

        for chunk in [1usize, 7, 64, 65, 333] {
            let mut writer = FixedBlockWriter::new(VecConsumer::new());
            writer.open(64).unwrap();
            let mut copy = data.clone();
            for piece in copy.chunks_mut(chunk) {
                writer.write(piece).unwrap();
            }
            writer.close().unwrap();
            assert!(writer.processor().calls.iter().all(|&len| len == 64));
            outputs.push(writer.into_processor().data);
        }

        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(&outputs[0][..1000], data.as_slice());
    }
}

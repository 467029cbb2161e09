//! Fixed-block adapters.
//!
//! Codecs and analyzers often insist on a fixed block granularity while the
//! code around them reads and writes arbitrary amounts. The adapters in this
//! module sit in between:
//!
//! ```text
//! read(n)  → FixedBlockReader → process_fixed_block(block_size) → producer
//! write(n) → FixedBlockWriter → process_fixed_block(block_size) → consumer
//! ```
//!
//! Both adapters are driven synchronously by their caller and never spawn
//! threads. Full blocks are passed straight through the caller's buffer;
//! only partial blocks are staged.

mod reader;
mod writer;

pub use reader::FixedBlockReader;
pub use writer::FixedBlockWriter;

use crate::BlockError;

/// A producer or consumer that only works in whole blocks.
///
/// The adapters guarantee that `block` is always exactly the block size they
/// were opened with.
///
/// # Example
///
/// ```
/// use stream_transport::{BlockError, FixedBlockProcessor};
///
/// /// Produces an endless stream of incrementing bytes.
/// struct Counter(u8);
///
/// impl FixedBlockProcessor for Counter {
///     fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError> {
///         for byte in block.iter_mut() {
///             *byte = self.0;
///             self.0 = self.0.wrapping_add(1);
///         }
///         Ok(block.len())
///     }
/// }
/// ```
pub trait FixedBlockProcessor {
    /// Processes one block.
    ///
    /// On the read path the processor fills `block` and returns how many
    /// bytes are valid; `Ok(0)` means end of stream. On the write path the
    /// processor consumes `block` and returns how many bytes it accepted.
    ///
    /// # Errors
    ///
    /// Any error is passed to the adapter's caller unchanged.
    fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError>;
}

impl<P: FixedBlockProcessor + ?Sized> FixedBlockProcessor for &mut P {
    fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError> {
        (**self).process_fixed_block(block)
    }
}

impl<P: FixedBlockProcessor + ?Sized> FixedBlockProcessor for Box<P> {
    fn process_fixed_block(&mut self, block: &mut [u8]) -> Result<usize, BlockError> {
        (**self).process_fixed_block(block)
    }
}

/// State shared by the reader and writer: the block size, the staging buffer
/// for partial blocks and a cursor into it.
///
/// For the reader, `position..valid_len` is staged data not yet handed out,
/// with `position <= valid_len <= block_size`. For the writer, `0..position`
/// is data accumulated towards the next block and `position < block_size`
/// between calls.
#[derive(Debug, Default)]
pub struct FixedBlockAdapter {
    block_size: usize,
    staging: Vec<u8>,
    position: usize,
    valid_len: usize,
    open: bool,
}

impl FixedBlockAdapter {
    /// Creates a closed adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates staging storage for `block_size` bytes and resets the cursors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockSize` if `block_size` is zero.
    pub fn open(&mut self, block_size: usize) -> Result<(), BlockError> {
        if block_size == 0 {
            return Err(BlockError::InvalidBlockSize(block_size));
        }
        self.block_size = block_size;
        self.staging = vec![0; block_size];
        self.position = 0;
        self.valid_len = 0;
        self.open = true;
        Ok(())
    }

    /// Releases staging storage.
    pub fn close(&mut self) {
        self.staging = Vec::new();
        self.position = 0;
        self.valid_len = 0;
        self.open = false;
    }

    /// Returns `true` between `open()` and `close()`.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns the block size, or 0 when closed.
    pub fn block_size(&self) -> usize {
        if self.open {
            self.block_size
        } else {
            0
        }
    }

    /// Returns the staging cursor.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of staged bytes (reader side).
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    fn ensure_open(&self) -> Result<(), BlockError> {
        if self.open {
            Ok(())
        } else {
            Err(BlockError::NotOpen)
        }
    }
}

// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Block writer for BGZF compression

use std::io::{self, Write};

use log::{debug, trace};

use crate::block::{Encoder, Quality};
use crate::constants::*;
use crate::error::{Error, Result};

/// BlockWriter compresses data into BGZF blocks
///
/// Input is buffered until a full block is available, at which point the
/// block is compressed and written immediately. [`finish`](BlockWriter::finish)
/// writes the final partial block and the EOF marker.
///
/// # Example
///
/// ```
/// use bgzfio::{BlockWriter, Quality, EOF_MARKER};
///
/// let mut compressed = Vec::new();
/// let mut writer = BlockWriter::new(&mut compressed, Quality::Fastest);
/// writer.write(b"Hello, World!").unwrap();
/// writer.finish().unwrap();
///
/// assert!(compressed.ends_with(&EOF_MARKER));
/// ```
pub struct BlockWriter<W> {
    writer: W,
    buf: Vec<u8>,
    block: Vec<u8>,
    encoder: Encoder,
    block_size: usize,
    blocks_written: u64,
    finished: bool,
    /// A block write failed, so the sink may hold a torn block
    failed: bool,
}

impl<W> BlockWriter<W> {
    /// Create a new BlockWriter with the default block size (65280 bytes)
    pub fn new(writer: W, quality: Quality) -> Self {
        Self::with_block_size(writer, quality, DEFAULT_BLOCK_SIZE)
    }

    /// Create a new BlockWriter with a specific uncompressed block size
    ///
    /// Block size is clamped to between 1 byte and 65280 bytes
    pub fn with_block_size(writer: W, quality: Quality, block_size: usize) -> Self {
        let block_size = block_size.clamp(1, DEFAULT_BLOCK_SIZE);

        BlockWriter {
            writer,
            buf: Vec::with_capacity(block_size),
            block: Vec::new(),
            encoder: Encoder::new(quality),
            block_size,
            blocks_written: 0,
            finished: false,
            failed: false,
        }
    }

    /// Number of blocks written so far, the EOF marker excluded
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Number of uncompressed bytes waiting for the next block
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Whether the EOF marker has been written
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get a reference to the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Get a mutable reference to the underlying writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwrap this BlockWriter, returning the underlying writer
    ///
    /// Pending data is discarded; call `finish` first to keep it.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            Err(Error::Closed)
        } else if self.failed {
            Err(Error::Faulted)
        } else {
            Ok(())
        }
    }

    /// Remember a failed sink write; nothing may follow a torn block
    fn sink_result(&mut self, result: io::Result<()>) -> Result<()> {
        if result.is_err() {
            self.failed = true;
        }
        Ok(result?)
    }

    /// Copy as much of `data` as fits in the current block
    fn stage(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.block_size - self.buf.len());
        self.buf.extend_from_slice(&data[..take]);
        take
    }

    fn is_full(&self) -> bool {
        self.buf.len() == self.block_size
    }

    /// Compress the pending bytes into `self.block` and clear them
    fn encode_pending(&mut self) -> Result<()> {
        self.encoder.encode(&self.buf, &mut self.block)?;
        self.blocks_written += 1;
        trace!(
            "bgzf: block #{} deflated {} -> {} bytes",
            self.blocks_written,
            self.buf.len(),
            self.block.len()
        );
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> BlockWriter<W> {
    /// Buffer `data`, writing every block that fills up
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        self.check_open()?;

        while !data.is_empty() {
            let taken = self.stage(data);
            data = &data[taken..];

            if self.is_full() {
                self.emit_block()?;
            }
        }

        Ok(())
    }

    /// Write a block holding whatever is pending, even if nothing is
    pub fn flush_block(&mut self) -> Result<()> {
        self.check_open()?;
        self.emit_block()
    }

    /// Write the final block and the EOF marker, then flush the writer
    ///
    /// Calling `finish` again is a no-op. After a failed block write it
    /// fails with [`Error::Faulted`] instead of appending to a torn block.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.check_open()?;

        self.emit_block()?;
        let result = self.writer.write_all(&EOF_MARKER);
        self.sink_result(result)?;
        self.finished = true;
        debug!("bgzf: wrote EOF marker after {} blocks", self.blocks_written);

        self.writer.flush()?;
        Ok(())
    }

    /// Flush the underlying writer without emitting a block
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn emit_block(&mut self) -> Result<()> {
        self.encode_pending()?;
        let result = self.writer.write_all(&self.block);
        self.sink_result(result)
    }
}

#[cfg(feature = "async")]
mod nonblocking {
    use log::debug;
    use tokio::io::{AsyncWrite, AsyncWriteExt};

    use super::BlockWriter;
    use crate::constants::EOF_MARKER;
    use crate::error::Result;

    impl<W: AsyncWrite + Unpin> BlockWriter<W> {
        /// Async counterpart of [`write`](BlockWriter::write)
        pub async fn write_async(&mut self, mut data: &[u8]) -> Result<()> {
            self.check_open()?;

            while !data.is_empty() {
                let taken = self.stage(data);
                data = &data[taken..];

                if self.is_full() {
                    self.emit_block_async().await?;
                }
            }

            Ok(())
        }

        /// Async counterpart of [`flush_block`](BlockWriter::flush_block)
        pub async fn flush_block_async(&mut self) -> Result<()> {
            self.check_open()?;
            self.emit_block_async().await
        }

        /// Async counterpart of [`finish`](BlockWriter::finish)
        pub async fn finish_async(&mut self) -> Result<()> {
            if self.finished {
                return Ok(());
            }
            self.check_open()?;

            self.emit_block_async().await?;
            let result = self.writer.write_all(&EOF_MARKER).await;
            self.sink_result(result)?;
            self.finished = true;
            debug!("bgzf: wrote EOF marker after {} blocks", self.blocks_written);

            self.writer.flush().await?;
            Ok(())
        }

        /// Async counterpart of [`flush`](BlockWriter::flush)
        pub async fn flush_async(&mut self) -> Result<()> {
            self.writer.flush().await?;
            Ok(())
        }

        async fn emit_block_async(&mut self) -> Result<()> {
            self.encode_pending()?;
            let result = self.writer.write_all(&self.block).await;
            self.sink_result(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::parse_header;

    /// Split a stream into its blocks using the BSIZE fields
    fn split_blocks(mut data: &[u8]) -> Vec<&[u8]> {
        let mut blocks = Vec::new();
        while !data.is_empty() {
            let header: [u8; HEADER_SIZE] = data[..HEADER_SIZE].try_into().unwrap();
            let size = parse_header(&header).unwrap();
            blocks.push(&data[..size]);
            data = &data[size..];
        }
        blocks
    }

    #[test]
    fn test_writer_basic() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.write(b"Hello, World!").unwrap();
        writer.finish().unwrap();

        let blocks = split_blocks(&compressed);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], EOF_MARKER);
    }

    #[test]
    fn test_writer_empty() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.finish().unwrap();

        // One empty data block followed by the EOF marker
        let blocks = split_blocks(&compressed);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], EOF_MARKER);
    }

    #[test]
    fn test_writer_emits_full_blocks_immediately() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::with_block_size(&mut compressed, Quality::Fastest, 100);
        writer.write(&[b'A'; 250]).unwrap();

        assert_eq!(writer.blocks_written(), 2);
        assert_eq!(writer.pending(), 50);
        assert_eq!(split_blocks(writer.get_ref()).len(), 2);
    }

    #[test]
    fn test_writer_no_implicit_flush() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.write(b"a").unwrap();
        writer.write(b"b").unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.blocks_written(), 0);
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn test_writer_flush_block() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.write(b"partial").unwrap();
        writer.flush_block().unwrap();

        assert_eq!(writer.blocks_written(), 1);
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_writer_finish_twice() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.write(b"data").unwrap();
        writer.finish().unwrap();
        let len = writer.get_ref().len();

        writer.finish().unwrap();
        assert_eq!(writer.get_ref().len(), len);
        assert!(writer.is_finished());
    }

    #[test]
    fn test_writer_write_after_finish() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.finish().unwrap();
        assert!(matches!(writer.write(b"late"), Err(Error::Closed)));
    }

    #[test]
    fn test_writer_failed_sink_blocks_further_output() {
        /// Takes 10 bytes, then fails every write
        struct Full(Vec<u8>);

        impl Write for Full {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let n = buf.len().min(10 - self.0.len());
                if n == 0 {
                    return Err(io::Error::other("disk full"));
                }
                self.0.extend_from_slice(&buf[..n]);
                Ok(n)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut writer = BlockWriter::with_block_size(Full(Vec::new()), Quality::Fastest, 4);
        assert!(matches!(writer.write(b"AAAA"), Err(Error::Io(_))));
        assert!(matches!(writer.write(b"BBBB"), Err(Error::Faulted)));
        assert!(matches!(writer.flush_block(), Err(Error::Faulted)));
        assert!(matches!(writer.finish(), Err(Error::Faulted)));
        assert!(!writer.is_finished());
        assert_eq!(writer.into_inner().0.len(), 10);
    }

    #[test]
    fn test_writer_block_size_clamped() {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::with_block_size(&mut compressed, Quality::Fastest, 1 << 20);
        writer.write(&vec![0u8; DEFAULT_BLOCK_SIZE + 1]).unwrap();
        assert_eq!(writer.blocks_written(), 1);
        assert_eq!(writer.pending(), 1);
    }

    #[test]
    fn test_writer_large_data() {
        let data = vec![b'A'; 200_000];
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
        writer.write(&data).unwrap();
        writer.finish().unwrap();

        // Should compress well
        assert!(compressed.len() < data.len() / 50);
        for block in split_blocks(&compressed) {
            assert!(block.len() <= MAX_BLOCK_SIZE);
        }
    }
}

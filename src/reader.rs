// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Block reader for BGZF decompression

use std::io::{self, Read};

use flate2::Decompress;
use log::{debug, trace};

use crate::block::{decode_block, parse_header};
use crate::constants::*;
use crate::error::{FormatError, Result};

/// BlockReader pulls one framed block at a time from a byte source
///
/// Each call to [`next_block`](BlockReader::next_block) reads exactly one
/// non-empty block (skipping empty ones such as the EOF marker), verifies
/// its CRC and size, and exposes the decompressed bytes until the next call.
/// At most one compressed and one decompressed block are held in memory.
///
/// # Example
///
/// ```
/// use bgzfio::{BlockReader, BlockWriter, Quality};
///
/// let mut compressed = Vec::new();
/// let mut writer = BlockWriter::new(&mut compressed, Quality::Optimal);
/// writer.write(b"Hello, World!").unwrap();
/// writer.finish().unwrap();
///
/// let mut reader = BlockReader::new(&compressed[..]);
/// assert_eq!(reader.next_block().unwrap(), Some(&b"Hello, World!"[..]));
/// assert_eq!(reader.next_block().unwrap(), None);
/// assert!(reader.saw_eof_marker());
/// ```
pub struct BlockReader<R> {
    reader: R,
    header: [u8; HEADER_SIZE],
    body: Vec<u8>,
    data: Vec<u8>,
    decompressor: Decompress,
    blocks_read: u64,
    saw_eof_marker: bool,
}

impl<R> BlockReader<R> {
    /// Create a new BlockReader over `reader`
    pub fn new(reader: R) -> Self {
        BlockReader {
            reader,
            header: [0u8; HEADER_SIZE],
            body: Vec::new(),
            data: Vec::new(),
            decompressor: Decompress::new(false),
            blocks_read: 0,
            saw_eof_marker: false,
        }
    }

    /// Decompressed bytes of the most recent block
    ///
    /// Empty once the stream ended, and while a fetch that failed is retried.
    pub fn block(&self) -> &[u8] {
        &self.data
    }

    /// Number of blocks read so far, empty blocks included
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Whether the EOF marker block has been read
    pub fn saw_eof_marker(&self) -> bool {
        self.saw_eof_marker
    }

    /// Get a reference to the underlying reader
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Get a mutable reference to the underlying reader
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwrap this BlockReader, returning the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Size the body buffer from the current header
    fn prepare_body(&mut self) -> Result<()> {
        let block_size = parse_header(&self.header)?;
        self.body.resize(block_size - HEADER_SIZE, 0);
        Ok(())
    }

    /// Decode the current body; returns false when the block was empty
    fn decode_current(&mut self) -> Result<bool> {
        decode_block(&self.body, &mut self.decompressor, &mut self.data)?;
        self.blocks_read += 1;

        if self.data.is_empty() {
            self.saw_eof_marker = self.header[..] == EOF_MARKER[..HEADER_SIZE]
                && self.body[..] == EOF_MARKER[HEADER_SIZE..];
            trace!("bgzf: empty block #{}", self.blocks_read);
            return Ok(false);
        }

        self.saw_eof_marker = false;
        trace!(
            "bgzf: block #{} inflated {} -> {} bytes",
            self.blocks_read,
            self.body.len() + HEADER_SIZE,
            self.data.len()
        );
        Ok(true)
    }

    /// Handle a source exhausted at a block boundary
    fn end_of_source(&mut self) {
        self.data.clear();
        if !self.saw_eof_marker {
            debug!("bgzf: source ended without an EOF marker block");
        }
    }
}

/// Check the number of header bytes obtained before the source ran dry
fn header_complete(filled: usize) -> Result<bool> {
    match filled {
        0 => Ok(false),
        HEADER_SIZE => Ok(true),
        _ => Err(FormatError::Truncated.into()),
    }
}

/// Check the number of body bytes obtained before the source ran dry
fn body_complete(filled: usize, expected: usize) -> Result<()> {
    if filled == expected {
        Ok(())
    } else {
        Err(FormatError::Truncated.into())
    }
}

/// Fill `buf` as far as the source allows, returning the bytes read
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read> BlockReader<R> {
    /// Read the next non-empty block
    ///
    /// Returns `Ok(None)` once the source is exhausted at a block boundary,
    /// whether or not an EOF marker was present.
    pub fn next_block(&mut self) -> Result<Option<&[u8]>> {
        self.data.clear();
        loop {
            let filled = read_full(&mut self.reader, &mut self.header)?;
            if !header_complete(filled)? {
                self.end_of_source();
                return Ok(None);
            }

            self.prepare_body()?;
            let filled = read_full(&mut self.reader, &mut self.body)?;
            body_complete(filled, self.body.len())?;

            if self.decode_current()? {
                break;
            }
        }
        Ok(Some(&self.data))
    }
}

#[cfg(feature = "async")]
mod nonblocking {
    use std::io;

    use tokio::io::{AsyncRead, AsyncReadExt};

    use super::{body_complete, header_complete, BlockReader};
    use crate::error::Result;

    async fn read_full<R: AsyncRead + Unpin + ?Sized>(
        reader: &mut R,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    impl<R: AsyncRead + Unpin> BlockReader<R> {
        /// Async counterpart of [`next_block`](BlockReader::next_block)
        pub async fn next_block_async(&mut self) -> Result<Option<&[u8]>> {
            self.data.clear();
            loop {
                let filled = read_full(&mut self.reader, &mut self.header).await?;
                if !header_complete(filled)? {
                    self.end_of_source();
                    return Ok(None);
                }

                self.prepare_body()?;
                let filled = read_full(&mut self.reader, &mut self.body).await?;
                body_complete(filled, self.body.len())?;

                if self.decode_current()? {
                    break;
                }
            }
            Ok(Some(&self.data))
        }
    }
}

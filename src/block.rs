// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! I/O-free block framing shared by the blocking and async paths
//!
//! A BGZF block is a complete gzip member:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |1f |8b |08 |04 |   MTIME = 0   |XFL|OS | XLEN=6|'B'|'C'|SLEN=2 | BSIZE |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! | CDATA (raw deflate) ...  | CRC32 (4) | ISIZE (4) |
//! +--------------------------+-----------+-----------+
//! ```
//!
//! BSIZE is the total block size minus one, so a reader can size a block
//! from its header alone.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::constants::*;
use crate::crc::crc;
use crate::error::FormatError;

/// Compression effort applied to every block of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Balance between speed and size (deflate level 6)
    #[default]
    Optimal,
    /// Fastest compression (deflate level 1)
    Fastest,
    /// Stored deflate blocks, still valid gzip members
    NoCompression,
    /// Smallest output (deflate level 9)
    SmallestSize,
}

impl From<Quality> for Compression {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Optimal => Compression::default(),
            Quality::Fastest => Compression::fast(),
            Quality::NoCompression => Compression::none(),
            Quality::SmallestSize => Compression::best(),
        }
    }
}

/// Validate a block header and return the total block size
pub fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<usize, FormatError> {
    if header[0..2] != GZIP_MAGIC {
        return Err(FormatError::BadMagic([header[0], header[1]]));
    }
    if header[2] != CM_DEFLATE {
        return Err(FormatError::BadMethod(header[2]));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]);
    let slen = u16::from_le_bytes([header[14], header[15]]);
    if header[3] & FLG_FEXTRA == 0
        || xlen != XLEN
        || header[SUBFIELD_OFFSET..SUBFIELD_OFFSET + 2] != SUBFIELD_ID
        || slen != SUBFIELD_LEN
    {
        return Err(FormatError::MissingSubfield);
    }

    let bsize = u16::from_le_bytes([header[BSIZE_OFFSET], header[BSIZE_OFFSET + 1]]) as usize;
    let block_size = bsize + 1;
    if block_size < HEADER_SIZE + FOOTER_SIZE {
        return Err(FormatError::BadBlockSize(block_size));
    }

    Ok(block_size)
}

/// Decode the remainder of a block (payload and footer) into `out`
///
/// `out` is cleared first. On success it holds exactly ISIZE bytes whose
/// CRC matches the footer.
pub fn decode_block(
    body: &[u8],
    decompressor: &mut Decompress,
    out: &mut Vec<u8>,
) -> Result<(), FormatError> {
    if body.len() < FOOTER_SIZE {
        return Err(FormatError::Truncated);
    }

    let (payload, footer) = body.split_at(body.len() - FOOTER_SIZE);
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let expected_len = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;
    if expected_len > MAX_UNCOMPRESSED_SIZE {
        return Err(FormatError::BadBlockSize(expected_len));
    }

    out.clear();
    out.reserve(expected_len + 1);
    decompressor.reset(false);

    let status = decompressor
        .decompress_vec(payload, out, FlushDecompress::Finish)
        .map_err(|_| FormatError::Inflate)?;
    if status != Status::StreamEnd {
        // Either the payload ended early or it inflates past ISIZE
        return Err(if out.len() > expected_len {
            FormatError::SizeMismatch {
                expected: expected_len,
                actual: out.len(),
            }
        } else {
            FormatError::Inflate
        });
    }

    if out.len() != expected_len {
        return Err(FormatError::SizeMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }

    let actual_crc = crc(out);
    if actual_crc != expected_crc {
        return Err(FormatError::CrcMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(())
}

/// Block compressor that remembers its deflate state between blocks
pub struct Encoder {
    compressor: Compress,
    stored: Option<Compress>,
}

impl Encoder {
    pub fn new(quality: Quality) -> Self {
        Encoder {
            compressor: Compress::new(quality.into(), false),
            stored: None,
        }
    }

    /// Frame `data` as a complete block into `out`, replacing its contents
    ///
    /// If the deflate output would overflow BSIZE, the block is re-encoded
    /// with stored deflate blocks.
    pub fn encode(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<(), FormatError> {
        debug_assert!(data.len() <= MAX_UNCOMPRESSED_SIZE);

        deflate_into(&mut self.compressor, data, out)?;
        if out.len() + FOOTER_SIZE > MAX_BLOCK_SIZE {
            let stored = self
                .stored
                .get_or_insert_with(|| Compress::new(Compression::none(), false));
            deflate_into(stored, data, out)?;
        }

        let block_size = out.len() + FOOTER_SIZE;
        if block_size > MAX_BLOCK_SIZE {
            return Err(FormatError::BlockTooLarge(block_size));
        }

        let bsize = (block_size - 1) as u16;
        out[BSIZE_OFFSET..BSIZE_OFFSET + 2].copy_from_slice(&bsize.to_le_bytes());
        out.extend_from_slice(&crc(data).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());

        Ok(())
    }
}

/// Write the header template followed by the raw deflate stream of `data`
fn deflate_into(
    compressor: &mut Compress,
    data: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), FormatError> {
    out.clear();
    out.reserve(HEADER_SIZE + max_deflate_len(data.len()) + FOOTER_SIZE);
    out.extend_from_slice(&HEADER_TEMPLATE);

    compressor.reset();
    let status = compressor
        .compress_vec(data, out, FlushCompress::Finish)
        .map_err(|_| FormatError::Inflate)?;
    if status != Status::StreamEnd {
        return Err(FormatError::BlockTooLarge(out.len()));
    }

    Ok(())
}

/// Upper bound on raw deflate output for `len` input bytes
fn max_deflate_len(len: usize) -> usize {
    // Stored blocks cost 5 bytes per 16KB in the worst encoder
    len + 5 * (len / 16_384 + 1) + 64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8], quality: Quality) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::new(quality).encode(data, &mut out).unwrap();
        out
    }

    fn header_of(block: &[u8]) -> [u8; HEADER_SIZE] {
        block[..HEADER_SIZE].try_into().unwrap()
    }

    #[test]
    fn test_empty_block_is_valid() {
        let block = encode(&[], Quality::Optimal);
        assert_eq!(parse_header(&header_of(&block)).unwrap(), block.len());

        let mut out = vec![1, 2, 3];
        decode_block(&block[HEADER_SIZE..], &mut Decompress::new(false), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_eof_marker() {
        assert_eq!(parse_header(&header_of(&EOF_MARKER)).unwrap(), EOF_MARKER.len());

        let mut out = Vec::new();
        decode_block(&EOF_MARKER[HEADER_SIZE..], &mut Decompress::new(false), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_bsize_matches_written_length() {
        let data = b"ACGTACGTTTGACCA".repeat(500);
        for quality in [
            Quality::Optimal,
            Quality::Fastest,
            Quality::NoCompression,
            Quality::SmallestSize,
        ] {
            let block = encode(&data, quality);
            let size = parse_header(&header_of(&block)).unwrap();
            assert_eq!(size, block.len(), "{:?}", quality);
        }
    }

    #[test]
    fn test_encode_decode() {
        let data = b"chr1\t100\t200\tname\n".repeat(64);
        let block = encode(&data, Quality::Fastest);

        let mut decompressor = Decompress::new(false);
        let mut out = Vec::new();
        decode_block(&block[HEADER_SIZE..], &mut decompressor, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_incompressible_full_block_fits() {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        let data: Vec<u8> = (0..DEFAULT_BLOCK_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();

        let block = encode(&data, Quality::SmallestSize);
        assert!(block.len() <= MAX_BLOCK_SIZE);

        let mut out = Vec::new();
        decode_block(&block[HEADER_SIZE..], &mut Decompress::new(false), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_parse_header_rejects_plain_gzip() {
        let mut header = HEADER_TEMPLATE;
        header[3] = 0;
        assert_eq!(parse_header(&header), Err(FormatError::MissingSubfield));
    }

    #[test]
    fn test_parse_header_rejects_bad_magic() {
        let mut header = HEADER_TEMPLATE;
        header[0] = b'B';
        header[1] = b'A';
        assert_eq!(parse_header(&header), Err(FormatError::BadMagic(*b"BA")));
    }

    #[test]
    fn test_parse_header_rejects_small_bsize() {
        let header = HEADER_TEMPLATE;
        assert_eq!(parse_header(&header), Err(FormatError::BadBlockSize(1)));
    }

    #[test]
    fn test_decode_detects_crc_mismatch() {
        let mut block = encode(b"hello bgzf", Quality::Optimal);
        let crc_at = block.len() - FOOTER_SIZE;
        block[crc_at] ^= 0xff;

        let mut out = Vec::new();
        let err = decode_block(&block[HEADER_SIZE..], &mut Decompress::new(false), &mut out)
            .unwrap_err();
        assert!(matches!(err, FormatError::CrcMismatch { .. }));
    }

    #[test]
    fn test_decode_detects_size_mismatch() {
        let mut block = encode(b"hello bgzf", Quality::Optimal);
        let isize_at = block.len() - 4;
        block[isize_at] = 3;

        let mut out = Vec::new();
        let err = decode_block(&block[HEADER_SIZE..], &mut Decompress::new(false), &mut out)
            .unwrap_err();
        assert!(matches!(err, FormatError::SizeMismatch { .. }));
    }
}

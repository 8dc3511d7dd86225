// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// gzip member magic
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression method: deflate
pub const CM_DEFLATE: u8 = 0x08;

/// Header flag: extra field present
pub const FLG_FEXTRA: u8 = 0x04;

/// Operating system byte written in headers (unknown)
pub const OS_UNKNOWN: u8 = 0xff;

/// Length of the extra field carried by every block
pub const XLEN: u16 = 6;

/// Subfield identifier marking a BGZF block
pub const SUBFIELD_ID: [u8; 2] = *b"BC";

/// Length of the BC subfield payload (the BSIZE field)
pub const SUBFIELD_LEN: u16 = 2;

/// Offset of the subfield identifier within the header
pub const SUBFIELD_OFFSET: usize = 12;

/// Offset of BSIZE within the header
pub const BSIZE_OFFSET: usize = 16;

/// Block header size
pub const HEADER_SIZE: usize = 18;

/// Block footer size (CRC32 + ISIZE)
pub const FOOTER_SIZE: usize = 8;

/// Maximum total size of one block, header and footer included (64KB)
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

/// Maximum uncompressed payload of one block (64KB)
pub const MAX_UNCOMPRESSED_SIZE: usize = 1 << 16;

/// Default uncompressed bytes per block written.
///
/// Matches htslib so that stored-mode fallback still fits in `MAX_BLOCK_SIZE`.
pub const DEFAULT_BLOCK_SIZE: usize = 0xff00;

/// Header template with BSIZE left as zero
pub const HEADER_TEMPLATE: [u8; HEADER_SIZE] = [
    GZIP_MAGIC[0],
    GZIP_MAGIC[1],
    CM_DEFLATE,
    FLG_FEXTRA,
    0x00,
    0x00,
    0x00,
    0x00,
    0x00,
    OS_UNKNOWN,
    XLEN as u8,
    0x00,
    SUBFIELD_ID[0],
    SUBFIELD_ID[1],
    SUBFIELD_LEN as u8,
    0x00,
    0x00,
    0x00,
];

/// The empty block terminating a well-formed stream
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

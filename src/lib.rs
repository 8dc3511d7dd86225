// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! # BGZF Streams
//!
//! This library implements BGZF, the blocked gzip format used for BAM, VCF,
//! BED and other large genomic files. It is byte compatible with htslib's
//! `bgzip`, and every block is a plain gzip member, so any gzip decoder can
//! read the output.
//!
//! BGZF provides:
//! - Independent blocks of at most 64KB, each sized in its own header
//! - CRC validation of every block
//! - Constant memory use regardless of stream length
//! - Blocking and async (tokio) I/O with the same semantics
//!
//! ## Stream Example
//!
//! ```rust
//! use bgzfio::{BgzfStream, Mode};
//! use std::io::{Cursor, Read, Write};
//!
//! let mut compressed = Vec::new();
//! let mut stream = BgzfStream::new(&mut compressed, Mode::Compress);
//! stream.write_all(b"chr1\t11873\t14409\tDDX11L1\n").unwrap();
//! stream.close().unwrap();
//! drop(stream);
//!
//! let mut stream = BgzfStream::new(Cursor::new(compressed), Mode::Decompress);
//! let mut text = String::new();
//! stream.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "chr1\t11873\t14409\tDDX11L1\n");
//! ```

mod block;
mod constants;
mod crc;
mod error;
mod probe;
mod reader;
mod stream;
mod writer;

pub use block::Quality;
pub use constants::{DEFAULT_BLOCK_SIZE, EOF_MARKER, MAX_BLOCK_SIZE};
pub use error::{Error, FormatError, Result};
pub use probe::{has_eof_marker, is_bgzf, is_bgzf_header};
pub use reader::BlockReader;
pub use stream::{BgzfStream, Builder, Mode, Session};
pub use writer::BlockWriter;

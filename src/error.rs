// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io;

use crate::stream::Mode;

/// Result type for BGZF operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for BGZF streams
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input is not a valid BGZF stream
    #[error("bgzf: {0}")]
    Format(#[from] FormatError),

    /// A construction argument is missing or inconsistent
    #[error("bgzf: invalid argument: {0}")]
    Argument(&'static str),

    /// The operation does not match the stream direction
    #[error("bgzf: {operation} is not supported on a {mode} stream")]
    NotSupported {
        operation: &'static str,
        mode: Mode,
    },

    /// The stream was already closed
    #[error("bgzf: stream is closed")]
    Closed,

    /// An earlier error or a cancelled operation left the stream unusable
    #[error("bgzf: stream is faulted and must be closed")]
    Faulted,

    /// I/O error from the underlying source or sink
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors in the block framing or payload
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The block does not start with the gzip magic
    #[error("not a gzip member, magic {0:02x?}")]
    BadMagic([u8; 2]),

    /// The compression method is not deflate
    #[error("unsupported compression method {0}")]
    BadMethod(u8),

    /// The header lacks the BC extra subfield
    #[error("missing BGZF extra subfield")]
    MissingSubfield,

    /// The BSIZE or ISIZE field is out of range
    #[error("invalid block size {0}")]
    BadBlockSize(usize),

    /// The source ended in the middle of a block
    #[error("truncated block")]
    Truncated,

    /// The deflate payload could not be decoded
    #[error("corrupt deflate payload")]
    Inflate,

    /// CRC of the decoded payload does not match the footer
    #[error("crc mismatch: footer {expected:#010x}, payload {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// Decoded length does not match the ISIZE footer field
    #[error("size mismatch: footer {expected}, payload {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// An encoded block would not fit the 16-bit BSIZE field
    #[error("encoded block of {0} bytes exceeds the 64KB limit")]
    BlockTooLarge(usize),
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Format(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::Argument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::NotSupported { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::Closed | Error::Faulted => io::Error::other(err),
        }
    }
}

impl Error {
    /// Whether this error leaves the stream unsafe to reuse
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Error::Format(_) | Error::Faulted)
    }
}

// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Cheap structural checks on files that may hold BGZF data

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::constants::*;

/// Whether `prefix` starts with a BGZF block header
///
/// Only the gzip magic and the `BC` subfield tag are checked.
pub fn is_bgzf_header(prefix: &[u8]) -> bool {
    prefix.len() >= HEADER_SIZE
        && prefix[0..2] == GZIP_MAGIC
        && prefix[SUBFIELD_OFFSET..SUBFIELD_OFFSET + 2] == SUBFIELD_ID
}

/// Whether the file at `path` starts with a BGZF block header
///
/// Reads at most one header. Any failure, including a missing or short
/// file, yields `false`.
///
/// # Example
///
/// ```
/// assert!(!bgzfio::is_bgzf("/nonexistent/reads.fastq.gz"));
/// ```
pub fn is_bgzf<P: AsRef<Path>>(path: P) -> bool {
    let mut header = [0u8; HEADER_SIZE];
    let read = File::open(path).and_then(|file| read_prefix(file, &mut header));
    matches!(read, Ok(HEADER_SIZE)) && is_bgzf_header(&header)
}

/// Whether the file at `path` ends with the EOF marker block
pub fn has_eof_marker<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.seek(SeekFrom::End(0))?;
    if len < EOF_MARKER.len() as u64 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-(EOF_MARKER.len() as i64)))?;
    let mut tail = [0u8; EOF_MARKER.len()];
    file.read_exact(&mut tail)?;
    Ok(tail == EOF_MARKER)
}

fn read_prefix<R: Read>(reader: R, buf: &mut [u8]) -> io::Result<usize> {
    let mut limited = reader.take(buf.len() as u64);
    let mut filled = 0;
    loop {
        match limited.read(&mut buf[filled..]) {
            Ok(0) => return Ok(filled),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

// Copyright 2024 Karpeles Lab Inc.
// Based on the BGZF format from the SAM/BAM specification
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! CRC-32 checksum for BGZF block footers
//!
//! This is the plain gzip CRC (IEEE polynomial, reflected), as stored in
//! the CRC32 field of RFC 1952 member trailers.

use crc32fast::Hasher;

/// Calculate the CRC-32 of an uncompressed block payload
pub fn crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_empty() {
        // The EOF marker stores a zero CRC for its empty payload
        assert_eq!(crc(&[]), 0);
    }

    #[test]
    fn test_crc_known_value() {
        assert_eq!(crc(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_crc_different_data() {
        let crc1 = crc(b"Hello");
        let crc2 = crc(b"World");
        assert_ne!(crc1, crc2, "Different data should produce different CRCs");
    }
}

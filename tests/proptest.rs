// Copyright 2024 Karpeles Lab Inc.
// Property-based tests using proptest

use bgzfio::{BgzfStream, BlockReader, Mode, Quality};
use proptest::prelude::*;
use std::io::{Read, Write as _};

fn quality() -> impl Strategy<Value = Quality> {
    prop_oneof![
        Just(Quality::Optimal),
        Just(Quality::Fastest),
        Just(Quality::NoCompression),
        Just(Quality::SmallestSize),
    ]
}

fn compress(data: &[u8], quality: Quality, block_size: usize) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut stream = BgzfStream::builder()
        .stream(&mut compressed)
        .quality(quality)
        .block_size(block_size)
        .build()
        .expect("build failed");
    stream.write_all(data).expect("write failed");
    stream.close().expect("close failed");
    drop(stream);
    compressed
}

proptest! {
    #[test]
    fn prop_stream_roundtrip(
        data in prop::collection::vec(any::<u8>(), 0..100_000),
        quality in quality(),
    ) {
        let compressed = compress(&data, quality, 65280);

        let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
        let mut decompressed = Vec::new();
        stream.read_to_end(&mut decompressed).expect("read failed");

        prop_assert_eq!(data, decompressed);
    }

    #[test]
    fn prop_stream_incremental_read(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        block_size in 1usize..5000,
        chunk_size in 1usize..3000,
    ) {
        let compressed = compress(&data, Quality::Fastest, block_size);

        let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
        let mut decompressed = Vec::new();
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let n = stream.read(&mut buffer).expect("read failed");
            if n == 0 {
                break;
            }
            decompressed.extend_from_slice(&buffer[..n]);
        }

        prop_assert_eq!(data, decompressed);
    }

    #[test]
    fn prop_block_sizes_respected(
        data in prop::collection::vec(any::<u8>(), 1..20_000),
        block_size in 1usize..5000,
    ) {
        let compressed = compress(&data, Quality::Optimal, block_size);

        let mut reader = BlockReader::new(&compressed[..]);
        let mut total = 0;
        while let Some(block) = reader.next_block().expect("next_block failed") {
            prop_assert!(block.len() <= block_size);
            total += block.len();
        }
        prop_assert_eq!(total, data.len());
        prop_assert!(reader.saw_eof_marker());
    }

    #[test]
    fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..10_000)) {
        // Arbitrary input should decode or fail, never panic
        let mut stream = BgzfStream::new(&data[..], Mode::Decompress);
        let mut out = Vec::new();
        let _ = stream.read_to_end(&mut out);
    }

    #[test]
    fn prop_corrupted_payload_detected(
        data in prop::collection::vec(any::<u8>(), 64..4000),
        flip in any::<prop::sample::Index>(),
    ) {
        let mut compressed = compress(&data, Quality::Optimal, 65280);
        // Low bits are never deflate padding, and the final payload byte is skipped
        let block_len = u16::from_le_bytes([compressed[16], compressed[17]]) as usize + 1;
        let payload_len = block_len - 18 - 8;
        let at = 18 + flip.index(payload_len - 1);
        compressed[at] ^= 0x01;

        let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
        let mut out = Vec::new();
        prop_assert!(stream.read_to_end(&mut out).is_err());
    }
}

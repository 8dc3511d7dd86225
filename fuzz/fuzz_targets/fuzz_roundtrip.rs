#![no_main]

use bgzfio::{BlockReader, BlockWriter, Quality};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Skip very large inputs to avoid OOM
    if data.len() > 1_000_000 {
        return;
    }

    // First byte picks the block size so short blocks get exercised too
    let (block_size, data) = match data.split_first() {
        Some((&b, rest)) => (usize::from(b) * 256 + 1, rest),
        None => (1, data),
    };

    for quality in [
        Quality::Fastest,
        Quality::Optimal,
        Quality::NoCompression,
        Quality::SmallestSize,
    ] {
        let mut compressed = Vec::new();
        let mut writer = BlockWriter::with_block_size(&mut compressed, quality, block_size);
        writer.write(data).expect("write failed");
        writer.finish().expect("finish failed");

        let mut reader = BlockReader::new(&compressed[..]);
        let mut decompressed = Vec::with_capacity(data.len());
        while let Some(block) = reader.next_block().expect("decode failed") {
            assert!(block.len() <= block_size);
            decompressed.extend_from_slice(block);
        }
        assert!(reader.saw_eof_marker());
        assert_eq!(data, &decompressed[..], "{:?} roundtrip failed", quality);
    }
});

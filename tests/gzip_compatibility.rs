//! Test that our blocks are plain gzip members readable by any gzip decoder

use bgzfio::{BgzfStream, Mode, Quality, EOF_MARKER};
use flate2::read::{GzDecoder, MultiGzDecoder};
use std::io::{Read, Write};

fn compress_with_block_size(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut stream = BgzfStream::builder()
        .stream(&mut compressed)
        .quality(Quality::Optimal)
        .block_size(block_size)
        .build()
        .unwrap();
    stream.write_all(data).unwrap();
    stream.close().unwrap();
    drop(stream);
    compressed
}

#[test]
fn test_first_block_decodes_alone() {
    let input = b"122333444455555";
    let compressed = compress_with_block_size(input, 65280);

    // Cut out just the first block using its BSIZE field
    let first_len = u16::from_le_bytes([compressed[16], compressed[17]]) as usize + 1;
    let first_block = &compressed[..first_len];

    let mut decoder = GzDecoder::new(first_block);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, input);

    // Nothing follows the member
    let mut extra = [0u8; 1];
    assert_eq!(decoder.read(&mut extra).unwrap(), 0);
}

#[test]
fn test_first_block_of_many() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 97) as u8).collect();
    let compressed = compress_with_block_size(&data, 4096);

    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, &data[..4096]);
}

#[test]
fn test_whole_stream_with_multi_member_decoder() {
    let data = b"@SRR001666.1 071112_SLXA-EAS1_s_7:5:1:817:345 length=36\n\
                 GGGTGATGGCCGCTGCCGATGGCGTCAAATCCCACC\n+\n\
                 IIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIII\n"
        .repeat(2000);
    let compressed = compress_with_block_size(&data, 65280);

    let mut decoder = MultiGzDecoder::new(&compressed[..]);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn test_eof_marker_is_empty_gzip_member() {
    let mut decoder = GzDecoder::new(&EOF_MARKER[..]);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).unwrap();
    assert!(decoded.is_empty());

    let header = decoder.header().expect("valid gzip header");
    assert_eq!(header.extra(), Some(&[b'B', b'C', 2, 0, 0x1b, 0][..]));
}

#[test]
fn test_reads_multi_member_gzip_written_by_bgzf_blocks() {
    // Build a stream by hand from three independently framed streams
    let mut compressed = Vec::new();
    for part in [&b"alpha "[..], b"beta ", b"gamma"] {
        let mut one = compress_with_block_size(part, 65280);
        one.truncate(one.len() - EOF_MARKER.len());
        compressed.extend(one);
    }
    compressed.extend_from_slice(&EOF_MARKER);

    let mut text = String::new();
    BgzfStream::new(&compressed[..], Mode::Decompress)
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "alpha beta gamma");
}

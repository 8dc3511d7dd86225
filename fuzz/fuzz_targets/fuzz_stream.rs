#![no_main]

use bgzfio::{BgzfStream, Mode};
use libfuzzer_sys::fuzz_target;
use std::io::Read;

fuzz_target!(|data: &[u8]| {
    // Skip very large inputs
    if data.len() > 1_000_000 {
        return;
    }

    // Write in uneven pieces, then read back with a small buffer
    let mut compressed = Vec::new();
    let mut stream = BgzfStream::new(&mut compressed, Mode::Compress);
    for piece in data.chunks(4093) {
        stream.write(piece).expect("write failed");
    }
    stream.close().expect("close failed");
    drop(stream);

    let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
    let mut decompressed = Vec::new();
    let mut buf = [0u8; 777];
    loop {
        let n = stream.read(&mut buf).expect("read failed");
        if n == 0 {
            break;
        }
        decompressed.extend_from_slice(&buf[..n]);
    }
    assert_eq!(data, &decompressed[..]);

    // Reading arbitrary bytes must not panic either
    let mut stream = BgzfStream::new(data, Mode::Decompress);
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out);
});

#![no_main]

use bgzfio::{BgzfStream, Mode};
use libfuzzer_sys::fuzz_target;
use std::io::Read;

fuzz_target!(|data: &[u8]| {
    // Arbitrary input either decodes or returns an error, never panics
    let mut stream = BgzfStream::new(data, Mode::Decompress);
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out);
});

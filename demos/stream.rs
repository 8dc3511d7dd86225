// Copyright 2024 Karpeles Lab Inc.
// Example demonstrating BGZF stream compression/decompression

use bgzfio::{BgzfStream, BlockReader, Mode, Quality, EOF_MARKER};
use std::io::{Read, Write};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("BGZF Stream Demo\n");

    let original_data = b"chr1\t11868\t14409\tDDX11L1\t0\t+\n\
                          chr1\t14403\t29570\tWASH7P\t0\t-\n\
                          chr1\t17368\t17436\tMIR6859-1\t0\t-\n";

    println!("Original data:");
    println!("  Size: {} bytes", original_data.len());
    println!("  Content: {:?}\n", std::str::from_utf8(original_data)?);

    // Compress
    let mut compressed = Vec::new();
    {
        let mut stream = BgzfStream::new(&mut compressed, Mode::Compress);
        stream.write_all(original_data)?;
        stream.close()?;
    }

    println!("Compressed:");
    println!("  Size: {} bytes", compressed.len());
    println!(
        "  Ratio: {:.2}%\n",
        (compressed.len() as f64 / original_data.len() as f64) * 100.0
    );

    // Show the block header
    println!("Header bytes: {:02x?}", &compressed[..18]);
    println!("(1f 8b 08 04 = gzip with extra field, 42 43 = BC subfield)\n");
    println!(
        "Ends with EOF marker: {}\n",
        compressed.ends_with(&EOF_MARKER)
    );

    // Decompress
    let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
    let mut decompressed = Vec::new();
    stream.read_to_end(&mut decompressed)?;

    println!("Decompressed:");
    println!("  Size: {} bytes", decompressed.len());
    println!("  Match: {}\n", decompressed == original_data);

    // Incremental reading
    println!("--- Incremental Reading Test ---");
    let mut stream = BgzfStream::new(&compressed[..], Mode::Decompress);
    let mut buffer = [0u8; 20];
    let mut total_read = 0;

    loop {
        let n = stream.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        total_read += n;
        println!("Read {} bytes: {:?}", n, std::str::from_utf8(&buffer[..n])?);
    }

    println!("\nTotal read: {} bytes", total_read);

    // Multiple writes creating multiple blocks
    println!("\n--- Multiple Blocks Test ---");
    let mut stream = BgzfStream::builder()
        .stream(Vec::<u8>::new())
        .quality(Quality::Fastest)
        .block_size(32)
        .leave_open(true)
        .build()?;
    for i in 0..5 {
        stream.write_all(format!("Block {} ", i).as_bytes())?;
    }
    stream.close()?;
    let compressed = stream.into_inner().unwrap_or_default();

    let mut reader = BlockReader::new(&compressed[..]);
    while let Some(block) = reader.next_block()? {
        println!("Block: {:?}", std::str::from_utf8(block)?);
    }

    println!("Compressed with small blocks: {} bytes", compressed.len());
    println!("Saw EOF marker: {}", reader.saw_eof_marker());

    Ok(())
}

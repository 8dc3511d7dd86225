// Copyright 2024 Karpeles Lab Inc.
// BGZF compression command-line tool
// Produces output readable by htslib's bgzip, tabix and samtools

use anyhow::{Context, Result};
use bgzfio::{BgzfStream, Mode, Quality, DEFAULT_BLOCK_SIZE};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Level {
    /// Fastest deflate level
    Fastest,
    /// Default deflate level
    Optimal,
    /// Stored blocks only
    None,
    /// Best deflate level
    Smallest,
}

impl From<Level> for Quality {
    fn from(level: Level) -> Self {
        match level {
            Level::Fastest => Quality::Fastest,
            Level::Optimal => Quality::Optimal,
            Level::None => Quality::NoCompression,
            Level::Smallest => Quality::SmallestSize,
        }
    }
}

#[derive(Parser)]
#[command(name = "bgzc")]
#[command(about = "BGZF compression tool", long_about = None)]
#[command(version)]
struct Args {
    /// Input files to compress
    #[arg(required = true)]
    files: Vec<String>,

    /// Write output to stdout (use with single file or -)
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Output file (use with single input file)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Compression level
    #[arg(short = 'l', long, value_enum, default_value_t = Level::Optimal)]
    level: Level,

    /// Uncompressed bytes per block (e.g. 4K, 32K, 65280)
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE.to_string())]
    blocksize: String,

    /// Do not overwrite existing files
    #[arg(long)]
    safe: bool,

    /// Delete source files after successful compression
    #[arg(long)]
    rm: bool,

    /// Verify written files by decompressing them
    #[arg(long)]
    verify: bool,

    /// Quiet mode - don't print progress
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Increase log verbosity (repeat for more)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize, quiet: bool) -> Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("bgzfio")
        .quiet(quiet)
        .verbosity(log_max_level)
        .timestamp(stderrlog::Timestamp::Off)
        .init()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_log(args.verbose as usize + 2, args.quiet)?;

    if args.files.len() > 1 && args.output.is_some() {
        anyhow::bail!("Cannot use -o with multiple input files");
    }

    if args.files.len() > 1 && args.stdout {
        anyhow::bail!("Cannot use -c with multiple input files");
    }

    let block_size = parse_size(&args.blocksize).context("Invalid block size")?;
    if block_size == 0 || block_size > DEFAULT_BLOCK_SIZE {
        anyhow::bail!("Block size must be between 1 and {}", DEFAULT_BLOCK_SIZE);
    }

    if args.files.len() == 1 && args.files[0] == "-" {
        let stdin = io::stdin();
        let stdout = io::stdout();
        return compress_stream(
            &mut stdin.lock(),
            stdout.lock(),
            args.level.into(),
            block_size,
            &ProgressBar::hidden(),
        );
    }

    for file in &args.files {
        compress_file(Path::new(file), &args, block_size)?;
    }

    Ok(())
}

fn output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

fn compress_file(input: &Path, args: &Args, block_size: usize) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Not a file: {}", input.display());
    }

    let output = if let Some(ref out) = args.output {
        out.clone()
    } else if args.stdout {
        PathBuf::from("-")
    } else {
        output_path(input)
    };
    let to_stdout = output == Path::new("-");

    if args.safe && !to_stdout && output.exists() {
        anyhow::bail!("Output file already exists: {}", output.display());
    }

    let file_size = fs::metadata(input)?.len();
    let pb = if !args.quiet && !to_stdout {
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut input_file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let quality = Quality::from(args.level);

    if to_stdout {
        let stdout = io::stdout();
        compress_stream(&mut input_file, stdout.lock(), quality, block_size, &pb)?;
    } else {
        let output_file = File::create(&output)
            .with_context(|| format!("Failed to create output file: {}", output.display()))?;
        compress_stream(
            &mut input_file,
            BufWriter::new(output_file),
            quality,
            block_size,
            &pb,
        )?;
    }
    pb.finish_and_clear();

    if !to_stdout {
        let output_size = fs::metadata(&output)?.len();
        if file_size > 0 {
            info!(
                "{} -> {} ({:.2}%)",
                input.display(),
                output.display(),
                output_size as f64 / file_size as f64 * 100.0
            );
        }

        if args.verify {
            verify_compressed_file(input, &output)?;
            debug!("verified {}", output.display());
        }

        if args.rm {
            fs::remove_file(input)
                .with_context(|| format!("Failed to remove source file: {}", input.display()))?;
        }
    }

    Ok(())
}

fn compress_stream<R: Read, W: Write>(
    input: &mut R,
    output: W,
    quality: Quality,
    block_size: usize,
    pb: &ProgressBar,
) -> Result<()> {
    let mut stream = BgzfStream::builder()
        .stream(output)
        .quality(quality)
        .block_size(block_size)
        .build()?;
    let mut buffer = vec![0u8; 128 * 1024];

    loop {
        let n = input.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        stream.write(&buffer[..n])?;
        pb.inc(n as u64);
    }

    stream.close()?;
    Ok(())
}

fn verify_compressed_file(original: &Path, compressed: &Path) -> Result<()> {
    let original_data = fs::read(original).with_context(|| {
        format!(
            "Failed to open original file for verification: {}",
            original.display()
        )
    })?;

    let compressed_file = File::open(compressed).with_context(|| {
        format!(
            "Failed to open compressed file for verification: {}",
            compressed.display()
        )
    })?;

    let mut stream = BgzfStream::new(io::BufReader::new(compressed_file), Mode::Decompress);
    let mut decompressed_data = Vec::new();
    stream
        .read_to_end(&mut decompressed_data)
        .with_context(|| {
            format!(
                "Failed to decompress file for verification: {}",
                compressed.display()
            )
        })?;

    if original_data != decompressed_data {
        anyhow::bail!(
            "Verification failed: decompressed data does not match original (original: {} bytes, decompressed: {} bytes)",
            original_data.len(),
            decompressed_data.len()
        );
    }

    Ok(())
}

fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim().to_uppercase();

    if let Some(num) = s.strip_suffix('K') {
        Ok(num.parse::<usize>()? * 1024)
    } else {
        s.parse::<usize>().context("Invalid size format")
    }
}

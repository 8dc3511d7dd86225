// Copyright 2024 Karpeles Lab Inc.
// BGZF decompression command-line tool
// Reads files written by htslib's bgzip as well as bgzc

use anyhow::{Context, Result};
use bgzfio::{has_eof_marker, is_bgzf, BgzfStream, Mode};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bgzd")]
#[command(about = "BGZF decompression tool", long_about = None)]
#[command(version)]
struct Args {
    /// Input files to decompress
    #[arg(required = true)]
    files: Vec<String>,

    /// Write output to stdout (use with single file or -)
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Output file (use with single input file)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Do not overwrite existing files
    #[arg(long)]
    safe: bool,

    /// Delete source files after successful decompression
    #[arg(long)]
    rm: bool,

    /// Verify files only, don't write output
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

    if args.files.len() == 1 && args.files[0] == "-" {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let written = if args.verify {
            decompress_stream(stdin.lock(), io::sink(), &ProgressBar::hidden())?
        } else {
            decompress_stream(stdin.lock(), stdout.lock(), &ProgressBar::hidden())?
        };
        debug!("decompressed {} bytes from stdin", written);
        return Ok(());
    }

    for file in &args.files {
        decompress_file(Path::new(file), &args)?;
    }

    Ok(())
}

/// Strip the compressed extension to get the output name
fn output_path(input: &Path) -> Result<PathBuf> {
    match input.extension().and_then(|ext| ext.to_str()) {
        Some("gz" | "bgz" | "bgzf") => Ok(input.with_extension("")),
        _ => anyhow::bail!(
            "Unknown extension, use -o or -c to name the output: {}",
            input.display()
        ),
    }
}

fn decompress_file(input: &Path, args: &Args) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Not a file: {}", input.display());
    }

    if !is_bgzf(input) {
        anyhow::bail!("Not a BGZF file: {}", input.display());
    }

    if !has_eof_marker(input)? {
        warn!(
            "{}: no EOF marker, the file may be truncated",
            input.display()
        );
    }

    let output = if args.verify {
        None
    } else if let Some(ref out) = args.output {
        Some(out.clone())
    } else if args.stdout {
        Some(PathBuf::from("-"))
    } else {
        Some(output_path(input)?)
    };
    let to_file = output.as_deref().filter(|out| *out != Path::new("-"));

    if let Some(out) = to_file {
        if args.safe && out.exists() {
            anyhow::bail!("Output file already exists: {}", out.display());
        }
    }

    let file_size = fs::metadata(input)?.len();
    let pb = if !args.quiet && (to_file.is_some() || args.verify) {
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

    let input_file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;

    let written = match (&output, to_file) {
        (None, _) => decompress_stream(input_file, io::sink(), &pb),
        (Some(_), Some(out)) => {
            let output_file = File::create(out)
                .with_context(|| format!("Failed to create output file: {}", out.display()))?;
            decompress_stream(input_file, BufWriter::new(output_file), &pb)
        }
        (Some(_), None) => {
            let stdout = io::stdout();
            decompress_stream(input_file, stdout.lock(), &pb)
        }
    }
    .with_context(|| format!("Failed to decompress {}", input.display()))?;
    pb.finish_and_clear();

    if args.verify {
        info!("{}: OK ({} bytes)", input.display(), written);
        return Ok(());
    }

    if let Some(out) = to_file {
        info!("{} -> {} ({} bytes)", input.display(), out.display(), written);

        if args.rm {
            fs::remove_file(input)
                .with_context(|| format!("Failed to remove source file: {}", input.display()))?;
        }
    }

    Ok(())
}

/// Decompress `input` into `output`, returning the decompressed length
fn decompress_stream<R: Read, W: Write>(input: R, mut output: W, pb: &ProgressBar) -> Result<u64> {
    let source = BufReader::new(pb.wrap_read(input));
    let mut stream = BgzfStream::new(source, Mode::Decompress);
    let mut buffer = vec![0u8; 128 * 1024];
    let mut written = 0u64;

    loop {
        let n = stream.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        output.write_all(&buffer[..n])?;
        written += n as u64;
    }
    stream.close()?;

    output.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgzfio::Quality;

    fn write_bgzf(path: &Path, data: &[u8]) {
        let file = BufWriter::new(File::create(path).unwrap());
        let mut stream = BgzfStream::with_quality(file, Quality::Fastest);
        stream.write_all(data).unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("calls.vcf.gz")).unwrap(),
            PathBuf::from("calls.vcf")
        );
        assert_eq!(
            output_path(Path::new("reads.bgz")).unwrap(),
            PathBuf::from("reads")
        );
        assert!(output_path(Path::new("reads.fastq")).is_err());
    }

    #[test]
    fn test_decompress_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variants.vcf.gz");
        let text = "#CHROM\tPOS\tID\tREF\tALT\nchr1\t12345\trs1\tA\tT\n".repeat(3000);
        write_bgzf(&path, text.as_bytes());

        let mut out = Vec::new();
        let written =
            decompress_stream(File::open(&path).unwrap(), &mut out, &ProgressBar::hidden())
                .unwrap();
        assert_eq!(written, text.len() as u64);
        assert_eq!(out, text.as_bytes());
    }

    #[test]
    fn test_corrupt_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gz");
        write_bgzf(&path, &[b'A'; 10_000]);

        let mut bytes = fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes.truncate(middle);
        fs::write(&path, &bytes).unwrap();

        assert!(!has_eof_marker(&path).unwrap());
        let result = decompress_stream(File::open(&path).unwrap(), io::sink(), &ProgressBar::hidden());
        assert!(result.is_err());
    }
}

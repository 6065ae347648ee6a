//! razgz - parallel random-access gzip decompression for FASTQ data.
//!
//! A conventional gzip decoder is stuck decoding from the front of the
//! stream, because every DEFLATE block leans on the 32 KiB of output before
//! it. razgz instead launches workers on disjoint byte ranges of one
//! compressed stream: each worker finds a block boundary by speculative
//! parsing, decodes with placeholder context into a symbolic window, and
//! patches itself into real bytes once its upstream neighbor hands over the
//! resolved context.

use std::process;

mod bitstream;
mod block_finder;
mod cli;
mod decompression;
mod error;
mod format;
mod handoff;
mod huffman;
mod multiplexer;
mod parallel_decompress;
mod parser;
mod sequential;
#[cfg(test)]
#[macro_use]
mod test_utils;
#[cfg(test)]
mod golden_tests;
mod window;
mod worker;

use cli::RazgzArgs;
use error::RazgzError;

const VERSION: &str = concat!("razgz ", env!("CARGO_PKG_VERSION"));

fn main() {
    match run() {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("razgz: {}", e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32, RazgzError> {
    let args = RazgzArgs::parse()?;

    if args.version {
        println!("{}", VERSION);
        return Ok(0);
    }
    if args.help {
        print_help();
        return Ok(0);
    }
    if !args.decompress {
        return Err(RazgzError::invalid_argument(
            "only decompression is implemented; pass -d",
        ));
    }

    let mut exit_code = 0;
    if args.files.is_empty() {
        exit_code = decompression::decompress_stdin(&args)?;
    } else {
        for file in &args.files {
            match decompression::decompress_file(file, &args) {
                Ok(code) => {
                    if code != 0 {
                        exit_code = code;
                    }
                }
                Err(e) => {
                    eprintln!("razgz: {}: {}", file, e);
                    exit_code = 1;
                }
            }
        }
    }
    Ok(exit_code)
}

fn print_help() {
    println!("Usage: razgz -d [OPTION]... [FILE]...");
    println!();
    println!("Decompress gzipped FASTQ FILEs in parallel (stdin if no FILE).");
    println!();
    println!("Options:");
    println!("  -d, --decompress Decompress (the only mode)");
    println!("  -c, --stdout     Write to stdout, keep original files");
    println!("  -t N             Use N threads (default: all CPUs)");
    println!("  -s BYTES         Skip BYTES of compressed data, sync, then decompress");
    println!("  -u BYTES         Stop 20 blocks after this compressed position");
    println!("  -k, --keep       Keep original file");
    println!("  -f, --force      Force overwrite of output file");
    println!("  -S SUF           Expect suffix SUF instead of .gz");
    println!("  -n, --no-name    Do not restore original name/time");
    println!("  -q, --quiet      Suppress warnings");
    println!("  -v, --verbose    Verbose output (repeat for more)");
    println!("  -h, --help       Show this help");
    println!("  -V, --version    Show version");
    println!();
    println!("Exit status: 0 ok, 1 error, 2 warnings only.");
    println!();
    println!("Examples:");
    println!("  razgz -dc reads.fastq.gz > reads.fastq");
    println!("  razgz -d -t 16 reads.fastq.gz");
    println!("  cat reads.fastq.gz | razgz -dc > reads.fastq");
}

//! File and stdin drivers.
//!
//! Inputs are memory-mapped (the random-access core needs the whole
//! compressed stream addressable); stdin is slurped for the same reason.
//! When writing to stdout the decompressed stream is buffered first, which
//! also makes the multi-member fallback trivial: nothing has reached the
//! terminal when the parallel path bails out. File outputs are written
//! directly and truncated before a retry.

use std::fs::File;
use std::io::{stdin, stdout, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::cli::RazgzArgs;
use crate::error::{RazgzError, RazgzResult};
use crate::parallel_decompress::{decompress_parallel, ParallelOpts};
use crate::sequential;

const STREAM_BUFFER_SIZE: usize = 256 * 1024;

fn parallel_opts(args: &RazgzArgs) -> ParallelOpts {
    ParallelOpts {
        num_threads: args.threads,
        verbosity: args.verbosity,
        ..ParallelOpts::default()
    }
}

/// Decompress `data` into `writer`, retrying sequentially (after `reset`)
/// when the stream turns out not to be splittable.
fn decompress_routed<W: Write + Send>(
    data: &[u8],
    writer: &mut W,
    args: &RazgzArgs,
    reset: impl FnOnce(&mut W) -> RazgzResult<()>,
) -> RazgzResult<u64> {
    if args.skip.is_some() || args.until.is_some() {
        return sequential::decompress_skip(
            data,
            writer,
            args.skip.unwrap_or(0),
            args.until,
            args.verbosity,
        );
    }
    match decompress_parallel(data, writer, &parallel_opts(args)) {
        Err(RazgzError::MultiMember) => {
            if args.verbosity >= 2 {
                eprintln!("razgz: multi-member stream, decoding sequentially");
            }
            reset(writer)?;
            sequential::decompress_gzip(data, writer, args.verbosity)
        }
        result => result,
    }
}

pub fn decompress_file(filename: &str, args: &RazgzArgs) -> RazgzResult<i32> {
    if filename == "-" {
        return decompress_stdin(args);
    }

    let input_path = Path::new(filename);
    if !input_path.exists() {
        return Err(RazgzError::FileNotFound(filename.to_string()));
    }
    if input_path.is_dir() {
        return Err(RazgzError::invalid_argument(format!(
            "{} is a directory",
            filename
        )));
    }

    let output_path = if args.stdout {
        None
    } else {
        match output_filename(input_path, &args.suffix) {
            Some(path) => Some(path),
            None => {
                if !args.quiet {
                    eprintln!(
                        "razgz: {}: unknown suffix -- ignored (expected {})",
                        filename, args.suffix
                    );
                }
                return Ok(2);
            }
        }
    };
    if let Some(ref path) = output_path {
        if path.exists() && !args.force {
            return Err(RazgzError::invalid_argument(format!(
                "output file {} already exists; use -f to overwrite",
                path.display()
            )));
        }
    }

    let input_file = File::open(input_path)?;
    let file_size = input_file.metadata()?.len();
    let mmap = unsafe { Mmap::map(&input_file)? };

    let output_size = match output_path {
        None => {
            // Buffer for stdout: parallel workers need a Send sink, and a
            // failed parallel attempt must not leak partial output. The
            // ISIZE trailer is a useful pre-allocation hint even though it
            // is modulo 2^32 and unverified.
            let mut buffer = Vec::new();
            if let Some((_, isize_hint)) = crate::format::read_footer(&mmap, mmap.len()) {
                buffer.reserve(isize_hint as usize);
            }
            let n = decompress_routed(&mmap, &mut buffer, args, |b| {
                b.clear();
                Ok(())
            })?;
            let stdout = stdout();
            let mut writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, stdout.lock());
            writer.write_all(&buffer)?;
            writer.flush()?;
            n
        }
        Some(ref path) => {
            let output_file = File::create(path)?;
            let mut writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, output_file);
            let result = decompress_routed(&mmap, &mut writer, args, |w| {
                w.flush()?;
                let file = w.get_mut();
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                Ok(())
            });
            match result {
                Ok(n) => {
                    writer.flush()?;
                    n
                }
                Err(e) => {
                    drop(writer);
                    let _ = std::fs::remove_file(path);
                    return Err(e);
                }
            }
        }
    };

    if args.verbosity >= 2 {
        eprintln!(
            "razgz: {}: {} -> {} bytes ({} threads)",
            filename, file_size, output_size, args.threads
        );
    }
    if !args.keep && !args.stdout {
        std::fs::remove_file(input_path)?;
    }
    Ok(0)
}

pub fn decompress_stdin(args: &RazgzArgs) -> RazgzResult<i32> {
    // The core needs random access over the whole compressed stream, so
    // stdin cannot be decoded as it arrives.
    let mut data = Vec::new();
    stdin().lock().read_to_end(&mut data)?;

    let mut buffer = Vec::new();
    decompress_routed(&data, &mut buffer, args, |b| {
        b.clear();
        Ok(())
    })?;
    let stdout = stdout();
    let mut writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, stdout.lock());
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(0)
}

fn output_filename(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_the_configured_suffix() {
        assert_eq!(
            output_filename(Path::new("/tmp/reads.fastq.gz"), ".gz"),
            Some(PathBuf::from("/tmp/reads.fastq"))
        );
        assert_eq!(output_filename(Path::new("reads.fastq"), ".gz"), None);
        assert_eq!(output_filename(Path::new(".gz"), ".gz"), None);
        assert_eq!(
            output_filename(Path::new("a.gzip"), ".gzip"),
            Some(PathBuf::from("a"))
        );
    }
}

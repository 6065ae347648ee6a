//! Single-threaded decode paths.
//!
//! The primary path runs our own parser with a concrete window, streaming
//! evicted bytes to the writer and walking gzip members back to back. The
//! parser's windows are ASCII-only by design, so inputs that turn out to
//! hold arbitrary binary payloads are routed to `flate2` instead; the
//! routing decision is made on the first block, before anything has been
//! written.
//!
//! Also here: the `-s`/`-u` random-access path, which syncs blindly into
//! the middle of a stream, decodes with a symbolic window, and renders
//! still-unresolved positions as `?`.

use std::io::{Read, Write};

use crate::bitstream::BitStream;
use crate::block_finder::{sync, SyncParams};
use crate::error::{RazgzError, RazgzResult};
use crate::format::{parse_gzip_header, GZIP_FOOTER_SIZE, GZIP_ID1, GZIP_ID2, GZIP_MIN_OVERHEAD};
use crate::parser::{BlockParser, BlockResult, ParseMode};
use crate::window::{ByteWindow, DummyWindow, SymbolicWindow, FIRST_BACKREF_SYMBOL, MAX_LITERAL};

/// Number of further blocks decoded once the `-u` position is passed.
const UNTIL_EXTRA_BLOCKS: usize = 20;

/// Decompress a complete gzip buffer (one member or several) to `writer`.
pub fn decompress_gzip<W: Write>(data: &[u8], writer: &mut W, verbosity: u8) -> RazgzResult<u64> {
    if !looks_ascii_decodable(data) {
        // Not FASTQ-shaped; hand the whole stream to flate2.
        return decompress_fallback(data, writer, verbosity);
    }
    decompress_members(data, writer, verbosity)
}

/// Probe the first block: does this stream decode under the ASCII windows?
fn looks_ascii_decodable(data: &[u8]) -> bool {
    let start = match parse_gzip_header(data) {
        Ok(start) => start,
        Err(_) => return true, // let the member walk report the real error
    };
    let mut parser = BlockParser::new();
    let mut input = BitStream::new(&data[start..data.len() - GZIP_FOOTER_SIZE]);
    let mut probe = DummyWindow::new();
    parser
        .parse_block(&mut input, &mut probe, ParseMode::ShouldSucceed)
        .is_ok()
}

fn decompress_members<W: Write>(data: &[u8], writer: &mut W, verbosity: u8) -> RazgzResult<u64> {
    let mut parser = BlockParser::new();
    let mut total = 0u64;
    let mut member_start = 0usize;

    loop {
        let payload_start = member_start
            + parse_gzip_header(&data[member_start..]).map_err(|e| match member_start {
                0 => e,
                _ => RazgzError::invalid_gzip("bad header on a subsequent member"),
            })?;
        let payload = &data[payload_start..data.len() - GZIP_FOOTER_SIZE];
        let mut input = BitStream::new(payload);
        let mut window = ByteWindow::new();

        loop {
            match parser.parse_block(&mut input, &mut window, ParseMode::MustSucceed) {
                BlockResult::Success => {
                    let flushed = window.take_output();
                    writer.write_all(&flushed)?;
                    total += flushed.len() as u64;
                }
                BlockResult::LastBlock => break,
                err => {
                    return Err(RazgzError::decompression(format!(
                        "{:?} at bit {}",
                        err,
                        input.position_bits()
                    )))
                }
            }
        }
        input.align_input();
        let consumed = input.position_bits() / 8;
        let out = window.into_output();
        writer.write_all(&out)?;
        total += out.len() as u64;

        // Footer, then possibly another member.
        let next = payload_start + consumed + GZIP_FOOTER_SIZE;
        if next > data.len() {
            return Err(RazgzError::invalid_gzip("truncated footer"));
        }
        let rest = &data[next..];
        if rest.len() >= GZIP_MIN_OVERHEAD && rest[0] == GZIP_ID1 && rest[1] == GZIP_ID2 {
            member_start = next;
            continue;
        }
        if !rest.is_empty() && rest.iter().any(|&b| b != 0) && verbosity >= 1 {
            eprintln!("razgz: {} trailing bytes ignored", rest.len());
        }
        writer.flush()?;
        return Ok(total);
    }
}

/// Stream everything through flate2 (handles multi-member and non-ASCII
/// payloads, which our windows reject by design).
pub fn decompress_fallback<W: Write>(
    data: &[u8],
    writer: &mut W,
    verbosity: u8,
) -> RazgzResult<u64> {
    if verbosity >= 2 {
        eprintln!("razgz: payload is not ASCII-decodable, using the generic decoder");
    }
    let mut decoder = flate2::read::MultiGzDecoder::new(data);
    let mut buffer = vec![0u8; 256 * 1024];
    let mut total = 0u64;
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                writer.write_all(&buffer[..n])?;
                total += n as u64;
            }
            Err(e) => {
                return Err(RazgzError::decompression(format!(
                    "corrupt gzip stream: {}",
                    e
                )))
            }
        }
    }
    writer.flush()?;
    Ok(total)
}

/// Random access into the middle of a stream (`-s`, optionally bounded by
/// `-u`). The decode starts from a blindly discovered block boundary with
/// no context, so back-references into the unknown prefix render as `?`.
pub fn decompress_skip<W: Write>(
    data: &[u8],
    writer: &mut W,
    skip_bytes: usize,
    until_bytes: Option<usize>,
    verbosity: u8,
) -> RazgzResult<u64> {
    let payload_start = parse_gzip_header(data)?;
    let payload = &data[payload_start..data.len() - GZIP_FOOTER_SIZE];
    if skip_bytes >= payload.len() {
        return Err(RazgzError::invalid_argument(
            "skip position is past the end of the compressed payload",
        ));
    }

    let mut parser = BlockParser::new();
    let mut input = BitStream::new(payload);
    let point = sync(
        &mut parser,
        &mut input,
        skip_bytes * 8,
        &SyncParams::default(),
    )
    .ok_or_else(|| {
        RazgzError::sync(format!(
            "no block boundary found after compressed byte {}",
            skip_bytes
        ))
    })?;
    if verbosity >= 1 {
        eprintln!(
            "razgz: synced at bit {} ({} bytes past the skip point)",
            point.bit_pos,
            point.bit_pos / 8 - skip_bytes
        );
    }

    let mut window = SymbolicWindow::new(payload.len() - skip_bytes);
    let mut blocks_past_until = 0usize;
    loop {
        if let Some(until) = until_bytes {
            // `until` is payload-relative, like the `-s` skip offset.
            if input.position_bits() / 8 >= until {
                blocks_past_until += 1;
                if blocks_past_until > UNTIL_EXTRA_BLOCKS {
                    break;
                }
            }
        }
        match parser.parse_block(&mut input, &mut window, ParseMode::MustSucceed) {
            BlockResult::Success => {}
            BlockResult::LastBlock => break,
            err => {
                return Err(RazgzError::decompression(format!(
                    "{:?} at bit {}",
                    err,
                    input.position_bits()
                )))
            }
        }
    }

    let out: Vec<u8> = window
        .output()
        .iter()
        .map(|&sym| {
            if sym <= MAX_LITERAL as u16 {
                sym as u8
            } else {
                debug_assert!(sym >= FIRST_BACKREF_SYMBOL);
                b'?'
            }
        })
        .collect();
    writer.write_all(&out)?;
    writer.flush()?;
    Ok(out.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8], level: Compression) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), level);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn roundtrips_ascii_payload() {
        let plain = b"ACGT\n".repeat(1000);
        let compressed = gzip(&plain, Compression::default());
        let mut out = Vec::new();
        let n = decompress_gzip(&compressed, &mut out, 0).unwrap();
        assert_eq!(n, plain.len() as u64);
        crate::assert_slices_eq!(out, plain);
    }

    #[test]
    fn walks_multiple_members() {
        let a = b"first member, ASCII text\n".repeat(2000);
        let b = b"second member, more text\n".repeat(2000);
        let mut compressed = gzip(&a, Compression::default());
        compressed.extend(gzip(&b, Compression::fast()));

        let mut out = Vec::new();
        decompress_gzip(&compressed, &mut out, 0).unwrap();
        let mut expect = a.clone();
        expect.extend_from_slice(&b);
        crate::assert_slices_eq!(out, expect);
    }

    #[test]
    fn binary_payload_routes_to_fallback() {
        let plain: Vec<u8> = (0..100_000u32).map(|i| (i * 17 % 251) as u8).collect();
        let compressed = gzip(&plain, Compression::default());
        let mut out = Vec::new();
        decompress_gzip(&compressed, &mut out, 0).unwrap();
        crate::assert_slices_eq!(out, plain);
    }

    #[test]
    fn corrupt_stream_does_not_decode_silently() {
        let plain = b"ACGT\n".repeat(20_000);
        let mut compressed = gzip(&plain, Compression::default());
        // Flip a bit in the middle of the deflate payload. The parser's
        // validity checks catch most flips; the remainder must at least
        // fail to reproduce the original bytes.
        let mid = compressed.len() / 2;
        compressed[mid] ^= 0x10;
        let mut out = Vec::new();
        match decompress_gzip(&compressed, &mut out, 0) {
            Err(_) => {}
            Ok(_) => assert_ne!(out, plain),
        }
    }

    #[test]
    fn skip_emits_resolved_suffix() {
        let plain: Vec<u8> = {
            // Poorly compressible ASCII so blocks stay close together and
            // most of the tail resolves without the missing context.
            let mut v = Vec::new();
            let mut state = 77u32;
            while v.len() < 1 << 20 {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                v.push(b'!' + ((state >> 24) % 90) as u8);
            }
            v
        };
        let compressed = gzip(&plain, Compression::default());
        let mut out = Vec::new();
        let n = decompress_skip(&compressed, &mut out, compressed.len() / 2, None, 0).unwrap();
        assert!(n > 0);
        // The suffix of the original must appear at the end of the output,
        // modulo '?' placeholders for unresolved positions.
        let tail_len = out.len().min(1024);
        let expect = &plain[plain.len() - tail_len..];
        for (got, want) in out[out.len() - tail_len..].iter().zip(expect) {
            assert!(got == want || *got == b'?');
        }
    }
}

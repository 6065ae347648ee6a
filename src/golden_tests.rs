//! End-to-end scenarios against reference decoders.
//!
//! Every test decodes a gzip stream produced by `flate2` (or crafted by
//! hand) and compares byte-for-byte with the expected plaintext, and where
//! it matters, with `libdeflater` as an independent oracle.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};

use crate::block_finder::SyncParams;
use crate::parallel_decompress::{decompress_parallel, ParallelOpts};
use crate::sequential::decompress_gzip;

fn gzip(data: &[u8], level: Compression) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), level);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn fastq(bytes: usize, seed: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state = seed | 1;
    let mut read = 0usize;
    while out.len() < bytes {
        out.extend_from_slice(format!("@r{}\n", read).as_bytes());
        for _ in 0..100 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            out.push(b"ACGT"[(state >> 29) as usize % 4]);
        }
        out.extend_from_slice(b"\n+\n");
        for _ in 0..100 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            out.push(b'!' + ((state >> 23) % 42) as u8);
        }
        out.push(b'\n');
        read += 1;
    }
    out.truncate(bytes);
    out
}

fn test_opts(threads: usize) -> ParallelOpts {
    ParallelOpts {
        num_threads: threads,
        section_bytes_per_thread: 256 << 10,
        min_bytes_per_thread: 64 << 10,
        first_chunk_bonus: 32 << 10,
        sync_params: SyncParams {
            min_block_bytes: 2 << 10,
            confirm_blocks: 6,
            ..SyncParams::default()
        },
        verbosity: 0,
    }
}

#[test]
fn single_thread_repeated_motif() {
    let plain = b"ACGT\n".repeat(1000);
    let compressed = gzip(&plain, Compression::default());
    let mut out = Vec::new();
    decompress_gzip(&compressed, &mut out, 0).unwrap();
    assert_slices_eq!(out, plain);
}

#[test]
fn parallel_matches_reference_decoder() {
    let plain = fastq(10 << 20, 0x5EED_1234);
    let compressed = gzip(&plain, Compression::default());

    // Reference: libdeflater, a decoder we share no code with.
    let mut reference = vec![0u8; plain.len() + 64];
    let n = libdeflater::Decompressor::new()
        .gzip_decompress(&compressed, &mut reference)
        .unwrap();
    reference.truncate(n);
    assert_slices_eq!(reference, plain);

    let mut out = Vec::new();
    decompress_parallel(&compressed, &mut out, &test_opts(8)).unwrap();
    assert_slices_eq!(out, reference);
}

#[test]
fn uniform_records_with_fastest_compression() {
    // Highly uniform records compressed at the fastest level: long matches,
    // large decoded blocks, and back-references that straddle every chunk
    // boundary.
    let mut plain = Vec::new();
    let mut read = 0usize;
    while plain.len() < 12 << 20 {
        plain.extend_from_slice(
            format!(
                "@r{}\nACGTACGTACGTACGTACGTACGTACGT\n+\n!!!!!!!!!!!!!!!!!!!!!!!!!!!!\n",
                read
            )
            .as_bytes(),
        );
        read += 1;
    }
    let compressed = gzip(&plain, Compression::fast());

    let mut out = Vec::new();
    decompress_parallel(&compressed, &mut out, &test_opts(4)).unwrap();
    assert_slices_eq!(out, plain);
}

#[test]
fn extra_field_in_header() {
    let plain = b"ACGT\n".repeat(1000);
    let mut enc = GzBuilder::new()
        .extra(vec![0x42; 37])
        .write(Vec::new(), Compression::default());
    enc.write_all(&plain).unwrap();
    let compressed = enc.finish().unwrap();

    let mut out = Vec::new();
    decompress_gzip(&compressed, &mut out, 0).unwrap();
    assert_slices_eq!(out, plain);
}

#[test]
fn final_stored_block_is_appended() {
    // Hand-assembled member: the payload in non-final stored blocks, then a
    // final stored block holding "HELLO".
    let payload = b"The quick brown fox jumps over the lazy dog. ".repeat(100);
    let mut deflate = Vec::new();
    for chunk in payload.chunks(4000) {
        deflate.push(0x00); // BFINAL=0, BTYPE=00, padding
        deflate.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        deflate.extend_from_slice(&(!(chunk.len() as u16)).to_le_bytes());
        deflate.extend_from_slice(chunk);
    }
    deflate.push(0x01); // BFINAL=1, BTYPE=00
    deflate.extend_from_slice(&5u16.to_le_bytes());
    deflate.extend_from_slice(&(!5u16).to_le_bytes());
    deflate.extend_from_slice(b"HELLO");

    let mut member = vec![0x1F, 0x8B, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xFF];
    member.extend_from_slice(&deflate);
    member.extend_from_slice(&[0u8; 4]); // CRC32 is not verified
    member.extend_from_slice(&((payload.len() + 5) as u32).to_le_bytes());

    let mut expect = payload.clone();
    expect.extend_from_slice(b"HELLO");
    let mut out = Vec::new();
    decompress_gzip(&member, &mut out, 0).unwrap();
    assert_slices_eq!(out, expect);
}

#[test]
fn corrupted_stream_does_not_decode_silently() {
    let plain = fastq(1 << 20, 0xBAD5_EED1);
    let mut compressed = gzip(&plain, Compression::default());

    // Flip a bit inside the first dynamic block's code-length section. Most
    // flips break the Kraft equality or derail the parse into non-ASCII
    // output; the rest produce different bytes, never silently correct
    // ones.
    compressed[12] ^= 0x08;
    let mut out = Vec::new();
    match decompress_gzip(&compressed, &mut out, 0) {
        Err(_) => {}
        Ok(_) => assert_ne!(out, plain),
    }
}

#[test]
fn thread_counts_agree_with_each_other() {
    let plain = fastq(5 << 20, 0x0DDB_A115);
    let compressed = gzip(&plain, Compression::default());

    let mut single = Vec::new();
    decompress_gzip(&compressed, &mut single, 0).unwrap();
    for threads in 1..=5 {
        let mut out = Vec::new();
        decompress_parallel(&compressed, &mut out, &test_opts(threads)).unwrap();
        assert_slices_eq!(out, single);
    }
}

//! The coordinator: partitions a single gzip member across worker threads.
//!
//! The compressed payload is cut into *sections* of at most
//! `nthreads * 32 MiB`, processed in order; each section is cut into
//! `nthreads` *chunks*, processed in parallel. Thread `t` owns chunk `t` of
//! every section, so each worker keeps the same upstream neighbor
//! throughout and the handoff links form a chain through the whole stream:
//!
//! ```text
//! section 0:  [chunk 0][chunk 1]...[chunk N-1] ──context──┐
//! section 1:  [chunk 0][chunk 1]...[chunk N-1] ◄──────────┘
//! ```
//!
//! Chunk 0 of a section starts on a known block boundary (bit 0, or where
//! the previous section's last chunk stopped) and is oversized by a few
//! MiB because it decodes with a resolved context and no synchronization.
//! The last chunk's stop position is preset to the section end.
//!
//! Output ordering needs no extra machinery: a worker writes its resolved
//! chunk before publishing its context, and the downstream worker cannot
//! resolve (hence cannot write) until that context arrives.

use std::io::Write;
use std::sync::Mutex;

use crate::block_finder::SyncParams;
use crate::error::{RazgzError, RazgzResult};
use crate::format::deflate_payload;
use crate::handoff::{handoff_channel, FromUpstream, Handoff, ToDownstream};
use crate::sequential;
use crate::worker::{FirstChunkWorker, RandomAccessChunkWorker, WorkerOutput};

#[derive(Clone, Debug)]
pub struct ParallelOpts {
    pub num_threads: usize,
    /// Section size is `num_threads` times this (32 MiB).
    pub section_bytes_per_thread: usize,
    /// Lower bound of compressed input per thread; fewer bytes fall back
    /// to sequential decoding.
    pub min_bytes_per_thread: usize,
    /// Extra compressed bytes given to the first chunk of each section.
    pub first_chunk_bonus: usize,
    pub sync_params: SyncParams,
    pub verbosity: u8,
}

impl Default for ParallelOpts {
    fn default() -> Self {
        ParallelOpts {
            num_threads: 1,
            section_bytes_per_thread: 32 << 20,
            min_bytes_per_thread: 32 << 20,
            first_chunk_bonus: 4 << 20,
            sync_params: SyncParams::default(),
            verbosity: 1,
        }
    }
}

/// Byte layout of the section/chunk grid over the deflate payload.
#[derive(Clone, Copy)]
struct Layout {
    nthreads: usize,
    n_sections: usize,
    section_size: usize,
    first_chunk: usize,
    rest_chunk: usize,
    in_size: usize,
}

impl Layout {
    fn section_start(&self, s: usize) -> usize {
        s * self.section_size
    }

    fn section_end(&self, s: usize) -> usize {
        if s == self.n_sections - 1 {
            self.in_size
        } else {
            (s + 1) * self.section_size
        }
    }

    fn chunk_start(&self, s: usize, t: usize) -> usize {
        debug_assert!(t >= 1);
        self.section_start(s) + self.first_chunk + (t - 1) * self.rest_chunk
    }
}

/// Decompress a whole (single-member) gzip buffer, writing the exact
/// sequential output. Falls back to the sequential path when the input is
/// too small to split.
pub fn decompress_parallel<W: Write + Send>(
    data: &[u8],
    writer: &mut W,
    opts: &ParallelOpts,
) -> RazgzResult<u64> {
    let deflate = deflate_payload(data)?;
    let in_size = deflate.len();

    let by_size = (in_size / opts.min_bytes_per_thread.max(1)).max(1);
    let nthreads = opts.num_threads.min(by_size);
    if nthreads <= 1 {
        return sequential::decompress_gzip(data, writer, opts.verbosity);
    }

    let max_section = nthreads * opts.section_bytes_per_thread;
    let n_sections = in_size.div_ceil(max_section.min(in_size));
    let section_size = in_size / n_sections;
    let chunk_size = section_size / nthreads;
    let bonus = opts
        .first_chunk_bonus
        .min(chunk_size.saturating_mul(nthreads - 1) / nthreads);
    let first_chunk = chunk_size + bonus;
    let rest_chunk = (nthreads * chunk_size - first_chunk) / (nthreads - 1);
    if rest_chunk == 0 {
        return sequential::decompress_gzip(data, writer, opts.verbosity);
    }
    let layout = Layout {
        nthreads,
        n_sections,
        section_size,
        first_chunk,
        rest_chunk,
        in_size,
    };
    if opts.verbosity >= 2 {
        eprintln!(
            "razgz: {} threads, {} sections of {} bytes, chunks {}+{}",
            nthreads, n_sections, section_size, first_chunk, rest_chunk
        );
    }

    // Handoff links, indexed per thread and section. Within a section,
    // chunk t-1 feeds chunk t; across sections, the last chunk feeds the
    // next section's first chunk, with its stop preset to the section end.
    let mut ups: Vec<Vec<Option<FromUpstream>>> = (0..nthreads)
        .map(|_| (0..n_sections).map(|_| None).collect())
        .collect();
    let mut downs: Vec<Vec<Option<ToDownstream>>> = (0..nthreads)
        .map(|_| (0..n_sections).map(|_| None).collect())
        .collect();
    for s in 0..n_sections {
        for t in 1..nthreads {
            let (td, fu) = handoff_channel();
            downs[t - 1][s] = Some(td);
            ups[t][s] = Some(fu);
        }
    }
    for s in 0..n_sections - 1 {
        let (td, fu) = handoff_channel();
        fu.set_end_block(layout.section_end(s) * 8);
        downs[nthreads - 1][s] = Some(td);
        ups[0][s + 1] = Some(fu);
    }

    let writer = Mutex::new(writer);
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(nthreads);
        for (t, (ups_t, downs_t)) in ups.into_iter().zip(downs).enumerate() {
            let writer = &writer;
            handles.push(scope.spawn(move || {
                if t == 0 {
                    first_thread_main(deflate, ups_t, downs_t, writer)
                } else {
                    random_thread_main(deflate, t, ups_t, downs_t, writer, &layout, opts)
                }
            }));
        }

        let mut total = 0u64;
        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(bytes)) => total += bytes,
                Ok(Err(e)) => first_err = first_err.or(Some(e)),
                Err(_) => {
                    first_err = first_err.or_else(|| Some(RazgzError::thread("worker panicked")))
                }
            }
        }
        match first_err {
            None => Ok(total),
            Some(e) => Err(e),
        }
    })
}

fn write_and_publish<W: Write + Send>(
    out: WorkerOutput,
    writer: &Mutex<&mut W>,
    down: Option<ToDownstream>,
) -> RazgzResult<u64> {
    let written = out.bytes.len() as u64;
    {
        let mut w = writer.lock().map_err(|_| RazgzError::thread("writer poisoned"))?;
        w.write_all(&out.bytes)?;
    }
    if let Some(d) = down {
        d.set_context(Handoff {
            stopped_at_bits: out.stopped_at_bits,
            context: out.context,
            reached_final: out.reached_last_block,
        })?;
    }
    Ok(written)
}

fn first_thread_main<W: Write + Send>(
    deflate: &[u8],
    ups: Vec<Option<FromUpstream>>,
    downs: Vec<Option<ToDownstream>>,
    writer: &Mutex<&mut W>,
) -> RazgzResult<u64> {
    let mut worker = FirstChunkWorker::new(deflate);
    let mut total = 0u64;

    for (s, (up, down)) in ups.into_iter().zip(downs).enumerate() {
        let out = if s == 0 {
            worker.run(0, None, down.as_ref())?
        } else {
            let handoff = up
                .expect("section > 0 must have an inter-section link")
                .get_context()?;
            if handoff.reached_final {
                WorkerOutput {
                    bytes: Vec::new(),
                    stopped_at_bits: handoff.stopped_at_bits,
                    context: handoff.context,
                    reached_last_block: true,
                }
            } else {
                worker.run(handoff.stopped_at_bits, Some(&handoff.context), down.as_ref())?
            }
        };
        total += write_and_publish(out, writer, down)?;
    }
    Ok(total)
}

fn random_thread_main<W: Write + Send>(
    deflate: &[u8],
    t: usize,
    ups: Vec<Option<FromUpstream>>,
    downs: Vec<Option<ToDownstream>>,
    writer: &Mutex<&mut W>,
    layout: &Layout,
    opts: &ParallelOpts,
) -> RazgzResult<u64> {
    let mut worker = RandomAccessChunkWorker::new(deflate, opts.sync_params, t, opts.verbosity);
    let mut total = 0u64;

    for (s, (up, down)) in ups.into_iter().zip(downs).enumerate() {
        let up = up.expect("every random-access chunk has an upstream link");
        let chunk_start = layout.chunk_start(s, t);
        let chunk_len = if t == layout.nthreads - 1 {
            layout.section_end(s) - chunk_start
        } else {
            layout.rest_chunk
        };
        let out = worker.run(chunk_start * 8, chunk_len, up, down.as_ref())?;
        total += write_and_publish(out, writer, down)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn fastq_like(bytes: usize, seed: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes);
        let mut state = seed | 1;
        let mut read = 0usize;
        while out.len() < bytes {
            out.extend_from_slice(format!("@read_{}/1\n", read).as_bytes());
            for _ in 0..150 {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                out.push(b"ACGT"[(state >> 28) as usize % 4]);
            }
            out.extend_from_slice(b"\n+\n");
            for _ in 0..150 {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                out.push(b'!' + ((state >> 21) % 41) as u8);
            }
            out.push(b'\n');
            read += 1;
        }
        out.truncate(bytes);
        out
    }

    fn gzip(data: &[u8], level: Compression) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), level);
        std::io::Write::write_all(&mut enc, data).unwrap();
        enc.finish().unwrap()
    }

    fn small_opts(threads: usize) -> ParallelOpts {
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
    fn matches_sequential_output_across_thread_counts() {
        let plain = fastq_like(6 << 20, 0x1234_5678);
        let compressed = gzip(&plain, Compression::default());

        for threads in [2, 3, 4] {
            let mut out = Vec::new();
            let n =
                decompress_parallel(&compressed, &mut out, &small_opts(threads)).unwrap();
            assert_eq!(n, plain.len() as u64, "threads = {}", threads);
            crate::assert_slices_eq!(out, plain);
        }
    }

    #[test]
    fn multiple_sections_chain_their_contexts() {
        let plain = fastq_like(8 << 20, 0x0BAD_CAFE);
        let compressed = gzip(&plain, Compression::fast());

        // Small sections force several of them, exercising the
        // inter-section handoff and the first-chunk resume path.
        let mut opts = small_opts(2);
        opts.section_bytes_per_thread = 128 << 10;
        let mut out = Vec::new();
        decompress_parallel(&compressed, &mut out, &opts).unwrap();
        crate::assert_slices_eq!(out, plain);
    }

    #[test]
    fn small_input_falls_back_to_sequential() {
        let plain = fastq_like(64 << 10, 0x600D_F00D);
        let compressed = gzip(&plain, Compression::default());
        let mut out = Vec::new();
        decompress_parallel(&compressed, &mut out, &small_opts(8)).unwrap();
        crate::assert_slices_eq!(out, plain);
    }
}

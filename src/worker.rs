//! Per-thread chunk workers.
//!
//! Two variants share the block-loop plumbing:
//!
//! - [`FirstChunkWorker`]: starts at a known block boundary (stream start,
//!   or the position where the previous section's last chunk stopped) with
//!   a resolved context, and decodes straight into a concrete window.
//! - [`RandomAccessChunkWorker`]: starts at a nominal byte offset, finds a
//!   real block boundary by blind synchronization, decodes speculatively
//!   into a 16-bit symbolic window (switching to an 8-bit window once the
//!   backref multiplexer succeeds), then patches its output into real bytes
//!   when the upstream context arrives.
//!
//! A worker returns its chunk's resolved output; the caller is responsible
//! for writing it to the sink before publishing the context downstream, so
//! the handoff chain doubles as the output ordering.

use crate::bitstream::BitStream;
use crate::block_finder::{sync, SyncParams};
use crate::error::{RazgzError, RazgzResult};
use crate::handoff::{FromUpstream, Handoff, ToDownstream};
use crate::multiplexer::{resolve_wide_symbol, BackrefMultiplexer};
use crate::parser::{BlockParser, BlockResult, ParseMode};
use crate::window::{ByteWindow, DeflateWindow, SymbolicWindow, CONTEXT_SIZE};

/// Blocks decoded wide before the first multiplex attempt.
const MUX_MIN_BLOCKS: usize = 8;

/// Input remaining after a final block beyond which the stream is treated
/// as multi-member (another gzip member follows the 8-byte footer).
const TRAILING_SLACK_BYTES: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StopReason {
    /// BFINAL was observed.
    LastBlock,
    /// The downstream worker's stop position was reached.
    CaughtUpDownstream,
}

pub struct WorkerOutput {
    pub bytes: Vec<u8>,
    /// Bit position of the first block boundary at or past the stop.
    pub stopped_at_bits: usize,
    /// The trailing 32 KiB of resolved output, for the downstream worker.
    pub context: Vec<u8>,
    pub reached_last_block: bool,
}

/// Decode blocks until the final block or the downstream stop position.
fn decompress_loop<W: DeflateWindow>(
    parser: &mut BlockParser,
    input: &mut BitStream<'_>,
    window: &mut W,
    stop: Option<&ToDownstream>,
) -> RazgzResult<StopReason> {
    loop {
        if let Some(link) = stop {
            if input.position_bits() >= link.stop_position() {
                return Ok(StopReason::CaughtUpDownstream);
            }
        }
        match parser.parse_block(input, window, ParseMode::MustSucceed) {
            BlockResult::Success => {}
            BlockResult::LastBlock => return Ok(StopReason::LastBlock),
            err => {
                return Err(RazgzError::decompression(format!(
                    "{:?} at bit {}",
                    err,
                    input.position_bits()
                )))
            }
        }
    }
}

/// Last `CONTEXT_SIZE` bytes of `previous ++ output`.
fn trailing_context(previous: &[u8], output: &[u8]) -> Vec<u8> {
    if output.len() >= CONTEXT_SIZE {
        output[output.len() - CONTEXT_SIZE..].to_vec()
    } else {
        let take = CONTEXT_SIZE - output.len();
        let mut ctx = Vec::with_capacity(CONTEXT_SIZE);
        ctx.extend_from_slice(&previous[previous.len() - take..]);
        ctx.extend_from_slice(output);
        ctx
    }
}

/// Reject a final block that leaves another member's worth of input behind.
fn check_single_member(input: &BitStream<'_>) -> RazgzResult<()> {
    let consumed = input.position_bits().div_ceil(8);
    if input.size().saturating_sub(consumed) > TRAILING_SLACK_BYTES {
        return Err(RazgzError::MultiMember);
    }
    Ok(())
}

pub struct FirstChunkWorker<'a> {
    parser: BlockParser,
    input: BitStream<'a>,
}

impl<'a> FirstChunkWorker<'a> {
    pub fn new(deflate_data: &'a [u8]) -> Self {
        FirstChunkWorker {
            parser: BlockParser::new(),
            input: BitStream::new(deflate_data),
        }
    }

    /// Decode one section's first chunk from a known boundary. The context
    /// is `None` only at stream offset 0.
    pub fn run(
        &mut self,
        start_bits: usize,
        initial_context: Option<&[u8]>,
        stop: Option<&ToDownstream>,
    ) -> RazgzResult<WorkerOutput> {
        if !self.input.set_position_bits(start_bits) {
            return Err(RazgzError::decompression(
                "section resume position is outside the input",
            ));
        }
        let mut window = match initial_context {
            Some(ctx) => ByteWindow::with_context(ctx),
            None => ByteWindow::new(),
        };
        let reason = decompress_loop(&mut self.parser, &mut self.input, &mut window, stop)?;
        if reason == StopReason::LastBlock {
            check_single_member(&self.input)?;
        }

        let stopped_at_bits = self.input.position_bits();
        let bytes = window.into_output();
        let zeros;
        let previous = match initial_context {
            Some(ctx) => ctx,
            None => {
                zeros = vec![0u8; CONTEXT_SIZE];
                &zeros
            }
        };
        Ok(WorkerOutput {
            context: trailing_context(previous, &bytes),
            bytes,
            stopped_at_bits,
            reached_last_block: reason == StopReason::LastBlock,
        })
    }
}

pub struct RandomAccessChunkWorker<'a> {
    parser: BlockParser,
    input: BitStream<'a>,
    sync_params: SyncParams,
    thread_index: usize,
    verbosity: u8,
}

impl<'a> RandomAccessChunkWorker<'a> {
    pub fn new(
        deflate_data: &'a [u8],
        sync_params: SyncParams,
        thread_index: usize,
        verbosity: u8,
    ) -> Self {
        RandomAccessChunkWorker {
            parser: BlockParser::new(),
            input: BitStream::new(deflate_data),
            sync_params,
            thread_index,
            verbosity,
        }
    }

    /// Decode one chunk starting from the nominal byte boundary at
    /// `chunk_start_bits`. `chunk_bytes` sizes the symbolic buffer.
    pub fn run(
        &mut self,
        chunk_start_bits: usize,
        chunk_bytes: usize,
        up: FromUpstream,
        stop: Option<&ToDownstream>,
    ) -> RazgzResult<WorkerOutput> {
        let point = sync(
            &mut self.parser,
            &mut self.input,
            chunk_start_bits,
            &self.sync_params,
        )
        .ok_or_else(|| {
            RazgzError::sync(format!(
                "no block boundary found within budget after bit {}",
                chunk_start_bits
            ))
        })?;
        // Publish upward before doing anything else: the upstream worker
        // must not decode past our first block.
        up.set_end_block(point.bit_pos);
        if self.verbosity >= 2 {
            eprintln!(
                "razgz: thread {} synced at bit {}{}",
                self.thread_index,
                point.bit_pos,
                if point.reached_final_block {
                    " (confirmation reached the final block)"
                } else {
                    ""
                }
            );
        }

        if let Some(link) = stop {
            // Syncing at or past the downstream boundary (a chunk with no
            // boundary of its own) is survivable: the decode loop catches
            // up immediately and the downstream worker re-decodes from the
            // authoritative upstream position.
            if self.verbosity >= 2 && point.bit_pos >= link.stop_position() {
                eprintln!(
                    "razgz: thread {}: sync at bit {} reached the downstream boundary",
                    self.thread_index, point.bit_pos
                );
            }
        }

        // Speculative decode: wide until the multiplexer fits the live
        // unresolved offsets into byte codepoints, then narrow.
        let mut wide = SymbolicWindow::new(chunk_bytes);
        let mut mux = BackrefMultiplexer::new();
        let mut narrow: Option<ByteWindow> = None;
        let mut block_count = 0usize;

        let reason = loop {
            if let Some(link) = stop {
                if self.input.position_bits() >= link.stop_position() {
                    break StopReason::CaughtUpDownstream;
                }
            }
            if narrow.is_none() && block_count > MUX_MIN_BLOCKS && block_count % 2 == 1 {
                if let Some(ctx) = mux.compress(wide.context()) {
                    narrow = Some(ByteWindow::with_context(&ctx));
                }
            }
            let result = match narrow.as_mut() {
                Some(w) => self
                    .parser
                    .parse_block(&mut self.input, w, ParseMode::MustSucceed),
                None => self
                    .parser
                    .parse_block(&mut self.input, &mut wide, ParseMode::MustSucceed),
            };
            match result {
                BlockResult::Success => block_count += 1,
                BlockResult::LastBlock => break StopReason::LastBlock,
                err => {
                    return Err(RazgzError::decompression(format!(
                        "{:?} at bit {}",
                        err,
                        self.input.position_bits()
                    )))
                }
            }
        };
        if reason == StopReason::LastBlock {
            check_single_member(&self.input)?;
        }
        let stopped_at_bits = self.input.position_bits();

        let handoff = up.get_context()?;
        if handoff.reached_final {
            // The upstream worker consumed the whole stream (our stop
            // position lost the race); everything we decoded is already in
            // its output. Pass its handoff through unchanged.
            return Ok(WorkerOutput {
                bytes: Vec::new(),
                stopped_at_bits: handoff.stopped_at_bits,
                context: handoff.context,
                reached_last_block: true,
            });
        }
        if handoff.stopped_at_bits != point.bit_pos {
            // Our sync was a false positive (or the upstream overran before
            // seeing the stop). The upstream position is authoritative:
            // drop the speculative output and decode again with the real
            // context.
            if self.verbosity >= 1 {
                eprintln!(
                    "razgz: thread {}: upstream stopped at bit {} but sync found {}; re-decoding",
                    self.thread_index, handoff.stopped_at_bits, point.bit_pos
                );
            }
            return self.redecode(&handoff, stop);
        }

        // Patch the symbolic output into real bytes.
        let narrow_out = narrow.map(|w| w.into_output());
        let mut bytes =
            Vec::with_capacity(wide.decoded_len() + narrow_out.as_ref().map_or(0, |o| o.len()));
        for &sym in wide.output() {
            bytes.push(resolve_wide_symbol(sym, &handoff.context));
        }
        if let Some(out) = narrow_out {
            let lkt = mux.context_to_lkt(&handoff.context);
            bytes.extend(out.iter().map(|&c| lkt[c as usize]));
        }

        Ok(WorkerOutput {
            context: trailing_context(&handoff.context, &bytes),
            bytes,
            stopped_at_bits,
            reached_last_block: reason == StopReason::LastBlock,
        })
    }

    /// Conservative recovery for a sync/upstream position mismatch.
    fn redecode(
        &mut self,
        handoff: &Handoff,
        stop: Option<&ToDownstream>,
    ) -> RazgzResult<WorkerOutput> {
        // The upstream worker may have overrun past our own stop position
        // (or to the end of the input); the remaining range can be empty.
        if let Some(link) = stop {
            if handoff.stopped_at_bits >= link.stop_position() {
                return Ok(WorkerOutput {
                    bytes: Vec::new(),
                    stopped_at_bits: handoff.stopped_at_bits,
                    context: handoff.context.clone(),
                    reached_last_block: false,
                });
            }
        }
        if handoff.stopped_at_bits >= 8 * self.input.size() {
            return Ok(WorkerOutput {
                bytes: Vec::new(),
                stopped_at_bits: handoff.stopped_at_bits,
                context: handoff.context.clone(),
                reached_last_block: true,
            });
        }
        if !self.input.set_position_bits(handoff.stopped_at_bits) {
            return Err(RazgzError::decompression(
                "upstream stop position is outside the input",
            ));
        }
        let mut window = ByteWindow::with_context(&handoff.context);
        let reason = decompress_loop(&mut self.parser, &mut self.input, &mut window, stop)?;
        if reason == StopReason::LastBlock {
            check_single_member(&self.input)?;
        }
        let stopped_at_bits = self.input.position_bits();
        let bytes = window.into_output();
        Ok(WorkerOutput {
            context: trailing_context(&handoff.context, &bytes),
            bytes,
            stopped_at_bits,
            reached_last_block: reason == StopReason::LastBlock,
        })
    }
}

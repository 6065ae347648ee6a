//! Blind synchronization: find a DEFLATE block boundary inside an arbitrary
//! byte range.
//!
//! DEFLATE has no block index and no self-synchronizing markers, so the
//! scanner simply tries every bit position and uses the parser as a
//! probabilistic oracle: a position is a candidate when one whole block
//! parses into a store-nothing window without tripping the ASCII, offset or
//! Huffman validity checks, and decodes at least `min_block_bytes`. A
//! candidate is accepted after `confirm_blocks` further blocks parse from
//! the same position, which pushes the false-positive probability off a
//! cliff. The first position that passes confirmation wins.

use crate::bitstream::BitStream;
use crate::parser::{BlockParser, BlockResult, ParseMode};
use crate::window::DummyWindow;

/// Default scan budget: one million byte positions.
pub const DEFAULT_MAX_SCAN_BITS: usize = 1 << 23;
/// Candidate blocks must decode at least this much (8 KiB): a shorter
/// success is likely a coincidence.
pub const DEFAULT_MIN_BLOCK_BYTES: usize = 1 << 13;
/// Additional blocks parsed to confirm a candidate.
pub const DEFAULT_CONFIRM_BLOCKS: usize = 8;

#[derive(Clone, Copy, Debug)]
pub struct SyncParams {
    pub max_scan_bits: usize,
    pub min_block_bytes: usize,
    pub confirm_blocks: usize,
}

impl Default for SyncParams {
    fn default() -> Self {
        SyncParams {
            max_scan_bits: DEFAULT_MAX_SCAN_BITS,
            min_block_bytes: DEFAULT_MIN_BLOCK_BYTES,
            confirm_blocks: DEFAULT_CONFIRM_BLOCKS,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SyncPoint {
    /// Bit position of the first confirmed block boundary.
    pub bit_pos: usize,
    /// The confirmation run hit BFINAL or consumed the whole input.
    pub reached_final_block: bool,
}

/// Scan `[skip_bits, skip_bits + max_scan_bits)` for a block boundary.
///
/// On success the stream is left positioned at the boundary. Returns `None`
/// when the budget is exhausted; the caller treats that as fatal for the
/// chunk.
pub fn sync(
    parser: &mut BlockParser,
    input: &mut BitStream<'_>,
    skip_bits: usize,
    params: &SyncParams,
) -> Option<SyncPoint> {
    if !input.set_position_bits(skip_bits) {
        return None;
    }
    let end = skip_bits + params.max_scan_bits.min(8 * input.size());
    let mut dummy = DummyWindow::new();

    for pos in skip_bits..end {
        // A worker never expects to sync onto the stream's final block.
        if !input.ensure_bits(1) {
            break;
        }
        if input.bits(1) == 0 {
            let mut probe = input.clone();
            dummy.clear();
            let first = parser.parse_block(&mut probe, &mut dummy, ParseMode::ShouldFail);

            if first == BlockResult::Success && dummy.size() >= params.min_block_bytes {
                if let Some(reached_final) = confirm(parser, &mut probe, &mut dummy, params) {
                    input.set_position_bits(pos);
                    return Some(SyncPoint {
                        bit_pos: pos,
                        reached_final_block: reached_final,
                    });
                }
            }
        }

        if !input.set_position_bits(pos + 1) {
            break;
        }
    }
    None
}

/// Run the confirmation blocks. `Some(reached_final)` accepts the
/// candidate; `None` rejects it as a false positive.
fn confirm(
    parser: &mut BlockParser,
    probe: &mut BitStream<'_>,
    dummy: &mut DummyWindow,
    params: &SyncParams,
) -> Option<bool> {
    for _ in 0..params.confirm_blocks {
        match parser.parse_block(probe, dummy, ParseMode::ShouldSucceed) {
            BlockResult::Success => {}
            BlockResult::LastBlock => return Some(true),
            // Ran off the end of the input while still parsing cleanly.
            BlockResult::NotEnoughInput | BlockResult::TooMuchInput => {
                return Some(probe.available() == 0)
            }
            _ => return None,
        }
    }
    Some(false)
}

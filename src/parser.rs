//! DEFLATE block parser.
//!
//! `parse_block` decodes exactly one block (stored, static-Huffman or
//! dynamic-Huffman) from a [`BitStream`] into any [`DeflateWindow`]. All
//! failure conditions are reported through [`BlockResult`] rather than
//! panics, because the same routine doubles as the probabilistic oracle of
//! the synchronization scanner: when pointed at an arbitrary bit position it
//! must reject garbage quickly and leave recovery to the caller.
//!
//! The [`ParseMode`] argument is a branch-weight hint. Under `ShouldFail`
//! (speculative sync probes) errors are the common case and stay silent;
//! under `MustSucceed` a failure indicates a corrupt stream mid-decode and
//! is reported to stderr before the result is returned.

use crate::bitstream::{BitStream, BITBUF_MAX_ENSURE};
use crate::huffman::*;
use crate::window::DeflateWindow;

const BLOCKTYPE_UNCOMPRESSED: u32 = 0;
const BLOCKTYPE_STATIC_HUFFMAN: u32 = 1;
const BLOCKTYPE_DYNAMIC_HUFFMAN: u32 = 2;

/// The order in which precode lengths are stored in a dynamic header.
const PRECODE_LENS_PERMUTATION: [usize; DEFLATE_NUM_PRECODE_SYMS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Expectation threaded through the parse path. Speculative probes run
/// `ShouldFail`; confirmation runs `ShouldSucceed`; committed decoding runs
/// `MustSucceed`, where any failure means the stream is corrupt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParseMode {
    MustSucceed,
    ShouldSucceed,
    ShouldFail,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockResult {
    /// Block decoded; more blocks follow.
    Success,
    /// Block decoded and BFINAL was set.
    LastBlock,
    /// Output buffer exhausted and the window could not flush.
    WindowOverflow,
    /// BTYPE was the reserved value 3.
    InvalidBlockType,
    /// Dynamic Huffman header failed to parse or build.
    InvalidDynamicHt,
    /// Stored block failed the LEN/NLEN or length checks.
    InvalidUncompressed,
    /// Literal outside the accepted alphabet.
    InvalidLiteral,
    /// Match offset outside the window horizon or the decoded prefix.
    InvalidMatch,
    /// Input continued past where the stream should have ended.
    TooMuchInput,
    /// Input exhausted before the block completed.
    NotEnoughInput,
    /// Block structure was self-inconsistent.
    InvalidParse,
}

impl BlockResult {
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, BlockResult::Success | BlockResult::LastBlock)
    }
}

/// Holds the per-block dynamic tables and the precomputed static tables.
pub struct BlockParser {
    tables: DecodeTables,
    static_tables: DecodeTables,
}

impl BlockParser {
    pub fn new() -> Self {
        let mut static_tables = DecodeTables::new();
        static_tables.prepare_static();
        BlockParser {
            tables: DecodeTables::new(),
            static_tables,
        }
    }

    /// Decode one block into `window`. On any non-`is_ok` result the window
    /// may hold a partial block; speculative callers keep a clone of the
    /// bitstream and a scratch window to discard.
    pub fn parse_block<W: DeflateWindow>(
        &mut self,
        input: &mut BitStream<'_>,
        window: &mut W,
        mode: ParseMode,
    ) -> BlockResult {
        let result = self.parse_block_inner(input, window);
        if mode == ParseMode::MustSucceed && !result.is_ok() {
            eprintln!(
                "razgz: {:?} at bit {} of the compressed stream",
                result,
                input.position_bits()
            );
        }
        result
    }

    fn parse_block_inner<W: DeflateWindow>(
        &mut self,
        input: &mut BitStream<'_>,
        window: &mut W,
    ) -> BlockResult {
        // BFINAL + BTYPE + the dynamic header counts.
        if !input.ensure_bits(1 + 2 + 5 + 5 + 4) {
            return BlockResult::NotEnoughInput;
        }

        let success = if input.pop_bits(1) != 0 {
            BlockResult::LastBlock
        } else {
            BlockResult::Success
        };

        let use_static = match input.pop_bits(2) {
            BLOCKTYPE_DYNAMIC_HUFFMAN => {
                if !self.prepare_dynamic(input) {
                    return BlockResult::InvalidDynamicHt;
                }
                false
            }
            BLOCKTYPE_UNCOMPRESSED => {
                let r = parse_stored(input, window);
                if r == BlockResult::Success {
                    window.notify_end_block();
                    return success;
                }
                return r;
            }
            BLOCKTYPE_STATIC_HUFFMAN => true,
            _ => return BlockResult::InvalidBlockType,
        };
        let tables = if use_static {
            &self.static_tables
        } else {
            &self.tables
        };

        // The main Huffman decode loop.
        loop {
            if !input.ensure_bits(DEFLATE_MAX_LITLEN_CODEWORD_LEN) && input.bits_left() == 0 {
                return BlockResult::NotEnoughInput;
            }
            let mut entry = tables.litlen[input.bits(LITLEN_TABLEBITS as u32) as usize];
            if entry & HUFFDEC_SUBTABLE_POINTER != 0 {
                // Litlen subtable required (uncommon case).
                input.remove_bits(LITLEN_TABLEBITS as u32);
                let start = (entry >> HUFFDEC_RESULT_SHIFT) & 0xFFFF;
                entry = tables.litlen[(start + input.bits(entry & HUFFDEC_LENGTH_MASK)) as usize];
            }
            input.remove_bits(entry & HUFFDEC_LENGTH_MASK);

            if entry & HUFFDEC_LITERAL != 0 {
                if window.available() == 0 && window.flush() == 0 {
                    return BlockResult::WindowOverflow;
                }
                if !window.push((entry >> HUFFDEC_RESULT_SHIFT) as u8) {
                    return BlockResult::InvalidLiteral;
                }
                continue;
            }

            // Match or end-of-block.
            let result = entry >> HUFFDEC_RESULT_SHIFT;
            input.ensure_bits(BITBUF_MAX_ENSURE);

            let length = (result >> HUFFDEC_LENGTH_BASE_SHIFT) as usize
                + input.pop_bits(result & HUFFDEC_EXTRA_LENGTH_BITS_MASK) as usize;

            // End-of-block is length 0, so one wrapping comparison covers
            // both the EOB case and the output-space check.
            if length.wrapping_sub(1) >= window.available() {
                if length == HUFFDEC_END_OF_BLOCK_LENGTH as usize {
                    window.notify_end_block();
                    return success;
                }
                if window.flush() == 0 {
                    return BlockResult::WindowOverflow;
                }
                debug_assert!(length <= window.available());
            }

            let mut entry = tables.offset[input.bits(OFFSET_TABLEBITS as u32) as usize];
            if entry & HUFFDEC_SUBTABLE_POINTER != 0 {
                // Offset subtable required (uncommon case).
                input.remove_bits(OFFSET_TABLEBITS as u32);
                let start = (entry >> HUFFDEC_RESULT_SHIFT) & 0xFFFF;
                entry = tables.offset[(start + input.bits(entry & HUFFDEC_LENGTH_MASK)) as usize];
            }
            input.remove_bits(entry & HUFFDEC_LENGTH_MASK);
            let result = entry >> HUFFDEC_RESULT_SHIFT;

            let offset = (result & HUFFDEC_OFFSET_BASE_MASK) as usize
                + input.pop_bits(result >> HUFFDEC_EXTRA_OFFSET_BITS_SHIFT) as usize;

            if !window.copy_match(length, offset) {
                return BlockResult::InvalidMatch;
            }
        }
    }

    /// Read a dynamic-Huffman header and build the litlen/offset tables.
    fn prepare_dynamic(&mut self, input: &mut BitStream<'_>) -> bool {
        let num_litlen_syms = input.pop_bits(5) as usize + 257;
        let num_offset_syms = input.pop_bits(5) as usize + 1;
        let num_explicit_precode_lens = input.pop_bits(4) as usize + 4;

        input.ensure_bits((DEFLATE_NUM_PRECODE_SYMS * 3) as u32);
        for i in 0..num_explicit_precode_lens {
            self.tables.precode_lens[PRECODE_LENS_PERMUTATION[i]] = input.pop_bits(3) as u8;
        }
        for i in num_explicit_precode_lens..DEFLATE_NUM_PRECODE_SYMS {
            self.tables.precode_lens[PRECODE_LENS_PERMUTATION[i]] = 0;
        }
        if !self.tables.build_precode() {
            return false;
        }

        // Expand the literal/length and offset codeword lengths. The lens
        // array has headroom for the worst-case repeat overrun, so the
        // repeat writers never branch on the remaining count.
        let mut i = 0;
        while i < num_litlen_syms + num_offset_syms {
            if !input.ensure_bits((DEFLATE_MAX_PRE_CODEWORD_LEN + 7) as u32) && input.bits_left() == 0
            {
                return false;
            }
            let entry = self.tables.precode[input.bits(DEFLATE_MAX_PRE_CODEWORD_LEN as u32) as usize];
            input.remove_bits(entry & HUFFDEC_LENGTH_MASK);
            let presym = (entry >> HUFFDEC_RESULT_SHIFT) as usize;

            if presym < 16 {
                self.tables.lens[i] = presym as u8;
                i += 1;
                continue;
            }

            // Ordered by frequency in typical streams.
            if presym == 16 {
                // Repeat the previous length 3..=6 times.
                if i == 0 {
                    return false;
                }
                let rep_val = self.tables.lens[i - 1];
                let rep_count = 3 + input.pop_bits(2) as usize;
                self.tables.lens[i..i + 6].fill(rep_val);
                i += rep_count;
            } else if presym == 17 {
                // Repeat zero 3..=10 times.
                let rep_count = 3 + input.pop_bits(3) as usize;
                self.tables.lens[i..i + 10].fill(0);
                i += rep_count;
            } else {
                // Repeat zero 11..=138 times.
                let rep_count = 11 + input.pop_bits(7) as usize;
                self.tables.lens[i..i + rep_count].fill(0);
                i += rep_count;
            }
        }

        // Offset first: it reads the tail of the shared lens array.
        if !self.tables.build_offset(num_litlen_syms, num_offset_syms) {
            return false;
        }
        self.tables.build_litlen(num_litlen_syms)
    }
}

impl Default for BlockParser {
    fn default() -> Self {
        BlockParser::new()
    }
}

/// Uncompressed block: byte-align, validate LEN/NLEN, copy raw bytes.
fn parse_stored<W: DeflateWindow>(input: &mut BitStream<'_>, window: &mut W) -> BlockResult {
    input.align_input();
    if input.available() < 4 {
        return BlockResult::InvalidUncompressed;
    }
    let len = input.pop_u16();
    let nlen = input.pop_u16();
    if len != !nlen {
        return BlockResult::InvalidUncompressed;
    }
    let len = len as usize;
    if len > input.available() {
        // The header itself is consistent; the block just claims more
        // input than the range holds.
        return BlockResult::TooMuchInput;
    }
    while window.available() < len {
        if window.flush() == 0 {
            return BlockResult::WindowOverflow;
        }
    }
    if !window.copy_uncompressed(input, len) {
        return BlockResult::InvalidUncompressed;
    }
    BlockResult::Success
}

//! Compression of 16-bit symbolic contexts into 8-bit ones.
//!
//! A random-access worker starts decoding into a 16-bit window because back
//! references into the unknown upstream context need distinguished codes.
//! After a few blocks most positions are resolved and the live unresolved
//! offsets concentrate: a byte has `256 - 127 = 129` codepoints above the
//! ASCII range, so whenever at most 126 or so distinct offsets remain, the
//! whole context fits in 8-bit symbols and decoding can continue in a
//! narrow window at half the memory traffic.
//!
//! The multiplexer owns the codepoint -> offset table built during
//! `compress`. Once the real upstream context arrives, `context_to_lkt`
//! turns it into a 256-entry byte lookup that rewrites the narrow window
//! into resolved bytes in a single pass.

use crate::window::{CONTEXT_SIZE, FIRST_BACKREF_SYMBOL};

/// First byte codepoint available for multiplexed back-references.
const FIRST_NARROW_CODE: usize = FIRST_BACKREF_SYMBOL as usize;

pub struct BackrefMultiplexer {
    /// Narrow codepoint -> offset in the primordial context. Entries below
    /// `FIRST_NARROW_CODE` are unused (identity range).
    lkt: [u16; 256],
    /// Codepoints allocated by the last successful `compress`.
    allocated: usize,
}

impl BackrefMultiplexer {
    pub fn new() -> Self {
        BackrefMultiplexer {
            lkt: [0; 256],
            allocated: FIRST_NARROW_CODE,
        }
    }

    /// Try to re-encode a 16-bit context window into 8-bit symbols.
    ///
    /// Returns the narrow context on success. Fails (returning `None`) when
    /// the context still references more distinct unresolved offsets than
    /// there are spare byte codepoints; the caller keeps decoding wide and
    /// may retry later. Each call rebuilds the allocation from scratch.
    pub fn compress(&mut self, wide_context: &[u16]) -> Option<Vec<u8>> {
        debug_assert_eq!(wide_context.len(), CONTEXT_SIZE);

        let mut next_code = FIRST_NARROW_CODE;
        let mut narrow = Vec::with_capacity(CONTEXT_SIZE);
        for &sym in wide_context {
            let code = if sym < FIRST_BACKREF_SYMBOL {
                sym as u8
            } else {
                let offset = sym - FIRST_BACKREF_SYMBOL;
                // Linear scan: the table stays short enough that this beats
                // anything fancier.
                match self.lkt[FIRST_NARROW_CODE..next_code]
                    .iter()
                    .position(|&o| o == offset)
                {
                    Some(i) => (FIRST_NARROW_CODE + i) as u8,
                    None => {
                        if next_code == 256 {
                            return None;
                        }
                        self.lkt[next_code] = offset;
                        next_code += 1;
                        (next_code - 1) as u8
                    }
                }
            };
            narrow.push(code);
        }

        self.allocated = next_code;
        Some(narrow)
    }

    /// Combine the resolved upstream context with the codepoint table into a
    /// byte -> byte lookup: identity for the ASCII range, context bytes for
    /// multiplexed codes.
    pub fn context_to_lkt(&self, upstream_context: &[u8]) -> [u8; 256] {
        debug_assert_eq!(upstream_context.len(), CONTEXT_SIZE);
        let mut res = [0u8; 256];
        for (i, slot) in res.iter_mut().enumerate().take(FIRST_NARROW_CODE) {
            *slot = i as u8;
        }
        for code in FIRST_NARROW_CODE..self.allocated {
            res[code] = upstream_context[self.lkt[code] as usize];
        }
        res
    }
}

impl Default for BackrefMultiplexer {
    fn default() -> Self {
        BackrefMultiplexer::new()
    }
}

/// Resolve one wide symbol against the real upstream context.
#[inline]
pub fn resolve_wide_symbol(sym: u16, upstream_context: &[u8]) -> u8 {
    if sym < FIRST_BACKREF_SYMBOL {
        sym as u8
    } else {
        upstream_context[(sym - FIRST_BACKREF_SYMBOL) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_context_with_offsets(offsets: &[usize]) -> Vec<u16> {
        let mut ctx = vec![b'A' as u16; CONTEXT_SIZE];
        for (i, &off) in offsets.iter().enumerate() {
            // Scatter repeated references to each offset.
            ctx[i * 7 % CONTEXT_SIZE] = FIRST_BACKREF_SYMBOL + off as u16;
            ctx[(i * 131 + 5) % CONTEXT_SIZE] = FIRST_BACKREF_SYMBOL + off as u16;
        }
        ctx
    }

    #[test]
    fn compress_is_faithful() {
        let offsets: Vec<usize> = (0..100).map(|i| i * 311 % CONTEXT_SIZE).collect();
        let wide = wide_context_with_offsets(&offsets);
        let mut mux = BackrefMultiplexer::new();
        let narrow = mux.compress(&wide).unwrap();

        let mut upstream = vec![0u8; CONTEXT_SIZE];
        for (i, b) in upstream.iter_mut().enumerate() {
            *b = b'!' + (i % 90) as u8;
        }
        let lkt = mux.context_to_lkt(&upstream);

        // Property: the narrow symbol at every position resolves to the
        // same byte as the wide symbol.
        for (&w, &n) in wide.iter().zip(narrow.iter()) {
            assert_eq!(lkt[n as usize], resolve_wide_symbol(w, &upstream));
        }
    }

    #[test]
    fn compress_fails_beyond_codepoint_budget() {
        let offsets: Vec<usize> = (0..200).collect();
        let wide = wide_context_with_offsets(&offsets);
        let mut mux = BackrefMultiplexer::new();
        assert!(mux.compress(&wide).is_none());
    }

    #[test]
    fn fully_resolved_context_needs_no_codepoints() {
        let wide = vec![b'G' as u16; CONTEXT_SIZE];
        let mut mux = BackrefMultiplexer::new();
        let narrow = mux.compress(&wide).unwrap();
        assert!(narrow.iter().all(|&c| c == b'G'));
    }
}

//! The handoff protocol between two adjacent chunk workers.
//!
//! Each worker boundary carries two pieces of state, with distinct timing:
//!
//! - the *stop position*: published by the downstream worker as soon as its
//!   synchronization finds a first block, and polled by the upstream worker
//!   once per block boundary. A plain release/acquire atomic.
//! - the *context*: the upstream worker's final 32 KiB of resolved output,
//!   paired with the bit position it stopped at. Sent once over a bounded
//!   channel; the downstream worker blocks on it before it can resolve its
//!   symbolic output and emit.
//!
//! Channel send/receive gives the happens-before edges the protocol needs:
//! the downstream worker observes the fully written context, and the
//! upstream worker is free to return once the send completes because the
//! context is moved, not borrowed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{RazgzError, RazgzResult};

/// Sentinel stop position: keep decoding.
pub const NO_STOP: usize = usize::MAX;

/// The `(first_block_bit_pos, resolved_context)` pair exchanged at a
/// boundary.
pub struct Handoff {
    /// Where the upstream worker stopped: the downstream worker's verified
    /// first-block position, unless the sync was a false positive.
    pub stopped_at_bits: usize,
    /// The trailing 32 KiB of the upstream worker's output.
    pub context: Vec<u8>,
    /// The upstream worker consumed the stream's final block, so there is
    /// nothing left for this worker to decode.
    pub reached_final: bool,
}

/// Upstream worker's end of a boundary.
pub struct ToDownstream {
    stop: Arc<AtomicUsize>,
    tx: Sender<Handoff>,
}

/// Downstream worker's end of a boundary.
pub struct FromUpstream {
    stop: Arc<AtomicUsize>,
    rx: Receiver<Handoff>,
}

pub fn handoff_channel() -> (ToDownstream, FromUpstream) {
    let stop = Arc::new(AtomicUsize::new(NO_STOP));
    let (tx, rx) = bounded(1);
    (
        ToDownstream {
            stop: Arc::clone(&stop),
            tx,
        },
        FromUpstream { stop, rx },
    )
}

impl ToDownstream {
    /// Stop position published by the downstream worker, or `NO_STOP`.
    #[inline]
    pub fn stop_position(&self) -> usize {
        self.stop.load(Ordering::Acquire)
    }

    /// Publish the final context; consumes the handle since a boundary is
    /// crossed exactly once.
    pub fn set_context(self, handoff: Handoff) -> RazgzResult<()> {
        self.tx
            .send(handoff)
            .map_err(|_| RazgzError::thread("downstream worker exited before taking the context"))
    }
}

impl FromUpstream {
    /// Tell the upstream worker where this worker's first block starts.
    #[inline]
    pub fn set_end_block(&self, bit_pos: usize) {
        self.stop.store(bit_pos, Ordering::Release);
    }

    /// Block until the upstream worker publishes its context.
    pub fn get_context(self) -> RazgzResult<Handoff> {
        self.rx
            .recv()
            .map_err(|_| RazgzError::thread("upstream worker exited before publishing its context"))
    }
}

//! Proof-of-work nonce search.
//!
//! A candidate block is hashed as its exact serialized text. The search walks
//! nonces upward from zero and accepts the first one whose hex digest starts
//! with `difficulty` `'0'` characters. With several threads each worker takes
//! an interleaved slice of the nonce space; the smallest winning nonce is kept
//! so the result never depends on the thread count.

use crate::blockchain::Block;
use crossbeam_channel::unbounded;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Longest possible target: every hex digit of a SHA-256 digest.
pub const MAX_DIFFICULTY: usize = 64;

/// True when the hex digest starts with `difficulty` zero characters.
pub fn meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
    hash_hex.len() >= difficulty && hash_hex.bytes().take(difficulty).all(|b| b == b'0')
}

/// Shared flag a caller sets to stop a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Candidate nonces `start, start + step, start + 2 * step, ...` until overflow.
#[derive(Debug, Clone)]
pub struct Nonces {
    next: Option<u64>,
    step: u64,
}

impl Nonces {
    pub fn new(start: u64, step: u64) -> Self {
        Nonces {
            next: Some(start),
            step: step.max(1),
        }
    }
}

impl Iterator for Nonces {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next?;
        self.next = current.checked_add(self.step);
        Some(current)
    }
}

/// A winning nonce and the digest it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct Miner {
    threads: usize,
    check_interval: u64,
}

impl Miner {
    pub fn new(threads: usize, check_interval: u64) -> Self {
        Miner {
            threads: threads.max(1),
            check_interval: check_interval.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Searches for the smallest nonce sealing `previous_hash` + `lines` at
    /// `difficulty`. Returns `None` when `cancel` fires first or the nonce
    /// space is exhausted.
    pub fn search(
        &self,
        previous_hash: &str,
        lines: &[String],
        difficulty: usize,
        cancel: &CancelFlag,
    ) -> Option<Solution> {
        let prefix = Block::sealing_prefix(previous_hash, lines);
        let base = Sha256::new_with_prefix(prefix.as_bytes());
        let bound = AtomicU64::new(u64::MAX);
        let step = self.threads as u64;
        let (sender, receiver) = unbounded::<Solution>();

        let best = thread::scope(|scope| {
            for worker in 0..step {
                let sender = sender.clone();
                let base = &base;
                let bound = &bound;
                scope.spawn(move || {
                    for (tried, nonce) in Nonces::new(worker, step).enumerate() {
                        if nonce > bound.load(Ordering::Acquire) {
                            return;
                        }
                        if tried as u64 % self.check_interval == 0 {
                            if cancel.is_cancelled() {
                                return;
                            }
                            if tried > 0 {
                                debug!(worker, nonce, "nonce search in progress");
                            }
                        }

                        let mut hasher = base.clone();
                        hasher.update(nonce.to_string().as_bytes());
                        let hash = hex::encode(hasher.finalize());
                        if meets_difficulty(&hash, difficulty) {
                            bound.fetch_min(nonce, Ordering::AcqRel);
                            let _ = sender.send(Solution { nonce, hash });
                            return;
                        }
                    }
                });
            }
            drop(sender);
            receiver.iter().min_by_key(|solution| solution.nonce)
        });

        if cancel.is_cancelled() {
            return None;
        }
        best
    }
}

impl Default for Miner {
    fn default() -> Self {
        Miner::new(1, 4096)
    }
}

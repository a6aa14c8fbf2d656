//! # PoW — SHA-256 Leading-Zero Nonce Solver
//!
//! Solves `SHA-256(prefix + ":" + nonce)` puzzles: find the smallest
//! non-negative `nonce` whose digest starts with at least `difficulty` zero
//! bits. Expected work is about `2^difficulty` hashes.
//!
//! ## Parallel Search
//!
//! The nonce space is walked in rounds. Each round hands every rayon worker a
//! disjoint chunk of `chunk` consecutive nonces:
//!
//! ```text
//! round r:  [w0: base .. base+c) [w1: base+c .. base+2c) ... [wN-1 ...)
//! ```
//!
//! A worker stops at the first hit in its chunk and publishes it through a
//! shared `fetch_min` on the best nonce, which also lets workers holding
//! higher nonces abandon their chunk early. The round's minimum hit is the
//! global minimum because every earlier round came up empty, so the answer
//! does not depend on the worker count. The winning pair is re-hashed and
//! re-checked before it is returned.
//!
//! ## Cancellation
//!
//! An optional stop flag is polled every 1024 nonces inside each chunk and
//! between rounds. A stopped search returns [`SolveOutcome::Cancelled`],
//! never a partial result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::progress::Progress;

/// Attempts between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// A SHA-256 digest cannot have more leading zero bits than this.
pub const MAX_DIFFICULTY: u32 = 256;

const DEFAULT_CHUNK: u64 = 8192;
const POLL_MASK: u64 = 0x3FF;

/// Count leading zero bits, scanning bytes most-significant first. Each zero
/// byte adds 8; the first non-zero byte adds its own leading zeros and ends
/// the scan.
pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in bytes {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 with `prefix + ":"` already absorbed; hashing a nonce only feeds
/// its decimal digits.
#[derive(Clone)]
pub struct ChallengeHasher {
    base: Sha256,
}

impl ChallengeHasher {
    pub fn new(prefix: &str) -> Self {
        let mut base = Sha256::new();
        base.update(prefix.as_bytes());
        base.update(b":");
        ChallengeHasher { base }
    }

    pub fn hash(&self, nonce: u64) -> [u8; 32] {
        let mut hasher = self.base.clone();
        let mut buf = [0u8; 20];
        hasher.update(decimal(nonce, &mut buf));
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

fn decimal(mut n: u64, buf: &mut [u8; 20]) -> &[u8] {
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    &buf[i..]
}

/// Re-hash `nonce` and return its leading zero bits if it meets `difficulty`.
pub fn verify(prefix: &str, nonce: u64, difficulty: u32) -> Option<u32> {
    let bits = leading_zero_bits(&ChallengeHasher::new(prefix).hash(nonce));
    (bits >= difficulty).then_some(bits)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveResult {
    pub nonce: u64,
    pub leading_zero_bits: u32,
    pub hash_hex: String,
    pub elapsed_secs: f64,
    pub observed_rate: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Solved(SolveResult),
    Cancelled { attempts: u64 },
}

#[derive(Clone)]
pub struct NonceSolver {
    workers: usize,
    chunk: u64,
    progress_interval: u64,
    rate_hint: Option<u64>,
    stop: Option<Arc<AtomicBool>>,
}

impl Default for NonceSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSolver {
    pub fn new() -> Self {
        NonceSolver {
            workers: rayon::current_num_threads(),
            chunk: DEFAULT_CHUNK,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            rate_hint: None,
            stop: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_chunk(mut self, chunk: u64) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Calibrated hashes/second, used for the ETA before the observed rate settles.
    pub fn with_rate_hint(mut self, rate: Option<u64>) -> Self {
        self.rate_hint = rate;
        self
    }

    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Relaxed))
    }

    /// Find the smallest nonce meeting `difficulty`. Blocks until found or
    /// the stop flag is raised. `difficulty` must not exceed [`MAX_DIFFICULTY`].
    pub fn solve(&self, prefix: &str, difficulty: u32) -> SolveOutcome {
        debug_assert!(difficulty <= MAX_DIFFICULTY);
        let hasher = ChallengeHasher::new(prefix);
        let progress = Progress::new(difficulty, self.progress_interval, self.rate_hint);
        if let Ok(mut current) = progress.current.lock() {
            let short: String = prefix.chars().take(16).collect();
            *current = format!("{}:* >= {} bits", short, difficulty);
        }
        info!(difficulty, workers = self.workers, "starting nonce search");

        let workers = self.workers as u64;
        let span = workers * self.chunk;
        let mut round_start: u64 = 0;

        loop {
            if self.stopped() {
                return self.cancelled(&progress);
            }

            let best = AtomicU64::new(u64::MAX);
            let hit = (0..workers)
                .into_par_iter()
                .filter_map(|w| {
                    let lo = round_start + w * self.chunk;
                    self.scan(&hasher, lo, lo + self.chunk, difficulty, &best, &progress)
                })
                .min_by_key(|(nonce, _)| *nonce);

            // A worker cut short by the stop flag may hide a smaller nonce.
            if self.stopped() {
                return self.cancelled(&progress);
            }
            if let Some((nonce, hash)) = hit {
                let bits = leading_zero_bits(&hash);
                // Independent re-check of the winner before it leaves the solver.
                if verify(prefix, nonce, difficulty) == Some(bits) {
                    return SolveOutcome::Solved(finish(&progress, nonce, bits, &hash));
                }
                warn!(nonce, bits, difficulty, "winning nonce failed re-verification, continuing");
            }

            match round_start.checked_add(span) {
                Some(next) => round_start = next,
                None => return self.cancelled(&progress),
            }
        }
    }

    fn scan(
        &self,
        hasher: &ChallengeHasher,
        lo: u64,
        hi: u64,
        difficulty: u32,
        best: &AtomicU64,
        progress: &Progress,
    ) -> Option<(u64, [u8; 32])> {
        let mut tried = 0u64;
        let mut best_bits = 0u32;
        let mut hit = None;
        for nonce in lo..hi {
            if nonce & POLL_MASK == 0 && (best.load(Ordering::Relaxed) < nonce || self.stopped()) {
                break;
            }
            let hash = hasher.hash(nonce);
            tried += 1;
            let bits = leading_zero_bits(&hash);
            best_bits = best_bits.max(bits);
            if bits >= difficulty {
                best.fetch_min(nonce, Ordering::Relaxed);
                hit = Some((nonce, hash));
                break;
            }
        }
        progress.record(tried, best_bits);
        hit
    }

    fn cancelled(&self, progress: &Progress) -> SolveOutcome {
        let attempts = progress.attempts.load(Ordering::Relaxed);
        warn!(attempts, "nonce search cancelled");
        SolveOutcome::Cancelled { attempts }
    }
}

fn finish(progress: &Progress, nonce: u64, bits: u32, hash: &[u8; 32]) -> SolveResult {
    let elapsed_secs = progress.elapsed_secs();
    let observed_rate = progress.rate().round() as u64;
    info!(
        nonce,
        leading_zero_bits = bits,
        elapsed = format_args!("{:.1}s", elapsed_secs),
        rate = observed_rate,
        "nonce found"
    );
    SolveResult {
        nonce,
        leading_zero_bits: bits,
        hash_hex: to_hex(hash),
        elapsed_secs,
        observed_rate,
    }
}

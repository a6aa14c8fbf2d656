//! # Progress — Solver Attempt Counters
//!
//! Thread-safe progress tracking shared between the nonce solver's rayon
//! workers and the status line. Uses atomics for lock-free counter updates
//! and a Mutex only for the label (written once per solve).
//!
//! ## Reporting Cadence
//!
//! Status is logged every `interval` attempts, never per attempt: workers add
//! their attempt counts in batches via [`Progress::record`], and whichever
//! batch crosses the next threshold emits the line. The line carries attempts,
//! rate, best leading-zero count seen so far, elapsed time, and an ETA based
//! on the expected `2^difficulty` attempts (using the calibrated rate until the
//! observed rate is available).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

pub struct Progress {
    pub attempts: AtomicU64,
    pub best_bits: AtomicU32,
    pub current: Mutex<String>,
    difficulty: u32,
    interval: u64,
    next_report: AtomicU64,
    rate_hint: Option<u64>,
    start: Instant,
}

impl Progress {
    pub fn new(difficulty: u32, interval: u64, rate_hint: Option<u64>) -> Arc<Self> {
        let interval = interval.max(1);
        Arc::new(Progress {
            attempts: AtomicU64::new(0),
            best_bits: AtomicU32::new(0),
            current: Mutex::new(String::new()),
            difficulty,
            interval,
            next_report: AtomicU64::new(interval),
            rate_hint,
            start: Instant::now(),
        })
    }

    /// Add a batch of attempts and the best leading-zero count in it.
    /// Returns true when this batch crossed a report threshold (and logged).
    pub fn record(&self, attempts: u64, best_bits: u32) -> bool {
        self.best_bits.fetch_max(best_bits, Ordering::Relaxed);
        let total = self.attempts.fetch_add(attempts, Ordering::Relaxed) + attempts;

        let threshold = self.next_report.load(Ordering::Relaxed);
        if total < threshold {
            return false;
        }
        let next = (total / self.interval + 1) * self.interval;
        if self
            .next_report
            .compare_exchange(threshold, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // Another worker claimed this threshold.
            return false;
        }
        self.print_status();
        true
    }

    /// Observed attempts per second; 0.0 before any time has elapsed.
    pub fn rate(&self) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.attempts.load(Ordering::Relaxed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Seconds left until the expected `2^difficulty` attempts are reached.
    pub fn eta_secs(&self) -> Option<f64> {
        let observed = self.rate();
        let rate = if observed > 0.0 {
            observed
        } else {
            self.rate_hint? as f64
        };
        if rate <= 0.0 {
            return None;
        }
        let expected = 2f64.powi(self.difficulty.min(255) as i32);
        let done = self.attempts.load(Ordering::Relaxed) as f64;
        Some(((expected - done).max(0.0)) / rate)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let attempts = self.attempts.load(Ordering::Relaxed);
        let best = self.best_bits.load(Ordering::Relaxed);
        let current = self.current.lock().map(|c| c.clone()).unwrap_or_default();
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            current = %current,
            attempts,
            best_bits = best,
            difficulty = self.difficulty,
            rate = format_args!("{:.0}", self.rate()),
            eta_secs = format_args!("{:.1}", self.eta_secs().unwrap_or(f64::NAN)),
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "solve progress"
        );
    }
}

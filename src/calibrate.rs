//! # Calibrate — Local Hash-Rate Measurement
//!
//! The check-in site sizes its PoW difficulty from the hash rate the client
//! reports, so the rate is measured before the first challenge is requested:
//! a few fixed-length rounds hashing `"benchmark:" + counter` on one core,
//! each round's count divided by its own elapsed time, and the **median** of
//! those round rates reported. A single round disturbed by a scheduler hiccup
//! does not move the median.
//!
//! Calibration costs a few seconds, so [`CalibratedRate`] runs it lazily at
//! most once per process and shares the value across every account.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::info;

use crate::pow::ChallengeHasher;

pub const DEFAULT_ROUNDS: usize = 3;
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone)]
pub struct HashRateCalibrator {
    rounds: usize,
    duration: Duration,
}

impl Default for HashRateCalibrator {
    fn default() -> Self {
        HashRateCalibrator {
            rounds: DEFAULT_ROUNDS,
            duration: DEFAULT_ROUND_DURATION,
        }
    }
}

impl HashRateCalibrator {
    pub fn new(rounds: usize, duration: Duration) -> Self {
        HashRateCalibrator {
            rounds: rounds.max(1),
            duration,
        }
    }

    /// Median hashes/second over the configured rounds. Never 0.
    pub fn measure(&self) -> u64 {
        let hasher = ChallengeHasher::new("benchmark");
        let mut counter = 0u64;
        let duration = self.duration;
        self.measure_with(|_| sample_round(&hasher, &mut counter, duration))
    }

    /// Like [`measure`](Self::measure) with an injected sampler returning one
    /// round's rate (hashes/second) for the given round index.
    pub fn measure_with<F>(&self, mut round: F) -> u64
    where
        F: FnMut(usize) -> f64,
    {
        let rates: Vec<f64> = (0..self.rounds).map(&mut round).collect();
        let rate = median(&rates).round().max(1.0) as u64;
        info!(
            rounds = self.rounds,
            rates = ?rates.iter().map(|r| r.round() as u64).collect::<Vec<_>>(),
            rate,
            "hash rate calibrated"
        );
        rate
    }
}

fn sample_round(hasher: &ChallengeHasher, counter: &mut u64, duration: Duration) -> f64 {
    let start = Instant::now();
    let mut count = 0u64;
    loop {
        let _ = hasher.hash(*counter);
        *counter = counter.wrapping_add(1);
        count += 1;
        if start.elapsed() >= duration {
            break;
        }
    }
    let secs = start.elapsed().as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        count as f64
    }
}

/// Median of `values`; mean of the middle two for an even count, 0.0 for none.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Calibrated rate computed on first use and reused afterwards.
pub struct CalibratedRate {
    calibrator: HashRateCalibrator,
    value: OnceLock<u64>,
}

impl CalibratedRate {
    pub fn new(calibrator: HashRateCalibrator) -> Self {
        CalibratedRate {
            calibrator,
            value: OnceLock::new(),
        }
    }

    /// Pre-filled rate; never runs a benchmark.
    pub fn fixed(rate: u64) -> Self {
        let value = OnceLock::new();
        let _ = value.set(rate.max(1));
        CalibratedRate {
            calibrator: HashRateCalibrator::default(),
            value,
        }
    }

    pub fn get(&self) -> u64 {
        *self.value.get_or_init(|| self.calibrator.measure())
    }
}

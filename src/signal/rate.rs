//! Inter-peak interval averaging and BPM estimate smoothing

use super::ring::Ring;
use std::time::Instant;

/// Result of feeding the peak list to the estimator after a new peak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUpdate {
    /// Fewer than three peaks so far
    Warming,
    /// The instantaneous estimate fell outside the plausible band
    Rejected { bpm: u32 },
    /// The estimate was admitted; `reported` is the new ring mean
    Accepted { bpm: u32, reported: u32 },
}

#[derive(Debug, Clone)]
pub struct RateEstimator {
    min_bpm: u32,
    max_bpm: u32,
    estimates: Ring<u32>,
}

impl RateEstimator {
    pub fn new(min_bpm: u32, max_bpm: u32, estimate_window: usize) -> Self {
        Self {
            min_bpm,
            max_bpm,
            estimates: Ring::new(estimate_window),
        }
    }

    /// Re-estimate from every peak held so far
    pub fn on_peak(&mut self, peaks: &[Instant]) -> RateUpdate {
        let Some(bpm) = instantaneous_bpm(peaks) else {
            return RateUpdate::Warming;
        };

        if bpm < f64::from(self.min_bpm) || bpm > f64::from(self.max_bpm) {
            return RateUpdate::Rejected {
                bpm: bpm.clamp(0.0, f64::from(u32::MAX)) as u32,
            };
        }

        let bpm = bpm as u32;
        self.estimates.push(bpm);
        RateUpdate::Accepted {
            bpm,
            reported: self.reported(),
        }
    }

    /// Truncated mean of the admitted estimates, 0 when none
    pub fn reported(&self) -> u32 {
        self.estimates.truncated_mean()
    }

    pub fn estimates(&self) -> &Ring<u32> {
        &self.estimates
    }

    pub fn reset(&mut self) {
        self.estimates.clear();
    }
}

/// `round(60 / mean interval)` over consecutive peaks, once more than two
/// peaks exist.
pub fn instantaneous_bpm(peaks: &[Instant]) -> Option<f64> {
    if peaks.len() <= 2 {
        return None;
    }

    let total: f64 = peaks
        .windows(2)
        .map(|pair| pair[1].saturating_duration_since(pair[0]).as_secs_f64())
        .sum();
    let average = total / (peaks.len() - 1) as f64;

    if average <= 0.0 {
        return None;
    }

    Some((60.0 / average).round())
}

//! Pulse signal pipeline
//!
//! Turns the red-channel means of consecutive finger-present frames into a
//! smoothed BPM value:
//! - `smoother`: raw ring → moving average → smoothed ring
//! - `peaks`: rising-edge detection with a refractory debounce
//! - `rate`: interval averaging, plausibility band, estimate ring

mod peaks;
mod rate;
mod ring;
mod smoother;

pub use peaks::{PeakDetector, is_rising_edge};
pub use rate::{RateEstimator, RateUpdate, instantaneous_bpm};
pub use ring::Ring;
pub use smoother::Smoother;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Raw red samples averaged by the smoother
    #[serde(default = "default_raw_window")]
    pub raw_window: usize,

    /// Smoothed values retained for peak detection
    #[serde(default = "default_smoothed_window")]
    pub smoothed_window: usize,

    /// Admitted BPM estimates averaged into the reported value
    #[serde(default = "default_estimate_window")]
    pub estimate_window: usize,

    /// Minimum spacing between accepted peaks
    #[serde(default = "default_refractory_ms")]
    pub refractory_ms: u64,

    #[serde(default = "default_min_bpm")]
    pub min_bpm: u32,

    #[serde(default = "default_max_bpm")]
    pub max_bpm: u32,
}

fn default_raw_window() -> usize {
    20
}

fn default_smoothed_window() -> usize {
    100
}

fn default_estimate_window() -> usize {
    5
}

fn default_refractory_ms() -> u64 {
    400
}

fn default_min_bpm() -> u32 {
    40
}

fn default_max_bpm() -> u32 {
    180
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            raw_window: default_raw_window(),
            smoothed_window: default_smoothed_window(),
            estimate_window: default_estimate_window(),
            refractory_ms: default_refractory_ms(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
        }
    }
}

impl SignalConfig {
    pub fn refractory(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }
}

/// Smoother, peak detector and rate estimator wired in sequence
#[derive(Debug, Clone)]
pub struct PulsePipeline {
    smoother: Smoother,
    detector: PeakDetector,
    estimator: RateEstimator,
}

impl PulsePipeline {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            smoother: Smoother::new(config.raw_window, config.smoothed_window),
            detector: PeakDetector::new(config.refractory()),
            estimator: RateEstimator::new(config.min_bpm, config.max_bpm, config.estimate_window),
        }
    }

    /// Feed one finger-present red mean observed at `timestamp`.
    ///
    /// Returns `None` unless a peak was accepted on this sample.
    pub fn push(&mut self, avg_r: f64, timestamp: Instant) -> Option<RateUpdate> {
        self.smoother.push(avg_r);

        let window = self.smoother.latest_three()?;
        if !self.detector.observe(window, timestamp) {
            return None;
        }

        let update = self.estimator.on_peak(self.detector.peaks());
        match update {
            RateUpdate::Warming => {
                log::debug!("Peak {} accepted", self.detector.peaks().len());
            }
            RateUpdate::Rejected { bpm } => {
                log::debug!("Dropped implausible estimate of {} BPM", bpm);
            }
            RateUpdate::Accepted { bpm, reported } => {
                log::debug!("Estimate {} BPM admitted, reporting {} BPM", bpm, reported);
            }
        }
        Some(update)
    }

    /// Current reported BPM (0 until an estimate is admitted)
    pub fn bpm(&self) -> u32 {
        self.estimator.reported()
    }

    /// Clear every buffer, as on loss of the finger
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.detector.reset();
        self.estimator.reset();
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn detector(&self) -> &PeakDetector {
        &self.detector
    }

    pub fn estimator(&self) -> &RateEstimator {
        &self.estimator
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FRAME_MS: u64 = 33;
    pub(crate) const FRAMES_PER_BEAT: u64 = 26;

    /// Red mean for frame `i`: flat baseline with a one-frame spike every
    /// `FRAMES_PER_BEAT` frames (858ms, ~70 BPM at 33ms per frame).
    pub(crate) fn beat_red(i: u64) -> f64 {
        if i > 0 && i % FRAMES_PER_BEAT == 0 {
            200.0
        } else {
            150.0
        }
    }

    pub(crate) fn frame_time(base: Instant, i: u64) -> Instant {
        base + Duration::from_millis(i * FRAME_MS)
    }

    #[test]
    fn test_flat_signal_produces_no_peaks() {
        let mut pipeline = PulsePipeline::new(&SignalConfig::default());
        let base = Instant::now();
        for i in 0..300 {
            assert!(pipeline.push(150.0, frame_time(base, i)).is_none());
        }
        assert_eq!(pipeline.bpm(), 0);
    }

    #[test]
    fn test_spike_train_converges_to_seventy() {
        let mut pipeline = PulsePipeline::new(&SignalConfig::default());
        let base = Instant::now();

        for i in 0..(FRAMES_PER_BEAT * 10) {
            pipeline.push(beat_red(i), frame_time(base, i));
        }

        assert_eq!(pipeline.detector().peaks().len(), 9);
        assert_eq!(pipeline.estimator().estimates().len(), 5);
        assert_eq!(pipeline.bpm(), 70);
    }

    #[test]
    fn test_peaks_only_after_three_smoothed_samples() {
        let mut pipeline = PulsePipeline::new(&SignalConfig::default());
        let base = Instant::now();

        // Strictly rising input would be a rising edge on every sample
        assert!(pipeline.push(120.0, frame_time(base, 0)).is_none());
        assert!(pipeline.push(130.0, frame_time(base, 1)).is_none());
        assert!(pipeline.push(140.0, frame_time(base, 2)).is_some());
    }

    #[test]
    fn test_reset_clears_all_stages() {
        let mut pipeline = PulsePipeline::new(&SignalConfig::default());
        let base = Instant::now();
        for i in 0..(FRAMES_PER_BEAT * 8) {
            pipeline.push(beat_red(i), frame_time(base, i));
        }
        assert!(pipeline.bpm() > 0);

        pipeline.reset();

        assert_eq!(pipeline.bpm(), 0);
        assert!(pipeline.smoother().raw().is_empty());
        assert!(pipeline.smoother().smoothed().is_empty());
        assert!(pipeline.detector().peaks().is_empty());
        assert!(pipeline.detector().last_peak().is_none());
        assert!(pipeline.estimator().estimates().is_empty());
    }
}

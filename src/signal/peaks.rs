//! Rising-edge peak detection with a refractory debounce

use std::time::{Duration, Instant};

/// True when the newest of three smoothed values is above both predecessors.
///
/// This is a rising-edge test: it does not check that the signal falls again
/// after `c`.
pub fn is_rising_edge([a, b, c]: [f64; 3]) -> bool {
    a < c && b < c
}

#[derive(Debug, Clone)]
pub struct PeakDetector {
    refractory: Duration,
    last_peak: Option<Instant>,
    peaks: Vec<Instant>,
}

impl PeakDetector {
    pub fn new(refractory: Duration) -> Self {
        Self {
            refractory,
            last_peak: None,
            peaks: Vec::new(),
        }
    }

    /// Inspect the latest smoothed window at time `now`.
    ///
    /// Returns true when a peak was accepted and appended. Candidates within
    /// the refractory period of the previous peak are dropped.
    pub fn observe(&mut self, window: [f64; 3], now: Instant) -> bool {
        if !is_rising_edge(window) {
            return false;
        }

        if let Some(last) = self.last_peak {
            if now.saturating_duration_since(last) <= self.refractory {
                return false;
            }
        }

        self.peaks.push(now);
        self.last_peak = Some(now);
        true
    }

    /// Accepted peak times, strictly increasing
    pub fn peaks(&self) -> &[Instant] {
        &self.peaks
    }

    pub fn last_peak(&self) -> Option<Instant> {
        self.last_peak
    }

    pub fn reset(&mut self) {
        self.peaks.clear();
        self.last_peak = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RISE: [f64; 3] = [1.0, 2.0, 3.0];

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_rising_edge_rule() {
        assert!(is_rising_edge([1.0, 2.0, 3.0]));
        assert!(is_rising_edge([3.0, 1.0, 2.0]));
        assert!(!is_rising_edge([1.0, 3.0, 3.0]));
        assert!(!is_rising_edge([2.0, 2.0, 2.0]));
        assert!(!is_rising_edge([3.0, 2.0, 1.0]));
    }

    #[test]
    fn test_first_peak_is_accepted() {
        let mut detector = PeakDetector::new(Duration::from_millis(400));
        let now = Instant::now();
        assert!(detector.observe(RISE, now));
        assert_eq!(detector.peaks(), &[now]);
    }

    #[test]
    fn test_candidates_inside_refractory_are_dropped() {
        let mut detector = PeakDetector::new(Duration::from_millis(400));
        let base = Instant::now();

        assert!(detector.observe(RISE, base));
        assert!(!detector.observe(RISE, ms(base, 100)));
        assert!(!detector.observe(RISE, ms(base, 400)));
        assert!(detector.observe(RISE, ms(base, 401)));
        assert_eq!(detector.peaks().len(), 2);
        assert_eq!(detector.last_peak(), Some(ms(base, 401)));
    }

    #[test]
    fn test_accepted_peaks_are_spaced_beyond_refractory() {
        let refractory = Duration::from_millis(400);
        let mut detector = PeakDetector::new(refractory);
        let base = Instant::now();

        // A rising edge on every 33ms frame for ten seconds
        for i in 0..300 {
            detector.observe(RISE, ms(base, i * 33));
        }

        let peaks = detector.peaks();
        assert!(peaks.len() > 10);
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] > refractory);
        }
    }

    #[test]
    fn test_non_rising_window_never_accepted() {
        let mut detector = PeakDetector::new(Duration::from_millis(400));
        assert!(!detector.observe([5.0, 5.0, 5.0], Instant::now()));
        assert!(detector.peaks().is_empty());
    }

    #[test]
    fn test_reset_forgets_last_peak() {
        let mut detector = PeakDetector::new(Duration::from_millis(400));
        let base = Instant::now();
        detector.observe(RISE, base);
        detector.reset();

        assert!(detector.peaks().is_empty());
        assert!(detector.observe(RISE, ms(base, 10)));
    }
}

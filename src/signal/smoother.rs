//! Moving-average smoothing of the red channel

use super::ring::Ring;

/// Raw red samples feed a moving average whose outputs are kept in a second
/// ring for the peak detector.
#[derive(Debug, Clone)]
pub struct Smoother {
    raw: Ring<f64>,
    smoothed: Ring<f64>,
}

impl Smoother {
    pub fn new(raw_window: usize, smoothed_window: usize) -> Self {
        Self {
            raw: Ring::new(raw_window),
            smoothed: Ring::new(smoothed_window),
        }
    }

    /// Push one red-channel mean and return the new smoothed value
    pub fn push(&mut self, avg_r: f64) -> f64 {
        self.raw.push(avg_r);
        let smoothed = self.raw.mean().unwrap_or(avg_r);
        self.smoothed.push(smoothed);
        smoothed
    }

    /// The three most recent smoothed values, oldest first
    pub fn latest_three(&self) -> Option<[f64; 3]> {
        self.smoothed.last::<3>()
    }

    pub fn raw(&self) -> &Ring<f64> {
        &self.raw
    }

    pub fn smoothed(&self) -> &Ring<f64> {
        &self.smoothed
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.smoothed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothed_value_is_window_mean() {
        let mut smoother = Smoother::new(3, 10);
        assert_eq!(smoother.push(3.0), 3.0);
        assert_eq!(smoother.push(6.0), 4.5);
        assert_eq!(smoother.push(9.0), 6.0);
        // 3.0 falls out of the window
        assert_eq!(smoother.push(12.0), 9.0);
    }

    #[test]
    fn test_latest_three_requires_three_values() {
        let mut smoother = Smoother::new(20, 100);
        smoother.push(150.0);
        smoother.push(150.0);
        assert!(smoother.latest_three().is_none());
        smoother.push(150.0);
        assert_eq!(smoother.latest_three(), Some([150.0, 150.0, 150.0]));
    }

    #[test]
    fn test_rings_stay_within_capacity() {
        let mut smoother = Smoother::new(20, 100);
        for i in 0..5000 {
            smoother.push(120.0 + (i % 17) as f64);
            assert!(smoother.raw().len() <= 20);
            assert!(smoother.smoothed().len() <= 100);
        }
        assert_eq!(smoother.raw().len(), 20);
        assert_eq!(smoother.smoothed().len(), 100);
    }

    #[test]
    fn test_reset_empties_both_rings() {
        let mut smoother = Smoother::new(20, 100);
        for _ in 0..30 {
            smoother.push(140.0);
        }
        smoother.reset();
        assert!(smoother.raw().is_empty());
        assert!(smoother.smoothed().is_empty());
        assert!(smoother.latest_three().is_none());
    }
}

//! Fingertip presence classification
//!
//! A fingertip lit by the torch saturates the red channel well above green
//! and blue. Anything else (ambient scene, lens uncovered) fails at least one
//! of the checks below.

use crate::sampler::FrameSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceThresholds {
    /// Red must exceed this absolute level
    #[serde(default = "default_min_red")]
    pub min_red: f64,

    /// Red must exceed both green and blue by more than this margin
    #[serde(default = "default_min_red_margin")]
    pub min_red_margin: f64,
}

fn default_min_red() -> f64 {
    110.0
}

fn default_min_red_margin() -> f64 {
    15.0
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        Self {
            min_red: default_min_red(),
            min_red_margin: default_min_red_margin(),
        }
    }
}

impl PresenceThresholds {
    pub fn is_finger_present(&self, sample: &FrameSample) -> bool {
        sample.avg_r > self.min_red
            && sample.avg_r > sample.avg_g + self.min_red_margin
            && sample.avg_r > sample.avg_b + self.min_red_margin
    }
}

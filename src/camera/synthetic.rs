//! Simulated fingertip camera
//!
//! Emits BGRA frames from a background thread. While the simulated finger is
//! on the lens the red channel carries a short pulse once per beat; while it
//! is lifted the frames show a dim, neutral scene.

use super::{Authorization, Camera, CameraError, FrameSink};
use crate::sampler::{PixelLayout, RawFrame};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub bpm: f64,
    pub fps: u32,
    pub width: usize,
    pub height: usize,
    /// Offsets from capture start during which the finger is lifted
    pub finger_off: Vec<Range<Duration>>,
    pub authorization: Authorization,
    pub has_device: bool,
    pub has_torch: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            bpm: 70.0,
            fps: 30,
            width: 192,
            height: 144,
            finger_off: Vec::new(),
            authorization: Authorization::Granted,
            has_device: true,
            has_torch: true,
        }
    }
}

/// Fraction of each beat period during which the pulse is high
const PULSE_WIDTH: f64 = 0.12;

impl SyntheticConfig {
    fn finger_on(&self, offset: Duration) -> bool {
        !self.finger_off.iter().any(|window| window.contains(&offset))
    }

    /// (blue, green, red) at `offset` from capture start
    fn color_at(&self, offset: Duration) -> [u8; 3] {
        if !self.finger_on(offset) {
            return [88, 90, 95];
        }

        let beat = offset.as_secs_f64() * self.bpm / 60.0;
        let red = if beat.fract() < PULSE_WIDTH { 190 } else { 160 };
        [35, 40, red]
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    torch_on: bool,
    stop_signal: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            torch_on: false,
            stop_signal: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Camera for SyntheticCamera {
    fn authorize(&mut self) -> Authorization {
        self.config.authorization
    }

    fn has_device(&self) -> bool {
        self.config.has_device
    }

    fn has_torch(&self) -> bool {
        self.config.has_device && self.config.has_torch
    }

    fn set_torch(&mut self, on: bool) -> Result<(), CameraError> {
        if !self.has_torch() {
            return Err(CameraError::TorchUnavailable);
        }
        self.torch_on = on;
        Ok(())
    }

    fn start(&mut self, sink: FrameSink) -> Result<(), CameraError> {
        if self.config.authorization != Authorization::Granted {
            return Err(CameraError::Unauthorized);
        }
        if !self.config.has_device {
            return Err(CameraError::DeviceUnavailable);
        }

        self.stop();

        let stop_signal = Arc::new(AtomicBool::new(false));
        self.stop_signal = Arc::clone(&stop_signal);

        let config = self.config.clone();
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.fps.max(1)));

        let worker = std::thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                let bytes_per_row = config.width * PixelLayout::BYTES_PER_PIXEL;
                let mut buffer = vec![255u8; bytes_per_row * config.height];
                let start = Instant::now();
                let mut next_frame = start;

                while !stop_signal.load(Ordering::Acquire) {
                    let now = Instant::now();
                    let [b, g, r] = config.color_at(now - start);
                    for pixel in buffer.chunks_exact_mut(PixelLayout::BYTES_PER_PIXEL) {
                        pixel[0] = b;
                        pixel[1] = g;
                        pixel[2] = r;
                    }

                    let frame =
                        RawFrame::packed(&buffer, config.width, config.height, PixelLayout::Bgra);
                    if !sink.deliver(&frame, now) {
                        break;
                    }

                    next_frame += frame_interval;
                    if let Some(wait) = next_frame.checked_duration_since(Instant::now()) {
                        std::thread::sleep(wait);
                    }
                }
            })
            .map_err(|e| CameraError::Capture(format!("Failed to spawn capture thread: {}", e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Synthetic capture thread panicked");
            }
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

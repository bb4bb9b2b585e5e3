//! Measurement session state machine
//!
//! `SessionController` owns the pulse pipeline and the 30-second window. It is
//! synchronous and single-owner; the monitor task serializes frames, clock
//! ticks and user commands onto it.
//!
//! ```text
//! Idle ──start──▶ Armed ──finger──▶ Running ──30s──▶ Completed
//!                   ▲                │   ▲
//!                   │           lost │   │ finger
//!                   │                ▼   │
//!                   └──────────────  Paused
//! ```

use crate::presence::PresenceThresholds;
use crate::sampler::FrameSample;
use crate::signal::{PulsePipeline, RateUpdate, SignalConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Length of a measurement, in clock ticks
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,

    /// Elapsed seconds after which the live BPM is shown
    #[serde(default = "default_reveal_after_secs")]
    pub reveal_after_secs: u32,
}

fn default_duration_secs() -> u32 {
    30
}

fn default_reveal_after_secs() -> u32 {
    15
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            reveal_after_secs: default_reveal_after_secs(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    /// Waiting for a finger
    Armed,
    Running,
    /// Finger lost mid-session; elapsed time is kept
    Paused,
    Completed,
    /// Camera unusable; terminal until the next start
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "Ready",
            Phase::Armed => "Waiting",
            Phase::Running => "Measuring",
            Phase::Paused => "Paused",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
        }
    }

    fn is_active(&self) -> bool {
        matches!(self, Phase::Armed | Phase::Running | Phase::Paused)
    }
}

/// Terminal reasons a session cannot run
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    PermissionDenied,
    PermissionBlocked,
    NoCamera,
    NoTorch,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusMessage {
    Ready,
    PlaceFinger,
    Measuring,
    Measured { bpm: u32 },
    Failed { failure: Failure },
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Ready => write!(f, "Ready to measure."),
            StatusMessage::PlaceFinger => write!(f, "Place your finger over the camera flash."),
            StatusMessage::Measuring => write!(f, "Measuring..."),
            StatusMessage::Measured { bpm } => write!(f, "Measured value = {}", bpm),
            StatusMessage::Failed { failure } => match failure {
                Failure::PermissionDenied => {
                    write!(f, "Camera permission is required to measure pulse.")
                }
                Failure::PermissionBlocked => {
                    write!(f, "Camera access is blocked. Please enable it in Settings.")
                }
                Failure::NoCamera => write!(f, "No camera was found on this device."),
                Failure::NoTorch => write!(f, "This camera has no flash to light the fingertip."),
            },
        }
    }
}

/// Snapshot published to the display layer after every state change
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub session_id: Option<Uuid>,
    pub phase: Phase,
    pub current_bpm: u32,
    /// The live value is shown once the reveal time has passed
    pub bpm_visible: bool,
    pub finger_present: bool,
    pub status: StatusMessage,
    pub elapsed_seconds: u32,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            session_id: None,
            phase: Phase::Idle,
            current_bpm: 0,
            bpm_visible: false,
            finger_present: false,
            status: StatusMessage::Ready,
            elapsed_seconds: 0,
        }
    }
}

/// Final value of a session that reached its full duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub bpm: u32,
    /// True when the value should be archived
    pub persist: bool,
}

/// Phase changes the clock and capture owner must react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Armed/Paused → Running; the clock starts or resumes
    Resumed,
    /// Running → Paused; the clock is suspended
    Paused,
    Completed(SessionOutcome),
}

pub struct SessionController {
    config: SessionConfig,
    presence: PresenceThresholds,
    pipeline: PulsePipeline,

    session_id: Option<Uuid>,
    phase: Phase,
    elapsed_seconds: u32,
    finger_present: bool,
    current_bpm: u32,
    bpm_visible: bool,
    status: StatusMessage,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        presence: PresenceThresholds,
        signal: &SignalConfig,
    ) -> Self {
        Self {
            config,
            presence,
            pipeline: PulsePipeline::new(signal),
            session_id: None,
            phase: Phase::Idle,
            elapsed_seconds: 0,
            finger_present: false,
            current_bpm: 0,
            bpm_visible: false,
            status: StatusMessage::Ready,
        }
    }

    /// Begin a new measurement, discarding any previous one
    pub fn start(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.reset_measurement();
        self.session_id = Some(id);
        self.phase = Phase::Armed;
        self.status = StatusMessage::PlaceFinger;
        log::info!("Session {} armed", id);
        id
    }

    /// Enter the terminal failure state; the session never runs
    pub fn fail(&mut self, failure: Failure) {
        self.reset_measurement();
        self.session_id = None;
        self.phase = Phase::Failed;
        self.status = StatusMessage::Failed { failure };
        log::warn!("Measurement unavailable: {:?}", failure);
    }

    /// Tear the session down and return to Idle
    pub fn stop(&mut self) {
        if let Some(id) = self.session_id.take() {
            log::info!("Session {} torn down in phase {:?}", id, self.phase);
        }
        self.reset_measurement();
        self.phase = Phase::Idle;
        self.status = StatusMessage::Ready;
    }

    /// Classify one frame and, if a finger is present, feed the pipeline
    pub fn on_frame(&mut self, sample: &FrameSample) -> Option<Transition> {
        if !self.phase.is_active() {
            return None;
        }

        if !self.presence.is_finger_present(sample) {
            self.finger_present = false;
            self.pipeline.reset();
            self.current_bpm = 0;
            self.status = StatusMessage::PlaceFinger;

            if self.phase == Phase::Running {
                self.phase = Phase::Paused;
                log::info!("Finger lost at {}s, pausing", self.elapsed_seconds);
                return Some(Transition::Paused);
            }
            return None;
        }

        self.finger_present = true;

        let transition = if matches!(self.phase, Phase::Armed | Phase::Paused) {
            self.phase = Phase::Running;
            self.status = StatusMessage::Measuring;
            log::info!("Finger detected, measuring from {}s", self.elapsed_seconds);
            Some(Transition::Resumed)
        } else {
            None
        };

        if let Some(RateUpdate::Accepted { reported, .. }) =
            self.pipeline.push(sample.avg_r, sample.timestamp)
        {
            self.current_bpm = reported;
        }

        transition
    }

    /// Advance the session clock by one second
    pub fn on_tick(&mut self) -> Option<Transition> {
        if self.phase != Phase::Running {
            return None;
        }

        self.elapsed_seconds = (self.elapsed_seconds + 1).min(self.config.duration_secs);

        if self.elapsed_seconds >= self.config.reveal_after_secs {
            self.bpm_visible = true;
        }

        if self.elapsed_seconds < self.config.duration_secs {
            return None;
        }

        let session_id = self.session_id?;
        self.phase = Phase::Completed;
        self.bpm_visible = true;
        self.status = StatusMessage::Measured {
            bpm: self.current_bpm,
        };

        let outcome = SessionOutcome {
            session_id,
            bpm: self.current_bpm,
            persist: self.current_bpm > 0 && self.finger_present,
        };
        log::info!(
            "Session {} completed at {} BPM (persist: {})",
            session_id,
            outcome.bpm,
            outcome.persist
        );
        Some(Transition::Completed(outcome))
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pipeline(&self) -> &PulsePipeline {
        &self.pipeline
    }

    pub fn snapshot(&self) -> Telemetry {
        Telemetry {
            session_id: self.session_id,
            phase: self.phase,
            current_bpm: self.current_bpm,
            bpm_visible: self.bpm_visible,
            finger_present: self.finger_present,
            status: self.status,
            elapsed_seconds: self.elapsed_seconds,
        }
    }

    fn reset_measurement(&mut self) {
        self.pipeline.reset();
        self.elapsed_seconds = 0;
        self.finger_present = false;
        self.current_bpm = 0;
        self.bpm_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::tests::{FRAMES_PER_BEAT, beat_red, frame_time};
    use std::time::Instant;

    fn controller() -> SessionController {
        SessionController::new(
            SessionConfig::default(),
            PresenceThresholds::default(),
            &SignalConfig::default(),
        )
    }

    fn finger(red: f64, at: Instant) -> FrameSample {
        FrameSample::new(red, 40.0, 35.0, at)
    }

    fn ambient(at: Instant) -> FrameSample {
        FrameSample::new(95.0, 90.0, 88.0, at)
    }

    /// Feed enough beating frames for five consistent estimates
    fn feed_beats(controller: &mut SessionController, base: Instant) -> u64 {
        let frames = FRAMES_PER_BEAT * 10;
        for i in 0..frames {
            controller.on_frame(&finger(beat_red(i), frame_time(base, i)));
        }
        frames
    }

    #[test]
    fn test_frames_ignored_while_idle() {
        let mut controller = controller();
        assert_eq!(controller.on_frame(&finger(180.0, Instant::now())), None);
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(!controller.snapshot().finger_present);
    }

    #[test]
    fn test_start_arms_and_finger_runs() {
        let mut controller = controller();
        let id = controller.start();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.session_id, Some(id));
        assert_eq!(snapshot.phase, Phase::Armed);
        assert_eq!(snapshot.status, StatusMessage::PlaceFinger);

        assert_eq!(
            controller.on_frame(&finger(180.0, Instant::now())),
            Some(Transition::Resumed)
        );
        assert_eq!(controller.phase(), Phase::Running);
        assert_eq!(controller.snapshot().status, StatusMessage::Measuring);
    }

    #[test]
    fn test_ticks_ignored_unless_running() {
        let mut controller = controller();
        controller.start();
        assert_eq!(controller.on_tick(), None);
        assert_eq!(controller.snapshot().elapsed_seconds, 0);
    }

    #[test]
    fn test_absent_frames_never_produce_estimates() {
        let mut controller = controller();
        controller.start();
        let base = Instant::now();

        for i in 0..500 {
            let red = if i % 2 == 0 { 110.0 } else { 200.0 };
            // Either dim red or a white scene
            let sample = if i % 2 == 0 {
                FrameSample::new(red, 0.0, 0.0, frame_time(base, i))
            } else {
                FrameSample::new(red, 190.0, 40.0, frame_time(base, i))
            };
            controller.on_frame(&sample);
            assert!(!controller.snapshot().finger_present);
        }

        assert!(controller.pipeline().estimator().estimates().is_empty());
        assert_eq!(controller.phase(), Phase::Armed);
    }

    #[test]
    fn test_losing_finger_pauses_and_clears_signal() {
        let mut controller = controller();
        controller.start();
        let base = Instant::now();
        let frames = feed_beats(&mut controller, base);

        for _ in 0..7 {
            controller.on_tick();
        }
        assert_eq!(controller.snapshot().current_bpm, 70);

        assert_eq!(
            controller.on_frame(&ambient(frame_time(base, frames))),
            Some(Transition::Paused)
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Paused);
        assert_eq!(snapshot.elapsed_seconds, 7);
        assert_eq!(snapshot.current_bpm, 0);
        assert!(!snapshot.finger_present);
        assert_eq!(snapshot.status, StatusMessage::PlaceFinger);

        let pipeline = controller.pipeline();
        assert!(pipeline.smoother().raw().is_empty());
        assert!(pipeline.smoother().smoothed().is_empty());
        assert!(pipeline.detector().peaks().is_empty());
        assert!(pipeline.estimator().estimates().is_empty());

        // Paused clock does not advance
        assert_eq!(controller.on_tick(), None);
        assert_eq!(controller.snapshot().elapsed_seconds, 7);

        // Regaining the finger resumes from the preserved time
        assert_eq!(
            controller.on_frame(&finger(150.0, frame_time(base, frames + 1))),
            Some(Transition::Resumed)
        );
        controller.on_tick();
        assert_eq!(controller.snapshot().elapsed_seconds, 8);
    }

    #[test]
    fn test_bpm_revealed_after_fifteen_seconds() {
        let mut controller = controller();
        controller.start();
        controller.on_frame(&finger(150.0, Instant::now()));

        for _ in 0..14 {
            controller.on_tick();
        }
        assert!(!controller.snapshot().bpm_visible);

        controller.on_tick();
        assert!(controller.snapshot().bpm_visible);
        assert_eq!(controller.phase(), Phase::Running);
    }

    #[test]
    fn test_full_session_with_bpm_is_persisted() {
        let mut controller = controller();
        let id = controller.start();
        feed_beats(&mut controller, Instant::now());

        let mut outcome = None;
        for _ in 0..30 {
            if let Some(Transition::Completed(done)) = controller.on_tick() {
                outcome = Some(done);
            }
        }

        assert_eq!(
            outcome,
            Some(SessionOutcome {
                session_id: id,
                bpm: 70,
                persist: true,
            })
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Completed);
        assert_eq!(snapshot.elapsed_seconds, 30);
        assert_eq!(snapshot.status, StatusMessage::Measured { bpm: 70 });

        // Completed sessions ignore further input
        assert_eq!(controller.on_tick(), None);
        assert_eq!(controller.on_frame(&ambient(Instant::now())), None);
        assert_eq!(controller.snapshot().current_bpm, 70);
    }

    #[test]
    fn test_session_without_bpm_is_not_persisted() {
        let mut controller = controller();
        controller.start();
        controller.on_frame(&finger(150.0, Instant::now()));

        let outcome = (0..30).find_map(|_| match controller.on_tick() {
            Some(Transition::Completed(done)) => Some(done),
            _ => None,
        });

        let outcome = outcome.unwrap();
        assert_eq!(outcome.bpm, 0);
        assert!(!outcome.persist);
    }

    #[test]
    fn test_fail_is_terminal_until_restart() {
        let mut controller = controller();
        controller.fail(Failure::PermissionDenied);

        assert_eq!(controller.phase(), Phase::Failed);
        assert_eq!(controller.on_frame(&finger(180.0, Instant::now())), None);
        assert_eq!(
            controller.snapshot().status,
            StatusMessage::Failed {
                failure: Failure::PermissionDenied
            }
        );

        controller.start();
        assert_eq!(controller.phase(), Phase::Armed);
    }

    #[test]
    fn test_restart_resets_elapsed_and_bpm() {
        let mut controller = controller();
        let first = controller.start();
        feed_beats(&mut controller, Instant::now());
        for _ in 0..10 {
            controller.on_tick();
        }

        let second = controller.start();
        assert_ne!(first, second);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.elapsed_seconds, 0);
        assert_eq!(snapshot.current_bpm, 0);
        assert!(!snapshot.bpm_visible);
        assert!(controller.pipeline().detector().peaks().is_empty());
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mut controller = controller();
        controller.start();
        controller.on_frame(&finger(150.0, Instant::now()));
        controller.stop();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot, Telemetry::default());
    }

    #[test]
    fn test_status_messages_render() {
        assert_eq!(
            StatusMessage::Measured { bpm: 72 }.to_string(),
            "Measured value = 72"
        );
        assert_eq!(
            StatusMessage::Failed {
                failure: Failure::PermissionBlocked
            }
            .to_string(),
            "Camera access is blocked. Please enable it in Settings."
        );
    }
}

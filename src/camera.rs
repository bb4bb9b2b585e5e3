//! Camera capability boundary
//!
//! The measurement core never talks to a capture device directly. A `Camera`
//! implementation answers the authorization and hardware questions, switches
//! the torch, and pushes frames into a `FrameSink` from its own capture
//! thread. The sink averages each frame in place and forwards the immutable
//! sample to the monitor task.

mod synthetic;

pub use synthetic::{SyntheticCamera, SyntheticConfig};

use crate::monitor::Command;
use crate::sampler::{RawFrame, sample_frame};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Outcome of asking for camera access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    /// The user declined the prompt
    Denied,
    /// Access is disabled in system settings
    Blocked,
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera access not authorized")]
    Unauthorized,
    #[error("No camera device available")]
    DeviceUnavailable,
    #[error("Camera has no torch")]
    TorchUnavailable,
    #[error("Capture error: {0}")]
    Capture(String),
}

/// Capability effector for a torch-equipped camera
pub trait Camera: Send + 'static {
    /// Request (or report already granted) access to the camera
    fn authorize(&mut self) -> Authorization;

    fn has_device(&self) -> bool;

    fn has_torch(&self) -> bool;

    fn set_torch(&mut self, on: bool) -> Result<(), CameraError>;

    /// Begin delivering frames to `sink` until `stop` is called
    fn start(&mut self, sink: FrameSink) -> Result<(), CameraError>;

    /// Stop delivering frames. Called on the monitor task, so it must return
    /// within about one frame interval.
    fn stop(&mut self);
}

/// Producer end handed to a camera for one session
#[derive(Clone, Debug)]
pub struct FrameSink {
    session: Uuid,
    stride: usize,
    tx: UnboundedSender<Command>,
}

impl FrameSink {
    pub(crate) fn new(session: Uuid, stride: usize, tx: UnboundedSender<Command>) -> Self {
        Self {
            session,
            stride,
            tx,
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Average `frame` and queue the sample for the monitor.
    ///
    /// Returns false once the monitor has gone away; the camera should stop
    /// producing.
    pub fn deliver(&self, frame: &RawFrame<'_>, timestamp: Instant) -> bool {
        let sample = sample_frame(frame, self.stride, timestamp);
        self.tx
            .send(Command::Frame {
                session: self.session,
                sample,
            })
            .is_ok()
    }
}

//! Serialized measurement context
//!
//! One tokio task owns the `SessionController`. Frames from the capture
//! thread, ticks from the session clock and user commands all arrive on a
//! single channel, so no pipeline state is ever shared. Frames and ticks are
//! tagged with the session (and clock run) that produced them; anything left
//! over from a torn-down session or a suspended clock is dropped on arrival.

use crate::camera::{Authorization, Camera, FrameSink};
use crate::conf::Settings;
use crate::sampler::FrameSample;
use crate::session::{Failure, SessionController, SessionOutcome, Telemetry, Transition};
use crate::store::DailyStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{
    UnboundedReceiver, UnboundedSender, WeakUnboundedSender, unbounded_channel,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Session clock period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Inputs to the monitor task
#[derive(Debug)]
pub enum Command {
    /// Start a new measurement (restarting any current one)
    Start,
    /// Tear the current measurement down
    Stop,
    Frame { session: Uuid, sample: FrameSample },
    Tick { session: Uuid, run: u64 },
    Shutdown,
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor task has stopped")]
    Closed,
}

/// Cloneable control surface for a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    tx: UnboundedSender<Command>,
    telemetry: watch::Receiver<Telemetry>,
}

impl MonitorHandle {
    pub fn start(&self) -> Result<(), MonitorError> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<(), MonitorError> {
        self.send(Command::Stop)
    }

    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(Command::Shutdown)
    }

    /// Latest published snapshot
    pub fn telemetry(&self) -> Telemetry {
        *self.telemetry.borrow()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.clone()
    }

    fn send(&self, command: Command) -> Result<(), MonitorError> {
        self.tx.send(command).map_err(|_| MonitorError::Closed)
    }
}

pub struct Monitor<C: Camera> {
    controller: SessionController,
    camera: C,
    store: Arc<dyn DailyStore>,
    stride: usize,

    commands: WeakUnboundedSender<Command>,
    telemetry: watch::Sender<Telemetry>,

    ticker: Option<JoinHandle<()>>,
    clock_run: u64,
    capturing: bool,
    /// Store writes still in flight; awaited before the task exits
    archives: Vec<JoinHandle<()>>,
}

impl<C: Camera> Monitor<C> {
    /// Spawn the monitor task on the current tokio runtime
    pub fn spawn(
        camera: C,
        store: Arc<dyn DailyStore>,
        settings: &Settings,
    ) -> (MonitorHandle, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let controller = SessionController::new(
            settings.session.clone(),
            settings.presence,
            &settings.signal,
        );
        let (telemetry_tx, telemetry_rx) = watch::channel(controller.snapshot());

        let monitor = Self {
            controller,
            camera,
            store,
            stride: settings.sampler.stride,
            commands: tx.downgrade(),
            telemetry: telemetry_tx,
            ticker: None,
            clock_run: 0,
            capturing: false,
            archives: Vec::new(),
        };

        let task = tokio::spawn(monitor.run(rx));
        let handle = MonitorHandle {
            tx,
            telemetry: telemetry_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut rx: UnboundedReceiver<Command>) {
        loop {
            // The capture thread and ticker keep `rx` open, so the last
            // handle going away is only visible through the watch channel
            let command = tokio::select! {
                command = rx.recv() => command,
                _ = self.telemetry.closed() => {
                    log::info!("All monitor handles dropped");
                    None
                }
            };
            let Some(command) = command else {
                break;
            };

            match command {
                Command::Start => self.handle_start(),
                Command::Stop => self.handle_stop(),
                Command::Frame { session, sample } => self.handle_frame(session, &sample),
                Command::Tick { session, run } => self.handle_tick(session, run),
                Command::Shutdown => break,
            }
            self.publish();
        }

        self.handle_stop();
        self.publish();

        for archive in self.archives.drain(..) {
            if let Err(e) = archive.await {
                log::error!("Archive task failed: {}", e);
            }
        }
        log::debug!("Monitor task exiting");
    }

    fn handle_start(&mut self) {
        self.halt();

        if let Err(failure) = self.prepare_camera() {
            self.controller.fail(failure);
            return;
        }

        let session = self.controller.start();
        let Some(tx) = self.commands.upgrade() else {
            return;
        };

        match self.camera.start(FrameSink::new(session, self.stride, tx)) {
            Ok(()) => self.capturing = true,
            Err(e) => {
                log::error!("Failed to start capture: {}", e);
                self.release_camera();
                self.controller.fail(Failure::NoCamera);
            }
        }
    }

    /// Check authorization and hardware, then light the torch
    fn prepare_camera(&mut self) -> Result<(), Failure> {
        match self.camera.authorize() {
            Authorization::Granted => {}
            Authorization::Denied => return Err(Failure::PermissionDenied),
            Authorization::Blocked => return Err(Failure::PermissionBlocked),
        }

        if !self.camera.has_device() {
            return Err(Failure::NoCamera);
        }
        if !self.camera.has_torch() {
            return Err(Failure::NoTorch);
        }

        if let Err(e) = self.camera.set_torch(true) {
            log::warn!("Unable to enable torch: {}", e);
        }
        Ok(())
    }

    fn handle_stop(&mut self) {
        self.halt();
        self.controller.stop();
    }

    fn handle_frame(&mut self, session: Uuid, sample: &FrameSample) {
        if self.controller.session_id() != Some(session) {
            return;
        }

        match self.controller.on_frame(sample) {
            Some(Transition::Resumed) => self.start_clock(session),
            Some(Transition::Paused) => self.stop_clock(),
            Some(Transition::Completed(outcome)) => self.finish(outcome),
            None => {}
        }
    }

    fn handle_tick(&mut self, session: Uuid, run: u64) {
        if self.controller.session_id() != Some(session) || run != self.clock_run {
            return;
        }

        if let Some(Transition::Completed(outcome)) = self.controller.on_tick() {
            self.finish(outcome);
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        self.halt();

        if !outcome.persist {
            log::info!("Session {} not archived", outcome.session_id);
            return;
        }

        let day = jiff::Zoned::now().date();
        let store = Arc::clone(&self.store);
        self.archives.retain(|archive| !archive.is_finished());
        self.archives.push(tokio::task::spawn_blocking(move || {
            match store.append(outcome.bpm, day) {
                Ok(()) => log::info!("Archived {} BPM for {}", outcome.bpm, day),
                Err(e) => log::warn!("Failed to archive session {}: {}", outcome.session_id, e),
            }
        }));
    }

    fn start_clock(&mut self, session: Uuid) {
        self.stop_clock();

        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        let run = self.clock_run;

        self.ticker = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + TICK_PERIOD;
            let mut interval = tokio::time::interval_at(start, TICK_PERIOD);
            loop {
                interval.tick().await;
                if tx.send(Command::Tick { session, run }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Abort the clock task; ticks it already queued become stale
    fn stop_clock(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.clock_run += 1;
    }

    /// Stop the clock and release the capture pipeline
    fn halt(&mut self) {
        self.stop_clock();
        if self.capturing {
            self.camera.stop();
            self.capturing = false;
            self.release_camera();
        }
    }

    fn release_camera(&mut self) {
        if self.camera.has_torch() {
            if let Err(e) = self.camera.set_torch(false) {
                log::warn!("Unable to disable torch: {}", e);
            }
        }
    }

    fn publish(&self) {
        self.telemetry.send_replace(self.controller.snapshot());
    }
}

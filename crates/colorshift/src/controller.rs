use std::thread::JoinHandle;
use std::time::Instant;

use camera::{CameraConstraints, CameraSource, FacingMode};
use describe::{CapturePipeline, DescribeOutcome, TapOutcome};
use scheduler::{ColorParams, ControlState, EyeSurface, FrameScheduler, TickOutcome};
use shiftconfig::{CameraSettings, Facing};

use crate::input::Command;

/// What the on-screen controls would display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSurface {
    pub running: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub sharpness_indicator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn camera_constraints(settings: &CameraSettings) -> CameraConstraints {
    CameraConstraints {
        width: settings.width,
        height: settings.height,
        frame_rate: settings.frame_rate,
        facing: match settings.facing {
            Facing::Environment => FacingMode::Environment,
            Facing::User => FacingMode::User,
        },
        device_index: settings.device,
    }
}

/// Top-level controller wiring camera, controls, scheduler and the capture
/// pipeline together.
pub struct ColorShiftApp<C: CameraSource, E: EyeSurface> {
    camera: C,
    constraints: CameraConstraints,
    scheduler: FrameScheduler<E>,
    controls: ControlState,
    color: ColorParams,
    pipeline: CapturePipeline,
    worker: Option<JoinHandle<DescribeOutcome>>,
    status: StatusSurface,
}

impl<C: CameraSource, E: EyeSurface> ColorShiftApp<C, E> {
    pub fn new(
        camera: C,
        constraints: CameraConstraints,
        scheduler: FrameScheduler<E>,
        controls: ControlState,
        color: ColorParams,
        pipeline: CapturePipeline,
    ) -> Self {
        let status = StatusSurface {
            running: false,
            loading: false,
            error: None,
            sharpness_indicator: controls.sharpness_label(),
        };
        Self {
            camera,
            constraints,
            scheduler,
            controls,
            color,
            pipeline,
            worker: None,
            status,
        }
    }

    pub fn status(&self) -> &StatusSurface {
        &self.status
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    pub fn scheduler(&self) -> &FrameScheduler<E> {
        &self.scheduler
    }

    pub fn start_camera(&mut self) {
        if self.controls.is_running() {
            return;
        }
        match self.camera.acquire(&self.constraints) {
            Ok(()) => {
                self.controls.set_running(true);
                self.scheduler.start();
                self.update_status(|status| {
                    status.running = true;
                    status.error = None;
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "camera access failed");
                self.update_status(|status| {
                    status.running = false;
                    status.error = Some(format!("Camera access failed: {err}"));
                });
            }
        }
    }

    /// Releases the camera and blanks both eyes. An in-flight description
    /// keeps running.
    pub fn stop_camera(&mut self) {
        self.camera.release();
        self.scheduler.stop();
        self.controls.set_running(false);
        self.update_status(|status| status.running = false);
    }

    pub fn tap(&mut self) -> bool {
        let frame = if self.camera.is_active() {
            self.camera.current_frame()
        } else {
            None
        };
        match self.pipeline.capture_and_describe(frame) {
            TapOutcome::Started(handle) => {
                self.reap_worker();
                self.worker = Some(handle);
                self.refresh_loading();
                true
            }
            TapOutcome::Ignored(reason) => {
                tracing::debug!(?reason, "tap ignored");
                false
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Flow {
        match command {
            Command::Tap => {
                self.tap();
            }
            Command::ZoomIn => {
                let zoom = self.controls.zoom_in();
                tracing::info!(zoom, "zoom in");
            }
            Command::ZoomOut => {
                let zoom = self.controls.zoom_out();
                tracing::info!(zoom, "zoom out");
            }
            Command::SharpnessUp => {
                self.controls.increase_sharpness();
                self.refresh_sharpness();
            }
            Command::SharpnessDown => {
                self.controls.decrease_sharpness();
                self.refresh_sharpness();
            }
            Command::Start => self.start_camera(),
            Command::Stop => self.stop_camera(),
            Command::Resize { width, height } => {
                if let Err(err) = self.scheduler.resize(width, height) {
                    tracing::warn!(error = %err, "ignoring resize");
                }
            }
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// One host refresh tick.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let frame = if self.controls.is_running() {
            self.camera.current_frame()
        } else {
            None
        };
        let outcome = self
            .scheduler
            .tick(now, frame.as_deref(), &self.controls, &self.color);
        self.refresh_loading();
        outcome
    }

    /// Cancels pending description retries, waits for the worker and releases
    /// the camera.
    pub fn shutdown(&mut self) -> Option<DescribeOutcome> {
        self.pipeline.shutdown();
        let outcome = self.worker.take().and_then(|handle| match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                tracing::error!("description worker panicked");
                None
            }
        });
        if self.controls.is_running() {
            self.stop_camera();
        }
        self.refresh_loading();
        outcome
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if let Ok(outcome) = handle.join() {
                tracing::debug!(?outcome, "previous description finished");
            }
        }
    }

    fn refresh_loading(&mut self) {
        let loading = self.pipeline.is_processing();
        if loading != self.status.loading {
            self.update_status(|status| status.loading = loading);
        }
        if !loading && self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.reap_worker();
        }
    }

    fn refresh_sharpness(&mut self) {
        let label = self.controls.sharpness_label();
        tracing::info!(sharpness = self.controls.sharpness_level(), "{label}");
        self.update_status(|status| status.sharpness_indicator = label);
    }

    fn update_status(&mut self, change: impl FnOnce(&mut StatusSurface)) {
        let before = self.status.clone();
        change(&mut self.status);
        if self.status != before {
            tracing::info!(
                running = self.status.running,
                loading = self.status.loading,
                error = self.status.error.as_deref().unwrap_or(""),
                sharpness = %self.status.sharpness_indicator,
                "status changed"
            );
        }
    }
}

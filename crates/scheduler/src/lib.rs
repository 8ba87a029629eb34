//! Frame scheduling for the stereo viewer.
//!
//! [`FrameScheduler`] is driven by the host's refresh ticks. It waits for the
//! camera to report real dimensions, paces accepted frames to the target rate,
//! and feeds each accepted frame through two independent [`EyeSurface`]s.
//! Nothing here touches the GPU directly.

mod controls;
mod pacing;

use std::fmt;
use std::time::{Duration, Instant};

use camera::VideoFrame;

pub use controls::{ColorParams, ControlState, ShaderUniforms, SteppedLevel};
pub use pacing::{frame_due, FramePacer};

pub const DEFAULT_VIEWPORT: (u32, u32) = (1920, 1080);

const STATS_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("target fps must be positive and finite, got {0}")]
    InvalidTargetFps(f32),
    #[error("viewport {width}x{height} has no area")]
    EmptyViewport { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

/// One eye's render target as seen by the scheduler.
pub trait EyeSurface {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resizes the target to `width`x`height` pixels.
    fn configure(&mut self, width: u32, height: u32);

    /// Replaces the target's source texture with `frame`.
    fn update(&mut self, frame: &VideoFrame) -> Result<(), Self::Error>;

    fn render(&mut self, uniforms: &ShaderUniforms) -> Result<(), Self::Error>;

    /// Blanks the target to opaque black.
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Running,
    Stopped,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The scheduler has not been started, or was stopped.
    Inactive,
    /// Started, but the camera has no usable frame yet.
    Waiting,
    /// Too soon after the previous accepted frame.
    Skipped,
    Rendered,
    /// The frame was accepted but an eye failed; both eyes were cleared.
    Failed,
}

#[derive(Debug, Default)]
struct RenderStats {
    window_start: Option<Instant>,
    rendered: u32,
    skipped: u32,
    failed: u32,
}

impl RenderStats {
    fn record(&mut self, now: Instant, outcome: TickOutcome) {
        let window_start = *self.window_start.get_or_insert(now);
        match outcome {
            TickOutcome::Rendered => self.rendered += 1,
            TickOutcome::Skipped => self.skipped += 1,
            TickOutcome::Failed => self.failed += 1,
            TickOutcome::Inactive | TickOutcome::Waiting => {}
        }
        let elapsed = now.saturating_duration_since(window_start);
        if elapsed >= STATS_WINDOW {
            let fps = f64::from(self.rendered) / elapsed.as_secs_f64();
            tracing::debug!(
                fps = (fps * 10.0).round() / 10.0,
                skipped = self.skipped,
                failed = self.failed,
                "render stats"
            );
            *self = Self {
                window_start: Some(now),
                ..Self::default()
            };
        }
    }
}

pub struct FrameScheduler<E: EyeSurface> {
    left: E,
    right: E,
    state: SchedulerState,
    start_requested: bool,
    pacer: FramePacer,
    viewport: (u32, u32),
    stats: RenderStats,
}

impl<E: EyeSurface> FrameScheduler<E> {
    pub fn new(left: E, right: E, target_fps: f32) -> Result<Self, SchedulerError> {
        if !(target_fps.is_finite() && target_fps > 0.0) {
            return Err(SchedulerError::InvalidTargetFps(target_fps));
        }
        Ok(Self {
            left,
            right,
            state: SchedulerState::Idle,
            start_requested: false,
            pacer: FramePacer::new(target_fps),
            viewport: DEFAULT_VIEWPORT,
            stats: RenderStats::default(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn left(&self) -> &E {
        &self.left
    }

    pub fn right(&self) -> &E {
        &self.right
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Size of each eye: half the viewport width, full height.
    pub fn eye_size(&self) -> (u32, u32) {
        let (width, height) = self.viewport;
        ((width / 2).max(1), height)
    }

    /// Requests rendering. Arming happens on the first tick that sees a frame
    /// with real dimensions.
    pub fn start(&mut self) {
        if matches!(self.state, SchedulerState::Armed | SchedulerState::Running) {
            return;
        }
        self.state = SchedulerState::Idle;
        self.start_requested = true;
        self.pacer.reset();
        tracing::debug!("frame scheduler start requested");
    }

    /// Stops rendering from any state and blanks both eyes.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.start_requested = false;
        self.pacer.reset();
        self.left.clear();
        self.right.clear();
        tracing::info!("frame scheduler stopped");
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SchedulerError> {
        if width == 0 || height == 0 {
            return Err(SchedulerError::EmptyViewport { width, height });
        }
        self.viewport = (width, height);
        if matches!(self.state, SchedulerState::Armed | SchedulerState::Running) {
            self.configure_eyes();
        }
        Ok(())
    }

    fn configure_eyes(&mut self) {
        let (width, height) = self.eye_size();
        self.left.configure(width, height);
        self.right.configure(width, height);
        tracing::debug!(width, height, "configured eye targets");
    }

    /// Advances the scheduler by one host refresh tick.
    pub fn tick(
        &mut self,
        now: Instant,
        frame: Option<&VideoFrame>,
        controls: &ControlState,
        color: &ColorParams,
    ) -> TickOutcome {
        let outcome = self.advance(now, frame, controls, color);
        self.stats.record(now, outcome);
        outcome
    }

    fn advance(
        &mut self,
        now: Instant,
        frame: Option<&VideoFrame>,
        controls: &ControlState,
        color: &ColorParams,
    ) -> TickOutcome {
        match self.state {
            SchedulerState::Stopped => return TickOutcome::Inactive,
            SchedulerState::Idle if !self.start_requested => return TickOutcome::Inactive,
            _ => {}
        }

        let Some(frame) = frame.filter(|frame| !frame.is_empty()) else {
            return TickOutcome::Waiting;
        };

        if self.state == SchedulerState::Idle {
            self.configure_eyes();
            self.state = SchedulerState::Armed;
            self.start_requested = false;
            tracing::info!(
                width = frame.width,
                height = frame.height,
                "camera ready; frame scheduler armed"
            );
        }

        if !self.pacer.try_accept(now) {
            return TickOutcome::Skipped;
        }

        let uniforms = controls.uniforms(color, frame.width, frame.height);
        let result = Self::draw(&mut self.left, frame, &uniforms)
            .map_err(|err| (Eye::Left, err))
            .and_then(|()| {
                Self::draw(&mut self.right, frame, &uniforms).map_err(|err| (Eye::Right, err))
            });

        match result {
            Ok(()) => {
                if self.state == SchedulerState::Armed {
                    self.state = SchedulerState::Running;
                    tracing::info!("frame scheduler running");
                }
                TickOutcome::Rendered
            }
            Err((eye, err)) => {
                tracing::warn!(%eye, error = %err, "frame render failed; clearing both eyes");
                self.left.clear();
                self.right.clear();
                TickOutcome::Failed
            }
        }
    }

    fn draw(eye: &mut E, frame: &VideoFrame, uniforms: &ShaderUniforms) -> Result<(), E::Error> {
        eye.update(frame)?;
        eye.render(uniforms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftconfig::ControlSettings;

    #[derive(Debug, thiserror::Error)]
    #[error("mock draw failure")]
    struct MockError;

    #[derive(Default)]
    struct MockEye {
        configured: Vec<(u32, u32)>,
        updates: u32,
        renders: u32,
        clears: u32,
        fail_render: bool,
        last_uniforms: Option<ShaderUniforms>,
    }

    impl EyeSurface for MockEye {
        type Error = MockError;

        fn configure(&mut self, width: u32, height: u32) {
            self.configured.push((width, height));
        }

        fn update(&mut self, _frame: &VideoFrame) -> Result<(), MockError> {
            self.updates += 1;
            Ok(())
        }

        fn render(&mut self, uniforms: &ShaderUniforms) -> Result<(), MockError> {
            if self.fail_render {
                return Err(MockError);
            }
            self.renders += 1;
            self.last_uniforms = Some(*uniforms);
            Ok(())
        }

        fn clear(&mut self) {
            self.clears += 1;
        }
    }

    fn scheduler() -> FrameScheduler<MockEye> {
        FrameScheduler::new(MockEye::default(), MockEye::default(), 30.0).unwrap()
    }

    fn controls() -> ControlState {
        ControlState::new(&ControlSettings::default())
    }

    #[test]
    fn rejects_non_positive_fps() {
        assert!(matches!(
            FrameScheduler::new(MockEye::default(), MockEye::default(), 0.0),
            Err(SchedulerError::InvalidTargetFps(_))
        ));
    }

    #[test]
    fn idle_until_started() {
        let mut scheduler = scheduler();
        let frame = VideoFrame::solid(4, 4, [0, 0, 0, 255]);
        let outcome = scheduler.tick(Instant::now(), Some(&frame), &controls(), &ColorParams::default());
        assert_eq!(outcome, TickOutcome::Inactive);
        assert_eq!(scheduler.left().renders, 0);
    }

    #[test]
    fn waits_for_camera_dimensions() {
        let mut scheduler = scheduler();
        scheduler.start();
        let now = Instant::now();
        let empty = VideoFrame::solid(0, 0, [0; 4]);
        let color = ColorParams::default();
        assert_eq!(scheduler.tick(now, None, &controls(), &color), TickOutcome::Waiting);
        assert_eq!(scheduler.tick(now, Some(&empty), &controls(), &color), TickOutcome::Waiting);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.left().configured.is_empty());
    }

    #[test]
    fn arms_then_runs_on_first_render() {
        let mut scheduler = scheduler();
        scheduler.start();
        let frame = VideoFrame::solid(8, 6, [10, 20, 30, 255]);
        let outcome = scheduler.tick(Instant::now(), Some(&frame), &controls(), &ColorParams::default());
        assert_eq!(outcome, TickOutcome::Rendered);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.left().configured, vec![(960, 1080)]);
        assert_eq!(scheduler.right().configured, vec![(960, 1080)]);
        assert_eq!(scheduler.left().updates, 1);
        assert_eq!(scheduler.right().renders, 1);
        let uniforms = scheduler.left().last_uniforms.unwrap();
        assert_eq!(uniforms.resolution, [8.0, 6.0]);
    }

    #[test]
    fn resize_keeps_eyes_at_half_width() {
        let mut scheduler = scheduler();
        scheduler.resize(1000, 500).unwrap();
        assert!(scheduler.left().configured.is_empty(), "not armed yet");
        scheduler.start();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        scheduler.tick(Instant::now(), Some(&frame), &controls(), &ColorParams::default());
        scheduler.resize(801, 600).unwrap();
        assert_eq!(scheduler.left().configured, vec![(500, 500), (400, 600)]);
        assert_eq!(scheduler.right().configured, vec![(500, 500), (400, 600)]);
        assert!(matches!(
            scheduler.resize(0, 600),
            Err(SchedulerError::EmptyViewport { .. })
        ));
    }

    #[test]
    fn render_failure_clears_both_eyes_and_continues() {
        let mut scheduler = FrameScheduler::new(
            MockEye::default(),
            MockEye {
                fail_render: true,
                ..MockEye::default()
            },
            30.0,
        )
        .unwrap();
        scheduler.start();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        let start = Instant::now();
        let color = ColorParams::default();
        assert_eq!(
            scheduler.tick(start, Some(&frame), &controls(), &color),
            TickOutcome::Failed
        );
        assert_eq!(scheduler.left().clears, 1);
        assert_eq!(scheduler.right().clears, 1);
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        let later = start + Duration::from_millis(40);
        assert_eq!(
            scheduler.tick(later, Some(&frame), &controls(), &color),
            TickOutcome::Failed,
            "scheduling continues after a failed frame"
        );
        assert_eq!(scheduler.left().renders, 2);
    }

    #[test]
    fn stop_clears_and_deactivates() {
        let mut scheduler = scheduler();
        scheduler.start();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        let now = Instant::now();
        scheduler.tick(now, Some(&frame), &controls(), &ColorParams::default());
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.left().clears, 1);
        assert_eq!(scheduler.right().clears, 1);
        let later = now + Duration::from_secs(1);
        assert_eq!(
            scheduler.tick(later, Some(&frame), &controls(), &ColorParams::default()),
            TickOutcome::Inactive
        );

        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(
            scheduler.tick(later, Some(&frame), &controls(), &ColorParams::default()),
            TickOutcome::Rendered
        );
    }

    #[test]
    fn paces_fast_ticks_to_target_fps() {
        let mut scheduler = scheduler();
        scheduler.start();
        let frame = VideoFrame::solid(2, 2, [0, 0, 0, 255]);
        let controls = controls();
        let color = ColorParams::default();
        let start = Instant::now();
        let step = Duration::from_nanos(1_000_000_000 / 120);
        let mut rendered = 0;
        let mut skipped = 0;
        for i in 0..120u32 {
            match scheduler.tick(start + step * i, Some(&frame), &controls, &color) {
                TickOutcome::Rendered => rendered += 1,
                TickOutcome::Skipped => skipped += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(rendered <= 31, "rendered {rendered} frames in one second");
        assert!(rendered >= 20, "rendered only {rendered} frames");
        assert_eq!(rendered + skipped, 120);
    }
}

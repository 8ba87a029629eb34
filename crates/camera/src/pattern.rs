use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{CameraConstraints, CameraError, CameraSource, VideoFrame};

/// Eight saturated bars; covers every hue sextant the colour transform rotates.
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [16, 16, 16],
];

/// Synthetic camera that scrolls colour bars across the frame.
///
/// Used by tests and by `--test-pattern` on machines without a capture device.
pub struct TestPatternCamera {
    constraints: Option<CameraConstraints>,
    started_at: Instant,
    warmup_polls: u32,
    polls: AtomicU32,
    sequence: AtomicU64,
    cached: Mutex<Option<Arc<VideoFrame>>>,
    failure: Option<String>,
}

impl TestPatternCamera {
    pub fn new() -> Self {
        Self {
            constraints: None,
            started_at: Instant::now(),
            warmup_polls: 0,
            polls: AtomicU32::new(0),
            sequence: AtomicU64::new(0),
            cached: Mutex::new(None),
            failure: None,
        }
    }

    /// Reports no frame for the first `polls` calls to `current_frame`, the way a
    /// real device reports 0x0 until its metadata has loaded.
    pub fn with_warmup(mut self, polls: u32) -> Self {
        self.warmup_polls = polls;
        self
    }

    /// Makes every `acquire` fail as if the device were missing.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new()
        }
    }

    fn frame_interval(constraints: &CameraConstraints) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(constraints.frame_rate.max(1)))
    }

    fn render(&self, constraints: &CameraConstraints, now: Instant) -> VideoFrame {
        let width = constraints.width.max(1);
        let height = constraints.height.max(1);
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f32();
        let offset = (elapsed * 40.0) as u32;
        let bar_width = (width / BARS.len() as u32).max(1);

        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
        for _y in 0..height {
            for x in 0..width {
                let bar = (((x + offset) / bar_width) as usize) % BARS.len();
                let [r, g, b] = BARS[bar];
                data.extend_from_slice(&[r, g, b, 255]);
            }
        }

        VideoFrame {
            data,
            width,
            height,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            captured_at: now,
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for TestPatternCamera {
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<(), CameraError> {
        if let Some(reason) = &self.failure {
            return Err(CameraError::Unavailable(reason.clone()));
        }
        tracing::info!(
            width = constraints.width,
            height = constraints.height,
            fps = constraints.frame_rate,
            "test pattern camera started"
        );
        self.constraints = Some(constraints.clone());
        self.started_at = Instant::now();
        self.polls.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        let constraints = self.constraints.as_ref()?;
        if self.polls.fetch_add(1, Ordering::Relaxed) < self.warmup_polls {
            return None;
        }

        let now = Instant::now();
        let mut cached = self.cached.lock().ok()?;
        let stale = cached.as_ref().map_or(true, |frame| {
            now.saturating_duration_since(frame.captured_at) >= Self::frame_interval(constraints)
        });
        if stale {
            *cached = Some(Arc::new(self.render(constraints, now)));
        }
        cached.clone()
    }

    fn is_active(&self) -> bool {
        self.constraints.is_some()
    }

    fn release(&mut self) {
        if self.constraints.take().is_some() {
            tracing::info!("test pattern camera stopped");
        }
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }
}

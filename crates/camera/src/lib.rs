//! Camera acquisition for the colour-shift viewer.
//!
//! The render path and the capture pipeline only ever see a [`CameraSource`]:
//!
//! ```text
//!   CameraSource::acquire ──▶ capture thread ──▶ latest VideoFrame slot
//!                                                   │
//!            FrameScheduler::tick ◀── current_frame ┤
//!            CapturePipeline (tap) ◀── current_frame ┘
//! ```
//!
//! Both consumers read the most recent decoded frame; neither mutates it, so a
//! frame is handed out as an `Arc<VideoFrame>`.

mod frame;
#[cfg(feature = "native")]
mod native;
mod pattern;

use std::fmt;
use std::sync::Arc;

pub use frame::VideoFrame;
#[cfg(feature = "native")]
pub use native::NativeCamera;
pub use pattern::TestPatternCamera;

/// Direction the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera, pointing at the scene in front of the wearer.
    #[default]
    Environment,
    /// Front camera, pointing at the wearer.
    User,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Environment => f.write_str("environment"),
            FacingMode::User => f.write_str("user"),
        }
    }
}

/// Stream constraints requested from the device.
///
/// The ideal values double as upper bounds: frames larger than
/// `width`x`height` are downscaled before they reach either consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub facing: FacingMode,
    /// Device index used when the platform cannot select by facing mode.
    pub device_index: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            facing: FacingMode::Environment,
            device_index: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera device unavailable: {0}")]
    Unavailable(String),
    #[error("camera stream failed: {0}")]
    Stream(String),
}

/// Live video stream owned by the top-level controller.
pub trait CameraSource: Send {
    /// Opens the device and starts streaming frames.
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<(), CameraError>;

    /// Most recently decoded frame, or `None` before the first frame arrives.
    fn current_frame(&self) -> Option<Arc<VideoFrame>>;

    /// Natural frame dimensions; `(0, 0)` until metadata is available.
    fn dimensions(&self) -> (u32, u32) {
        self.current_frame()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }

    fn is_active(&self) -> bool;

    /// Stops all tracks. Calling it on an inactive source is a no-op.
    fn release(&mut self);
}

impl CameraSource for Box<dyn CameraSource> {
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<(), CameraError> {
        (**self).acquire(constraints)
    }

    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        (**self).current_frame()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

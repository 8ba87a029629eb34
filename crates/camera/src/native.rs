//! Device capture through nokhwa.
//!
//! Frames are pulled on a dedicated thread and published into a single
//! latest-frame slot; the render loop and the capture pipeline read that slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;

use crate::{CameraConstraints, CameraError, CameraSource, FacingMode, VideoFrame};

type FrameSlot = Arc<Mutex<Option<Arc<VideoFrame>>>>;

/// Camera backed by the platform capture API.
pub struct NativeCamera {
    latest: FrameSlot,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl NativeCamera {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    fn open(constraints: &CameraConstraints) -> Result<Camera, CameraError> {
        let format = CameraFormat::new(
            Resolution::new(constraints.width, constraints.height),
            FrameFormat::MJPEG,
            constraints.frame_rate,
        );
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format));
        let index = CameraIndex::Index(constraints.device_index);

        let mut camera = Camera::new(index, requested).map_err(map_open_error)?;
        camera.open_stream().map_err(map_open_error)?;
        tracing::info!(
            device = %camera.info().human_name(),
            width = camera.resolution().width(),
            height = camera.resolution().height(),
            fps = camera.frame_rate(),
            "camera stream opened"
        );
        Ok(camera)
    }

    fn capture_loop(
        mut camera: Camera,
        constraints: CameraConstraints,
        latest: FrameSlot,
        running: Arc<AtomicBool>,
    ) {
        let mut sequence: u64 = 0;
        while running.load(Ordering::Acquire) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to capture frame");
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };
            let resolution = buffer.resolution();
            let image = match buffer.decode_image::<RgbAFormat>() {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to decode frame");
                    continue;
                }
            };

            let frame = VideoFrame {
                data: image.into_raw(),
                width: resolution.width(),
                height: resolution.height(),
                sequence,
                captured_at: Instant::now(),
            }
            .fit_within(constraints.width, constraints.height);
            sequence = sequence.wrapping_add(1);
            *latest.lock() = Some(Arc::new(frame));
        }

        if let Err(err) = camera.stop_stream() {
            tracing::warn!(error = %err, "failed to stop camera stream");
        }
        tracing::info!("camera capture thread stopped");
    }
}

impl Default for NativeCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for NativeCamera {
    fn acquire(&mut self, constraints: &CameraConstraints) -> Result<(), CameraError> {
        if self.is_active() {
            return Ok(());
        }
        if constraints.facing != FacingMode::Environment {
            tracing::debug!(
                facing = %constraints.facing,
                "facing mode is advisory on this platform; selecting by device index"
            );
        }

        let (opened_tx, opened_rx) = bounded::<Result<(), CameraError>>(1);
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);
        let constraints = constraints.clone();
        running.store(true, Ordering::Release);

        // Some backends tie the device to the thread that opened it.
        let spawned = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || match Self::open(&constraints) {
                Ok(camera) => {
                    let _ = opened_tx.send(Ok(()));
                    Self::capture_loop(camera, constraints, latest, running);
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(err));
                }
            });

        let handle = settle_capture_thread(&self.running, spawned, &opened_rx)?;
        self.thread_handle = Some(handle);
        Ok(())
    }

    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        if !self.is_active() {
            return None;
        }
        self.latest.lock().clone()
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            join_capture_thread(handle);
        }
        *self.latest.lock() = None;
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        self.release();
    }
}

fn map_open_error(err: NokhwaError) -> CameraError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("permission") {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::Unavailable(message)
    }
}

/// Waits for the capture thread to report whether the device opened. Every
/// failure leaves `running` cleared.
fn settle_capture_thread(
    running: &AtomicBool,
    spawned: io::Result<JoinHandle<()>>,
    opened: &Receiver<Result<(), CameraError>>,
) -> Result<JoinHandle<()>, CameraError> {
    let handle = match spawned {
        Ok(handle) => handle,
        Err(err) => {
            running.store(false, Ordering::Release);
            return Err(CameraError::Stream(format!(
                "failed to spawn capture thread: {err}"
            )));
        }
    };

    let result = opened.recv().unwrap_or_else(|_| {
        Err(CameraError::Stream(
            "capture thread exited before reporting".to_string(),
        ))
    });
    match result {
        Ok(()) => Ok(handle),
        Err(err) => {
            running.store(false, Ordering::Release);
            join_capture_thread(handle);
            Err(err)
        }
    }
}

fn join_capture_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("camera capture thread panicked");
    }
}

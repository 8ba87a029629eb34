use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use camera::VideoFrame;
use shiftconfig::{DescribeSettings, ToneSettings};

use crate::audio::{AudioOutput, PlaybackError, ToneSpec};
use crate::payload::{EncodeError, ImagePayload};
use crate::retry::{self, CancelToken, Canceller, RetryFailure, RetryPolicy};
use crate::transport::{DescriptionTransport, TransportError};

/// Why a description could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("description request failed after {attempts} attempt(s): {source}")]
    Request {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("failed to play description: {0}")]
    Playback(#[from] PlaybackError),
}

#[derive(Debug)]
pub enum DescribeOutcome {
    /// The description audio played to completion.
    Spoken { attempts: u32 },
    /// Something failed; the fallback tone was played instead.
    Fallback { cause: DescribeError },
    /// The pipeline shut down while a retry was pending.
    Cancelled { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A description is already in flight.
    Busy,
    /// The camera has no frame with real dimensions yet.
    CameraNotReady,
    ShutDown,
    /// The worker thread could not be spawned.
    WorkerUnavailable,
}

#[derive(Debug)]
pub enum TapOutcome {
    Ignored(IgnoreReason),
    Started(JoinHandle<DescribeOutcome>),
}

impl TapOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TapOutcome::Started(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub jpeg_quality: u8,
    pub tone: ToneSpec,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::new(&DescribeSettings::default(), &ToneSettings::default())
    }
}

impl PipelineSettings {
    pub fn new(describe: &DescribeSettings, tone: &ToneSettings) -> Self {
        Self {
            retry: RetryPolicy::from(describe),
            jpeg_quality: describe.jpeg_quality,
            tone: ToneSpec::from(tone),
        }
    }
}

/// Clears the in-flight flag when dropped, whichever way the worker exits.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tap-to-describe: snapshot, encode, post with retry, play.
///
/// At most one description is in flight at a time; taps that arrive while one
/// is running are dropped, not queued.
pub struct CapturePipeline {
    transport: Arc<dyn DescriptionTransport>,
    audio: Arc<dyn AudioOutput>,
    settings: PipelineSettings,
    in_flight: Arc<AtomicBool>,
    canceller: Canceller,
    cancel: CancelToken,
}

impl CapturePipeline {
    pub fn new(
        transport: Arc<dyn DescriptionTransport>,
        audio: Arc<dyn AudioOutput>,
        settings: PipelineSettings,
    ) -> Self {
        let (canceller, cancel) = retry::cancellation();
        Self {
            transport,
            audio,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            canceller,
            cancel,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// True while a description is being fetched or played.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Starts describing `frame` on a worker thread unless the pipeline is
    /// busy, shut down, or the frame is not usable.
    pub fn capture_and_describe(&self, frame: Option<Arc<VideoFrame>>) -> TapOutcome {
        if self.cancel.is_cancelled() {
            return TapOutcome::Ignored(IgnoreReason::ShutDown);
        }
        if self.is_processing() {
            tracing::info!("already processing a frame; tap ignored");
            return TapOutcome::Ignored(IgnoreReason::Busy);
        }
        let Some(frame) = frame.filter(|frame| !frame.is_empty()) else {
            tracing::warn!("camera not ready for frame capture");
            return TapOutcome::Ignored(IgnoreReason::CameraNotReady);
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("already processing a frame; tap ignored");
            return TapOutcome::Ignored(IgnoreReason::Busy);
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        tracing::info!(
            width = frame.width,
            height = frame.height,
            sequence = frame.sequence,
            "capturing frame for description"
        );
        let transport = Arc::clone(&self.transport);
        let audio = Arc::clone(&self.audio);
        let settings = self.settings;
        let cancel = self.cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("describe-worker".to_string())
            .spawn(move || {
                let _guard = guard;
                describe_frame(&frame, transport.as_ref(), audio.as_ref(), &settings, &cancel)
            });

        match spawned {
            Ok(handle) => TapOutcome::Started(handle),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn description worker");
                TapOutcome::Ignored(IgnoreReason::WorkerUnavailable)
            }
        }
    }

    /// Cancels pending retry delays and refuses further taps. An attempt that is
    /// already on the wire runs until it completes or times out.
    pub fn shutdown(&self) {
        self.canceller.cancel();
    }
}

fn describe_frame(
    frame: &VideoFrame,
    transport: &dyn DescriptionTransport,
    audio: &dyn AudioOutput,
    settings: &PipelineSettings,
    cancel: &CancelToken,
) -> DescribeOutcome {
    let payload = match ImagePayload::from_frame(frame, settings.jpeg_quality) {
        Ok(payload) => payload,
        Err(err) => return fall_back(audio, &settings.tone, err.into()),
    };

    match retry::send_with_retry(transport, &payload, &settings.retry, cancel) {
        Ok(delivery) => match audio.play(&delivery.audio) {
            Ok(()) => {
                tracing::info!(attempts = delivery.attempts, "description played");
                DescribeOutcome::Spoken {
                    attempts: delivery.attempts,
                }
            }
            Err(err) => fall_back(audio, &settings.tone, err.into()),
        },
        Err(RetryFailure::Cancelled { attempts }) => DescribeOutcome::Cancelled { attempts },
        Err(RetryFailure::Exhausted { attempts, error }) => fall_back(
            audio,
            &settings.tone,
            DescribeError::Request {
                attempts,
                source: error,
            },
        ),
    }
}

fn fall_back(audio: &dyn AudioOutput, tone: &ToneSpec, cause: DescribeError) -> DescribeOutcome {
    tracing::warn!(error = %cause, "description failed; playing fallback tone");
    if let Err(err) = audio.play_tone(tone) {
        tracing::error!(error = %err, "failed to play fallback tone");
    }
    DescribeOutcome::Fallback { cause }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use crossbeam_channel::{bounded, Receiver, Sender};

    use super::*;

    #[derive(Default)]
    struct RecordingAudio {
        played: Mutex<Vec<Vec<u8>>>,
        tones: AtomicU32,
        fail_play: bool,
    }

    impl AudioOutput for RecordingAudio {
        fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
            if self.fail_play {
                return Err(PlaybackError::Decode("not mpeg".into()));
            }
            self.played.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        fn play_tone(&self, _tone: &ToneSpec) -> Result<(), PlaybackError> {
            self.tones.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingTransport {
        calls: AtomicU32,
        error: fn() -> TransportError,
        called: Option<Sender<()>>,
    }

    impl FailingTransport {
        fn timing_out() -> Self {
            Self {
                calls: AtomicU32::new(0),
                error: || TransportError::Timeout(Duration::from_secs(30)),
                called: None,
            }
        }
    }

    impl DescriptionTransport for FailingTransport {
        fn post(&self, _payload: &ImagePayload) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(called) = &self.called {
                let _ = called.send(());
            }
            Err((self.error)())
        }
    }

    /// Blocks every request until the test releases it.
    struct GatedTransport {
        calls: AtomicU32,
        release: Receiver<()>,
    }

    impl DescriptionTransport for GatedTransport {
        fn post(&self, _payload: &ImagePayload) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.recv();
            Ok(b"ID3 audio".to_vec())
        }
    }

    fn settings(max_retries: u32) -> PipelineSettings {
        PipelineSettings {
            retry: RetryPolicy {
                max_retries,
                delay: Duration::from_millis(1),
            },
            ..PipelineSettings::default()
        }
    }

    fn frame() -> Option<Arc<VideoFrame>> {
        Some(Arc::new(VideoFrame::solid(8, 8, [200, 100, 50, 255])))
    }

    fn join(outcome: TapOutcome) -> DescribeOutcome {
        match outcome {
            TapOutcome::Started(handle) => handle.join().expect("worker panicked"),
            TapOutcome::Ignored(reason) => panic!("tap ignored: {reason:?}"),
        }
    }

    #[test]
    fn persistent_timeouts_fall_back_once() {
        let transport = Arc::new(FailingTransport::timing_out());
        let audio = Arc::new(RecordingAudio::default());
        let pipeline = CapturePipeline::new(transport.clone(), audio.clone(), settings(3));

        let outcome = join(pipeline.capture_and_describe(frame()));

        assert!(matches!(
            outcome,
            DescribeOutcome::Fallback {
                cause: DescribeError::Request { attempts: 4, .. }
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert_eq!(audio.tones.load(Ordering::SeqCst), 1);
        assert!(audio.played.lock().unwrap().is_empty());
        assert!(!pipeline.is_processing());
    }

    #[test]
    fn successful_description_is_played() {
        let (release_tx, release_rx) = bounded(1);
        release_tx.send(()).unwrap();
        let transport = Arc::new(GatedTransport {
            calls: AtomicU32::new(0),
            release: release_rx,
        });
        let audio = Arc::new(RecordingAudio::default());
        let pipeline = CapturePipeline::new(transport, audio.clone(), settings(3));

        let outcome = join(pipeline.capture_and_describe(frame()));

        assert!(matches!(outcome, DescribeOutcome::Spoken { attempts: 1 }));
        assert_eq!(audio.played.lock().unwrap().as_slice(), &[b"ID3 audio".to_vec()]);
        assert_eq!(audio.tones.load(Ordering::SeqCst), 0);
        assert!(!pipeline.is_processing());
    }

    #[test]
    fn playback_failure_triggers_fallback() {
        let (release_tx, release_rx) = bounded(1);
        release_tx.send(()).unwrap();
        let transport = Arc::new(GatedTransport {
            calls: AtomicU32::new(0),
            release: release_rx,
        });
        let audio = Arc::new(RecordingAudio {
            fail_play: true,
            ..RecordingAudio::default()
        });
        let pipeline = CapturePipeline::new(transport, audio.clone(), settings(3));

        let outcome = join(pipeline.capture_and_describe(frame()));

        assert!(matches!(
            outcome,
            DescribeOutcome::Fallback {
                cause: DescribeError::Playback(_)
            }
        ));
        assert_eq!(audio.tones.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_processing());
    }

    #[test]
    fn second_tap_while_busy_is_ignored() {
        let (release_tx, release_rx) = bounded(2);
        let transport = Arc::new(GatedTransport {
            calls: AtomicU32::new(0),
            release: release_rx,
        });
        let audio = Arc::new(RecordingAudio::default());
        let pipeline = CapturePipeline::new(transport.clone(), audio, settings(0));

        let first = pipeline.capture_and_describe(frame());
        assert!(first.is_started());
        assert!(pipeline.is_processing());

        let second = pipeline.capture_and_describe(frame());
        assert!(matches!(second, TapOutcome::Ignored(IgnoreReason::Busy)));
        assert!(pipeline.is_processing());

        release_tx.send(()).unwrap();
        assert!(matches!(join(first), DescribeOutcome::Spoken { .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_processing());

        release_tx.send(()).unwrap();
        assert!(matches!(
            join(pipeline.capture_and_describe(frame())),
            DescribeOutcome::Spoken { .. }
        ));
    }

    #[test]
    fn tap_without_camera_frame_is_a_no_op() {
        let transport = Arc::new(FailingTransport::timing_out());
        let audio = Arc::new(RecordingAudio::default());
        let pipeline = CapturePipeline::new(transport.clone(), audio.clone(), settings(3));

        let missing = pipeline.capture_and_describe(None);
        let empty = pipeline.capture_and_describe(Some(Arc::new(VideoFrame::solid(0, 0, [0; 4]))));

        assert!(matches!(missing, TapOutcome::Ignored(IgnoreReason::CameraNotReady)));
        assert!(matches!(empty, TapOutcome::Ignored(IgnoreReason::CameraNotReady)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(audio.tones.load(Ordering::SeqCst), 0);
        assert!(!pipeline.is_processing());
    }

    #[test]
    fn non_retryable_status_falls_back_immediately() {
        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
            error: || TransportError::Status(404),
            called: None,
        });
        let audio = Arc::new(RecordingAudio::default());
        let pipeline = CapturePipeline::new(transport.clone(), audio.clone(), settings(3));

        let outcome = join(pipeline.capture_and_describe(frame()));

        assert!(matches!(
            outcome,
            DescribeOutcome::Fallback {
                cause: DescribeError::Request { attempts: 1, .. }
            }
        ));
        assert_eq!(audio.tones.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_cancels_pending_retry() {
        let (called_tx, called_rx) = bounded(8);
        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
            error: || TransportError::Connect("refused".into()),
            called: Some(called_tx),
        });
        let audio = Arc::new(RecordingAudio::default());
        let slow = PipelineSettings {
            retry: RetryPolicy {
                max_retries: 3,
                delay: Duration::from_secs(30),
            },
            ..PipelineSettings::default()
        };
        let pipeline = CapturePipeline::new(transport.clone(), audio.clone(), slow);
        let started = Instant::now();

        let tap = pipeline.capture_and_describe(frame());
        called_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pipeline.shutdown();

        assert!(matches!(join(tap), DescribeOutcome::Cancelled { attempts: 1 }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(audio.tones.load(Ordering::SeqCst), 0);
        assert!(!pipeline.is_processing());
        assert!(matches!(
            pipeline.capture_and_describe(frame()),
            TapOutcome::Ignored(IgnoreReason::ShutDown)
        ));
    }
}

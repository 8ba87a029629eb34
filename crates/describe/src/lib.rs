//! Tap-to-describe: turns the current camera frame into spoken audio.
//!
//! ```text
//!   tap ─▶ CapturePipeline ─▶ ImagePayload (JPEG data URL)
//!                                 │
//!                                 ▼
//!             send_with_retry ─▶ DescriptionTransport::post
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!       AudioOutput::play (mpeg)      AudioOutput::play_tone (fallback)
//! ```
//!
//! Work runs on a dedicated worker thread so the render loop never blocks on
//! the network or the audio device.

pub mod audio;
pub mod payload;
pub mod pipeline;
pub mod retry;
pub mod transport;

#[cfg(feature = "playback")]
pub use audio::RodioOutput;
pub use audio::{AudioOutput, MutedOutput, PlaybackError, ToneSpec, TONE_SAMPLE_RATE};
pub use payload::{EncodeError, ImagePayload};
pub use pipeline::{
    CapturePipeline, DescribeError, DescribeOutcome, IgnoreReason, PipelineSettings, TapOutcome,
};
pub use retry::{cancellation, send_with_retry, CancelToken, Canceller, Delivery, RetryFailure, RetryPolicy};
pub use transport::{DescriptionTransport, HttpTransport, TransportError};

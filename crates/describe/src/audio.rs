use std::f32::consts::TAU;
use std::time::Duration;

use shiftconfig::ToneSettings;

pub const TONE_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio response was empty")]
    Empty,
    #[error("no audio output available: {0}")]
    Device(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
}

/// Plays description audio and the fallback cue. Both calls block until
/// playback has finished.
pub trait AudioOutput: Send + Sync {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError>;

    fn play_tone(&self, tone: &ToneSpec) -> Result<(), PlaybackError>;
}

/// A decaying sine cue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency: f32,
    pub gain: f32,
    pub floor_gain: f32,
    pub duration: Duration,
    pub sample_rate: u32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self::from(&ToneSettings::default())
    }
}

impl From<&ToneSettings> for ToneSpec {
    fn from(settings: &ToneSettings) -> Self {
        Self {
            frequency: settings.frequency,
            gain: settings.gain,
            floor_gain: settings.floor_gain,
            duration: settings.duration,
            sample_rate: TONE_SAMPLE_RATE,
        }
    }
}

impl ToneSpec {
    /// Gain `t` seconds in: an exponential ramp from `gain` to `floor_gain`.
    pub fn gain_at(&self, t: f32) -> f32 {
        let length = self.duration.as_secs_f32();
        if length <= 0.0 {
            return self.floor_gain;
        }
        let progress = (t / length).clamp(0.0, 1.0);
        self.gain * (self.floor_gain / self.gain).powf(progress)
    }

    pub fn sample_count(&self) -> usize {
        (self.duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }

    pub fn samples(&self) -> ToneSamples {
        ToneSamples {
            spec: *self,
            index: 0,
            total: self.sample_count(),
        }
    }
}

/// Mono `f32` samples of a [`ToneSpec`].
#[derive(Debug, Clone)]
pub struct ToneSamples {
    spec: ToneSpec,
    index: usize,
    total: usize,
}

impl Iterator for ToneSamples {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.index >= self.total {
            return None;
        }
        let t = self.index as f32 / self.spec.sample_rate as f32;
        self.index += 1;
        Some((TAU * self.spec.frequency * t).sin() * self.spec.gain_at(t))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ToneSamples {}

#[cfg(feature = "playback")]
mod device {
    use std::io::Cursor;
    use std::time::Duration;

    use rodio::{Decoder, OutputStream, Sink, Source};

    use super::{AudioOutput, PlaybackError, ToneSamples, ToneSpec};

    impl Source for ToneSamples {
        fn current_frame_len(&self) -> Option<usize> {
            Some(self.total - self.index)
        }

        fn channels(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            self.spec.sample_rate
        }

        fn total_duration(&self) -> Option<Duration> {
            Some(self.spec.duration)
        }
    }

    /// Default output device via rodio.
    ///
    /// The stream is opened per call on the calling thread and dropped as soon
    /// as the sink drains.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct RodioOutput;

    impl RodioOutput {
        fn play_source<S>(&self, source: S) -> Result<(), PlaybackError>
        where
            S: Source<Item = f32> + Send + 'static,
        {
            let (_stream, handle) =
                OutputStream::try_default().map_err(|err| PlaybackError::Device(err.to_string()))?;
            let sink = Sink::try_new(&handle).map_err(|err| PlaybackError::Device(err.to_string()))?;
            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        }
    }

    impl AudioOutput for RodioOutput {
        fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
            if audio.is_empty() {
                return Err(PlaybackError::Empty);
            }
            let decoder = Decoder::new(Cursor::new(audio.to_vec()))
                .map_err(|err| PlaybackError::Decode(err.to_string()))?;
            tracing::debug!(
                bytes = audio.len(),
                sample_rate = decoder.sample_rate(),
                "playing description audio"
            );
            self.play_source(decoder.convert_samples::<f32>())
        }

        fn play_tone(&self, tone: &ToneSpec) -> Result<(), PlaybackError> {
            tracing::debug!(frequency = tone.frequency, "playing fallback tone");
            self.play_source(tone.samples())
        }
    }
}

#[cfg(feature = "playback")]
pub use device::RodioOutput;

/// Output that only logs; used when no audio device is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutedOutput;

impl AudioOutput for MutedOutput {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        if audio.is_empty() {
            return Err(PlaybackError::Empty);
        }
        tracing::info!(bytes = audio.len(), "description received (audio muted)");
        Ok(())
    }

    fn play_tone(&self, tone: &ToneSpec) -> Result<(), PlaybackError> {
        tracing::info!(frequency = tone.frequency, "fallback tone (audio muted)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tone_matches_cue() {
        let tone = ToneSpec::default();
        assert_eq!(tone.frequency, 800.0);
        assert_eq!(tone.sample_count(), 22_050);
        assert_eq!(tone.samples().len(), 22_050);
    }

    #[test]
    fn gain_ramps_exponentially_to_floor() {
        let tone = ToneSpec::default();
        assert!((tone.gain_at(0.0) - 0.3).abs() < 1e-6);
        assert!((tone.gain_at(0.5) - 0.01).abs() < 1e-6);
        let midpoint = tone.gain_at(0.25);
        assert!((midpoint - (0.3f32 * 0.01).sqrt()).abs() < 1e-5);
        assert!((tone.gain_at(10.0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn samples_stay_within_gain_envelope() {
        let tone = ToneSpec::default();
        for (i, sample) in tone.samples().enumerate() {
            let t = i as f32 / TONE_SAMPLE_RATE as f32;
            assert!(sample.abs() <= tone.gain_at(t) + 1e-6);
        }
    }

    #[test]
    fn muted_output_rejects_empty_audio() {
        assert!(matches!(MutedOutput.play(&[]), Err(PlaybackError::Empty)));
        assert!(MutedOutput.play(&[1]).is_ok());
    }
}

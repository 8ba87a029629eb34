use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_ENDPOINT: &str = "https://flask-hello-world4-seven.vercel.app/speak_description";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Effective configuration for one viewer session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShiftConfig {
    pub render: RenderSettings,
    pub controls: ControlSettings,
    pub camera: CameraSettings,
    pub describe: DescribeSettings,
    pub fallback_tone: ToneSettings,
}

/// Colour-transform parameters shared by both eyes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    pub target_fps: f32,
    pub hue_shift: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub saturation_boost: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            hue_shift: 0.4,
            contrast: 1.2,
            brightness: 0.02,
            saturation_boost: 1.1,
        }
    }
}

/// A clamped, stepped adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RangeSetting {
    pub initial: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

/// Each range field left out of the file keeps its own control's default,
/// so `[controls.zoom]` with only `max` still parses.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "PartialControls")]
pub struct ControlSettings {
    pub zoom: RangeSetting,
    pub sharpness: RangeSetting,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PartialControls {
    zoom: PartialRange,
    sharpness: PartialRange,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialRange {
    initial: Option<f32>,
    min: Option<f32>,
    max: Option<f32>,
    step: Option<f32>,
}

impl PartialRange {
    fn or(self, fallback: RangeSetting) -> RangeSetting {
        RangeSetting {
            initial: self.initial.unwrap_or(fallback.initial),
            min: self.min.unwrap_or(fallback.min),
            max: self.max.unwrap_or(fallback.max),
            step: self.step.unwrap_or(fallback.step),
        }
    }
}

impl From<PartialControls> for ControlSettings {
    fn from(partial: PartialControls) -> Self {
        let defaults = Self::default();
        Self {
            zoom: partial.zoom.or(defaults.zoom),
            sharpness: partial.sharpness.or(defaults.sharpness),
        }
    }
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            zoom: RangeSetting {
                initial: 1.2,
                min: 0.5,
                max: 3.0,
                step: 0.2,
            },
            sharpness: RangeSetting {
                initial: 2.5,
                min: 0.5,
                max: 2.5,
                step: 0.2,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Environment,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub facing: Facing,
    pub device: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            facing: Facing::Environment,
            device: 0,
        }
    }
}

/// Remote description service and its retry budget.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescribeSettings {
    pub endpoint: String,
    pub max_retries: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_delay: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for DescribeSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            jpeg_quality: 80,
        }
    }
}

/// Audible cue played when no description could be obtained.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToneSettings {
    pub frequency: f32,
    pub gain: f32,
    pub floor_gain: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            frequency: 800.0,
            gain: 0.3,
            floor_gain: 0.01,
            duration: Duration::from_millis(500),
        }
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ShiftConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ShiftConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        if !(render.target_fps.is_finite() && render.target_fps > 0.0) {
            return Err(ConfigError::Invalid(
                "render.target_fps must be greater than zero".into(),
            ));
        }
        for (name, value) in [
            ("render.hue_shift", render.hue_shift),
            ("render.contrast", render.contrast),
            ("render.brightness", render.brightness),
            ("render.saturation_boost", render.saturation_boost),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite")));
            }
        }
        if render.saturation_boost < 0.0 {
            return Err(ConfigError::Invalid(
                "render.saturation_boost must be >= 0".into(),
            ));
        }

        validate_range("controls.zoom", &self.controls.zoom)?;
        if self.controls.zoom.min <= 0.0 {
            return Err(ConfigError::Invalid(
                "controls.zoom.min must be greater than zero".into(),
            ));
        }
        validate_range("controls.sharpness", &self.controls.sharpness)?;

        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(ConfigError::Invalid(
                "camera dimensions must be greater than zero".into(),
            ));
        }
        if camera.frame_rate == 0 {
            return Err(ConfigError::Invalid(
                "camera.frame_rate must be greater than zero".into(),
            ));
        }

        let describe = &self.describe;
        if describe.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "describe.endpoint must not be empty".into(),
            ));
        }
        if describe.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "describe.timeout must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&describe.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "describe.jpeg_quality must be within 1..=100".into(),
            ));
        }

        let tone = &self.fallback_tone;
        if !(tone.frequency.is_finite() && tone.frequency > 0.0) {
            return Err(ConfigError::Invalid(
                "fallback_tone.frequency must be greater than zero".into(),
            ));
        }
        if !(tone.gain > 0.0 && tone.gain <= 1.0) || !(tone.floor_gain > 0.0 && tone.floor_gain <= tone.gain) {
            return Err(ConfigError::Invalid(
                "fallback_tone gains must satisfy 0 < floor_gain <= gain <= 1".into(),
            ));
        }
        if tone.duration.is_zero() {
            return Err(ConfigError::Invalid(
                "fallback_tone.duration must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn validate_range(name: &str, range: &RangeSetting) -> Result<(), ConfigError> {
    if ![range.initial, range.min, range.max, range.step]
        .iter()
        .all(|value| value.is_finite())
    {
        return Err(ConfigError::Invalid(format!("{name} values must be finite")));
    }
    if range.min >= range.max {
        return Err(ConfigError::Invalid(format!(
            "{name}.min ({}) must be less than {name}.max ({})",
            range.min, range.max
        )));
    }
    if range.step <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{name}.step must be greater than zero"
        )));
    }
    if range.initial < range.min || range.initial > range.max {
        return Err(ConfigError::Invalid(format!(
            "{name}.initial ({}) must lie within [{}, {}]",
            range.initial, range.min, range.max
        )));
    }
    Ok(())
}

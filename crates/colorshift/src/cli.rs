use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "colorshift",
    author,
    version,
    about = "Stereoscopic colour-shift viewer with tap-to-describe audio",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to load instead of `<config dir>/config.toml`.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Description service URL.
    #[arg(long, value_name = "URL", env = "COLORSHIFT_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Target processing rate for the colour transform.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Hue rotation applied to both eyes, as a fraction of a full turn.
    #[arg(long, value_name = "TURNS")]
    pub hue_shift: Option<f32>,

    /// Retries after the first failed description request.
    #[arg(long, value_name = "COUNT", global = true)]
    pub max_retries: Option<u32>,

    /// Capture device index.
    #[arg(long, value_name = "INDEX")]
    pub camera: Option<u32>,

    /// Use the synthetic colour-bar source instead of a capture device.
    #[arg(long)]
    pub test_pattern: bool,

    /// Output viewport; each eye gets half the width.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_viewport)]
    pub viewport: Option<(u32, u32)>,

    /// Host refresh rate driving the scheduler ticks.
    #[arg(long, value_name = "HZ", default_value_t = 60.0)]
    pub refresh_hz: f32,

    /// Exit after running for this long (e.g. `10s`, `2m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Log descriptions instead of playing them.
    #[arg(long, global = true)]
    pub mute: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Describe a still image through the description service, then exit.
    Describe(DescribeArgs),
    /// Inspect the configuration.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct DescribeArgs {
    /// Image file to describe (PNG or JPEG).
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration file path.
    Where,
    /// Print the effective configuration, after command-line overrides.
    Print,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_viewport(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("viewport must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    let (width, height) = normalized
        .split_once('x')
        .ok_or_else(|| format!("invalid viewport '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid viewport width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid viewport height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err(format!("viewport '{trimmed}' has no area"));
    }
    Ok((width, height))
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Ok(Duration::from_secs_f64(seconds));
        }
        return Err(format!("duration '{trimmed}' must be non-negative"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

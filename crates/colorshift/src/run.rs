use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camera::{CameraSource, TestPatternCamera, VideoFrame};
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use describe::{
    AudioOutput, CapturePipeline, DescribeOutcome, HttpTransport, MutedOutput, PipelineSettings,
    TapOutcome,
};
use renderer::GpuOptions;
use scheduler::{ColorParams, ControlState, FrameScheduler};
use shiftconfig::ShiftConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::controller::{camera_constraints, ColorShiftApp, Flow};
use crate::input::{self, Command};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: &RunArgs, config: &ShiftConfig) -> Result<()> {
    if !(args.refresh_hz.is_finite() && args.refresh_hz > 0.0) {
        return Err(anyhow!("refresh rate must be positive, got {}", args.refresh_hz));
    }

    let (left, right) = renderer::create_eye_pair(&GpuOptions::default()).map_err(|err| {
        tracing::error!(error = %err, "render path unavailable");
        anyhow!(err).context("failed to initialise the eye render targets")
    })?;
    let mut scheduler = FrameScheduler::new(left, right, config.render.target_fps)
        .context("failed to create frame scheduler")?;
    if let Some((width, height)) = args.viewport {
        scheduler
            .resize(width, height)
            .context("invalid viewport")?;
    }

    let pipeline = build_pipeline(config, args.mute)?;
    let mut app = ColorShiftApp::new(
        build_camera(args),
        camera_constraints(&config.camera),
        scheduler,
        ControlState::new(&config.controls),
        ColorParams::from(&config.render),
        pipeline,
    );

    let (command_tx, command_rx) = unbounded();
    input::spawn_stdin_reader(command_tx).context("failed to start command reader")?;
    tracing::info!(
        fps = config.render.target_fps,
        refresh_hz = args.refresh_hz,
        endpoint = %config.describe.endpoint,
        "colorshift running; commands: tap, zoom+, zoom-, sharp+, sharp-, start, stop, resize WxH, quit"
    );

    app.start_camera();
    host_loop(&mut app, &command_rx, args.refresh_hz, args.duration);

    if let Some(outcome) = app.shutdown() {
        tracing::info!(?outcome, "description worker finished");
    }
    tracing::info!(
        scheduler = ?app.scheduler().state(),
        zoom = app.controls().zoom_level(),
        error = app.status().error.as_deref().unwrap_or(""),
        "colorshift stopped"
    );
    Ok(())
}

/// Ticks the controller at `refresh_hz` against absolute deadlines so a slow
/// tick does not shift the whole schedule.
fn host_loop<C, E>(
    app: &mut ColorShiftApp<C, E>,
    commands: &Receiver<Command>,
    refresh_hz: f32,
    limit: Option<Duration>,
) where
    C: CameraSource,
    E: scheduler::EyeSurface,
{
    let interval = Duration::from_secs_f64(1.0 / f64::from(refresh_hz));
    let started = Instant::now();
    let mut deadline = started;

    loop {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if app.apply(command) == Flow::Quit {
                        return;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let now = Instant::now();
        app.tick(now);

        if limit.is_some_and(|limit| now.saturating_duration_since(started) >= limit) {
            tracing::info!("run duration elapsed");
            return;
        }

        deadline += interval;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }
}

fn build_camera(args: &RunArgs) -> Box<dyn CameraSource> {
    if args.test_pattern {
        tracing::info!("using synthetic test pattern camera");
        return Box::new(TestPatternCamera::new());
    }
    native_camera()
}

#[cfg(feature = "native-camera")]
fn native_camera() -> Box<dyn CameraSource> {
    Box::new(camera::NativeCamera::new())
}

#[cfg(not(feature = "native-camera"))]
fn native_camera() -> Box<dyn CameraSource> {
    tracing::warn!("built without native camera support; using synthetic test pattern");
    Box::new(TestPatternCamera::new())
}

fn build_pipeline(config: &ShiftConfig, mute: bool) -> Result<CapturePipeline> {
    let transport = HttpTransport::new(&config.describe.endpoint, config.describe.timeout)
        .context("failed to create description transport")?;
    Ok(CapturePipeline::new(
        Arc::new(transport),
        build_audio(mute),
        PipelineSettings::new(&config.describe, &config.fallback_tone),
    ))
}

#[cfg(feature = "playback")]
fn build_audio(mute: bool) -> Arc<dyn AudioOutput> {
    if mute {
        Arc::new(MutedOutput)
    } else {
        Arc::new(describe::RodioOutput)
    }
}

#[cfg(not(feature = "playback"))]
fn build_audio(mute: bool) -> Arc<dyn AudioOutput> {
    if !mute {
        tracing::info!("built without audio playback; descriptions are logged only");
    }
    Arc::new(MutedOutput)
}

/// One-shot description of a still image file.
pub fn describe_image(path: &Path, config: &ShiftConfig, mute: bool) -> Result<DescribeOutcome> {
    let image = image::open(path)
        .with_context(|| format!("failed to read image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let frame = VideoFrame::from_rgba(image.into_raw(), width, height, 0)
        .ok_or_else(|| anyhow!("decoded image has an inconsistent pixel buffer"))?
        .fit_within(config.camera.width, config.camera.height);
    tracing::info!(
        path = %path.display(),
        width = frame.width,
        height = frame.height,
        "describing image"
    );

    let pipeline = build_pipeline(config, mute)?;
    match pipeline.capture_and_describe(Some(Arc::new(frame))) {
        TapOutcome::Started(worker) => worker
            .join()
            .map_err(|_| anyhow!("description worker panicked")),
        TapOutcome::Ignored(reason) => Err(anyhow!("image was not described: {reason:?}")),
    }
}

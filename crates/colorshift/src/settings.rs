use anyhow::{Context, Result};
use shiftconfig::ShiftConfig;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// Loads the config file (defaults when absent), applies command-line
/// overrides and validates the result.
pub fn resolve(paths: &AppPaths, args: &RunArgs) -> Result<ShiftConfig> {
    let mut config = ShiftConfig::load(paths.config_file()).with_context(|| {
        format!(
            "failed to load configuration from {}",
            paths.config_file().display()
        )
    })?;
    apply_overrides(&mut config, args);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn apply_overrides(config: &mut ShiftConfig, args: &RunArgs) {
    if let Some(endpoint) = &args.endpoint {
        config.describe.endpoint = endpoint.clone();
    }
    if let Some(fps) = args.fps {
        config.render.target_fps = fps;
    }
    if let Some(hue_shift) = args.hue_shift {
        config.render.hue_shift = hue_shift;
    }
    if let Some(max_retries) = args.max_retries {
        config.describe.max_retries = max_retries;
    }
    if let Some(device) = args.camera {
        config.camera.device = device;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let mut config = ShiftConfig::default();
        let args = RunArgs {
            endpoint: Some("http://127.0.0.1:9/describe".into()),
            fps: Some(24.0),
            max_retries: Some(1),
            camera: Some(2),
            ..RunArgs::default()
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.describe.endpoint, "http://127.0.0.1:9/describe");
        assert_eq!(config.render.target_fps, 24.0);
        assert_eq!(config.describe.max_retries, 1);
        assert_eq!(config.camera.device, 2);
        assert_eq!(config.render.hue_shift, ShiftConfig::default().render.hue_shift);
    }

    #[test]
    fn resolve_reads_file_then_validates_overrides() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("config.toml");
        fs::write(&file, "[render]\ntarget_fps = 15\n").unwrap();
        let paths = AppPaths::discover(Some(&file)).unwrap();

        let config = resolve(&paths, &RunArgs::default()).unwrap();
        assert_eq!(config.render.target_fps, 15.0);

        let bad = RunArgs {
            fps: Some(0.0),
            ..RunArgs::default()
        };
        assert!(resolve(&paths, &bad).is_err());
    }
}

use shiftconfig::{ControlSettings, RangeSetting, RenderSettings};

/// A value confined to `[min, max]` that moves in fixed steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteppedLevel {
    value: f32,
    min: f32,
    max: f32,
    step: f32,
}

impl SteppedLevel {
    pub fn new(initial: f32, min: f32, max: f32, step: f32) -> Self {
        Self {
            value: initial.clamp(min, max),
            min,
            max,
            step,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn increase(&mut self) -> f32 {
        self.value = (self.value + self.step).clamp(self.min, self.max);
        self.value
    }

    pub fn decrease(&mut self) -> f32 {
        self.value = (self.value - self.step).clamp(self.min, self.max);
        self.value
    }
}

impl From<&RangeSetting> for SteppedLevel {
    fn from(range: &RangeSetting) -> Self {
        Self::new(range.initial, range.min, range.max, range.step)
    }
}

/// User-adjustable viewing state.
///
/// Every mutation clamps, so the levels never leave their configured ranges.
#[derive(Debug, Clone)]
pub struct ControlState {
    zoom: SteppedLevel,
    sharpness: SteppedLevel,
    running: bool,
}

impl ControlState {
    pub fn new(settings: &ControlSettings) -> Self {
        Self {
            zoom: SteppedLevel::from(&settings.zoom),
            sharpness: SteppedLevel::from(&settings.sharpness),
            running: false,
        }
    }

    pub fn zoom_level(&self) -> f32 {
        self.zoom.value()
    }

    pub fn sharpness_level(&self) -> f32 {
        self.sharpness.value()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.zoom.increase()
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.zoom.decrease()
    }

    pub fn increase_sharpness(&mut self) -> u8 {
        self.sharpness.increase();
        self.sharpness_indicator()
    }

    pub fn decrease_sharpness(&mut self) -> u8 {
        self.sharpness.decrease();
        self.sharpness_indicator()
    }

    /// Sharpness mapped onto a 1..=10 scale.
    pub fn sharpness_indicator(&self) -> u8 {
        let span = self.sharpness.max() - self.sharpness.min();
        if span <= 0.0 {
            return 10;
        }
        let ratio = (self.sharpness.value() - self.sharpness.min()) / span;
        (ratio * 9.0 + 1.0).round().clamp(1.0, 10.0) as u8
    }

    pub fn sharpness_label(&self) -> String {
        format!("Sharp: {}/10", self.sharpness_indicator())
    }

    /// Uniform values for one render call against a `width`x`height` source.
    pub fn uniforms(&self, color: &ColorParams, width: u32, height: u32) -> ShaderUniforms {
        ShaderUniforms {
            hue_shift: color.hue_shift.rem_euclid(1.0),
            contrast: color.contrast,
            brightness: color.brightness,
            saturation_boost: color.saturation_boost,
            sharpness: self.sharpness.value(),
            resolution: [width as f32, height as f32],
            zoom: self.zoom.value(),
        }
    }
}

/// Fixed colour-transform parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    pub hue_shift: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub saturation_boost: f32,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self::from(&RenderSettings::default())
    }
}

impl From<&RenderSettings> for ColorParams {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            hue_shift: settings.hue_shift,
            contrast: settings.contrast,
            brightness: settings.brightness,
            saturation_boost: settings.saturation_boost,
        }
    }
}

/// Per-call shader inputs, derived fresh for every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderUniforms {
    /// Hue rotation in turns, always within `[0, 1)`.
    pub hue_shift: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub saturation_boost: f32,
    pub sharpness: f32,
    /// Source video dimensions in pixels.
    pub resolution: [f32; 2],
    pub zoom: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> ControlState {
        ControlState::new(&ControlSettings::default())
    }

    #[test]
    fn zoom_in_four_times_from_default() {
        let mut state = controls();
        for _ in 0..4 {
            state.zoom_in();
        }
        assert!((state.zoom_level() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn zoom_is_idempotent_at_bounds() {
        let mut state = controls();
        for _ in 0..50 {
            state.zoom_in();
        }
        assert_eq!(state.zoom_level(), 3.0);
        state.zoom_in();
        assert_eq!(state.zoom_level(), 3.0);
        for _ in 0..50 {
            state.zoom_out();
        }
        assert_eq!(state.zoom_level(), 0.5);
    }

    #[test]
    fn sharpness_and_indicator_stay_in_range() {
        let mut state = controls();
        let mut seen = Vec::new();
        for step in 0..30 {
            let indicator = if step % 7 < 5 {
                state.decrease_sharpness()
            } else {
                state.increase_sharpness()
            };
            let level = state.sharpness_level();
            assert!((0.5..=2.5).contains(&level), "level {level} out of range");
            assert!((1..=10).contains(&indicator));
            seen.push(indicator);
        }
        assert!(seen.contains(&1));
    }

    #[test]
    fn indicator_matches_endpoints() {
        let mut state = controls();
        assert_eq!(state.sharpness_indicator(), 10);
        assert_eq!(state.sharpness_label(), "Sharp: 10/10");
        for _ in 0..20 {
            state.decrease_sharpness();
        }
        assert_eq!(state.sharpness_indicator(), 1);
        assert_eq!(state.sharpness_label(), "Sharp: 1/10");
    }

    #[test]
    fn degenerate_range_reports_full_scale() {
        let settings = ControlSettings {
            sharpness: RangeSetting {
                initial: 1.0,
                min: 1.0,
                max: 1.0,
                step: 0.2,
            },
            ..ControlSettings::default()
        };
        let state = ControlState::new(&settings);
        assert_eq!(state.sharpness_indicator(), 10);
    }

    #[test]
    fn uniforms_wrap_hue_and_carry_levels() {
        let mut state = controls();
        state.zoom_in();
        let color = ColorParams {
            hue_shift: 1.25,
            ..ColorParams::default()
        };
        let uniforms = state.uniforms(&color, 640, 480);
        assert!((uniforms.hue_shift - 0.25).abs() < 1e-6);
        assert_eq!(uniforms.resolution, [640.0, 480.0]);
        assert!((uniforms.zoom - 1.4).abs() < 1e-5);
        assert_eq!(uniforms.sharpness, 2.5);
        assert_eq!(uniforms.contrast, 1.2);
    }
}

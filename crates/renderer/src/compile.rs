use std::borrow::Cow;

use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{Module, ShaderStage};

use crate::ShaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn naga(self) -> ShaderStage {
        match self {
            Stage::Vertex => ShaderStage::Vertex,
            Stage::Fragment => ShaderStage::Fragment,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Parses and validates one GLSL stage, returning the IR used for reflection.
///
/// Both parse and validation diagnostics end up in [`ShaderError::Compile`].
pub(crate) fn compile_stage(source: &str, stage: Stage) -> Result<Module, ShaderError> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage.naga()), source)
        .map_err(|errors| ShaderError::Compile {
            stage,
            log: errors
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            stage,
            log: err.as_inner().to_string(),
        })?;

    Ok(module)
}

pub(crate) fn create_module(
    device: &wgpu::Device,
    source: &str,
    stage: Stage,
    label: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage: stage.naga(),
            defines: &[],
        },
    })
}

/// Full-viewport quad with zoom applied around the texture centre.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_texCoord;
layout(location = 0) out vec2 v_texCoord;

layout(std140, set = 0, binding = 0) uniform ColorShiftParams {
    vec2 u_resolution;
    float u_hueShift;
    float u_contrast;
    float u_brightness;
    float u_saturationBoost;
    float u_sharpness;
    float u_zoom;
} params;

void main() {
    v_texCoord = (a_texCoord - vec2(0.5)) / params.u_zoom + vec2(0.5);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Hue rotation, saturation boost, contrast/brightness and edge sharpening.
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_texCoord;
layout(location = 0) out vec4 o_color;

layout(std140, set = 0, binding = 0) uniform ColorShiftParams {
    vec2 u_resolution;
    float u_hueShift;
    float u_contrast;
    float u_brightness;
    float u_saturationBoost;
    float u_sharpness;
    float u_zoom;
} params;

layout(set = 1, binding = 0) uniform texture2D u_texture;
layout(set = 1, binding = 1) uniform sampler u_sampler;

vec4 sampleVideo(vec2 coord) {
    return texture(sampler2D(u_texture, u_sampler), coord);
}

vec3 rgb2hsv(vec3 c) {
    vec4 K = vec4(0.0, -1.0 / 3.0, 2.0 / 3.0, -1.0);
    vec4 p = mix(vec4(c.bg, K.wz), vec4(c.gb, K.xy), step(c.b, c.g));
    vec4 q = mix(vec4(p.xyw, c.r), vec4(c.r, p.yzx), step(p.x, c.r));
    float d = q.x - min(q.w, q.y);
    float e = 1.0e-10;
    return vec3(abs(q.z + (q.w - q.y) / (6.0 * d + e)), d / (q.x + e), q.x);
}

vec3 hsv2rgb(vec3 c) {
    vec4 K = vec4(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    vec3 p = abs(fract(c.xxx + K.xyz) * 6.0 - K.www);
    return c.z * mix(K.xxx, clamp(p - K.xxx, 0.0, 1.0), c.y);
}

float edgeMagnitude(vec2 coord) {
    vec2 texel = 1.0 / params.u_resolution;
    float tl = length(sampleVideo(coord + vec2(-texel.x, -texel.y)).rgb);
    float tm = length(sampleVideo(coord + vec2(0.0, -texel.y)).rgb);
    float tr = length(sampleVideo(coord + vec2(texel.x, -texel.y)).rgb);
    float ml = length(sampleVideo(coord + vec2(-texel.x, 0.0)).rgb);
    float mm = length(sampleVideo(coord).rgb);
    float mr = length(sampleVideo(coord + vec2(texel.x, 0.0)).rgb);
    float bl = length(sampleVideo(coord + vec2(-texel.x, texel.y)).rgb);
    float bm = length(sampleVideo(coord + vec2(0.0, texel.y)).rgb);
    float br = length(sampleVideo(coord + vec2(texel.x, texel.y)).rgb);
    return abs(8.0 * mm - tl - tm - tr - ml - mr - bl - bm - br);
}

void main() {
    vec4 color = sampleVideo(v_texCoord);
    vec3 hsv = rgb2hsv(color.rgb);
    hsv.x = fract(hsv.x + params.u_hueShift);
    hsv.y = min(1.0, hsv.y * params.u_saturationBoost);
    vec3 rgb = hsv2rgb(hsv);
    rgb = (rgb - 0.5) * params.u_contrast + 0.5 + params.u_brightness;
    rgb = clamp(rgb, 0.0, 1.0);
    float edge = edgeMagnitude(v_texCoord);
    rgb += edge * params.u_sharpness * 0.1;
    o_color = vec4(clamp(rgb, 0.0, 1.0), color.a);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_shaders_compile() {
        compile_stage(VERTEX_SHADER_GLSL, Stage::Vertex).expect("vertex shader");
        compile_stage(FRAGMENT_SHADER_GLSL, Stage::Fragment).expect("fragment shader");
    }

    #[test]
    fn syntax_errors_carry_a_log() {
        let err = compile_stage("#version 450\nvoid main() { this is not glsl }\n", Stage::Fragment)
            .unwrap_err();
        match err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

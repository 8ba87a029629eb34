//! CPU reference of the fragment stage.
//!
//! Mirrors the GLSL in [`crate::FRAGMENT_SHADER_GLSL`] operation for operation,
//! sampling at texel centres with edge clamping. Zoom is a vertex-stage concern
//! and is not modelled here.

use camera::VideoFrame;
use scheduler::ShaderUniforms;

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

pub fn rgb_to_hsv([r, g, b]: [f32; 3]) -> [f32; 3] {
    let k = [0.0, -1.0 / 3.0, 2.0 / 3.0, -1.0];
    let t = step(b, g);
    let p = [mix(b, g, t), mix(g, b, t), mix(k[3], k[0], t), mix(k[2], k[1], t)];
    let t = step(p[0], r);
    let q = [mix(p[0], r, t), p[1], mix(p[3], p[2], t), mix(r, p[0], t)];
    let d = q[0] - q[3].min(q[1]);
    let e = 1.0e-10;
    [
        (q[2] + (q[3] - q[1]) / (6.0 * d + e)).abs(),
        d / (q[0] + e),
        q[0],
    ]
}

pub fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [f32; 3] {
    let k = [1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0];
    let channel = |offset: f32| {
        let p = (fract(h + offset) * 6.0 - k[3]).abs();
        v * mix(k[0], (p - k[0]).clamp(0.0, 1.0), s)
    };
    [channel(k[0]), channel(k[1]), channel(k[2])]
}

/// Hue rotation, saturation boost, contrast and brightness for one colour.
pub fn shift_color(rgb: [f32; 3], uniforms: &ShaderUniforms) -> [f32; 3] {
    let [h, s, v] = rgb_to_hsv(rgb);
    let hsv = [
        fract(h + uniforms.hue_shift),
        (s * uniforms.saturation_boost).min(1.0),
        v,
    ];
    hsv_to_rgb(hsv).map(|c| {
        ((c - 0.5) * uniforms.contrast + 0.5 + uniforms.brightness).clamp(0.0, 1.0)
    })
}

fn normalised(pixel: [u8; 4]) -> [f32; 4] {
    pixel.map(|c| f32::from(c) / 255.0)
}

fn rgb_length(pixel: [f32; 4]) -> f32 {
    (pixel[0] * pixel[0] + pixel[1] * pixel[1] + pixel[2] * pixel[2]).sqrt()
}

/// Laplacian-style magnitude over the 3x3 neighbourhood of `(x, y)`.
pub fn edge_magnitude(frame: &VideoFrame, x: i64, y: i64) -> f32 {
    let center = rgb_length(normalised(frame.pixel(x, y)));
    let mut sum = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            sum += center - rgb_length(normalised(frame.pixel(x + dx, y + dy)));
        }
    }
    f32::abs(sum)
}

/// Final RGBA for the texel at `(x, y)`, each channel in `[0, 1]`.
pub fn shade_pixel(frame: &VideoFrame, x: i64, y: i64, uniforms: &ShaderUniforms) -> [f32; 4] {
    let color = normalised(frame.pixel(x, y));
    let shifted = shift_color([color[0], color[1], color[2]], uniforms);
    let edge = edge_magnitude(frame, x, y);
    let boost = edge * uniforms.sharpness * 0.1;
    let [r, g, b] = shifted.map(|c| (c + boost).clamp(0.0, 1.0));
    [r, g, b, color[3]]
}

/// Transforms a whole frame at its native resolution.
pub fn apply(frame: &VideoFrame, uniforms: &ShaderUniforms) -> VideoFrame {
    let mut data = Vec::with_capacity(frame.data.len());
    for y in 0..i64::from(frame.height) {
        for x in 0..i64::from(frame.width) {
            let rgba = shade_pixel(frame, x, y, uniforms);
            data.extend(rgba.map(|c| (c * 255.0).round() as u8));
        }
    }
    VideoFrame {
        data,
        width: frame.width,
        height: frame.height,
        sequence: frame.sequence,
        captured_at: frame.captured_at,
    }
}

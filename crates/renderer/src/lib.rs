//! GPU colour transform for the stereo viewer.
//!
//! Each eye is an [`EyeRenderTarget`] with its own device and its own
//! [`ShaderProgram`]. The flow per accepted frame is:
//!
//! ```text
//!   VideoFrame ──▶ EyeRenderTarget::update ──▶ video texture
//!                                                  │
//!   ShaderUniforms ──▶ EyeRenderTarget::render ──▶ uniform block ──▶ quad draw
//! ```
//!
//! Shaders are Vulkan GLSL compiled through naga. Uniform offsets and vertex
//! attribute locations are reflected from the compiled IR rather than assumed,
//! so a program that does not declare everything the renderer writes fails to
//! build instead of rendering garbage. [`color`] holds a CPU reference of the
//! same transform.

pub mod color;
mod compile;
mod eye;
mod program;

pub use compile::{Stage, FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
pub use eye::{EyeRenderTarget, GpuOptions};
pub use program::{
    AttributeLocations, ProgramLayout, ShaderProgram, Uniform, UniformLayout, VertexAttribute,
    TARGET_FORMAT,
};

use scheduler::Eye;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: Stage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

/// Fatal to the render path; never retried.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("no usable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// A single frame's failure; the scheduler recovers from these.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("eye target has not been configured")]
    NotConfigured,
    #[error("no video frame has been uploaded")]
    NoSource,
    #[error("video frame has no pixels")]
    EmptyFrame,
    #[error("video frame holds {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("GPU rejected frame: {0}")]
    Gpu(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
}

/// Builds both eyes, each on a device of its own.
pub fn create_eye_pair(
    options: &GpuOptions,
) -> Result<(EyeRenderTarget, EyeRenderTarget), InitializationError> {
    let left = EyeRenderTarget::new(Eye::Left, options)?;
    let right = EyeRenderTarget::new(Eye::Right, options)?;
    Ok((left, right))
}

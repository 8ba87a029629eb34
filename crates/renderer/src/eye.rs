use camera::VideoFrame;
use scheduler::{Eye, EyeSurface, ShaderUniforms};
use wgpu::util::DeviceExt;

use crate::program::{ShaderProgram, QUAD_VERTICES, TARGET_FORMAT};
use crate::{InitializationError, RenderError};

/// Adapter selection for an eye's device.
#[derive(Debug, Clone)]
pub struct GpuOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
        }
    }
}

struct SourceTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct OutputTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// One eye's complete GPU pipeline.
///
/// Every eye owns its own instance, device, queue, program and textures; the
/// two eyes of a viewer never share GPU objects.
pub struct EyeRenderTarget {
    eye: Eye,
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
    program: ShaderProgram,
    quad: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    source: Option<SourceTexture>,
    target: Option<OutputTarget>,
}

impl EyeRenderTarget {
    pub fn new(eye: Eye, options: &GpuOptions) -> Result<Self, InitializationError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))?;
        let info = adapter.get_info();
        tracing::debug!(
            %eye,
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(match eye {
                Eye::Left => "left eye device",
                Eye::Right => "right eye device",
            }),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))?;
        device.on_uncaptured_error(Box::new(move |err| {
            tracing::error!(%eye, error = %err, "uncaptured GPU error");
        }));

        let program = ShaderProgram::new(&device)?;

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("eye quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("eye uniforms"),
            size: program.layout().uniforms.size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("eye uniform bind group"),
            layout: &program.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        tracing::info!(%eye, adapter = %info.name, "eye render target initialised");
        Ok(Self {
            eye,
            _instance: instance,
            device,
            queue,
            program,
            quad,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            source: None,
            target: None,
        })
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Current target size, if configured.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.target.as_ref().map(|target| (target.width, target.height))
    }

    /// Dimensions of the most recently uploaded frame.
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|source| (source.width, source.height))
    }

    fn create_target(&self, width: u32, height: u32) -> OutputTarget {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("eye output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        OutputTarget {
            texture,
            view,
            width,
            height,
        }
    }

    fn create_source(&self, width: u32, height: u32) -> SourceTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("eye video texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("eye video bind group"),
            layout: &self.program.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        SourceTexture {
            texture,
            bind_group,
            width,
            height,
        }
    }

    /// Runs `record` inside a validation scope and submits the encoder.
    fn submit<F>(&self, label: &str, record: F) -> Result<(), RenderError>
    where
        F: FnOnce(&mut wgpu::CommandEncoder),
    {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        record(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RenderError::Gpu(err.to_string())),
            None => Ok(()),
        }
    }

    fn clear_target(&self, target: &OutputTarget) -> Result<(), RenderError> {
        self.submit("eye clear", |encoder| {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("eye clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        })
    }

    /// Resizes the output to `width`x`height` and blanks it.
    pub fn configure(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.size() == Some((width, height)) {
            return;
        }
        let target = self.create_target(width, height);
        if let Err(err) = self.clear_target(&target) {
            tracing::warn!(eye = %self.eye, error = %err, "failed to clear new eye target");
        }
        tracing::debug!(eye = %self.eye, width, height, "eye target configured");
        self.target = Some(target);
    }

    /// Uploads `frame` as the full source texture.
    pub fn update(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        if frame.is_empty() {
            return Err(RenderError::EmptyFrame);
        }
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected {
            return Err(RenderError::FrameSize {
                expected,
                actual: frame.data.len(),
            });
        }
        if self.source_size() != Some((frame.width, frame.height)) {
            self.source = Some(self.create_source(frame.width, frame.height));
        }
        let Some(source) = self.source.as_ref() else {
            return Err(RenderError::NoSource);
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Draws the colour-transformed source into the output.
    pub fn render(&mut self, uniforms: &ShaderUniforms) -> Result<(), RenderError> {
        let target = self.target.as_ref().ok_or(RenderError::NotConfigured)?;
        let source = self.source.as_ref().ok_or(RenderError::NoSource)?;

        let bytes = self.program.layout().uniforms.encode(uniforms);
        self.queue.write_buffer(&self.uniform_buffer, 0, &bytes);

        self.submit("eye render", |encoder| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("eye colour shift pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.program.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &source.bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        })
    }

    /// Blanks the output to opaque black.
    pub fn clear(&mut self) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        if let Err(err) = self.clear_target(target) {
            tracing::warn!(eye = %self.eye, error = %err, "failed to clear eye target");
        }
    }

    /// Copies the output back to the CPU as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>, RenderError> {
        let target = self.target.as_ref().ok_or(RenderError::NotConfigured)?;
        let unpadded = target.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("eye readback"),
            size: u64::from(padded) * u64::from(target.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.submit("eye readback", |encoder| {
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded),
                        rows_per_image: Some(target.height),
                    },
                },
                wgpu::Extent3d {
                    width: target.width,
                    height: target.height,
                    depth_or_array_layers: 1,
                },
            );
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| RenderError::Readback(err.to_string()))?;
        rx.recv()
            .map_err(|_| RenderError::Readback("map callback dropped".to_string()))?
            .map_err(|err| RenderError::Readback(err.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * target.height) as usize);
        for row in mapped.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(pixels)
    }
}

impl EyeSurface for EyeRenderTarget {
    type Error = RenderError;

    fn configure(&mut self, width: u32, height: u32) {
        EyeRenderTarget::configure(self, width, height);
    }

    fn update(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        EyeRenderTarget::update(self, frame)
    }

    fn render(&mut self, uniforms: &ShaderUniforms) -> Result<(), RenderError> {
        EyeRenderTarget::render(self, uniforms)
    }

    fn clear(&mut self) {
        EyeRenderTarget::clear(self);
    }
}

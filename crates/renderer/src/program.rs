use std::collections::HashMap;

use scheduler::ShaderUniforms;
use wgpu::naga::{AddressSpace, Binding, Module, ShaderStage, TypeInner};

use crate::compile::{self, Stage, FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
use crate::ShaderError;

/// Output format of every eye target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Values the colour transform reads from its uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    Resolution,
    HueShift,
    Contrast,
    Brightness,
    SaturationBoost,
    Sharpness,
    Zoom,
}

impl Uniform {
    pub const ALL: [Uniform; 7] = [
        Uniform::Resolution,
        Uniform::HueShift,
        Uniform::Contrast,
        Uniform::Brightness,
        Uniform::SaturationBoost,
        Uniform::Sharpness,
        Uniform::Zoom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Uniform::Resolution => "u_resolution",
            Uniform::HueShift => "u_hueShift",
            Uniform::Contrast => "u_contrast",
            Uniform::Brightness => "u_brightness",
            Uniform::SaturationBoost => "u_saturationBoost",
            Uniform::Sharpness => "u_sharpness",
            Uniform::Zoom => "u_zoom",
        }
    }

    fn width(self) -> u32 {
        match self {
            Uniform::Resolution => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexAttribute {
    Position,
    TexCoord,
}

impl VertexAttribute {
    pub fn name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "a_position",
            VertexAttribute::TexCoord => "a_texCoord",
        }
    }
}

/// Byte offsets of each uniform inside the std140 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    offsets: [u32; Uniform::ALL.len()],
    size: u64,
}

impl UniformLayout {
    pub fn offset(&self, uniform: Uniform) -> u32 {
        self.offsets[uniform as usize]
    }

    /// Buffer size, rounded up to the std140 struct alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Serialises `uniforms` into a buffer laid out per the reflected offsets.
    pub fn encode(&self, uniforms: &ShaderUniforms) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        let mut put = |uniform: Uniform, value: &[u8]| {
            let start = self.offset(uniform) as usize;
            bytes[start..start + value.len()].copy_from_slice(value);
        };
        put(Uniform::Resolution, bytemuck::cast_slice(&uniforms.resolution));
        put(Uniform::HueShift, bytemuck::bytes_of(&uniforms.hue_shift));
        put(Uniform::Contrast, bytemuck::bytes_of(&uniforms.contrast));
        put(Uniform::Brightness, bytemuck::bytes_of(&uniforms.brightness));
        put(
            Uniform::SaturationBoost,
            bytemuck::bytes_of(&uniforms.saturation_boost),
        );
        put(Uniform::Sharpness, bytemuck::bytes_of(&uniforms.sharpness));
        put(Uniform::Zoom, bytemuck::bytes_of(&uniforms.zoom));
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocations {
    pub position: u32,
    pub tex_coord: u32,
}

impl AttributeLocations {
    pub fn location(&self, attribute: VertexAttribute) -> u32 {
        match attribute {
            VertexAttribute::Position => self.position,
            VertexAttribute::TexCoord => self.tex_coord,
        }
    }
}

/// Bindings reflected from a compiled vertex/fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    pub uniforms: UniformLayout,
    pub attributes: AttributeLocations,
}

impl ProgramLayout {
    /// Compiles both stages and reflects their bindings without touching a device.
    pub fn reflect(vertex_source: &str, fragment_source: &str) -> Result<Self, ShaderError> {
        let vertex = compile::compile_stage(vertex_source, Stage::Vertex)?;
        let fragment = compile::compile_stage(fragment_source, Stage::Fragment)?;
        Self::link(&vertex, &fragment)
    }

    fn link(vertex: &Module, fragment: &Module) -> Result<Self, ShaderError> {
        let vertex_block = uniform_block(vertex);
        let fragment_block = uniform_block(fragment);
        if vertex_block.is_none() && fragment_block.is_none() {
            return Err(link_error("no uniform block declared in either stage"));
        }

        let mut offsets = [0u32; Uniform::ALL.len()];
        let mut span = 0u32;
        for uniform in Uniform::ALL {
            let in_vertex = vertex_block
                .as_ref()
                .and_then(|block| block.members.get(uniform.name()).copied());
            let in_fragment = fragment_block
                .as_ref()
                .and_then(|block| block.members.get(uniform.name()).copied());
            let offset = match (in_vertex, in_fragment) {
                (Some(a), Some(b)) if a != b => {
                    return Err(link_error(format!(
                        "uniform `{}` is at offset {a} in the vertex stage but {b} in the fragment stage",
                        uniform.name()
                    )));
                }
                (Some(offset), _) | (None, Some(offset)) => offset,
                (None, None) => {
                    return Err(link_error(format!(
                        "uniform `{}` is not declared by the program",
                        uniform.name()
                    )));
                }
            };
            offsets[uniform as usize] = offset;
            span = span.max(offset + uniform.width());
        }
        for block in [&vertex_block, &fragment_block].into_iter().flatten() {
            span = span.max(block.span);
        }

        let inputs = vertex_inputs(vertex);
        let location = |attribute: VertexAttribute| {
            inputs.get(attribute.name()).copied().ok_or_else(|| {
                link_error(format!(
                    "vertex attribute `{}` is not declared by the program",
                    attribute.name()
                ))
            })
        };
        let attributes = AttributeLocations {
            position: location(VertexAttribute::Position)?,
            tex_coord: location(VertexAttribute::TexCoord)?,
        };

        Ok(Self {
            uniforms: UniformLayout {
                offsets,
                size: u64::from(span.next_multiple_of(16)),
            },
            attributes,
        })
    }
}

struct UniformBlock {
    members: HashMap<String, u32>,
    span: u32,
}

fn uniform_block(module: &Module) -> Option<UniformBlock> {
    module.global_variables.iter().find_map(|(_, var)| {
        if var.space != AddressSpace::Uniform {
            return None;
        }
        match &module.types[var.ty].inner {
            TypeInner::Struct { members, span } => Some(UniformBlock {
                members: members
                    .iter()
                    .filter_map(|member| Some((member.name.clone()?, member.offset)))
                    .collect(),
                span: *span,
            }),
            _ => None,
        }
    })
}

fn vertex_inputs(module: &Module) -> HashMap<String, u32> {
    module
        .entry_points
        .iter()
        .filter(|entry| entry.stage == ShaderStage::Vertex)
        .flat_map(|entry| entry.function.arguments.iter())
        .filter_map(|argument| match (&argument.name, &argument.binding) {
            (Some(name), Some(Binding::Location { location, .. })) => {
                Some((name.clone(), *location))
            }
            _ => None,
        })
        .collect()
}

fn link_error(log: impl Into<String>) -> ShaderError {
    ShaderError::Link { log: log.into() }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct QuadVertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

/// Triangle strip covering clip space; texture v runs top to bottom.
pub(crate) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

/// A linked colour-transform program on one device.
///
/// Construction either yields a complete pipeline or a [`ShaderError`]; no
/// partially built program escapes.
pub struct ShaderProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) uniform_layout: wgpu::BindGroupLayout,
    pub(crate) texture_layout: wgpu::BindGroupLayout,
    layout: ProgramLayout,
}

impl ShaderProgram {
    /// Builds the bundled colour-transform program.
    pub fn new(device: &wgpu::Device) -> Result<Self, ShaderError> {
        Self::from_sources(device, VERTEX_SHADER_GLSL, FRAGMENT_SHADER_GLSL)
    }

    pub fn from_sources(
        device: &wgpu::Device,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let layout = ProgramLayout::reflect(vertex_source, fragment_source)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let parts = Self::build(device, vertex_source, fragment_source, &layout);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(link_error(err.to_string()));
        }

        let (pipeline, uniform_layout, texture_layout) = parts;
        tracing::debug!(
            uniform_bytes = layout.uniforms.size(),
            position = layout.attributes.position,
            tex_coord = layout.attributes.tex_coord,
            "linked colour shift program"
        );
        Ok(Self {
            pipeline,
            uniform_layout,
            texture_layout,
            layout,
        })
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    pub fn uniform_offset(&self, uniform: Uniform) -> u32 {
        self.layout.uniforms.offset(uniform)
    }

    pub fn attribute_location(&self, attribute: VertexAttribute) -> u32 {
        self.layout.attributes.location(attribute)
    }

    fn build(
        device: &wgpu::Device,
        vertex_source: &str,
        fragment_source: &str,
        layout: &ProgramLayout,
    ) -> (
        wgpu::RenderPipeline,
        wgpu::BindGroupLayout,
        wgpu::BindGroupLayout,
    ) {
        let vertex_module =
            compile::create_module(device, vertex_source, Stage::Vertex, "colour shift vertex");
        let fragment_module = compile::create_module(
            device,
            fragment_source,
            Stage::Fragment,
            "colour shift fragment",
        );

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("colour shift uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(layout.uniforms.size()),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("video texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("colour shift pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let attributes = [
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: 0,
                shader_location: layout.attributes.position,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                shader_location: layout.attributes.tex_coord,
            },
        ];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("colour shift pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        (pipeline, uniform_layout, texture_layout)
    }
}

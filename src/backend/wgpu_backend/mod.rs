//! wgpu backend implementation
//!
//! Presents the immediate-mode [`RenderDevice`] surface on top of wgpu.
//! Uniform writes go into a CPU copy of each program's uniform block;
//! every draw snapshots that block into its own buffer and bind group,
//! resolves a pipeline for the current fixed-function state and queues
//! the draw. Queued commands are encoded into render passes when the
//! frame ends, or earlier when a resource they use is about to change.
//!
//! The output surface is an off-screen texture that can be read back
//! with [`WgpuBackend::read_surface`].

mod reflect;

use std::any::Any;
use std::collections::HashMap;

use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;
pub use reflect::{reflect, ProgramLayout, TextureBinding, UniformField};

const SURFACE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x4,
];

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    desc: TextureDescriptor,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct GpuTarget {
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Uniform(UniformField),
    /// Index into the program's texture bindings
    Texture(usize),
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    layout: ProgramLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    slots: Vec<Slot>,
    /// CPU copy of the uniform block
    staging: Vec<u8>,
    /// Texture unit each texture binding reads from
    units: HashMap<usize, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    state: PipelineState,
    format: TextureFormat,
    depth: bool,
}

/// Recorded command, encoded at flush time
enum Command {
    Clear {
        target: Option<RenderTargetHandle>,
        color: Vec4,
    },
    Draw {
        target: Option<RenderTargetHandle>,
        pipeline: PipelineKey,
        uniforms: wgpu::BindGroup,
        textures: wgpu::BindGroup,
        mesh: MeshHandle,
        viewport: Viewport,
    },
    Blit {
        bind_group: wgpu::BindGroup,
        dst: Viewport,
    },
}

impl Command {
    /// Render target written; `None` is the output surface
    fn attachment(&self) -> Option<RenderTargetHandle> {
        match self {
            Command::Clear { target, .. } | Command::Draw { target, .. } => *target,
            Command::Blit { .. } => None,
        }
    }
}

/// wgpu backend implementation
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    surface: wgpu::Texture,
    surface_view: wgpu::TextureView,
    surface_size: (u32, u32),

    // Resource storage
    programs: HashMap<u64, GpuProgram>,
    textures: HashMap<u64, GpuTexture>,
    meshes: HashMap<u64, GpuMesh>,
    targets: HashMap<u64, GpuTarget>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    next_id: u64,

    // Bound on unset image slots
    white_2d: GpuTexture,
    white_cube: GpuTexture,

    blit_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    blit_sampler: wgpu::Sampler,

    // Immediate-mode state
    current_program: Option<ProgramHandle>,
    current_target: Option<RenderTargetHandle>,
    state: PipelineState,
    viewport: Viewport,
    units: HashMap<u32, TextureHandle>,

    pending: Vec<Command>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::Src => wgpu::BlendFactor::Src,
            BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::Dst => wgpu::BlendFactor::Dst,
            BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
        match kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        }
    }
}

impl WgpuBackend {
    /// Headless backend on the first suitable adapter
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async(width, height))
    }

    pub async fn new_headless_async(width: u32, height: u32) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Forward Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self::with_device(device, queue, width, height))
    }

    /// Wrap a device the caller already owns
    pub fn with_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let (surface, surface_view) = Self::create_surface(&device, width, height);

        let white = [255u8; 4];
        let white_2d = Self::create_gpu_texture(
            &device,
            &queue,
            &TextureDescriptor {
                label: Some("white_2d".into()),
                ..Default::default()
            },
            Some(&white),
        );
        let white_cube = Self::create_gpu_texture(
            &device,
            &queue,
            &TextureDescriptor {
                label: Some("white_cube".into()),
                kind: TextureKind::Cube,
                ..Default::default()
            },
            Some(&white.repeat(6)),
        );

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });
        let blit_pipeline = Self::create_blit_pipeline(&device, &blit_layout);
        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            surface,
            surface_view,
            surface_size: (width.max(1), height.max(1)),
            programs: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            targets: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            white_2d,
            white_cube,
            blit_layout,
            blit_pipeline,
            blit_sampler,
            current_program: None,
            current_target: None,
            state: PipelineState::default(),
            viewport: Viewport::from_size(width, height),
            units: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Recreate the output surface at a new size
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.flush();
        let (surface, view) = Self::create_surface(&self.device, width, height);
        self.surface = surface;
        self.surface_view = view;
        self.surface_size = (width.max(1), height.max(1));
    }

    /// Read the output surface back as tightly packed sRGB RGBA8 rows
    pub fn read_surface(&mut self) -> BackendResult<Vec<u8>> {
        self.flush();

        let (width, height) = self.surface_size;
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Surface Readback"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            self.surface.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?
            .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_surface(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Surface"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(SURFACE_FORMAT),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn create_gpu_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> GpuTexture {
        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: desc.kind.layers(),
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage)
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        if let Some(data) = data {
            queue.write_texture(
                texture.as_image_copy(),
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(Self::view_dimension(desc.kind)),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.sampler.address_mode_u),
            address_mode_v: Self::convert_address_mode(desc.sampler.address_mode_v),
            address_mode_w: Self::convert_address_mode(desc.sampler.address_mode_w),
            mag_filter: Self::convert_filter_mode(desc.sampler.mag_filter),
            min_filter: Self::convert_filter_mode(desc.sampler.min_filter),
            ..Default::default()
        });

        GpuTexture {
            texture,
            view,
            sampler,
            desc: desc.clone(),
        }
    }

    fn create_target(&self, width: u32, height: u32, format: TextureFormat) -> GpuTarget {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        GpuTarget {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            width: size.width,
            height: size.height,
            format,
        }
    }

    fn create_blit_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/wgsl/blit.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(SURFACE_FORMAT),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }

    fn create_pipeline(&self, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program.0)?;
        let state = &key.state;

        let blend = state.blend.map(|b| {
            let component = wgpu::BlendComponent {
                src_factor: Self::convert_blend_factor(b.src_factor),
                dst_factor: Self::convert_blend_factor(b.dst_factor),
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: component,
                alpha: component,
            }
        });

        let depth_stencil = key.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: state.depth_test && state.depth_write,
            depth_compare: if state.depth_test {
                Self::convert_compare_function(state.depth_func)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: match state.front_face {
                FrontFace::Ccw => wgpu::FrontFace::Ccw,
                FrontFace::Cw => wgpu::FrontFace::Cw,
            },
            cull_mode: match state.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            ..Default::default()
        };

        log::debug!("Creating pipeline for `{}`: {:?}", program.label, state);
        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.label.as_str()),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(key.format),
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive,
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        }))
    }

    /// Uniform and texture bind groups for a draw with `program`
    fn bind_groups(&self, program: &GpuProgram) -> (wgpu::BindGroup, wgpu::BindGroup) {
        let buffer = (!program.staging.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Uniforms"),
                    contents: &program.staging,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });
        let uniform_entries: Vec<_> = buffer
            .iter()
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniforms = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Bind Group"),
            layout: &program.uniform_layout,
            entries: &uniform_entries,
        });

        let mut texture_entries = Vec::new();
        for (index, binding) in program.layout.textures.iter().enumerate() {
            let texture = program
                .units
                .get(&index)
                .and_then(|unit| self.units.get(unit))
                .and_then(|handle| self.textures.get(&handle.0))
                .filter(|texture| match texture.desc.kind {
                    TextureKind::D2 => binding.kind == UniformKind::Sampler2D,
                    TextureKind::Cube => binding.kind == UniformKind::SamplerCube,
                })
                .unwrap_or(match binding.kind {
                    UniformKind::SamplerCube => &self.white_cube,
                    _ => &self.white_2d,
                });

            texture_entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            if let Some(sampler) = binding.sampler {
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: sampler,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
        }
        let textures = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Bind Group"),
            layout: &program.texture_layout,
            entries: &texture_entries,
        });

        (uniforms, textures)
    }

    /// Encode and submit every queued command
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let commands = std::mem::take(&mut self.pending);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // One render pass per run of commands on the same attachment; a
        // clear always opens a new pass.
        let mut start = 0;
        while start < commands.len() {
            let attachment = commands[start].attachment();
            let mut end = start + 1;
            while end < commands.len()
                && commands[end].attachment() == attachment
                && !matches!(commands[end], Command::Clear { .. })
            {
                end += 1;
            }
            self.encode_pass(&mut encoder, attachment, &commands[start..end]);
            start = end;
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        attachment: Option<RenderTargetHandle>,
        commands: &[Command],
    ) {
        let (color_view, depth_view, size) = match attachment {
            Some(handle) => match self.targets.get(&handle.0) {
                Some(target) => (
                    &target.color_view,
                    Some(&target.depth_view),
                    (target.width, target.height),
                ),
                None => {
                    log::warn!("Dropping commands for a destroyed render target");
                    return;
                }
            },
            None => (&self.surface_view, None, self.surface_size),
        };

        let clear = match commands.first() {
            Some(Command::Clear { color, .. }) => Some(*color),
            _ => None,
        };
        let color_load = match clear {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.x as f64,
                g: c.y as f64,
                b: c.z as f64,
                a: c.w as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = if clear.is_some() {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Forward Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in commands {
            match command {
                Command::Clear { .. } => {}
                Command::Draw {
                    pipeline,
                    uniforms,
                    textures,
                    mesh,
                    viewport,
                    ..
                } => {
                    let (Some(pipeline), Some(mesh)) =
                        (self.pipelines.get(pipeline), self.meshes.get(&mesh.0))
                    else {
                        continue;
                    };
                    let Some((x, y, w, h)) = clamp_viewport(*viewport, size) else {
                        continue;
                    };
                    pass.set_viewport(x, y, w, h, 0.0, 1.0);
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, uniforms, &[]);
                    pass.set_bind_group(1, textures, &[]);
                    pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                    pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
                Command::Blit { bind_group, dst } => {
                    let Some((x, y, w, h)) = clamp_viewport(*dst, size) else {
                        continue;
                    };
                    pass.set_viewport(x, y, w, h, 0.0, 1.0);
                    pass.set_pipeline(&self.blit_pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.draw(0..3, 0..1);
                }
            }
        }
    }
}

/// Viewport clipped to an attachment of `size`, `None` if nothing is left
fn clamp_viewport(viewport: Viewport, size: (u32, u32)) -> Option<(f32, f32, f32, f32)> {
    let (width, height) = size;
    if viewport.x >= width || viewport.y >= height {
        return None;
    }
    let w = viewport.width.min(width - viewport.x);
    let h = viewport.height.min(height - viewport.y);
    if w == 0 || h == 0 {
        return None;
    }
    Some((viewport.x as f32, viewport.y as f32, w as f32, h as f32))
}

/// Write `value` into a uniform block at `offset` using WGSL layout rules
fn write_uniform(staging: &mut [u8], offset: u32, value: &UniformValue) {
    let offset = offset as usize;
    let mut write = |at: usize, bytes: &[u8]| {
        if let Some(dst) = staging.get_mut(at..at + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    };
    match value {
        UniformValue::Bool(v) => write(offset, bytemuck::bytes_of(&(*v as u32))),
        UniformValue::Float(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Int(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Vec2(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Vec3(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Vec4(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Mat2(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::Mat3(v) => {
            // columns are padded to 16 bytes
            for (i, column) in [v.x_axis, v.y_axis, v.z_axis].iter().enumerate() {
                write(offset + i * 16, bytemuck::bytes_of(column));
            }
        }
        UniformValue::Mat4(v) => write(offset, bytemuck::bytes_of(v)),
        UniformValue::TextureUnit(_) => {}
    }
}

impl RenderDevice for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        log::trace!("WgpuBackend: begin frame");
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.flush();
        log::trace!("WgpuBackend: end frame");
        Ok(())
    }

    fn create_program(&mut self, source: &ProgramSource) -> BackendResult<ProgramHandle> {
        let layout = reflect(&source.wgsl).map_err(BackendError::ProgramCreationFailed)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(format!(
                "{}: {}",
                source.label, err
            )));
        }

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let uniform_entries: Vec<_> = (layout.uniform_size > 0)
            .then_some(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .into_iter()
            .collect();

        let mut texture_entries = Vec::new();
        for texture in &layout.textures {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture.binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: match texture.kind {
                        UniformKind::SamplerCube => wgpu::TextureViewDimension::Cube,
                        _ => wgpu::TextureViewDimension::D2,
                    },
                    multisampled: false,
                },
                count: None,
            });
            if let Some(sampler) = texture.sampler {
                texture_entries.push(wgpu::BindGroupLayoutEntry {
                    binding: sampler,
                    visibility,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                });
            }
        }

        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Layout"),
                entries: &uniform_entries,
            });
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Texture Layout"),
                entries: &texture_entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(source.label.as_str()),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        log::debug!(
            "Created program `{}` ({} uniform bytes, {} textures)",
            source.label,
            layout.uniform_size,
            layout.textures.len()
        );

        let id = self.allocate_id();
        self.programs.insert(
            id,
            GpuProgram {
                label: source.label.clone(),
                module,
                staging: vec![0; layout.uniform_size as usize],
                layout,
                uniform_layout,
                texture_layout,
                pipeline_layout,
                slots: Vec::new(),
                units: HashMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.flush();
        self.programs.remove(&program.0);
        self.pipelines.retain(|key, _| key.program != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(
        &mut self,
        program: ProgramHandle,
        name: &str,
        kind: UniformKind,
    ) -> BackendResult<Option<UniformLocation>> {
        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or(BackendError::InvalidHandle("program"))?;

        let mismatch = || BackendError::UniformTypeMismatch {
            name: name.to_string(),
            declared: kind,
        };
        let slot = if let Some(field) = entry.layout.uniforms.get(name) {
            if field.kind != kind {
                return Err(mismatch());
            }
            Slot::Uniform(*field)
        } else if let Some((index, texture)) = entry.layout.texture(name) {
            if texture.kind != kind {
                return Err(mismatch());
            }
            Slot::Texture(index)
        } else {
            return Ok(None);
        };

        entry.slots.push(slot);
        Ok(Some(UniformLocation {
            program,
            slot: (entry.slots.len() - 1) as u32,
        }))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(program) = self.programs.get_mut(&location.program.0) else {
            return;
        };
        match program.slots.get(location.slot as usize) {
            Some(Slot::Uniform(field)) => write_uniform(&mut program.staging, field.offset, value),
            Some(Slot::Texture(index)) => {
                if let UniformValue::TextureUnit(unit) = value {
                    program.units.insert(*index, *unit);
                }
            }
            None => {}
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.units.insert(unit, texture);
    }

    fn apply_state(&mut self, state: &PipelineState) {
        self.state = *state;
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        if let Some(data) = data {
            if data.len() != desc.data_size() {
                return Err(BackendError::TextureCreationFailed(format!(
                    "expected {} bytes of pixel data, got {}",
                    desc.data_size(),
                    data.len()
                )));
            }
        }
        let texture = Self::create_gpu_texture(&self.device, &self.queue, desc, data);
        let id = self.allocate_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn copy_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureHandle> {
        let source = self
            .textures
            .get(&texture.0)
            .ok_or(BackendError::InvalidHandle("texture"))?;
        let copy = Self::create_gpu_texture(&self.device, &self.queue, &source.desc, None);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Copy"),
            });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            copy.texture.as_image_copy(),
            wgpu::Extent3d {
                width: source.desc.width.max(1),
                height: source.desc.height.max(1),
                depth_or_array_layers: source.desc.kind.layers(),
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let id = self.allocate_id();
        self.textures.insert(id, copy);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.flush();
        self.textures.remove(&texture.0);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> BackendResult<MeshHandle> {
        let vertices_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let id = self.allocate_id();
        self.meshes.insert(
            id,
            GpuMesh {
                vertices: vertices_buffer,
                indices: indices_buffer,
                index_count: indices.len() as u32,
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.flush();
        self.meshes.remove(&mesh.0);
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        let Some(program) = self.current_program else {
            log::warn!("WgpuBackend: draw without a program");
            return;
        };
        if self.meshes.get(&mesh.0).map_or(true, |m| m.index_count == 0) {
            return;
        }
        let (format, depth) = match self.current_target {
            Some(target) => match self.targets.get(&target.0) {
                Some(target) => (target.format, true),
                None => return,
            },
            None => (SURFACE_FORMAT, false),
        };

        let key = PipelineKey {
            program,
            state: self.state,
            format,
            depth,
        };
        if !self.pipelines.contains_key(&key) {
            let Some(pipeline) = self.create_pipeline(&key) else {
                return;
            };
            self.pipelines.insert(key, pipeline);
        }

        let Some(entry) = self.programs.get(&program.0) else {
            return;
        };
        let (uniforms, textures) = self.bind_groups(entry);
        self.pending.push(Command::Draw {
            target: self.current_target,
            pipeline: key,
            uniforms,
            textures,
            mesh,
            viewport: self.viewport,
        });
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<RenderTargetHandle> {
        if format.is_depth() {
            return Err(BackendError::TextureCreationFailed(
                "render target color format cannot be a depth format".into(),
            ));
        }
        let target = self.create_target(width, height, format);
        let id = self.allocate_id();
        self.targets.insert(id, target);
        Ok(RenderTargetHandle(id))
    }

    fn resize_render_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let format = self
            .targets
            .get(&target.0)
            .ok_or(BackendError::InvalidHandle("render target"))?
            .format;
        self.flush();
        let resized = self.create_target(width, height, format);
        self.targets.insert(target.0, resized);
        Ok(())
    }

    fn render_target_size(&self, target: RenderTargetHandle) -> Option<(u32, u32)> {
        self.targets.get(&target.0).map(|t| (t.width, t.height))
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        self.flush();
        self.targets.remove(&target.0);
        if self.current_target == Some(target) {
            self.current_target = None;
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.current_target = target;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: Vec4) {
        self.pending.push(Command::Clear {
            target: self.current_target,
            color,
        });
    }

    fn blit_to_surface(&mut self, target: RenderTargetHandle, dst: Viewport) {
        let Some(source) = self.targets.get(&target.0) else {
            log::warn!("WgpuBackend: blit from unknown render target");
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                },
            ],
        });
        self.pending.push(Command::Blit { bind_group, dst });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec3};

    #[test]
    fn test_clamp_viewport() {
        assert_eq!(
            clamp_viewport(Viewport::new(10, 0, 100, 50), (64, 32)),
            Some((10.0, 0.0, 54.0, 32.0))
        );
        assert_eq!(clamp_viewport(Viewport::new(64, 0, 1, 1), (64, 32)), None);
    }

    #[test]
    fn test_mat3_columns_padded() {
        let mut staging = vec![0u8; 48];
        let matrix = Mat3::from_cols(Vec3::X, Vec3::Y * 2.0, Vec3::Z * 3.0);
        write_uniform(&mut staging, 0, &UniformValue::Mat3(matrix));

        let floats: &[f32] = bytemuck::cast_slice(&staging);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 2.0);
        assert_eq!(floats[10], 3.0);
        assert_eq!(floats[3], 0.0);
    }

    #[test]
    fn test_out_of_range_write_ignored() {
        let mut staging = vec![0u8; 8];
        write_uniform(&mut staging, 4, &UniformValue::Vec4(Vec4::ONE));
        assert_eq!(staging, vec![0u8; 8]);

        write_uniform(&mut staging, 4, &UniformValue::Bool(true));
        assert_eq!(&staging[4..], &1u32.to_ne_bytes());
    }
}

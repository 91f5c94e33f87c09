use std::cell::RefCell;
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::blend::{BlendFactor, BlendMode};
use crate::gpu::device::{
    Command, DeviceCaps, FilterMode, GpuDevice, PipelineDesc, PipelineStateId, ShaderModuleId,
    ShaderStage, TextureDesc, TextureFormat, TextureId, TextureReadback, TextureUsage, Vertex,
    split_passes,
};

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];
const UNIFORM_SIZE: usize = 20;
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

struct WgpuTexture {
    /// `None` for swap-chain views registered by a window surface.
    texture: Option<wgpu::Texture>,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
    target_format: wgpu::TextureFormat,
    filter: FilterMode,
}

struct WgpuModule {
    module: wgpu::ShaderModule,
}

#[derive(Clone)]
struct Program {
    label: &'static str,
    module: wgpu::ShaderModule,
    vertex: &'static str,
    fragment: &'static str,
}

#[derive(Default)]
struct WgpuState {
    next_id: u64,
    textures: HashMap<TextureId, WgpuTexture>,
    modules: HashMap<ShaderModuleId, WgpuModule>,
    programs: HashMap<PipelineStateId, Program>,
    compiled: HashMap<(PipelineStateId, BlendMode, wgpu::TextureFormat), wgpu::RenderPipeline>,
}

impl WgpuState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`GpuDevice`] backed by wgpu.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: DeviceCaps,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    /// 1x1 white texel bound where a palette or mask is absent.
    fallback: wgpu::TextureView,
    index_buffer: wgpu::Buffer,
    state: RefCell<WgpuState>,
}

pub(crate) fn backend_name(backend: wgpu::Backend) -> &'static str {
    match backend {
        wgpu::Backend::Vulkan => "vulkan",
        wgpu::Backend::Metal => "metal",
        wgpu::Backend::Dx12 => "dx12",
        wgpu::Backend::Gl => "gl",
        wgpu::Backend::BrowserWebGpu => "webgpu",
        _ => "wgpu",
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
    }
}

fn blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    if mode == BlendMode::Disabled {
        return None;
    }
    let eq = mode.equation();
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(eq.color_src),
            dst_factor: blend_factor(eq.color_dst),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(eq.alpha_src),
            dst_factor: blend_factor(eq.alpha_dst),
            operation: wgpu::BlendOperation::Add,
        },
    })
}

fn create_sampler(device: &wgpu::Device, label: &str, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Everything one draw needs, created before its render pass begins.
struct PreparedDraw {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    viewport: (f32, f32, f32, f32),
    scissor: (u32, u32, u32, u32),
}

impl WgpuDevice {
    /// Requests a default adapter and device with no surface attached.
    pub fn new_headless() -> RetrocompResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                RetrocompError::resource("no gpu adapter available")
            }
            other => RetrocompError::resource(format!("wgpu request_adapter failed: {other:?}")),
        })?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("retrocomp_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RetrocompError::resource(format!("wgpu request_device failed: {e:?}")))?;
        Ok(Self::from_parts(
            device,
            queue,
            backend_name(adapter.get_info().backend),
        ))
    }

    /// Wraps a device the host already created, e.g. for its window surface.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, backend: &'static str) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("retrocomp_bgl"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
                sampler_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("retrocomp_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let nearest = create_sampler(&device, "retrocomp_nearest", wgpu::FilterMode::Nearest);
        let linear = create_sampler(&device, "retrocomp_linear", wgpu::FilterMode::Linear);

        let fallback_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retrocomp_fallback"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &fallback_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0xFF; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let fallback = fallback_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("retrocomp_quad_indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        let caps = DeviceCaps {
            max_texture_dimension: device.limits().max_texture_dimension_2d,
            backend,
        };
        Self {
            device,
            queue,
            caps,
            bind_group_layout,
            pipeline_layout,
            nearest,
            linear,
            fallback,
            index_buffer,
            state: RefCell::new(WgpuState::default()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Makes a swap-chain view drawable as a render target until unregistered.
    pub fn register_external_target(
        &self,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> TextureId {
        let mut st = self.state.borrow_mut();
        let id = TextureId(st.alloc_id());
        st.textures.insert(
            id,
            WgpuTexture {
                texture: None,
                view,
                width,
                height,
                format: TextureFormat::Rgba8,
                target_format: format,
                filter: FilterMode::Nearest,
            },
        );
        id
    }

    pub fn unregister_external(&self, id: TextureId) {
        self.state.borrow_mut().textures.remove(&id);
    }

    fn sampler(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Nearest => &self.nearest,
            FilterMode::Linear => &self.linear,
        }
    }

    fn compile(
        &self,
        st: &mut WgpuState,
        id: PipelineStateId,
        blend: BlendMode,
        format: wgpu::TextureFormat,
    ) -> RetrocompResult<wgpu::RenderPipeline> {
        if let Some(p) = st.compiled.get(&(id, blend, format)) {
            return Ok(p.clone());
        }
        let program = st
            .programs
            .get(&id)
            .cloned()
            .ok_or_else(|| RetrocompError::resource(format!("unknown pipeline {id:?}")))?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some(program.vertex),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some(program.fragment),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend_state(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RetrocompError::resource(format!(
                "{}: pipeline compilation failed: {err}",
                program.label
            )));
        }
        tracing::debug!(pipeline = program.label, ?blend, ?format, "compiled render pipeline");
        st.compiled.insert((id, blend, format), pipeline.clone());
        Ok(pipeline)
    }
}

impl GpuDevice for WgpuDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_texture(&self, desc: &TextureDesc) -> RetrocompResult<TextureId> {
        let max = self.caps.max_texture_dimension;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RetrocompError::resource(format!(
                "{}: {}x{} exceeds device limit {max}",
                desc.label, desc.width, desc.height
            )));
        }
        let format = wgpu_format(desc.format);
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if desc.usage.contains(TextureUsage::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut st = self.state.borrow_mut();
        let id = TextureId(st.alloc_id());
        st.textures.insert(
            id,
            WgpuTexture {
                texture: Some(texture),
                view,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                target_format: format,
                filter: FilterMode::Nearest,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) {
        if let Some(t) = self.state.borrow_mut().textures.remove(&id)
            && let Some(texture) = t.texture
        {
            texture.destroy();
        }
    }

    fn write_texture(
        &self,
        id: TextureId,
        region: Rect,
        data: &[u8],
        bytes_per_row: usize,
    ) -> RetrocompResult<()> {
        let st = self.state.borrow();
        let tex = st
            .textures
            .get(&id)
            .ok_or_else(|| RetrocompError::resource(format!("unknown texture {id:?}")))?;
        let Some(texture) = tex.texture.as_ref() else {
            return Err(RetrocompError::usage("cannot upload into a swap-chain image"));
        };
        if region.is_empty() || !Rect::with_size(tex.width, tex.height).contains_rect(region) {
            return Err(RetrocompError::usage(format!(
                "write region {region:?} outside texture {}x{}",
                tex.width, tex.height
            )));
        }
        let row_len = region.width() as usize * tex.format.bytes_per_texel();
        let rows = region.height() as usize;
        if bytes_per_row < row_len || data.len() < (rows - 1) * bytes_per_row + row_len {
            return Err(RetrocompError::usage("texture upload data too short"));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.left as u32,
                    y: region.top as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &data[..(rows - 1) * bytes_per_row + row_len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row as u32),
                rows_per_image: Some(rows as u32),
            },
            wgpu::Extent3d {
                width: region.width() as u32,
                height: region.height() as u32,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn set_texture_filter(&self, id: TextureId, filter: FilterMode) -> RetrocompResult<()> {
        let mut st = self.state.borrow_mut();
        let tex = st
            .textures
            .get_mut(&id)
            .ok_or_else(|| RetrocompError::resource(format!("unknown texture {id:?}")))?;
        tex.filter = filter;
        Ok(())
    }

    fn read_texture(&self, id: TextureId) -> RetrocompResult<TextureReadback> {
        let st = self.state.borrow();
        let tex = st
            .textures
            .get(&id)
            .ok_or_else(|| RetrocompError::resource(format!("unknown texture {id:?}")))?;
        let Some(texture) = tex.texture.as_ref() else {
            return Err(RetrocompError::usage("cannot read back a swap-chain image"));
        };
        let bpt = tex.format.bytes_per_texel() as u32;
        let row_bytes = tex.width * bpt;
        let padded = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("retrocomp_readback"),
            size: padded as u64 * tex.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("retrocomp_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(tex.height),
                },
            },
            wgpu::Extent3d {
                width: tex.width,
                height: tex.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RetrocompError::resource(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| RetrocompError::resource("readback channel closed"))?
            .map_err(|e| RetrocompError::resource(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let mut data = Vec::with_capacity(row_bytes as usize * tex.height as usize);
        for row in 0..tex.height as usize {
            let start = row * padded as usize;
            data.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();
        Ok(TextureReadback {
            width: tex.width,
            height: tex.height,
            format: tex.format,
            data,
        })
    }

    fn load_shader_module(
        &self,
        label: &'static str,
        source: &str,
        entry_points: &[(&'static str, ShaderStage)],
    ) -> RetrocompResult<ShaderModuleId> {
        for (name, _) in entry_points {
            if !source.contains(&format!("fn {name}(")) {
                return Err(RetrocompError::resource(format!(
                    "{label}: entry point `{name}` missing from source"
                )));
            }
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RetrocompError::resource(format!(
                "{label}: shader compilation failed: {err}"
            )));
        }
        let mut st = self.state.borrow_mut();
        let id = ShaderModuleId(st.alloc_id());
        st.modules.insert(id, WgpuModule { module });
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) {
        self.state.borrow_mut().modules.remove(&id);
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RetrocompResult<PipelineStateId> {
        let mut st = self.state.borrow_mut();
        if desc.vertex.module != desc.fragment.module {
            return Err(RetrocompError::usage(format!(
                "{}: vertex and fragment functions come from different modules",
                desc.label
            )));
        }
        let module = st
            .modules
            .get(&desc.vertex.module)
            .map(|m| m.module.clone())
            .ok_or_else(|| {
                RetrocompError::resource(format!(
                    "{}: shader module {:?} is not loaded",
                    desc.label, desc.vertex.module
                ))
            })?;
        let id = PipelineStateId(st.alloc_id());
        st.programs.insert(
            id,
            Program {
                label: desc.label,
                module,
                vertex: desc.vertex.entry_point(),
                fragment: desc.fragment.entry_point(),
            },
        );
        Ok(id)
    }

    fn destroy_pipeline(&self, id: PipelineStateId) {
        let mut st = self.state.borrow_mut();
        st.programs.remove(&id);
        st.compiled.retain(|(p, _, _), _| *p != id);
    }

    fn submit(&self, commands: Vec<Command>) -> RetrocompResult<()> {
        let passes = split_passes(commands)?;
        let mut st = self.state.borrow_mut();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("retrocomp_frame_encoder"),
            });

        for pass in passes {
            let (target_view, target_format, tw, th) = {
                let t = st.textures.get(&pass.target).ok_or_else(|| {
                    RetrocompError::resource(format!("unknown target {:?}", pass.target))
                })?;
                (t.view.clone(), t.target_format, t.width, t.height)
            };

            let mut prepared = Vec::with_capacity(pass.draws.len());
            for draw in &pass.draws {
                let bound = [
                    Some(draw.textures.source),
                    draw.textures.palette,
                    draw.textures.mask,
                ];
                if bound.contains(&Some(pass.target)) {
                    return Err(RetrocompError::usage(
                        "a draw samples the texture it renders into",
                    ));
                }
                let scissor = match draw.scissor {
                    Some(s) => s.to_rect(),
                    None => Rect::with_size(tw, th),
                }
                .intersect(Rect::with_size(tw, th));
                if scissor.is_empty() {
                    continue;
                }
                let pipeline = self.compile(&mut st, draw.pipeline, draw.blend, target_format)?;

                let view_of = |id: TextureId| -> RetrocompResult<(wgpu::TextureView, FilterMode)> {
                    st.textures
                        .get(&id)
                        .map(|t| (t.view.clone(), t.filter))
                        .ok_or_else(|| RetrocompError::resource(format!("unknown texture {id:?}")))
                };
                let (source, source_filter) = view_of(draw.textures.source)?;
                let palette = match draw.textures.palette {
                    Some(id) => view_of(id)?.0,
                    None => self.fallback.clone(),
                };
                let mask = match draw.textures.mask {
                    Some(id) => view_of(id)?.0,
                    None => self.fallback.clone(),
                };

                let mut uniforms = [0.0f32; UNIFORM_SIZE];
                uniforms[..16].copy_from_slice(&draw.projection.to_cols_array());
                uniforms[16..].copy_from_slice(&draw.color);
                let uniform_buffer =
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("retrocomp_uniforms"),
                            contents: bytemuck::cast_slice(&uniforms),
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                let vertices = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("retrocomp_quad"),
                        contents: bytemuck::cast_slice(&draw.vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("retrocomp_bg"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&palette),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&mask),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(self.sampler(source_filter)),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(&self.nearest),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: uniform_buffer.as_entire_binding(),
                        },
                    ],
                });
                prepared.push(PreparedDraw {
                    pipeline,
                    bind_group,
                    vertices,
                    viewport: (
                        draw.viewport.x,
                        draw.viewport.y,
                        draw.viewport.width,
                        draw.viewport.height,
                    ),
                    scissor: (
                        scissor.left as u32,
                        scissor.top as u32,
                        scissor.width() as u32,
                        scissor.height() as u32,
                    ),
                });
            }

            let load = match pass.clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("retrocomp_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            for draw in &prepared {
                let (x, y, w, h) = draw.viewport;
                rp.set_pipeline(&draw.pipeline);
                rp.set_bind_group(0, &draw.bind_group, &[]);
                rp.set_vertex_buffer(0, draw.vertices.slice(..));
                rp.set_viewport(x, y, w, h, 0.0, 1.0);
                let (sx, sy, sw, sh) = draw.scissor;
                rp.set_scissor_rect(sx, sy, sw, sh);
                rp.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
            }
        }

        drop(st);
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

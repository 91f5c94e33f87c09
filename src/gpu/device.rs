use std::rc::Rc;

use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::math::Matrix4;
use crate::gpu::blend::BlendMode;
use crate::gpu::shader::ShaderId;

pub type SharedDevice = Rc<dyn GpuDevice>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderModuleId(pub u64);

/// Compiled vertex+fragment program on the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineStateId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, bytes in memory order R, G, B, A.
    Rgba8,
    /// Single 8-bit channel; samples as `(r, 0, 0, 1)`.
    R8,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::R8 => 1,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u8 {
        const SAMPLED = 1 << 0;
        const RENDER_TARGET = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

impl FilterMode {
    pub fn from_enabled(linear: bool) -> Self {
        if linear {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    pub max_texture_dimension: u32,
    pub backend: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Entry point inside a loaded shader module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderFunction {
    pub module: ShaderModuleId,
    pub id: ShaderId,
}

impl ShaderFunction {
    pub fn entry_point(&self) -> &'static str {
        self.id.entry_point()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineDesc {
    pub label: &'static str,
    pub vertex: ShaderFunction,
    pub fragment: ShaderFunction,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "gpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Scissor rectangle in target pixels, origin top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScissorBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScissorBox {
    pub fn to_rect(self) -> Rect {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBindings {
    /// Binding 0: the texture being drawn (indices for the palette lookup program).
    pub source: TextureId,
    /// Binding 1: 256x1 palette, only read by the lookup program.
    pub palette: Option<TextureId>,
    /// Binding 2: R8 coverage mask, only read by the lookup program. Absent means fully opaque.
    pub mask: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub pipeline: PipelineStateId,
    pub blend: BlendMode,
    pub viewport: Viewport,
    pub scissor: Option<ScissorBox>,
    pub projection: Matrix4,
    pub color: [f32; 4],
    pub textures: TextureBindings,
    /// Quad corners; rasterised as triangles (0,1,2) and (0,2,3).
    pub vertices: [Vertex; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginPass {
        target: TextureId,
        clear: Option<[f32; 4]>,
    },
    Draw(DrawCall),
    EndPass,
}

/// Pixels copied back from a texture, rows tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureReadback {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

/// A render pass recovered from a flat command list.
#[derive(Clone, Debug, PartialEq)]
pub struct PassCommands {
    pub target: TextureId,
    pub clear: Option<[f32; 4]>,
    pub draws: Vec<DrawCall>,
}

/// Groups commands into passes. Draws outside a pass or unbalanced pass markers are rejected.
pub fn split_passes(commands: Vec<Command>) -> RetrocompResult<Vec<PassCommands>> {
    let mut passes = Vec::new();
    let mut open: Option<PassCommands> = None;
    for cmd in commands {
        match cmd {
            Command::BeginPass { target, clear } => {
                if open.is_some() {
                    return Err(RetrocompError::usage(
                        "render pass begun while another is open",
                    ));
                }
                open = Some(PassCommands {
                    target,
                    clear,
                    draws: Vec::new(),
                });
            }
            Command::Draw(call) => match open.as_mut() {
                Some(pass) => pass.draws.push(call),
                None => return Err(RetrocompError::usage("draw recorded outside a render pass")),
            },
            Command::EndPass => match open.take() {
                Some(pass) => passes.push(pass),
                None => return Err(RetrocompError::usage("render pass ended but none is open")),
            },
        }
    }
    if open.is_some() {
        return Err(RetrocompError::usage("render pass left open at submit"));
    }
    Ok(passes)
}

/// The GPU surface the compositor draws through.
///
/// Handles are plain ids; the device owns the objects and releases them on the matching
/// `destroy_*` call. Methods take `&self` so one device can be shared by every texture and
/// pipeline that references it.
pub trait GpuDevice {
    fn caps(&self) -> DeviceCaps;

    fn create_texture(&self, desc: &TextureDesc) -> RetrocompResult<TextureId>;
    fn destroy_texture(&self, id: TextureId);
    /// Writes `region` from `data`, whose rows are `bytes_per_row` apart.
    fn write_texture(
        &self,
        id: TextureId,
        region: Rect,
        data: &[u8],
        bytes_per_row: usize,
    ) -> RetrocompResult<()>;
    fn set_texture_filter(&self, id: TextureId, filter: FilterMode) -> RetrocompResult<()>;
    fn read_texture(&self, id: TextureId) -> RetrocompResult<TextureReadback>;

    fn load_shader_module(
        &self,
        label: &'static str,
        source: &str,
        entry_points: &[(&'static str, ShaderStage)],
    ) -> RetrocompResult<ShaderModuleId>;
    fn destroy_shader_module(&self, id: ShaderModuleId);

    fn create_pipeline(&self, desc: &PipelineDesc) -> RetrocompResult<PipelineStateId>;
    fn destroy_pipeline(&self, id: PipelineStateId);

    /// Executes recorded commands in order.
    fn submit(&self, commands: Vec<Command>) -> RetrocompResult<()>;
}

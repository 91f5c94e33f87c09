use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::blend::{u8_to_unorm, unorm_to_u8};
use crate::gpu::device::{
    Command, DeviceCaps, DrawCall, FilterMode, GpuDevice, PipelineDesc, PipelineStateId,
    ShaderModuleId, ShaderStage, TextureDesc, TextureFormat, TextureId, TextureReadback,
    TextureUsage, split_passes,
};
use crate::gpu::shader::{PALETTE_ADJUST, ShaderId};

/// Default texture size limit, matching common desktop GPUs.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Subpixel grid vertices are snapped to, so shared triangle edges rasterise exactly once.
const SUBPIXEL: f64 = 256.0;

/// CPU reference implementation of [`GpuDevice`].
///
/// Executes the same command stream a hardware device would, with the same sampling and blend
/// rules, so compositor output can be checked pixel by pixel without a GPU.
pub struct SoftwareDevice {
    caps: DeviceCaps,
    state: RefCell<SoftState>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub submits: u64,
    pub passes: u64,
    pub draws: u64,
    pub texels_uploaded: u64,
    pub live_textures: usize,
}

#[derive(Default)]
struct SoftState {
    next_id: u64,
    textures: HashMap<TextureId, SoftTexture>,
    modules: HashSet<ShaderModuleId>,
    pipelines: HashMap<PipelineStateId, FragmentProgram>,
    stats: SoftStats,
}

impl SoftState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FragmentProgram {
    Sample,
    PaletteLookup,
}

struct SoftTexture {
    desc: TextureDesc,
    filter: FilterMode,
    data: Vec<u8>,
}

impl SoftTexture {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let w = self.desc.width as i64;
        let h = self.desc.height as i64;
        let x = x.clamp(0, w - 1) as usize;
        let y = y.clamp(0, h - 1) as usize;
        let bpt = self.desc.format.bytes_per_texel();
        let off = (y * self.desc.width as usize + x) * bpt;
        match self.desc.format {
            TextureFormat::Rgba8 => [
                u8_to_unorm(self.data[off]),
                u8_to_unorm(self.data[off + 1]),
                u8_to_unorm(self.data[off + 2]),
                u8_to_unorm(self.data[off + 3]),
            ],
            TextureFormat::R8 => [u8_to_unorm(self.data[off]), 0.0, 0.0, 1.0],
        }
    }

    fn sample(&self, u: f32, v: f32, filter: FilterMode) -> [f32; 4] {
        let w = self.desc.width as f32;
        let h = self.desc.height as f32;
        match filter {
            FilterMode::Nearest => self.texel((u * w).floor() as i64, (v * h).floor() as i64),
            FilterMode::Linear => {
                let tx = u * w - 0.5;
                let ty = v * h - 0.5;
                let x0 = tx.floor();
                let y0 = ty.floor();
                let fx = tx - x0;
                let fy = ty - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let a = self.texel(x0, y0);
                let b = self.texel(x0 + 1, y0);
                let c = self.texel(x0, y0 + 1);
                let d = self.texel(x0 + 1, y0 + 1);
                let mut out = [0.0f32; 4];
                for i in 0..4 {
                    let top = a[i] + (b[i] - a[i]) * fx;
                    let bottom = c[i] + (d[i] - c[i]) * fx;
                    out[i] = top + (bottom - top) * fy;
                }
                out
            }
        }
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::with_max_texture_dimension(DEFAULT_MAX_TEXTURE_DIMENSION)
    }

    pub fn with_max_texture_dimension(max: u32) -> Self {
        Self {
            caps: DeviceCaps {
                max_texture_dimension: max,
                backend: "software",
            },
            state: RefCell::new(SoftState::default()),
        }
    }

    pub fn stats(&self) -> SoftStats {
        let st = self.state.borrow();
        SoftStats {
            live_textures: st.textures.len(),
            ..st.stats
        }
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_texture(&self, desc: &TextureDesc) -> RetrocompResult<TextureId> {
        let max = self.caps.max_texture_dimension;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RetrocompError::resource(format!(
                "cannot allocate {} texture {}x{} (limit {max})",
                desc.label, desc.width, desc.height
            )));
        }
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
        let mut st = self.state.borrow_mut();
        let id = TextureId(st.alloc_id());
        st.textures.insert(
            id,
            SoftTexture {
                desc: *desc,
                filter: FilterMode::Nearest,
                data: vec![0; len],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) {
        self.state.borrow_mut().textures.remove(&id);
    }

    fn write_texture(
        &self,
        id: TextureId,
        region: Rect,
        data: &[u8],
        bytes_per_row: usize,
    ) -> RetrocompResult<()> {
        let mut st = self.state.borrow_mut();
        let tex = st
            .textures
            .get_mut(&id)
            .ok_or_else(|| RetrocompError::resource(format!("unknown texture {id:?}")))?;
        let bounds = Rect::with_size(tex.desc.width, tex.desc.height);
        if region.is_empty() || !bounds.contains_rect(region) {
            return Err(RetrocompError::usage(format!(
                "write region {region:?} outside texture {}x{}",
                tex.desc.width, tex.desc.height
            )));
        }
        let bpt = tex.desc.format.bytes_per_texel();
        let row_len = region.width() as usize * bpt;
        let rows = region.height() as usize;
        if bytes_per_row < row_len || data.len() < (rows - 1) * bytes_per_row + row_len {
            return Err(RetrocompError::usage("texture upload data too short"));
        }
        let tex_pitch = tex.desc.width as usize * bpt;
        for row in 0..rows {
            let src = &data[row * bytes_per_row..row * bytes_per_row + row_len];
            let dst_off = (region.top as usize + row) * tex_pitch + region.left as usize * bpt;
            tex.data[dst_off..dst_off + row_len].copy_from_slice(src);
        }
        st.stats.texels_uploaded += (region.width() * region.height()) as u64;
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
        Ok(TextureReadback {
            width: tex.desc.width,
            height: tex.desc.height,
            format: tex.desc.format,
            data: tex.data.clone(),
        })
    }

    fn load_shader_module(
        &self,
        label: &'static str,
        source: &str,
        entry_points: &[(&'static str, ShaderStage)],
    ) -> RetrocompResult<ShaderModuleId> {
        for (name, stage) in entry_points {
            let known = ShaderId::ALL
                .iter()
                .any(|id| id.entry_point() == *name && id.stage() == *stage);
            if !known || !source.contains(&format!("fn {name}(")) {
                return Err(RetrocompError::resource(format!(
                    "{label}: entry point `{name}` has no software implementation"
                )));
            }
        }
        let mut st = self.state.borrow_mut();
        let id = ShaderModuleId(st.alloc_id());
        st.modules.insert(id);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) {
        self.state.borrow_mut().modules.remove(&id);
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RetrocompResult<PipelineStateId> {
        let mut st = self.state.borrow_mut();
        for f in [desc.vertex, desc.fragment] {
            if !st.modules.contains(&f.module) {
                return Err(RetrocompError::resource(format!(
                    "{}: shader module {:?} is not loaded",
                    desc.label, f.module
                )));
            }
        }
        if desc.vertex.id != ShaderId::Vertex {
            return Err(RetrocompError::usage(format!(
                "{}: `{}` is not a vertex entry point",
                desc.label,
                desc.vertex.entry_point()
            )));
        }
        let program = match desc.fragment.id {
            ShaderId::FragmentSample => FragmentProgram::Sample,
            ShaderId::FragmentPaletteLookup => FragmentProgram::PaletteLookup,
            ShaderId::Vertex => {
                return Err(RetrocompError::usage(format!(
                    "{}: `vertex_main` is not a fragment entry point",
                    desc.label
                )));
            }
        };
        let id = PipelineStateId(st.alloc_id());
        st.pipelines.insert(id, program);
        Ok(id)
    }

    fn destroy_pipeline(&self, id: PipelineStateId) {
        self.state.borrow_mut().pipelines.remove(&id);
    }

    fn submit(&self, commands: Vec<Command>) -> RetrocompResult<()> {
        let passes = split_passes(commands)?;
        let mut st = self.state.borrow_mut();
        st.stats.submits += 1;
        for pass in passes {
            let mut target = st.textures.remove(&pass.target).ok_or_else(|| {
                RetrocompError::resource(format!("unknown render target {:?}", pass.target))
            })?;
            let result = run_pass(&st, &mut target, pass.clear, &pass.draws);
            st.textures.insert(pass.target, target);
            result?;
            st.stats.passes += 1;
            st.stats.draws += pass.draws.len() as u64;
        }
        Ok(())
    }
}

fn run_pass(
    st: &SoftState,
    target: &mut SoftTexture,
    clear: Option<[f32; 4]>,
    draws: &[DrawCall],
) -> RetrocompResult<()> {
    if target.desc.format != TextureFormat::Rgba8
        || !target.desc.usage.contains(TextureUsage::RENDER_TARGET)
    {
        return Err(RetrocompError::usage(format!(
            "{} texture is not a render target",
            target.desc.label
        )));
    }
    if let Some(color) = clear {
        let px = color.map(unorm_to_u8);
        for chunk in target.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
    for call in draws {
        let program = *st.pipelines.get(&call.pipeline).ok_or_else(|| {
            RetrocompError::resource(format!("unknown pipeline {:?}", call.pipeline))
        })?;
        let lookup = |id: TextureId| {
            st.textures.get(&id).ok_or_else(|| {
                RetrocompError::usage(format!(
                    "texture {id:?} is missing or is the current render target"
                ))
            })
        };
        let source = lookup(call.textures.source)?;
        match program {
            FragmentProgram::Sample => {
                let filter = source.filter;
                rasterize(target, call, |u, v| {
                    modulate(source.sample(u, v, filter), call.color)
                });
            }
            FragmentProgram::PaletteLookup => {
                let palette = call.textures.palette.map(lookup).transpose()?;
                let mask = call.textures.mask.map(lookup).transpose()?;
                rasterize(target, call, |u, v| {
                    let index = source.sample(u, v, FilterMode::Nearest)[0];
                    let color = palette
                        .map(|p| p.sample(index * PALETTE_ADJUST, 0.0, FilterMode::Nearest))
                        .unwrap_or([0.0; 4]);
                    let coverage = mask
                        .map(|m| m.sample(u, v, FilterMode::Nearest)[0])
                        .unwrap_or(1.0);
                    modulate(color.map(|c| c * coverage), call.color)
                });
            }
        }
    }
    Ok(())
}

fn modulate(c: [f32; 4], m: [f32; 4]) -> [f32; 4] {
    [c[0] * m[0], c[1] * m[1], c[2] * m[2], c[3] * m[3]]
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f64,
    y: f64,
    u: f64,
    v: f64,
}

fn edge(a: ScreenVertex, b: ScreenVertex, px: f64, py: f64) -> f64 {
    (px - a.x) * (b.y - a.y) - (py - a.y) * (b.x - a.x)
}

fn is_top_left(a: ScreenVertex, b: ScreenVertex) -> bool {
    let dy = b.y - a.y;
    let dx = b.x - a.x;
    (dy == 0.0 && dx < 0.0) || dy > 0.0
}

/// Rasterises the quad in `call` into `target`, sampling each covered pixel centre with `shade`.
fn rasterize(target: &mut SoftTexture, call: &DrawCall, shade: impl Fn(f32, f32) -> [f32; 4]) {
    let vp = call.viewport;
    let screen = call.vertices.map(|vert| {
        let clip = call
            .projection
            .transform_point(vert.position[0], vert.position[1]);
        let w = if clip[3] == 0.0 { 1.0 } else { clip[3] };
        let ndc_x = (clip[0] / w) as f64;
        let ndc_y = (clip[1] / w) as f64;
        let x = vp.x as f64 + (ndc_x + 1.0) * 0.5 * vp.width as f64;
        let y = vp.y as f64 + (1.0 - ndc_y) * 0.5 * vp.height as f64;
        ScreenVertex {
            x: (x * SUBPIXEL).round() / SUBPIXEL,
            y: (y * SUBPIXEL).round() / SUBPIXEL,
            u: vert.tex_coord[0] as f64,
            v: vert.tex_coord[1] as f64,
        }
    });

    let mut clip = Rect::with_size(target.desc.width, target.desc.height).intersect(Rect::new(
        vp.x.floor() as i32,
        vp.y.floor() as i32,
        (vp.x + vp.width).ceil() as i32,
        (vp.y + vp.height).ceil() as i32,
    ));
    if let Some(scissor) = call.scissor {
        clip = clip.intersect(scissor.to_rect());
    }
    if clip.is_empty() {
        return;
    }

    for tri in [[0usize, 1, 2], [0, 2, 3]] {
        let a = screen[tri[0]];
        let mut b = screen[tri[1]];
        let mut c = screen[tri[2]];
        let mut area = edge(a, b, c.x, c.y);
        if area == 0.0 {
            continue;
        }
        if area < 0.0 {
            std::mem::swap(&mut b, &mut c);
            area = -area;
        }
        let min_x = (a.x.min(b.x).min(c.x).floor() as i32).max(clip.left);
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i32).min(clip.right);
        let min_y = (a.y.min(b.y).min(c.y).floor() as i32).max(clip.top);
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i32).min(clip.bottom);
        let tl_bc = is_top_left(b, c);
        let tl_ca = is_top_left(c, a);
        let tl_ab = is_top_left(a, b);
        for py in min_y..max_y {
            for px in min_x..max_x {
                let cx = px as f64 + 0.5;
                let cy = py as f64 + 0.5;
                let w_a = edge(b, c, cx, cy);
                let w_b = edge(c, a, cx, cy);
                let w_c = edge(a, b, cx, cy);
                let inside = |w: f64, tl: bool| w > 0.0 || (w == 0.0 && tl);
                if !(inside(w_a, tl_bc) && inside(w_b, tl_ca) && inside(w_c, tl_ab)) {
                    continue;
                }
                let u = (w_a * a.u + w_b * b.u + w_c * c.u) / area;
                let v = (w_a * a.v + w_b * b.v + w_c * c.v) / area;
                let src = shade(u as f32, v as f32);
                let off = (py as usize * target.desc.width as usize + px as usize) * 4;
                let dst = [
                    u8_to_unorm(target.data[off]),
                    u8_to_unorm(target.data[off + 1]),
                    u8_to_unorm(target.data[off + 2]),
                    u8_to_unorm(target.data[off + 3]),
                ];
                let out = call.blend.apply(src, dst);
                for (i, ch) in out.iter().enumerate() {
                    target.data[off + i] = unorm_to_u8(*ch);
                }
            }
        }
    }
}

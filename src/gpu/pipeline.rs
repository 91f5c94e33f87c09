use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::math::Matrix4;
use crate::gpu::context::SharedContext;
use crate::gpu::device::{DrawCall, PipelineDesc, PipelineStateId, TextureBindings, TextureId, Vertex};
use crate::gpu::encoder::FrameEncoder;
use crate::gpu::framebuffer::Framebuffer;
use crate::gpu::shader::ShaderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub(crate) u64);

/// Texture coordinates covering a whole texture, in [`quad_corners`] order.
pub const FULL_TEX_COORDS: [f32; 8] = [0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

/// Corners of an axis-aligned quad: bottom-left, bottom-right, top-right, top-left.
pub fn quad_corners(x: f32, y: f32, w: f32, h: f32) -> [f32; 8] {
    [x, y + h, x + w, y + h, x + w, y, x, y]
}

/// Texture coordinates covering `[0, u] x [0, v]`, in [`quad_corners`] order.
pub fn tex_coords(u: f32, v: f32) -> [f32; 8] {
    [0.0, v, u, v, u, 0.0, 0.0, 0.0]
}

/// A shader program plus the framebuffer it draws into.
pub struct Pipeline {
    ctx: SharedContext,
    id: PipelineId,
    label: &'static str,
    fragment: ShaderId,
    state: Option<PipelineStateId>,
    framebuffer: Option<Framebuffer>,
    color: [f32; 4],
    projection: Option<Matrix4>,
    palette: Option<TextureId>,
    mask: Option<TextureId>,
    pass_pending: bool,
}

impl Pipeline {
    pub fn new(ctx: &SharedContext, label: &'static str, fragment: ShaderId) -> RetrocompResult<Self> {
        let desc = PipelineDesc {
            label,
            vertex: ctx.shader(ShaderId::Vertex)?,
            fragment: ctx.shader(fragment)?,
        };
        let state = ctx.device().create_pipeline(&desc)?;
        Ok(Self {
            ctx: ctx.clone(),
            id: ctx.next_pipeline_id(),
            label,
            fragment,
            state: Some(state),
            framebuffer: None,
            color: [1.0; 4],
            projection: None,
            palette: None,
            mask: None,
            pass_pending: false,
        })
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn fragment(&self) -> ShaderId {
        self.fragment
    }

    pub fn is_active(&self) -> bool {
        self.ctx.active_pipeline() == Some(self.id)
    }

    /// Makes this the active pipeline on `enc`, superseding whichever was active, and opens a
    /// pass on the framebuffer if one is set.
    pub fn activate(&mut self, enc: &mut FrameEncoder) -> RetrocompResult<()> {
        let target = match &self.framebuffer {
            Some(fb) => Some((fb.target()?, fb.state().clear_color)),
            None => None,
        };
        enc.end_pass();
        self.ctx.active_slot().set(Some(self.id));
        self.projection = None;
        self.pass_pending = false;
        if let Some(fb) = self.framebuffer.as_mut() {
            fb.bind(self.id);
        }
        if let Some((target, clear)) = target {
            enc.begin_pass(target, clear);
        }
        tracing::trace!(pipeline = self.label, "activated");
        Ok(())
    }

    pub fn deactivate(&mut self, enc: &mut FrameEncoder) {
        if !self.is_active() {
            return;
        }
        enc.end_pass();
        if let Some(fb) = self.framebuffer.as_mut() {
            fb.unbind();
        }
        self.ctx.active_slot().set(None);
    }

    /// Swaps the framebuffer and returns the previous one. While active, the old framebuffer
    /// is deactivated and the new one takes over from the next draw.
    pub fn set_framebuffer(&mut self, framebuffer: Option<Framebuffer>) -> Option<Framebuffer> {
        let active = self.is_active();
        let mut old = std::mem::replace(&mut self.framebuffer, framebuffer);
        if active {
            if let Some(fb) = old.as_mut() {
                fb.unbind();
            }
            if let Some(fb) = self.framebuffer.as_mut() {
                fb.bind(self.id);
            }
            self.projection = None;
            self.pass_pending = true;
        }
        old
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn framebuffer_mut(&mut self) -> Option<&mut Framebuffer> {
        self.framebuffer.as_mut()
    }

    pub fn set_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.color = [r, g, b, a];
    }

    /// Overrides the framebuffer's projection until the next activation.
    pub fn set_projection(&mut self, projection: Matrix4) {
        self.projection = Some(projection);
    }

    pub fn set_palette_texture(&mut self, palette: Option<TextureId>) {
        self.palette = palette;
    }

    pub fn set_mask_texture(&mut self, mask: Option<TextureId>) {
        self.mask = mask;
    }

    fn ensure_pass(&mut self, enc: &mut FrameEncoder) -> RetrocompResult<()> {
        if !self.is_active() {
            return Err(RetrocompError::usage(format!(
                "{}: draw on inactive pipeline",
                self.label
            )));
        }
        let fb = self.framebuffer.as_ref().ok_or_else(|| {
            RetrocompError::usage(format!("{}: no framebuffer set", self.label))
        })?;
        let target = fb.target()?;
        if self.pass_pending || enc.open_target() != Some(target) {
            enc.begin_pass(target, fb.applied_state().clear_color);
            self.pass_pending = false;
        }
        Ok(())
    }

    /// Draws `texture` onto the quad `corners` (four x,y pairs in projection space).
    pub fn draw_textured(
        &mut self,
        enc: &mut FrameEncoder,
        texture: TextureId,
        corners: &[f32; 8],
        tex_coords: &[f32; 8],
    ) -> RetrocompResult<()> {
        self.ensure_pass(enc)?;
        let state = self
            .state
            .ok_or_else(|| RetrocompError::usage(format!("{}: pipeline destroyed", self.label)))?;
        let Some(fb) = self.framebuffer.as_ref() else {
            return Err(RetrocompError::usage(format!("{}: no framebuffer set", self.label)));
        };
        let applied = fb.applied_state();
        let mut vertices = [Vertex::default(); 4];
        for (i, v) in vertices.iter_mut().enumerate() {
            v.position = [corners[i * 2], corners[i * 2 + 1]];
            v.tex_coord = [tex_coords[i * 2], tex_coords[i * 2 + 1]];
        }
        enc.draw(DrawCall {
            pipeline: state,
            blend: applied.blend,
            viewport: applied.viewport,
            scissor: applied.scissor_enabled.then_some(applied.scissor_box),
            projection: self.projection.unwrap_or(applied.projection),
            color: self.color,
            textures: TextureBindings {
                source: texture,
                palette: self.palette,
                mask: self.mask,
            },
            vertices,
        })
    }

    /// Draws the whole of `texture` into the axis-aligned rect `(x, y, w, h)`.
    pub fn draw_textured_rect(
        &mut self,
        enc: &mut FrameEncoder,
        texture: TextureId,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> RetrocompResult<()> {
        self.draw_textured(enc, texture, &quad_corners(x, y, w, h), &FULL_TEX_COORDS)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_active() {
            self.ctx.active_slot().set(None);
        }
        if let Some(state) = self.state.take() {
            self.ctx.device().destroy_pipeline(state);
        }
    }
}

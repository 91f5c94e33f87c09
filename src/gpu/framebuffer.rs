use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::math::Matrix4;
use crate::gpu::blend::BlendMode;
use crate::gpu::context::{ActivePipelineSlot, GpuContext};
use crate::gpu::device::{
    FilterMode, ScissorBox, SharedDevice, TextureFormat, TextureId, TextureUsage, Viewport,
};
use crate::gpu::pipeline::PipelineId;
use crate::gpu::texture::GpuTexture;

bitflags::bitflags! {
    /// State groups copied by [`Framebuffer::copy_state_from`]. Bit 3 is reserved.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CopyMask: u32 {
        const CLEAR_COLOR = 1 << 0;
        const BLEND = 1 << 1;
        const SCISSOR_ENABLE = 1 << 2;
        const SCISSOR_BOX = 1 << 4;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FramebufferState {
    pub clear_color: [f32; 4],
    pub blend: BlendMode,
    pub scissor_enabled: bool,
    pub scissor_box: ScissorBox,
    pub viewport: Viewport,
    pub projection: Matrix4,
}

impl FramebufferState {
    fn sized(width: u32, height: u32) -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 0.0],
            blend: BlendMode::Disabled,
            scissor_enabled: false,
            scissor_box: ScissorBox::default(),
            viewport: Viewport::with_size(width, height),
            projection: Matrix4::ortho_top_left(width, height),
        }
    }
}

enum FramebufferKind {
    /// The window's drawable, bound fresh every frame.
    Backbuffer { target: Option<TextureId> },
    /// An offscreen texture owned by the framebuffer.
    Texture {
        device: SharedDevice,
        texture: Option<GpuTexture>,
        filter: FilterMode,
    },
}

/// A render target plus the render state applied while drawing into it.
///
/// Setters always update the buffered state; while the framebuffer is bound to the active
/// pipeline they are also applied immediately.
pub struct Framebuffer {
    label: &'static str,
    kind: FramebufferKind,
    width: u32,
    height: u32,
    state: FramebufferState,
    applied: FramebufferState,
    bound: Option<PipelineId>,
    slot: ActivePipelineSlot,
}

impl Framebuffer {
    pub fn backbuffer(ctx: &GpuContext, width: u32, height: u32) -> Self {
        let state = FramebufferState::sized(width, height);
        Self {
            label: "backbuffer",
            kind: FramebufferKind::Backbuffer { target: None },
            width,
            height,
            applied: state.clone(),
            state,
            bound: None,
            slot: ctx.active_slot().clone(),
        }
    }

    /// Offscreen framebuffer rendering into its own RGBA texture.
    pub fn texture_target(
        ctx: &GpuContext,
        label: &'static str,
        width: u32,
        height: u32,
    ) -> RetrocompResult<Self> {
        let device = ctx.device().clone();
        let texture = create_target_texture(&device, label, width, height, FilterMode::Nearest)?;
        let state = FramebufferState::sized(width, height);
        Ok(Self {
            label,
            kind: FramebufferKind::Texture {
                device,
                texture: Some(texture),
                filter: FilterMode::Nearest,
            },
            width,
            height,
            applied: state.clone(),
            state,
            bound: None,
            slot: ctx.active_slot().clone(),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_backbuffer(&self) -> bool {
        matches!(self.kind, FramebufferKind::Backbuffer { .. })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Buffered state, including changes not yet applied.
    pub fn state(&self) -> &FramebufferState {
        &self.state
    }

    /// State as last applied to the active pipeline.
    pub fn applied_state(&self) -> &FramebufferState {
        &self.applied
    }

    pub fn is_active(&self) -> bool {
        self.bound.is_some() && self.slot.get() == self.bound
    }

    fn sync(&mut self) {
        if self.is_active() {
            self.applied = self.state.clone();
        }
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.state.clear_color = [r, g, b, a];
        self.sync();
    }

    pub fn set_blend(&mut self, mode: BlendMode) {
        self.state.blend = mode;
        self.sync();
    }

    pub fn set_scissor_enable(&mut self, enabled: bool) {
        self.state.scissor_enabled = enabled;
        self.sync();
    }

    pub fn set_scissor_box(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.state.scissor_box = ScissorBox {
            x,
            y,
            width,
            height,
        };
        self.sync();
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        self.sync();
    }

    pub fn set_projection(&mut self, projection: Matrix4) {
        self.state.projection = projection;
        self.sync();
    }

    /// Resizes the target. Viewport and projection follow the new size; a texture target is
    /// reallocated when its dimensions change.
    pub fn set_size(&mut self, width: u32, height: u32) -> RetrocompResult<()> {
        if let FramebufferKind::Texture {
            device,
            texture,
            filter,
        } = &mut self.kind
            && (width != self.width || height != self.height || texture.is_none())
        {
            *texture = None;
            *texture = Some(create_target_texture(
                device, self.label, width, height, *filter,
            )?);
        }
        self.width = width;
        self.height = height;
        self.state.viewport = Viewport::with_size(width, height);
        self.state.projection = Matrix4::ortho_top_left(width, height);
        self.sync();
        Ok(())
    }

    /// Copies the state groups selected by `mask` from `other`.
    pub fn copy_state_from(&mut self, other: &FramebufferState, mask: CopyMask) {
        if mask.contains(CopyMask::CLEAR_COLOR) {
            self.state.clear_color = other.clear_color;
        }
        if mask.contains(CopyMask::BLEND) {
            self.state.blend = other.blend;
        }
        if mask.contains(CopyMask::SCISSOR_ENABLE) {
            self.state.scissor_enabled = other.scissor_enabled;
        }
        if mask.contains(CopyMask::SCISSOR_BOX) {
            self.state.scissor_box = other.scissor_box;
        }
        self.sync();
    }

    /// Points a backbuffer at this frame's drawable.
    pub fn set_drawable(&mut self, drawable: Option<TextureId>) -> RetrocompResult<()> {
        match &mut self.kind {
            FramebufferKind::Backbuffer { target } => {
                *target = drawable;
                Ok(())
            }
            FramebufferKind::Texture { .. } => Err(RetrocompError::usage(format!(
                "{}: texture target has no drawable",
                self.label
            ))),
        }
    }

    pub fn target(&self) -> RetrocompResult<TextureId> {
        match &self.kind {
            FramebufferKind::Backbuffer { target } => target.ok_or_else(|| {
                RetrocompError::present(format!("{}: no drawable bound", self.label))
            }),
            FramebufferKind::Texture { texture, .. } => match texture {
                Some(t) => t.id(),
                None => Err(RetrocompError::usage(format!(
                    "{}: target texture destroyed",
                    self.label
                ))),
            },
        }
    }

    /// The texture a texture target renders into.
    pub fn texture(&self) -> Option<&GpuTexture> {
        match &self.kind {
            FramebufferKind::Texture { texture, .. } => texture.as_ref(),
            FramebufferKind::Backbuffer { .. } => None,
        }
    }

    /// Sampling filter of a texture target, used when it is drawn elsewhere.
    pub fn set_filtering(&mut self, mode: FilterMode) -> RetrocompResult<()> {
        if let FramebufferKind::Texture {
            texture, filter, ..
        } = &mut self.kind
        {
            *filter = mode;
            if let Some(t) = texture.as_mut() {
                t.set_filtering(mode)?;
            }
        }
        Ok(())
    }

    pub(crate) fn bind(&mut self, pipeline: PipelineId) {
        self.bound = Some(pipeline);
        self.applied = self.state.clone();
    }

    pub(crate) fn unbind(&mut self) {
        self.bound = None;
    }
}

fn create_target_texture(
    device: &SharedDevice,
    label: &'static str,
    width: u32,
    height: u32,
    filter: FilterMode,
) -> RetrocompResult<GpuTexture> {
    let mut texture = GpuTexture::create(
        device,
        label,
        width,
        height,
        TextureFormat::Rgba8,
        TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
    )?;
    if filter != FilterMode::Nearest {
        texture.set_filtering(filter)?;
    }
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::soft::SoftwareDevice;
    use std::rc::Rc;

    fn ctx() -> crate::gpu::context::SharedContext {
        GpuContext::create(Rc::new(SoftwareDevice::new())).unwrap()
    }

    #[test]
    fn copy_state_respects_mask() {
        let ctx = ctx();
        let mut src = Framebuffer::backbuffer(&ctx, 10, 10);
        src.set_clear_color(1.0, 0.0, 0.0, 1.0);
        src.set_blend(BlendMode::Additive);
        src.set_scissor_enable(true);
        src.set_scissor_box(1, 2, 3, 4);
        let mut dst = Framebuffer::backbuffer(&ctx, 10, 10);
        dst.copy_state_from(src.state(), CopyMask::BLEND | CopyMask::SCISSOR_BOX);
        assert_eq!(dst.state().blend, BlendMode::Additive);
        assert_eq!(
            dst.state().scissor_box,
            ScissorBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4
            }
        );
        assert_eq!(dst.state().clear_color, [0.0; 4]);
        assert!(!dst.state().scissor_enabled);
    }

    #[test]
    fn copy_from_own_state_is_identity() {
        let ctx = ctx();
        let mut fb = Framebuffer::backbuffer(&ctx, 10, 10);
        fb.set_blend(BlendMode::Premultiplied);
        fb.set_scissor_box(0, 0, 5, 5);
        let snapshot = fb.state().clone();
        fb.copy_state_from(&snapshot, CopyMask::all());
        assert_eq!(fb.state(), &snapshot);
    }

    #[test]
    fn inactive_changes_are_buffered() {
        let ctx = ctx();
        let mut fb = Framebuffer::backbuffer(&ctx, 10, 10);
        fb.set_blend(BlendMode::Traditional);
        assert_eq!(fb.state().blend, BlendMode::Traditional);
        assert_eq!(fb.applied_state().blend, BlendMode::Disabled);
        let id = ctx.next_pipeline_id();
        fb.bind(id);
        ctx.active_slot().set(Some(id));
        assert!(fb.is_active());
        assert_eq!(fb.applied_state().blend, BlendMode::Traditional);
        fb.set_blend(BlendMode::Opaque);
        assert_eq!(fb.applied_state().blend, BlendMode::Opaque);
        ctx.active_slot().set(None);
        assert!(!fb.is_active());
    }

    #[test]
    fn texture_target_reallocates_on_resize() {
        let ctx = ctx();
        let mut fb = Framebuffer::texture_target(&ctx, "offscreen", 4, 4).unwrap();
        let first = fb.target().unwrap();
        fb.set_size(4, 4).unwrap();
        assert_eq!(fb.target().unwrap(), first);
        fb.set_size(8, 2).unwrap();
        assert_ne!(fb.target().unwrap(), first);
        assert_eq!(fb.texture().unwrap().width(), 8);
        assert_eq!(fb.state().viewport, Viewport::with_size(8, 2));
        assert!(fb.set_drawable(None).is_err());
    }

    #[test]
    fn backbuffer_needs_a_drawable() {
        let ctx = ctx();
        let mut fb = Framebuffer::backbuffer(&ctx, 4, 4);
        assert!(matches!(fb.target(), Err(RetrocompError::Present(_))));
        fb.set_drawable(Some(TextureId(99))).unwrap();
        assert_eq!(fb.target().unwrap(), TextureId(99));
    }
}

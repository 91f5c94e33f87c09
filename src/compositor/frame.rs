use crate::compositor::Compositor;
use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::blend::BlendMode;
use crate::gpu::encoder::FrameEncoder;
use crate::gpu::framebuffer::Framebuffer;
use crate::gpu::pipeline::{Pipeline, quad_corners};
use crate::surface::Surface;

fn backbuffer(pipeline: &mut Pipeline) -> RetrocompResult<&mut Framebuffer> {
    pipeline
        .framebuffer_mut()
        .ok_or_else(|| RetrocompError::usage("compositor pipeline has no backbuffer"))
}

#[allow(clippy::too_many_arguments)]
fn draw_surface(
    pipeline: &mut Pipeline,
    enc: &mut FrameEncoder,
    surface: &Surface,
    blend: BlendMode,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
) -> RetrocompResult<()> {
    let Some(texture) = surface.texture() else {
        return Ok(());
    };
    backbuffer(pipeline)?.set_blend(blend);
    pipeline.draw_textured(
        enc,
        texture.id()?,
        &quad_corners(x, y, w, h),
        &surface.tex_coords(),
    )
}

fn draw_in_rect(
    pipeline: &mut Pipeline,
    enc: &mut FrameEncoder,
    surface: &Surface,
    blend: BlendMode,
    rect: Rect,
) -> RetrocompResult<()> {
    draw_surface(
        pipeline,
        enc,
        surface,
        blend,
        rect.left as f32,
        rect.top as f32,
        rect.width() as f32,
        rect.height() as f32,
    )
}

impl Compositor {
    /// One frame: upload what changed, draw game screen, overlay and cursor into the next
    /// drawable, then present it.
    pub(super) fn render_frame(&mut self) -> RetrocompResult<()> {
        let Self {
            live,
            game_screen,
            overlay,
            overlay_visible,
            cursor,
            cursor_visible,
            cursor_pos,
            cursor_metrics,
            areas,
            shake_scaled,
            ..
        } = self;
        let live = live
            .as_mut()
            .ok_or_else(|| RetrocompError::usage("no live context"))?;
        // From here on the drawable is either presented or handed back.
        let drawable = live.provider.next_drawable()?;
        let ctx = live.ctx.clone();
        let pipeline = &mut live.pipeline;
        let drawn = (|| -> RetrocompResult<usize> {
            let mut enc = FrameEncoder::begin(&ctx, "frame");
            let mut overlay = overlay.as_mut().filter(|_| *overlay_visible);
            let mut cursor = cursor.as_mut().filter(|_| *cursor_visible);
            if let Some(s) = game_screen.as_mut() {
                s.upload_if_dirty(&ctx, &mut enc)?;
            }
            if let Some(s) = overlay.as_deref_mut() {
                s.upload_if_dirty(&ctx, &mut enc)?;
            }
            if let Some(c) = cursor.as_deref_mut() {
                c.surface.upload_if_dirty(&ctx, &mut enc)?;
                if let Some(m) = c.mask.as_mut() {
                    m.upload_if_dirty(&ctx, &mut enc)?;
                }
            }

            {
                let fb = backbuffer(pipeline)?;
                fb.set_drawable(Some(drawable.texture))?;
                if fb.width() != drawable.width || fb.height() != drawable.height {
                    fb.set_size(drawable.width, drawable.height)?;
                }
            }
            pipeline.activate(&mut enc)?;

            let game_rect = areas.game;
            {
                let fb = backbuffer(pipeline)?;
                if overlay.is_some() {
                    fb.set_scissor_enable(false);
                } else {
                    fb.set_scissor_box(
                        game_rect.left,
                        game_rect.top,
                        game_rect.width(),
                        game_rect.height(),
                    );
                    fb.set_scissor_enable(true);
                }
            }

            if let Some(s) = game_screen.as_ref() {
                let rect = game_rect.translate(shake_scaled.x, shake_scaled.y);
                draw_in_rect(pipeline, &mut enc, s, BlendMode::Opaque, rect)?;
            }
            if let Some(s) = overlay.as_deref() {
                draw_in_rect(pipeline, &mut enc, s, BlendMode::Traditional, areas.overlay)?;
            }
            if let Some(c) = cursor.as_deref() {
                let x = (cursor_pos.x - cursor_metrics.hotspot.x) as f32;
                let y = (cursor_pos.y - cursor_metrics.hotspot.y) as f32;
                let (w, h) = (cursor_metrics.width, cursor_metrics.height);
                match c.mask.as_ref() {
                    Some(mask) => {
                        // The mask clears or inverts what is underneath, then the premultiplied
                        // cursor is added on top of the cleared pixels.
                        draw_surface(
                            pipeline,
                            &mut enc,
                            mask,
                            BlendMode::MaskAlphaAndInvertByColor,
                            x,
                            y,
                            w,
                            h,
                        )?;
                        draw_surface(
                            pipeline,
                            &mut enc,
                            &c.surface,
                            BlendMode::Premultiplied,
                            x,
                            y,
                            w,
                            h,
                        )?;
                    }
                    None => {
                        let blend = if c.surface.is_paletted() {
                            BlendMode::Traditional
                        } else {
                            BlendMode::Premultiplied
                        };
                        draw_surface(pipeline, &mut enc, &c.surface, blend, x, y, w, h)?;
                    }
                }
            }

            backbuffer(pipeline)?.set_scissor_enable(false);
            pipeline.deactivate(&mut enc);
            let draws = enc.draw_count();
            enc.commit()?;
            Ok(draws)
        })();

        let draws = match drawn {
            Ok(draws) => draws,
            Err(err) => {
                if let Some(fb) = live.pipeline.framebuffer_mut() {
                    let _ = fb.set_drawable(None);
                }
                live.provider.discard(drawable);
                return Err(err);
            }
        };
        live.provider.present(drawable)?;
        tracing::trace!(draws, serial = drawable.serial, "frame presented");
        Ok(())
    }
}

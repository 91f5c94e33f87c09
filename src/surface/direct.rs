use crate::foundation::error::RetrocompResult;
use crate::foundation::format::PixelFormat;
use crate::gpu::context::SharedContext;
use crate::gpu::device::{FilterMode, TextureFormat, TextureUsage};
use crate::gpu::texture::GpuTexture;
use crate::surface::SurfaceCore;

/// Direct-colour surface, uploaded as RGBA8.
#[derive(Debug)]
pub struct DirectSurface {
    pub(crate) core: SurfaceCore,
    texture: Option<GpuTexture>,
}

impl DirectSurface {
    pub fn new(label: &'static str, format: PixelFormat) -> Self {
        Self {
            core: SurfaceCore::new(label, format),
            texture: None,
        }
    }

    pub(crate) fn allocate(&mut self, width: u32, height: u32) -> RetrocompResult<()> {
        self.core.allocate(width, height)?;
        Ok(())
    }

    fn ensure_texture(&mut self, ctx: &SharedContext) -> RetrocompResult<()> {
        let (bw, bh) = (self.core.buffer.width(), self.core.buffer.height());
        if let Some(t) = &self.texture
            && t.is_live()
            && t.width() == bw
            && t.height() == bh
        {
            return Ok(());
        }
        self.texture = None;
        let mut texture = GpuTexture::create(
            ctx.device(),
            self.core.label,
            bw,
            bh,
            TextureFormat::Rgba8,
            TextureUsage::SAMPLED,
        )?;
        if self.core.filter != FilterMode::Nearest {
            texture.set_filtering(self.core.filter)?;
        }
        self.texture = Some(texture);
        self.core.dirty.flag_all();
        Ok(())
    }

    pub(crate) fn upload_if_dirty(&mut self, ctx: &SharedContext) -> RetrocompResult<()> {
        self.ensure_texture(ctx)?;
        let Some(area) = self.core.prepare_upload() else {
            return Ok(());
        };
        if let Some(texture) = &self.texture {
            let buffer = &self.core.buffer;
            if buffer.format() == PixelFormat::native_rgba8() {
                let off = buffer.offset(area.left as u32, area.top as u32);
                texture.replace_region(area, &buffer.data()[off..], buffer.pitch())?;
            } else {
                let rgba = buffer.to_rgba8(area);
                texture.replace_region(area, &rgba, area.width() as usize * 4)?;
            }
        }
        self.core.dirty.clear();
        Ok(())
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        self.texture.as_ref()
    }

    pub(crate) fn set_filtering(&mut self, filter: FilterMode) -> RetrocompResult<()> {
        self.core.filter = filter;
        if let Some(t) = self.texture.as_mut() {
            t.set_filtering(filter)?;
        }
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        self.texture = None;
    }
}

#[cfg(test)]
mod tests {
    use crate::foundation::core::Rect;
    use crate::foundation::format::PixelFormat;
    use crate::gpu::context::GpuContext;
    use crate::gpu::device::GpuDevice;
    use crate::gpu::encoder::FrameEncoder;
    use crate::gpu::soft::SoftwareDevice;
    use crate::surface::Surface;
    use std::rc::Rc;

    #[test]
    fn upload_converts_and_pads() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("direct", PixelFormat::RGB565);
        s.allocate(2, 1).unwrap();
        let px = [0xF800u16.to_ne_bytes(), 0x07E0u16.to_ne_bytes()].concat();
        s.copy_rect(0, 0, 2, 1, &px, 4).unwrap();
        let mut enc = FrameEncoder::begin(&ctx, "upload");
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        assert!(!s.is_dirty());
        let tex = s.texture().unwrap();
        assert_eq!((tex.width(), tex.height()), (3, 2));
        let rb = soft.read_texture(tex.id().unwrap()).unwrap();
        assert_eq!(&rb.data[0..12], &[255, 0, 0, 255, 0, 255, 0, 255, 0, 255, 0, 255]);
        assert_eq!(&rb.data[12..24], &rb.data[0..12]);
    }

    #[test]
    fn clean_surface_uploads_nothing() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("direct", PixelFormat::native_rgba8());
        s.allocate(4, 4).unwrap();
        let mut enc = FrameEncoder::begin(&ctx, "upload");
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        let before = soft.stats().texels_uploaded;
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        assert_eq!(soft.stats().texels_uploaded, before);
        s.fill_rect(Rect::from_xywh(1, 1, 1, 1), 0).unwrap();
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        assert_eq!(soft.stats().texels_uploaded, before + 1);
    }

    #[test]
    fn destroy_keeps_client_pixels() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("direct", PixelFormat::native_rgba8());
        s.allocate(2, 2).unwrap();
        s.fill(0x12345678);
        let mut enc = FrameEncoder::begin(&ctx, "upload");
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        s.destroy();
        assert!(s.texture().is_none());
        assert_eq!(s.buffer().pixel(1, 1), 0x12345678);
        s.recreate();
        assert!(s.is_dirty());
        s.upload_if_dirty(&ctx, &mut enc).unwrap();
        assert!(s.texture().is_some());
    }
}

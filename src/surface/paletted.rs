use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::format::PixelFormat;
use crate::gpu::context::SharedContext;
use crate::gpu::device::{FilterMode, TextureFormat, TextureUsage};
use crate::gpu::encoder::FrameEncoder;
use crate::gpu::framebuffer::Framebuffer;
use crate::gpu::pipeline::Pipeline;
use crate::gpu::shader::ShaderId;
use crate::gpu::texture::GpuTexture;
use crate::surface::SurfaceCore;

pub const PALETTE_ENTRIES: usize = 256;

/// GPU side of a paletted surface: index, palette and mask textures plus the lookup pass that
/// expands them into an RGBA target.
struct PalettedGpu {
    indices: GpuTexture,
    palette: GpuTexture,
    mask: GpuTexture,
    lookup: Pipeline,
}

/// CLUT8 surface. Indices are uploaded as-is and expanded to colour on the GPU.
pub struct PalettedSurface {
    pub(crate) core: SurfaceCore,
    palette: [u8; PALETTE_ENTRIES * 4],
    palette_dirty: bool,
    /// Coverage per buffer texel (0 or 255), padding included.
    mask: Option<Vec<u8>>,
    mask_dirty: bool,
    gpu: Option<PalettedGpu>,
}

impl std::fmt::Debug for PalettedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PalettedSurface")
            .field("core", &self.core)
            .field("palette_dirty", &self.palette_dirty)
            .field("has_mask", &self.mask.is_some())
            .field("gpu", &self.gpu.is_some())
            .finish()
    }
}

impl PalettedSurface {
    pub fn new(label: &'static str) -> Self {
        Self {
            core: SurfaceCore::new(label, PixelFormat::CLUT8),
            palette: [0; PALETTE_ENTRIES * 4],
            palette_dirty: true,
            mask: None,
            mask_dirty: true,
            gpu: None,
        }
    }

    pub(crate) fn allocate(&mut self, width: u32, height: u32) -> RetrocompResult<()> {
        if self.core.allocate(width, height)? && self.mask.take().is_some() {
            self.mask_dirty = true;
        }
        Ok(())
    }

    /// Sets `count` entries from packed RGB triples starting at `start`. Alpha becomes 0xFF.
    pub fn set_palette(&mut self, start: usize, count: usize, rgb: &[u8]) -> RetrocompResult<()> {
        if start + count > PALETTE_ENTRIES {
            return Err(RetrocompError::usage(format!(
                "palette range {start}+{count} exceeds {PALETTE_ENTRIES} entries"
            )));
        }
        if rgb.len() < count * 3 {
            return Err(RetrocompError::usage(format!(
                "palette data has {} bytes, need {}",
                rgb.len(),
                count * 3
            )));
        }
        for i in 0..count {
            let dst = (start + i) * 4;
            self.palette[dst..dst + 3].copy_from_slice(&rgb[i * 3..i * 3 + 3]);
            self.palette[dst + 3] = 0xFF;
        }
        self.palette_dirty = true;
        Ok(())
    }

    /// Packed RGB triples for `count` entries from `start`.
    pub fn grab_palette(&self, start: usize, count: usize) -> RetrocompResult<Vec<u8>> {
        if start + count > PALETTE_ENTRIES {
            return Err(RetrocompError::usage(format!(
                "palette range {start}+{count} exceeds {PALETTE_ENTRIES} entries"
            )));
        }
        let mut out = Vec::with_capacity(count * 3);
        for i in start..start + count {
            out.extend_from_slice(&self.palette[i * 4..i * 4 + 3]);
        }
        Ok(out)
    }

    /// Makes entry `index` fully transparent black.
    pub fn set_color_key(&mut self, index: u8) {
        let i = index as usize * 4;
        self.palette[i..i + 4].fill(0);
        self.palette_dirty = true;
    }

    /// RGBA entry as stored.
    pub fn palette_entry(&self, index: u8) -> [u8; 4] {
        let i = index as usize * 4;
        [
            self.palette[i],
            self.palette[i + 1],
            self.palette[i + 2],
            self.palette[i + 3],
        ]
    }

    /// Per-pixel coverage over the logical area (non-zero means visible). `None` removes it.
    pub fn set_mask(&mut self, mask: Option<&[u8]>) -> RetrocompResult<()> {
        let Some(src) = mask else {
            self.mask = None;
            self.mask_dirty = true;
            return Ok(());
        };
        let (w, h) = (self.core.width as usize, self.core.height as usize);
        if src.len() < w * h {
            return Err(RetrocompError::usage(format!(
                "mask has {} bytes, need {}",
                src.len(),
                w * h
            )));
        }
        let (bw, bh) = (
            self.core.buffer.width() as usize,
            self.core.buffer.height() as usize,
        );
        let mut out = vec![0u8; bw * bh];
        for y in 0..bh {
            let sy = y.min(h.saturating_sub(1));
            for x in 0..bw {
                let sx = x.min(w.saturating_sub(1));
                if src[sy * w + sx] != 0 {
                    out[y * bw + x] = 0xFF;
                }
            }
        }
        self.mask = Some(out);
        self.mask_dirty = true;
        Ok(())
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.core.dirty.is_dirty() || self.palette_dirty || self.mask_dirty
    }

    pub fn is_palette_dirty(&self) -> bool {
        self.palette_dirty
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        self.gpu
            .as_ref()
            .and_then(|g| g.lookup.framebuffer())
            .and_then(|fb| fb.texture())
    }

    fn mask_size(&self) -> (u32, u32) {
        match self.mask {
            Some(_) => (self.core.buffer.width(), self.core.buffer.height()),
            None => (1, 1),
        }
    }

    fn ensure_gpu(&mut self, ctx: &SharedContext) -> RetrocompResult<()> {
        let (bw, bh) = (self.core.buffer.width(), self.core.buffer.height());
        if let Some(gpu) = &self.gpu
            && gpu.indices.width() == bw
            && gpu.indices.height() == bh
        {
            return Ok(());
        }
        self.gpu = None;
        let device = ctx.device();
        let label = self.core.label;
        let indices = GpuTexture::create(
            device,
            label,
            bw,
            bh,
            TextureFormat::R8,
            TextureUsage::SAMPLED,
        )?;
        let palette = GpuTexture::create(
            device,
            "palette",
            PALETTE_ENTRIES as u32,
            1,
            TextureFormat::Rgba8,
            TextureUsage::SAMPLED,
        )?;
        let (mw, mh) = self.mask_size();
        let mask = GpuTexture::create(
            device,
            "palette_mask",
            mw,
            mh,
            TextureFormat::R8,
            TextureUsage::SAMPLED,
        )?;
        let mut target = Framebuffer::texture_target(ctx, label, bw, bh)?;
        target.set_filtering(self.core.filter)?;
        let mut lookup = Pipeline::new(ctx, "palette_lookup", ShaderId::FragmentPaletteLookup)?;
        lookup.set_framebuffer(Some(target));
        self.gpu = Some(PalettedGpu {
            indices,
            palette,
            mask,
            lookup,
        });
        self.core.dirty.flag_all();
        self.palette_dirty = true;
        self.mask_dirty = true;
        Ok(())
    }

    pub(crate) fn upload_if_dirty(
        &mut self,
        ctx: &SharedContext,
        enc: &mut FrameEncoder,
    ) -> RetrocompResult<()> {
        self.ensure_gpu(ctx)?;
        if !self.is_dirty() {
            return Ok(());
        }
        let (mw, mh) = self.mask_size();
        let Self {
            core,
            palette,
            palette_dirty,
            mask,
            mask_dirty,
            gpu,
        } = self;
        let Some(gpu) = gpu.as_mut() else {
            return Ok(());
        };

        if let Some(area) = core.prepare_upload() {
            let off = core.buffer.offset(area.left as u32, area.top as u32);
            gpu.indices
                .replace_region(area, &core.buffer.data()[off..], core.buffer.pitch())?;
        }
        if *palette_dirty {
            gpu.palette.replace_region(
                Rect::with_size(PALETTE_ENTRIES as u32, 1),
                &palette[..],
                PALETTE_ENTRIES * 4,
            )?;
        }
        if *mask_dirty {
            if gpu.mask.width() != mw || gpu.mask.height() != mh {
                gpu.mask = GpuTexture::create(
                    ctx.device(),
                    "palette_mask",
                    mw,
                    mh,
                    TextureFormat::R8,
                    TextureUsage::SAMPLED,
                )?;
            }
            match mask {
                Some(coverage) => {
                    gpu.mask
                        .replace_region(Rect::with_size(mw, mh), coverage, mw as usize)?
                }
                None => gpu
                    .mask
                    .replace_region(Rect::with_size(1, 1), &[0xFF], 1)?,
            }
        }

        let (bw, bh) = (core.buffer.width() as f32, core.buffer.height() as f32);
        gpu.lookup.set_palette_texture(Some(gpu.palette.id()?));
        gpu.lookup.set_mask_texture(Some(gpu.mask.id()?));
        gpu.lookup.activate(enc)?;
        gpu.lookup
            .draw_textured_rect(enc, gpu.indices.id()?, 0.0, 0.0, bw, bh)?;
        gpu.lookup.deactivate(enc);

        core.dirty.clear();
        *palette_dirty = false;
        *mask_dirty = false;
        Ok(())
    }

    pub(crate) fn set_filtering(&mut self, filter: FilterMode) -> RetrocompResult<()> {
        self.core.filter = filter;
        if let Some(fb) = self
            .gpu
            .as_mut()
            .and_then(|g| g.lookup.framebuffer_mut())
        {
            fb.set_filtering(filter)?;
        }
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        self.gpu = None;
    }

    pub(crate) fn recreate(&mut self) {
        self.core.dirty.flag_all();
        self.palette_dirty = true;
        self.mask_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::GpuContext;
    use crate::gpu::device::GpuDevice;
    use crate::gpu::soft::SoftwareDevice;
    use crate::surface::Surface;
    use std::rc::Rc;

    fn expand(soft: &SoftwareDevice, ctx: &SharedContext, s: &mut Surface) -> Vec<u8> {
        let mut enc = FrameEncoder::begin(ctx, "expand");
        s.upload_if_dirty(ctx, &mut enc).unwrap();
        enc.commit().unwrap();
        soft.read_texture(s.texture().unwrap().id().unwrap())
            .unwrap()
            .data
    }

    #[test]
    fn palette_entries_get_opaque_alpha_and_key_clears() {
        let mut p = PalettedSurface::new("p");
        p.set_palette(10, 2, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(p.palette_entry(10), [1, 2, 3, 255]);
        assert_eq!(p.palette_entry(11), [4, 5, 6, 255]);
        assert_eq!(p.grab_palette(10, 2).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        p.set_color_key(11);
        assert_eq!(p.palette_entry(11), [0, 0, 0, 0]);
        assert!(p.set_palette(255, 2, &[0; 6]).is_err());
        assert!(p.set_palette(0, 2, &[0; 5]).is_err());
    }

    #[test]
    fn expansion_looks_up_every_index() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("game", PixelFormat::CLUT8);
        s.allocate(3, 1).unwrap();
        let p = s.as_paletted_mut().unwrap();
        p.set_palette(0, 3, &[0, 0, 0, 255, 0, 0, 0, 0, 255]).unwrap();
        p.set_palette(255, 1, &[9, 9, 9]).unwrap();
        s.copy_rect(0, 0, 3, 1, &[1, 2, 255], 3).unwrap();
        let data = expand(&soft, &ctx, &mut s);
        assert_eq!(&data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&data[4..8], &[0, 0, 255, 255]);
        assert_eq!(&data[8..12], &[9, 9, 9, 255]);
        assert!(!s.is_dirty());
    }

    #[test]
    fn palette_only_change_re_expands() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("game", PixelFormat::CLUT8);
        s.allocate(1, 1).unwrap();
        s.as_paletted_mut()
            .unwrap()
            .set_palette(0, 1, &[1, 1, 1])
            .unwrap();
        let first = expand(&soft, &ctx, &mut s);
        assert_eq!(&first[0..4], &[1, 1, 1, 255]);
        let p = s.as_paletted_mut().unwrap();
        p.set_palette(0, 1, &[200, 100, 50]).unwrap();
        assert!(s.is_dirty());
        let second = expand(&soft, &ctx, &mut s);
        assert_eq!(&second[0..4], &[200, 100, 50, 255]);
    }

    #[test]
    fn mask_hides_pixels() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("cursor", PixelFormat::CLUT8);
        s.allocate(2, 1).unwrap();
        let p = s.as_paletted_mut().unwrap();
        p.set_palette(0, 1, &[50, 60, 70]).unwrap();
        p.set_mask(Some(&[1, 0])).unwrap();
        let data = expand(&soft, &ctx, &mut s);
        assert_eq!(&data[0..4], &[50, 60, 70, 255]);
        assert_eq!(&data[4..8], &[0, 0, 0, 0]);
        s.as_paletted_mut().unwrap().set_mask(None).unwrap();
        let data = expand(&soft, &ctx, &mut s);
        assert_eq!(&data[4..8], &[50, 60, 70, 255]);
    }

    #[test]
    fn destroy_and_recreate_restores_output() {
        let soft = Rc::new(SoftwareDevice::new());
        let ctx = GpuContext::create(soft.clone()).unwrap();
        let mut s = Surface::new("game", PixelFormat::CLUT8);
        s.allocate(2, 2).unwrap();
        s.as_paletted_mut()
            .unwrap()
            .set_palette(4, 1, &[8, 16, 32])
            .unwrap();
        s.fill(4);
        let before = expand(&soft, &ctx, &mut s);
        s.destroy();
        assert_eq!(soft.stats().live_textures, 0);
        s.recreate();
        let after = expand(&soft, &ctx, &mut s);
        assert_eq!(before, after);
    }
}

//! Client-side pixel buffers mirrored into GPU textures.

pub mod buffer;
pub mod direct;
pub mod paletted;

pub use buffer::PixelBuffer;
pub use direct::DirectSurface;
pub use paletted::PalettedSurface;

use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::format::PixelFormat;
use crate::gpu::context::SharedContext;
use crate::gpu::device::FilterMode;
use crate::gpu::encoder::FrameEncoder;
use crate::gpu::pipeline;
use crate::gpu::texture::GpuTexture;

/// Extra texels right of and below the logical area, so linear filtering at the edge samples a
/// copy of the edge rather than stale data.
pub const SURFACE_PADDING: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyTracker {
    all: bool,
    area: Rect,
}

impl DirtyTracker {
    pub fn add(&mut self, rect: Rect) {
        self.area.extend(rect);
    }

    pub fn flag_all(&mut self) {
        self.all = true;
    }

    pub fn clear(&mut self) {
        self.all = false;
        self.area = Rect::default();
    }

    pub fn is_dirty(&self) -> bool {
        self.all || !self.area.is_empty()
    }

    /// Dirty region clipped to `bounds`; all of `bounds` when everything is dirty.
    pub fn area(&self, bounds: Rect) -> Rect {
        if self.all {
            bounds
        } else {
            self.area.intersect(bounds)
        }
    }
}

/// State shared by both surface kinds.
#[derive(Debug)]
pub(crate) struct SurfaceCore {
    pub(crate) label: &'static str,
    pub(crate) buffer: PixelBuffer,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) dirty: DirtyTracker,
    pub(crate) filter: FilterMode,
}

impl SurfaceCore {
    fn new(label: &'static str, format: PixelFormat) -> Self {
        Self {
            label,
            buffer: PixelBuffer::new(0, 0, format),
            width: 0,
            height: 0,
            dirty: DirtyTracker::default(),
            filter: FilterMode::Nearest,
        }
    }

    /// Returns whether the buffer was reallocated.
    fn allocate(&mut self, width: u32, height: u32) -> RetrocompResult<bool> {
        if width == 0 || height == 0 {
            return Err(RetrocompError::usage(format!(
                "{}: cannot allocate {width}x{height}",
                self.label
            )));
        }
        if width == self.width && height == self.height {
            return Ok(false);
        }
        let (Some(padded_w), Some(padded_h)) = (
            width.checked_add(SURFACE_PADDING),
            height.checked_add(SURFACE_PADDING),
        ) else {
            return Err(RetrocompError::usage(format!(
                "{}: {width}x{height} leaves no room for padding",
                self.label
            )));
        };
        self.buffer = PixelBuffer::new(padded_w, padded_h, self.buffer.format());
        self.width = width;
        self.height = height;
        self.dirty.flag_all();
        tracing::debug!(label = self.label, width, height, "surface allocated");
        Ok(true)
    }

    fn logical(&self) -> Rect {
        Rect::with_size(self.width, self.height)
    }

    fn check_inside(&self, rect: Rect) -> RetrocompResult<()> {
        if !self.logical().contains_rect(rect) {
            return Err(RetrocompError::usage(format!(
                "{}: rect {rect:?} outside {}x{}",
                self.label, self.width, self.height
            )));
        }
        Ok(())
    }

    fn copy_rect(
        &mut self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        src: &[u8],
        src_pitch: usize,
    ) -> RetrocompResult<()> {
        let rect = Rect::from_xywh(x as i32, y as i32, w as i32, h as i32);
        self.check_inside(rect)?;
        self.buffer.copy_rect_from(x, y, w, h, src, src_pitch)?;
        self.dirty.add(rect);
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: u32) -> RetrocompResult<()> {
        self.check_inside(rect)?;
        self.buffer.fill_rect(rect, color);
        self.dirty.add(rect);
        Ok(())
    }

    fn fill(&mut self, color: u32) {
        let logical = self.logical();
        self.buffer.fill_rect(logical, color);
        self.dirty.flag_all();
    }

    /// Region to upload, with the padding row/column refreshed when the dirty area touches the
    /// logical edge. `None` when nothing is dirty.
    fn prepare_upload(&mut self) -> Option<Rect> {
        if !self.dirty.is_dirty() {
            return None;
        }
        let mut area = self.dirty.area(self.logical());
        if area.is_empty() {
            return None;
        }
        let bw = self.buffer.width();
        let bh = self.buffer.height();
        if area.right as u32 == self.width && bw > self.width {
            self.buffer
                .duplicate_column(self.width, area.top as u32, area.bottom as u32);
            area.right += 1;
        }
        if area.bottom as u32 == self.height && bh > self.height {
            self.buffer
                .duplicate_row(self.height, area.left as u32, area.right as u32);
            area.bottom += 1;
        }
        Some(area)
    }

    fn tex_coords(&self) -> [f32; 8] {
        let bw = self.buffer.width().max(1) as f32;
        let bh = self.buffer.height().max(1) as f32;
        pipeline::tex_coords(self.width as f32 / bw, self.height as f32 / bh)
    }
}

/// A surface is either direct-colour or paletted (CLUT8).
#[derive(Debug)]
pub enum Surface {
    Direct(DirectSurface),
    Paletted(PalettedSurface),
}

impl Surface {
    /// Creates an empty surface; CLUT8 formats get a paletted one.
    pub fn new(label: &'static str, format: PixelFormat) -> Self {
        if format.is_clut8() {
            Surface::Paletted(PalettedSurface::new(label))
        } else {
            Surface::Direct(DirectSurface::new(label, format))
        }
    }

    fn core(&self) -> &SurfaceCore {
        match self {
            Surface::Direct(s) => &s.core,
            Surface::Paletted(s) => &s.core,
        }
    }

    fn core_mut(&mut self) -> &mut SurfaceCore {
        match self {
            Surface::Direct(s) => &mut s.core,
            Surface::Paletted(s) => &mut s.core,
        }
    }

    /// Sizes the logical area; reallocates (and marks everything dirty) only when it changes.
    pub fn allocate(&mut self, width: u32, height: u32) -> RetrocompResult<()> {
        match self {
            Surface::Direct(s) => s.allocate(width, height),
            Surface::Paletted(s) => s.allocate(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.core().width
    }

    pub fn height(&self) -> u32 {
        self.core().height
    }

    pub fn format(&self) -> PixelFormat {
        self.core().buffer.format()
    }

    pub fn label(&self) -> &'static str {
        self.core().label
    }

    /// Whole client buffer, padding included.
    pub fn buffer(&self) -> &PixelBuffer {
        &self.core().buffer
    }

    /// Direct access for in-place edits; the caller must flag what it touched.
    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.core_mut().buffer
    }

    pub fn copy_rect(
        &mut self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        src: &[u8],
        src_pitch: usize,
    ) -> RetrocompResult<()> {
        self.core_mut().copy_rect(x, y, w, h, src, src_pitch)
    }

    pub fn fill(&mut self, color: u32) {
        self.core_mut().fill(color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: u32) -> RetrocompResult<()> {
        self.core_mut().fill_rect(rect, color)
    }

    pub fn flag_dirty(&mut self) {
        self.core_mut().dirty.flag_all();
    }

    pub fn add_dirty_area(&mut self, rect: Rect) {
        self.core_mut().dirty.add(rect);
    }

    pub fn dirty_area(&self) -> Rect {
        let core = self.core();
        core.dirty.area(core.logical())
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Surface::Direct(s) => s.core.dirty.is_dirty(),
            Surface::Paletted(s) => s.is_dirty(),
        }
    }

    /// Pushes pending client-side changes to the GPU, creating GPU objects on first use.
    pub fn upload_if_dirty(
        &mut self,
        ctx: &SharedContext,
        enc: &mut FrameEncoder,
    ) -> RetrocompResult<()> {
        match self {
            Surface::Direct(s) => s.upload_if_dirty(ctx),
            Surface::Paletted(s) => s.upload_if_dirty(ctx, enc),
        }
    }

    /// Texture to draw: the uploaded pixels, or the expanded colours of a paletted surface.
    pub fn texture(&self) -> Option<&GpuTexture> {
        match self {
            Surface::Direct(s) => s.texture(),
            Surface::Paletted(s) => s.texture(),
        }
    }

    /// Texture coordinates covering the logical area, in quad corner order.
    pub fn tex_coords(&self) -> [f32; 8] {
        self.core().tex_coords()
    }

    pub fn set_filtering(&mut self, linear: bool) -> RetrocompResult<()> {
        match self {
            Surface::Direct(s) => s.set_filtering(FilterMode::from_enabled(linear)),
            Surface::Paletted(s) => s.set_filtering(FilterMode::from_enabled(linear)),
        }
    }

    /// Releases GPU objects. The client buffer survives.
    pub fn destroy(&mut self) {
        match self {
            Surface::Direct(s) => s.destroy(),
            Surface::Paletted(s) => s.destroy(),
        }
    }

    /// Marks everything for re-upload after a new context appears.
    pub fn recreate(&mut self) {
        match self {
            Surface::Direct(s) => s.core.dirty.flag_all(),
            Surface::Paletted(s) => s.recreate(),
        }
    }

    pub fn as_paletted(&self) -> Option<&PalettedSurface> {
        match self {
            Surface::Paletted(s) => Some(s),
            Surface::Direct(_) => None,
        }
    }

    pub fn as_paletted_mut(&mut self) -> Option<&mut PalettedSurface> {
        match self {
            Surface::Paletted(s) => Some(s),
            Surface::Direct(_) => None,
        }
    }

    pub fn is_paletted(&self) -> bool {
        matches!(self, Surface::Paletted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_area_extends_and_clips() {
        let mut t = DirtyTracker::default();
        assert!(!t.is_dirty());
        t.add(Rect::from_xywh(2, 2, 2, 2));
        t.add(Rect::from_xywh(6, 1, 1, 1));
        assert_eq!(t.area(Rect::with_size(10, 10)), Rect::new(2, 1, 7, 4));
        t.flag_all();
        assert_eq!(t.area(Rect::with_size(5, 5)), Rect::with_size(5, 5));
        t.clear();
        assert!(!t.is_dirty());
    }

    #[test]
    fn allocation_pads_buffer_and_flags_dirty() {
        let mut s = Surface::new("t", PixelFormat::RGB565);
        s.allocate(10, 4).unwrap();
        assert_eq!(s.buffer().width(), 11);
        assert_eq!(s.buffer().height(), 5);
        assert!(s.is_dirty());
        assert_eq!(s.dirty_area(), Rect::with_size(10, 4));
        assert!(s.allocate(0, 4).is_err());
        assert!(s.allocate(u32::MAX, 1).is_err());
        assert_eq!((s.width(), s.height()), (10, 4));
    }

    #[test]
    fn copy_rect_outside_logical_area_is_rejected() {
        let mut s = Surface::new("t", PixelFormat::CLUT8);
        s.allocate(4, 4).unwrap();
        assert!(s.copy_rect(4, 0, 1, 1, &[1], 1).is_err());
        assert!(s.copy_rect(3, 3, 1, 1, &[1], 1).is_ok());
    }

    #[test]
    fn edge_duplication_only_when_touching_logical_edge() {
        let mut s = Surface::new("t", PixelFormat::CLUT8);
        s.allocate(3, 2).unwrap();
        if let Surface::Paletted(p) = &mut s {
            p.core.dirty.clear();
        }
        s.copy_rect(0, 0, 2, 1, &[5, 6], 2).unwrap();
        let area = match &mut s {
            Surface::Paletted(p) => p.core.prepare_upload(),
            Surface::Direct(_) => unreachable!(),
        };
        assert_eq!(area, Some(Rect::from_xywh(0, 0, 2, 1)));

        s.copy_rect(2, 1, 1, 1, &[9], 1).unwrap();
        let area = match &mut s {
            Surface::Paletted(p) => p.core.prepare_upload(),
            Surface::Direct(_) => unreachable!(),
        };
        assert_eq!(area, Some(Rect::new(0, 0, 4, 3)));
        let buf = s.buffer();
        assert_eq!(buf.pixel(3, 1), 9);
        assert_eq!(buf.pixel(3, 2), 9);
        assert_eq!(buf.pixel(0, 2), 0);
    }
}

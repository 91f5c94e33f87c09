use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::format::PixelFormat;

/// Client-side pixel storage, rows `pitch` bytes apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pitch: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let pitch = width as usize * format.bpp();
        Self {
            width,
            height,
            pitch,
            format,
            data: vec![0; pitch * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.pitch + x as usize * self.format.bpp()
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let off = self.offset(x, y);
        self.format.read_pixel(&self.data[off..])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: u32) {
        let off = self.offset(x, y);
        self.format.write_pixel(&mut self.data[off..], color);
    }

    /// Fills `rect`, clipped to the buffer.
    pub fn fill_rect(&mut self, rect: Rect, color: u32) {
        let r = rect.intersect(Rect::with_size(self.width, self.height));
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                self.set_pixel(x as u32, y as u32, color);
            }
        }
    }

    /// Copies a `w`x`h` block from `src` (rows `src_pitch` bytes apart) to `(x, y)`.
    pub fn copy_rect_from(
        &mut self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        src: &[u8],
        src_pitch: usize,
    ) -> RetrocompResult<()> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        if x + w > self.width || y + h > self.height {
            return Err(RetrocompError::usage(format!(
                "copy of {w}x{h} at ({x},{y}) exceeds {}x{} buffer",
                self.width, self.height
            )));
        }
        let row_len = w as usize * self.format.bpp();
        if src_pitch < row_len || src.len() < (h as usize - 1) * src_pitch + row_len {
            return Err(RetrocompError::usage(format!(
                "source of {} bytes with pitch {src_pitch} is too small for {w}x{h}",
                src.len()
            )));
        }
        for row in 0..h as usize {
            let dst = self.offset(x, y + row as u32);
            self.data[dst..dst + row_len]
                .copy_from_slice(&src[row * src_pitch..row * src_pitch + row_len]);
        }
        Ok(())
    }

    /// Copies `rect` out into `dst` (rows `dst_pitch` bytes apart).
    pub fn copy_rect_to(&self, rect: Rect, dst: &mut [u8], dst_pitch: usize) -> RetrocompResult<()> {
        if rect.is_empty() {
            return Ok(());
        }
        if !Rect::with_size(self.width, self.height).contains_rect(rect) {
            return Err(RetrocompError::usage(format!(
                "read of {rect:?} exceeds {}x{} buffer",
                self.width, self.height
            )));
        }
        let row_len = rect.width() as usize * self.format.bpp();
        let rows = rect.height() as usize;
        if dst_pitch < row_len || dst.len() < (rows - 1) * dst_pitch + row_len {
            return Err(RetrocompError::usage("destination buffer too small"));
        }
        for row in 0..rows {
            let src = self.offset(rect.left as u32, rect.top as u32 + row as u32);
            dst[row * dst_pitch..row * dst_pitch + row_len]
                .copy_from_slice(&self.data[src..src + row_len]);
        }
        Ok(())
    }

    /// Converts `rect` to tightly packed RGBA8 (memory order R, G, B, A).
    pub fn to_rgba8(&self, rect: Rect) -> Vec<u8> {
        let mut out = Vec::with_capacity((rect.width() * rect.height()).max(0) as usize * 4);
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                let (a, r, g, b) = self.format.color_to_argb(self.pixel(x as u32, y as u32));
                out.extend_from_slice(&[r, g, b, a]);
            }
        }
        out
    }

    /// Duplicates column `x - 1` into column `x` over rows `top..bottom`.
    pub(crate) fn duplicate_column(&mut self, x: u32, top: u32, bottom: u32) {
        let bpp = self.format.bpp();
        for y in top..bottom {
            let src = self.offset(x - 1, y);
            self.data.copy_within(src..src + bpp, src + bpp);
        }
    }

    /// Duplicates row `y - 1` into row `y` over columns `left..right`.
    pub(crate) fn duplicate_row(&mut self, y: u32, left: u32, right: u32) {
        let src = self.offset(left, y - 1);
        let len = (right - left) as usize * self.format.bpp();
        self.data.copy_within(src..src + len, src + self.pitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_rect_honours_pitch() {
        let mut buf = PixelBuffer::new(4, 3, PixelFormat::CLUT8);
        let src = [1u8, 2, 9, 3, 4, 9];
        buf.copy_rect_from(1, 1, 2, 2, &src, 3).unwrap();
        assert_eq!(buf.data(), &[0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]);
        let mut out = [0u8; 4];
        buf.copy_rect_to(Rect::from_xywh(1, 1, 2, 2), &mut out, 2)
            .unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn copy_rect_rejects_out_of_bounds_and_short_source() {
        let mut buf = PixelBuffer::new(4, 4, PixelFormat::RGB565);
        assert!(buf.copy_rect_from(3, 0, 2, 1, &[0; 4], 4).is_err());
        assert!(buf.copy_rect_from(0, 0, 2, 2, &[0; 5], 4).is_err());
        assert!(buf.copy_rect_from(0, 0, 0, 2, &[], 0).is_ok());
    }

    #[test]
    fn rgba8_conversion_expands_565() {
        let mut buf = PixelBuffer::new(2, 1, PixelFormat::RGB565);
        buf.set_pixel(0, 0, 0xF800);
        buf.set_pixel(1, 0, 0x001F);
        assert_eq!(
            buf.to_rgba8(Rect::with_size(2, 1)),
            vec![255, 0, 0, 255, 0, 0, 255, 255]
        );
    }

    #[test]
    fn duplicate_edges() {
        let mut buf = PixelBuffer::new(3, 3, PixelFormat::CLUT8);
        buf.copy_rect_from(0, 0, 2, 2, &[1, 2, 3, 4], 2).unwrap();
        buf.duplicate_column(2, 0, 2);
        buf.duplicate_row(2, 0, 3);
        assert_eq!(buf.data(), &[1, 2, 2, 3, 4, 4, 3, 4, 4]);
    }
}

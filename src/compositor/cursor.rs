//! Cursor image preparation: colour keys, premultiplication, masks, and scaling.

use crate::foundation::core::Point;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::foundation::format::PixelFormat;
use crate::foundation::math::Frac;
use crate::surface::Surface;

/// Mask value: the cursor pixel is not drawn and the screen shows through.
pub const CURSOR_MASK_TRANSPARENT: u8 = 0;
/// Mask value: the cursor pixel replaces the screen.
pub const CURSOR_MASK_OPAQUE: u8 = 1;
/// Mask value: the screen pixel underneath is colour-inverted.
pub const CURSOR_MASK_INVERT: u8 = 2;

/// Cursor pixels as handed over by the VM.
#[derive(Clone, Copy, Debug)]
pub struct CursorImage<'a> {
    /// `width * height` pixels, tightly packed in `format`.
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    /// Pixel value drawn transparent when there is no mask.
    pub key_color: u32,
    /// Draw at native size instead of following the game screen's scale.
    pub dont_scale: bool,
    pub format: PixelFormat,
    /// Optional `width * height` bytes of `CURSOR_MASK_*` values.
    pub mask: Option<&'a [u8]>,
}

impl CursorImage<'_> {
    pub(crate) fn validate(&self) -> RetrocompResult<()> {
        let count = self.width as usize * self.height as usize;
        let need = count * self.format.bpp();
        if self.pixels.len() < need {
            return Err(RetrocompError::usage(format!(
                "cursor has {} bytes, need {need}",
                self.pixels.len()
            )));
        }
        if let Some(mask) = self.mask
            && mask.len() < count
        {
            return Err(RetrocompError::usage(format!(
                "cursor mask has {} bytes, need {count}",
                mask.len()
            )));
        }
        Ok(())
    }
}

/// Built cursor surfaces.
#[derive(Debug)]
pub(crate) struct BuiltCursor {
    pub surface: Surface,
    pub mask: Option<Surface>,
    /// Hotspot within `surface`, border included.
    pub hotspot: Point,
}

/// Format the cursor surface uses: the source format when it can be kept as is, otherwise a
/// format with alpha so the key colour can become transparent.
pub(crate) fn cursor_format(source: PixelFormat, alpha_format: PixelFormat) -> PixelFormat {
    if source.is_clut8() || (source.has_alpha() && source.is_supported()) {
        source
    } else {
        alpha_format
    }
}

fn premultiply(c: u8, a: u8) -> u8 {
    (c as u32 * a as u32 / 255) as u8
}

/// Builds the cursor surface and, when a mask is given, the mask surface drawn under it.
///
/// Scalable cursors get a one-pixel transparent border so linear filtering fades to nothing
/// at the edges.
pub(crate) fn build_cursor(
    image: &CursorImage<'_>,
    alpha_format: PixelFormat,
) -> RetrocompResult<BuiltCursor> {
    image.validate()?;
    let (w, h) = (image.width, image.height);
    let border = if image.dont_scale { 0 } else { 1 };
    let (Some(sw), Some(sh)) = (w.checked_add(2 * border), h.checked_add(2 * border)) else {
        return Err(RetrocompError::usage(format!(
            "cursor {w}x{h} is too large for its border"
        )));
    };
    let src_format = image.format;
    let format = cursor_format(src_format, alpha_format);
    let use_key = image.mask.is_none();

    let mut surface = Surface::new("cursor", format);
    surface.allocate(sw, sh)?;

    if surface.is_paletted() {
        if border > 0 {
            surface.fill(image.key_color & 0xFF);
        }
        surface.copy_rect(border, border, w, h, image.pixels, w as usize)?;
        let coverage = image.mask.map(|mask| {
            let mut coverage = vec![0u8; (sw * sh) as usize];
            for y in 0..h {
                for x in 0..w {
                    if mask[(y * w + x) as usize] == CURSOR_MASK_OPAQUE {
                        coverage[((y + border) * sw + x + border) as usize] = 1;
                    }
                }
            }
            coverage
        });
        if let Some(p) = surface.as_paletted_mut() {
            p.set_mask(coverage.as_deref())?;
        }
    } else {
        let bpp = src_format.bpp();
        let buffer = surface.buffer_mut();
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                let color = src_format.read_pixel(&image.pixels[i * bpp..]);
                let out = if use_key && color == image.key_color {
                    0
                } else if image
                    .mask
                    .is_some_and(|m| m[i] != CURSOR_MASK_OPAQUE)
                {
                    0
                } else {
                    let (a, r, g, b) = src_format.color_to_argb(color);
                    if a == 0xFF {
                        format.argb_to_color(a, r, g, b)
                    } else {
                        format.argb_to_color(a, premultiply(r, a), premultiply(g, a), premultiply(b, a))
                    }
                };
                buffer.set_pixel(x + border, y + border, out);
            }
        }
    }
    surface.flag_dirty();

    let mask = match image.mask {
        Some(mask) => {
            let mut ms = Surface::new("cursor_mask", alpha_format);
            ms.allocate(sw, sh)?;
            let buffer = ms.buffer_mut();
            for y in 0..h {
                for x in 0..w {
                    let i = (y * w + x) as usize;
                    let mut alpha = if src_format.is_clut8() {
                        0xFF
                    } else {
                        let color = src_format.read_pixel(&image.pixels[i * src_format.bpp()..]);
                        src_format.color_to_argb(color).0
                    };
                    let mut inv = 0;
                    match mask[i] {
                        CURSOR_MASK_TRANSPARENT => alpha = 0,
                        CURSOR_MASK_INVERT => {
                            alpha = 0xFF;
                            inv = 0xFF;
                        }
                        _ => {}
                    }
                    buffer.set_pixel(
                        x + border,
                        y + border,
                        alpha_format.argb_to_color(alpha, inv, inv, inv),
                    );
                }
            }
            ms.flag_dirty();
            Some(ms)
        }
        None => None,
    };

    Ok(BuiltCursor {
        surface,
        mask,
        hotspot: Point::new(image.hotspot_x + border as i32, image.hotspot_y + border as i32),
    })
}

/// Cursor size and hotspot in window pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CursorMetrics {
    pub hotspot: Point,
    pub width: f32,
    pub height: f32,
}

/// Scales a cursor by the game screen's draw-rect factor, in 16.16 fixed point. Unscalable
/// cursors, or a missing game screen, keep native size.
pub(crate) fn scale_cursor(
    size: (u32, u32),
    hotspot: Point,
    dont_scale: bool,
    game_draw: (i32, i32),
    game_size: (u32, u32),
) -> CursorMetrics {
    if dont_scale || game_size.0 == 0 || game_size.1 == 0 || game_draw.0 <= 0 || game_draw.1 <= 0 {
        return CursorMetrics {
            hotspot,
            width: size.0 as f32,
            height: size.1 as f32,
        };
    }
    let fx = Frac::ratio(game_draw.0 as i64, game_size.0 as i64);
    let fy = Frac::ratio(game_draw.1 as i64, game_size.1 as i64);
    CursorMetrics {
        hotspot: Point::new(
            fx.mul_int(hotspot.x as i64).to_int() as i32,
            fy.mul_int(hotspot.y as i64).to_int() as i32,
        ),
        width: fx.mul_int(size.0 as i64).to_f64() as f32,
        height: fy.mul_int(size.1 as i64).to_f64() as f32,
    }
}

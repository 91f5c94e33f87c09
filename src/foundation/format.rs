use serde::{Deserialize, Serialize};

/// Packed pixel layout of a client buffer: bytes per pixel plus per-channel bit counts and shifts.
///
/// A format with one byte per pixel is CLUT8 (indices into a 256-entry palette). Multi-byte
/// pixels are read and written in native endianness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    pub bytes_per_pixel: u8,
    pub r_bits: u8,
    pub g_bits: u8,
    pub b_bits: u8,
    pub a_bits: u8,
    pub r_shift: u8,
    pub g_shift: u8,
    pub b_shift: u8,
    pub a_shift: u8,
}

impl PixelFormat {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        bytes_per_pixel: u8,
        r_bits: u8,
        g_bits: u8,
        b_bits: u8,
        a_bits: u8,
        r_shift: u8,
        g_shift: u8,
        b_shift: u8,
        a_shift: u8,
    ) -> Self {
        Self {
            bytes_per_pixel,
            r_bits,
            g_bits,
            b_bits,
            a_bits,
            r_shift,
            g_shift,
            b_shift,
            a_shift,
        }
    }

    pub const CLUT8: PixelFormat = PixelFormat::new(1, 0, 0, 0, 0, 0, 0, 0, 0);
    pub const RGBA8888: PixelFormat = PixelFormat::new(4, 8, 8, 8, 8, 24, 16, 8, 0);
    pub const ABGR8888: PixelFormat = PixelFormat::new(4, 8, 8, 8, 8, 0, 8, 16, 24);
    pub const RGB565: PixelFormat = PixelFormat::new(2, 5, 6, 5, 0, 11, 5, 0, 0);
    pub const RGBA5551: PixelFormat = PixelFormat::new(2, 5, 5, 5, 1, 11, 6, 1, 0);
    pub const RGBA4444: PixelFormat = PixelFormat::new(2, 4, 4, 4, 4, 12, 8, 4, 0);
    pub const RGB555: PixelFormat = PixelFormat::new(2, 5, 5, 5, 0, 10, 5, 0, 0);

    /// 32-bit format whose bytes sit in memory as R, G, B, A on this host.
    pub const fn native_rgba8() -> Self {
        if cfg!(target_endian = "little") {
            Self::ABGR8888
        } else {
            Self::RGBA8888
        }
    }

    /// The other 32-bit channel order.
    pub const fn swapped_rgba8() -> Self {
        if cfg!(target_endian = "little") {
            Self::RGBA8888
        } else {
            Self::ABGR8888
        }
    }

    /// Game screen formats the compositor accepts, best first.
    pub fn supported() -> Vec<PixelFormat> {
        vec![
            Self::native_rgba8(),
            Self::RGB565,
            Self::RGBA5551,
            Self::RGBA4444,
            Self::swapped_rgba8(),
            Self::RGB555,
            Self::CLUT8,
        ]
    }

    pub fn is_supported(&self) -> bool {
        Self::supported().contains(self)
    }

    pub fn is_clut8(&self) -> bool {
        self.bytes_per_pixel == 1
    }

    pub fn has_alpha(&self) -> bool {
        self.a_bits > 0
    }

    pub fn bpp(&self) -> usize {
        self.bytes_per_pixel as usize
    }

    /// Splits a packed colour into 8-bit `(a, r, g, b)`. Formats without alpha report 0xFF.
    pub fn color_to_argb(&self, color: u32) -> (u8, u8, u8, u8) {
        let a = if self.a_bits == 0 {
            0xFF
        } else {
            expand_channel(color, self.a_bits, self.a_shift)
        };
        (
            a,
            expand_channel(color, self.r_bits, self.r_shift),
            expand_channel(color, self.g_bits, self.g_shift),
            expand_channel(color, self.b_bits, self.b_shift),
        )
    }

    pub fn argb_to_color(&self, a: u8, r: u8, g: u8, b: u8) -> u32 {
        pack_channel(a, self.a_bits, self.a_shift)
            | pack_channel(r, self.r_bits, self.r_shift)
            | pack_channel(g, self.g_bits, self.g_shift)
            | pack_channel(b, self.b_bits, self.b_shift)
    }

    pub fn rgb_to_color(&self, r: u8, g: u8, b: u8) -> u32 {
        self.argb_to_color(0xFF, r, g, b)
    }

    /// Reads one packed pixel from the start of `bytes`.
    pub fn read_pixel(&self, bytes: &[u8]) -> u32 {
        match self.bytes_per_pixel {
            1 => bytes[0] as u32,
            2 => u16::from_ne_bytes([bytes[0], bytes[1]]) as u32,
            _ => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    pub fn write_pixel(&self, bytes: &mut [u8], color: u32) {
        match self.bytes_per_pixel {
            1 => bytes[0] = color as u8,
            2 => bytes[..2].copy_from_slice(&(color as u16).to_ne_bytes()),
            _ => bytes[..4].copy_from_slice(&color.to_ne_bytes()),
        }
    }
}

fn expand_channel(color: u32, bits: u8, shift: u8) -> u8 {
    if bits == 0 {
        return 0;
    }
    let v = (color >> shift) & ((1u32 << bits) - 1);
    if bits >= 8 {
        return v as u8;
    }
    // Replicate the high bits into the low ones so full scale maps to 0xFF.
    let mut out = 0u32;
    let mut filled = 0u32;
    while filled < 8 {
        out = (out << bits) | v;
        filled += bits as u32;
    }
    (out >> (filled - 8)) as u8
}

fn pack_channel(v: u8, bits: u8, shift: u8) -> u32 {
    if bits == 0 {
        return 0;
    }
    ((v as u32) >> (8 - bits.min(8))) << shift
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match FormatName::of(*self) {
            Some(name) => write!(f, "{}", name.as_str()),
            None => write!(
                f,
                "PixelFormat({}bpp r{}g{}b{}a{} >>{}/{}/{}/{})",
                self.bytes_per_pixel,
                self.r_bits,
                self.g_bits,
                self.b_bits,
                self.a_bits,
                self.r_shift,
                self.g_shift,
                self.b_shift,
                self.a_shift
            ),
        }
    }
}

/// Named formats, as accepted by scripts and printed by the CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatName {
    #[default]
    Clut8,
    Rgba8888,
    Abgr8888,
    Rgb565,
    Rgba5551,
    Rgba4444,
    Rgb555,
}

impl FormatName {
    pub const ALL: [FormatName; 7] = [
        FormatName::Clut8,
        FormatName::Rgba8888,
        FormatName::Abgr8888,
        FormatName::Rgb565,
        FormatName::Rgba5551,
        FormatName::Rgba4444,
        FormatName::Rgb555,
    ];

    pub fn format(self) -> PixelFormat {
        match self {
            FormatName::Clut8 => PixelFormat::CLUT8,
            FormatName::Rgba8888 => PixelFormat::RGBA8888,
            FormatName::Abgr8888 => PixelFormat::ABGR8888,
            FormatName::Rgb565 => PixelFormat::RGB565,
            FormatName::Rgba5551 => PixelFormat::RGBA5551,
            FormatName::Rgba4444 => PixelFormat::RGBA4444,
            FormatName::Rgb555 => PixelFormat::RGB555,
        }
    }

    pub fn of(format: PixelFormat) -> Option<FormatName> {
        Self::ALL.into_iter().find(|n| n.format() == format)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormatName::Clut8 => "clut8",
            FormatName::Rgba8888 => "rgba8888",
            FormatName::Abgr8888 => "abgr8888",
            FormatName::Rgb565 => "rgb565",
            FormatName::Rgba5551 => "rgba5551",
            FormatName::Rgba4444 => "rgba4444",
            FormatName::Rgb555 => "rgb555",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb565_expands_full_scale() {
        let f = PixelFormat::RGB565;
        assert_eq!(f.color_to_argb(0xF800), (0xFF, 0xFF, 0, 0));
        assert_eq!(f.color_to_argb(0x07E0), (0xFF, 0, 0xFF, 0));
        assert_eq!(f.color_to_argb(0x001F), (0xFF, 0, 0, 0xFF));
        assert_eq!(f.rgb_to_color(0xFF, 0, 0), 0xF800);
    }

    #[test]
    fn rgba4444_keeps_alpha_nibble() {
        let f = PixelFormat::RGBA4444;
        let c = f.argb_to_color(0x88, 0xFF, 0, 0);
        assert_eq!(c, 0xF008);
        assert_eq!(f.color_to_argb(c), (0x88, 0xFF, 0, 0));
    }

    #[test]
    fn native_rgba8_bytes_are_r_g_b_a() {
        let f = PixelFormat::native_rgba8();
        let mut px = [0u8; 4];
        f.write_pixel(&mut px, f.argb_to_color(4, 1, 2, 3));
        assert_eq!(px, [1, 2, 3, 4]);
        assert_eq!(f.color_to_argb(f.read_pixel(&px)), (4, 1, 2, 3));
    }

    #[test]
    fn supported_list_ends_with_clut8() {
        let formats = PixelFormat::supported();
        assert_eq!(formats.len(), 7);
        assert_eq!(formats[0], PixelFormat::native_rgba8());
        assert_eq!(*formats.last().unwrap(), PixelFormat::CLUT8);
        assert!(!PixelFormat::new(3, 8, 8, 8, 0, 16, 8, 0, 0).is_supported());
    }

    #[test]
    fn names_round_trip() {
        for name in FormatName::ALL {
            assert_eq!(FormatName::of(name.format()), Some(name));
        }
        assert_eq!(PixelFormat::RGB555.to_string(), "rgb555");
    }
}

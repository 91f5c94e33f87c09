/// Blend modes selectable on a framebuffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source replaces destination, alpha included.
    #[default]
    Disabled,
    /// Source colour replaces destination colour; destination alpha is kept.
    Opaque,
    /// Classic `src.a` / `1 - src.a` interpolation.
    Traditional,
    /// Source colour is already multiplied by its alpha.
    Premultiplied,
    Additive,
    /// Used for cursor masks: alpha clears the destination, colour inverts it.
    MaskAlphaAndInvertByColor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    OneMinusDstColor,
}

/// `out = src * src_factor + dst * dst_factor`, separately for colour and alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
}

impl BlendMode {
    pub fn equation(self) -> BlendEquation {
        use BlendFactor::*;
        let (color_src, color_dst, alpha_src, alpha_dst) = match self {
            BlendMode::Disabled => (One, Zero, One, Zero),
            BlendMode::Opaque => (One, Zero, Zero, One),
            BlendMode::Traditional => (SrcAlpha, OneMinusSrcAlpha, One, OneMinusSrcAlpha),
            BlendMode::Premultiplied => (One, OneMinusSrcAlpha, One, OneMinusSrcAlpha),
            BlendMode::Additive => (One, One, One, One),
            BlendMode::MaskAlphaAndInvertByColor => {
                (OneMinusDstColor, OneMinusSrcAlpha, One, OneMinusSrcAlpha)
            }
        };
        BlendEquation {
            color_src,
            color_dst,
            alpha_src,
            alpha_dst,
        }
    }

    /// Applies the blend equation to one pixel of normalised RGBA.
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let eq = self.equation();
        let mut out = [0.0f32; 4];
        for c in 0..3 {
            let s = factor(eq.color_src, src, dst, c);
            let d = factor(eq.color_dst, src, dst, c);
            out[c] = (src[c] * s + dst[c] * d).clamp(0.0, 1.0);
        }
        let s = factor(eq.alpha_src, src, dst, 3);
        let d = factor(eq.alpha_dst, src, dst, 3);
        out[3] = (src[3] * s + dst[3] * d).clamp(0.0, 1.0);
        out
    }
}

fn factor(f: BlendFactor, src: [f32; 4], dst: [f32; 4], channel: usize) -> f32 {
    match f {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcAlpha => src[3],
        BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
        BlendFactor::OneMinusDstColor => 1.0 - dst[channel],
    }
}

pub(crate) fn unorm_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

pub(crate) fn u8_to_unorm(v: u8) -> f32 {
    v as f32 / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(rgba: [u8; 4]) -> [f32; 4] {
        rgba.map(u8_to_unorm)
    }

    fn bytes(v: [f32; 4]) -> [u8; 4] {
        v.map(unorm_to_u8)
    }

    #[test]
    fn opaque_keeps_destination_alpha() {
        let out = BlendMode::Opaque.apply(px([10, 20, 30, 0]), px([0, 0, 0, 255]));
        assert_eq!(bytes(out), [10, 20, 30, 255]);
    }

    #[test]
    fn premultiplied_transparent_source_is_identity() {
        let dst = [12, 200, 7, 255];
        let out = BlendMode::Premultiplied.apply([0.0; 4], px(dst));
        assert_eq!(bytes(out), dst);
    }

    #[test]
    fn traditional_half_alpha() {
        let out = BlendMode::Traditional.apply(px([255, 0, 0, 128]), px([0, 255, 0, 255]));
        assert_eq!(bytes(out), [128, 127, 0, 255]);
    }

    #[test]
    fn mask_invert_clears_inverts_or_keeps() {
        let dst = px([0, 255, 0, 255]);
        let inverted = BlendMode::MaskAlphaAndInvertByColor.apply(px([255, 255, 255, 255]), dst);
        assert_eq!(bytes(inverted), [255, 0, 255, 255]);
        let cleared = BlendMode::MaskAlphaAndInvertByColor.apply(px([0, 0, 0, 255]), dst);
        assert_eq!(bytes(cleared)[..3], [0, 0, 0]);
        let kept = BlendMode::MaskAlphaAndInvertByColor.apply([0.0; 4], dst);
        assert_eq!(bytes(kept), [0, 255, 0, 255]);
    }

    #[test]
    fn additive_saturates() {
        let out = BlendMode::Additive.apply(px([200, 0, 0, 255]), px([100, 0, 0, 255]));
        assert_eq!(bytes(out), [255, 0, 0, 255]);
    }
}

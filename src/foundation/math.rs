/// Column-major 4x4 matrix, laid out the way shader uniforms expect it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4 {
    pub cols: [[f32; 4]; 4],
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Orthographic projection mapping pixel `(0,0)` to the top-left of clip space and
    /// `(width,height)` to the bottom-right.
    pub fn ortho_top_left(width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            cols: [
                [2.0 / w, 0.0, 0.0, 0.0],
                [0.0, -2.0 / h, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [-1.0, 1.0, 0.0, 1.0],
            ],
        }
    }

    pub fn transform_point(&self, x: f32, y: f32) -> [f32; 4] {
        let c = &self.cols;
        let mut out = [0.0f32; 4];
        for (i, o) in out.iter_mut().enumerate() {
            *o = c[0][i] * x + c[1][i] * y + c[3][i];
        }
        out
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for (i, col) in self.cols.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(col);
        }
        out
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 16.16 fixed-point number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Frac(pub i64);

impl Frac {
    pub const BITS: u32 = 16;
    pub const ONE: Frac = Frac(1 << Self::BITS);

    pub fn from_int(v: i64) -> Self {
        Frac(v << Self::BITS)
    }

    /// `num / den` as a fraction; `den` must be non-zero.
    pub fn ratio(num: i64, den: i64) -> Self {
        Frac((num << Self::BITS) / den)
    }

    pub fn mul_int(self, v: i64) -> Self {
        Frac(self.0 * v)
    }

    pub fn to_int(self) -> i64 {
        self.0 >> Self::BITS
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1i64 << Self::BITS) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let m = Matrix4::ortho_top_left(640, 400);
        assert_eq!(m.transform_point(0.0, 0.0), [-1.0, 1.0, 0.0, 1.0]);
        assert_eq!(m.transform_point(640.0, 400.0), [1.0, -1.0, 0.0, 1.0]);
        let mid = m.transform_point(320.0, 200.0);
        assert!(mid[0].abs() < 1e-6 && mid[1].abs() < 1e-6);
    }

    #[test]
    fn ortho_columns_are_column_major() {
        let m = Matrix4::ortho_top_left(2, 4);
        let a = m.to_cols_array();
        assert_eq!(a[0], 1.0);
        assert_eq!(a[5], -0.5);
        assert_eq!(&a[12..16], &[-1.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn frac_truncates_like_fixed_point() {
        let f = Frac::ratio(640, 320);
        assert_eq!(f.mul_int(7).to_int(), 14);
        let third = Frac::ratio(1, 3);
        assert_eq!(third.mul_int(3).to_int(), 0);
        assert!((Frac::ratio(3, 2).to_f64() - 1.5).abs() < 1e-9);
        assert_eq!(Frac::from_int(5).to_int(), 5);
    }
}

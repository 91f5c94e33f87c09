//! Where finished frames go: the host window's drawable, or an offscreen target for tests and
//! the CLI.

mod offscreen;
#[cfg(feature = "gpu")]
mod window;

pub use offscreen::OffscreenSurface;
#[cfg(feature = "gpu")]
pub use window::WgpuWindowSurface;

use crate::foundation::error::RetrocompResult;
use crate::gpu::device::{SharedDevice, TextureId};

/// One frame's render target, valid until presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drawable {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub serial: u64,
}

/// Host-side presentation surface the compositor draws into.
pub trait SurfaceProvider {
    /// Device that owns the drawables.
    fn device(&self) -> SharedDevice;
    /// Next drawable, or a present error when none is available this frame.
    fn next_drawable(&mut self) -> RetrocompResult<Drawable>;
    fn present(&mut self, drawable: Drawable) -> RetrocompResult<()>;
    /// Hands back a drawable that will not be presented because the frame failed.
    fn discard(&mut self, drawable: Drawable);
    /// Window size in physical pixels.
    fn window_size(&self) -> (u32, u32);
    fn hidpi_factor(&self) -> f32;
}

/// Tightly packed RGBA8 pixels read back from a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

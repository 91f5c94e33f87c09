use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::device::{SharedDevice, TextureFormat, TextureUsage};
use crate::gpu::texture::GpuTexture;
use crate::present::{Drawable, FrameRGBA, SurfaceProvider};

/// Provider that renders into a device texture and keeps the last frame for readback.
///
/// Clones share the same target, so a caller can hand one clone to the compositor and keep
/// another to inspect frames.
#[derive(Clone)]
pub struct OffscreenSurface {
    inner: Rc<RefCell<OffscreenInner>>,
}

struct OffscreenInner {
    device: SharedDevice,
    texture: GpuTexture,
    hidpi: f32,
    serial: u64,
    in_flight: Option<u64>,
    presented: u64,
    discarded: u64,
    unavailable: u32,
}

fn create_target(device: &SharedDevice, width: u32, height: u32) -> RetrocompResult<GpuTexture> {
    GpuTexture::create(
        device,
        "offscreen_backbuffer",
        width,
        height,
        TextureFormat::Rgba8,
        TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
    )
}

impl OffscreenSurface {
    pub fn new(device: SharedDevice, width: u32, height: u32) -> RetrocompResult<Self> {
        let texture = create_target(&device, width, height)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(OffscreenInner {
                device,
                texture,
                hidpi: 1.0,
                serial: 0,
                in_flight: None,
                presented: 0,
                discarded: 0,
                unavailable: 0,
            })),
        })
    }

    pub fn with_hidpi(self, factor: f32) -> Self {
        self.inner.borrow_mut().hidpi = factor;
        self
    }

    /// Reallocates the target, as a window resize would.
    pub fn resize(&self, width: u32, height: u32) -> RetrocompResult<()> {
        let mut inner = self.inner.borrow_mut();
        let texture = create_target(&inner.device, width, height)?;
        inner.texture = texture;
        inner.in_flight = None;
        Ok(())
    }

    /// Makes the next `frames` drawable requests fail.
    pub fn withhold_drawables(&self, frames: u32) {
        self.inner.borrow_mut().unavailable = frames;
    }

    pub fn present_count(&self) -> u64 {
        self.inner.borrow().presented
    }

    pub fn discard_count(&self) -> u64 {
        self.inner.borrow().discarded
    }

    /// A drawable has been handed out and neither presented nor discarded yet.
    pub fn has_drawable_in_flight(&self) -> bool {
        self.inner.borrow().in_flight.is_some()
    }

    pub fn readback(&self) -> RetrocompResult<FrameRGBA> {
        let inner = self.inner.borrow();
        let rb = inner.device.read_texture(inner.texture.id()?)?;
        Ok(FrameRGBA {
            width: rb.width,
            height: rb.height,
            data: rb.data,
        })
    }
}

impl SurfaceProvider for OffscreenSurface {
    fn device(&self) -> SharedDevice {
        self.inner.borrow().device.clone()
    }

    fn next_drawable(&mut self) -> RetrocompResult<Drawable> {
        let mut inner = self.inner.borrow_mut();
        if inner.unavailable > 0 {
            inner.unavailable -= 1;
            return Err(RetrocompError::present("offscreen drawable unavailable"));
        }
        inner.serial += 1;
        let serial = inner.serial;
        inner.in_flight = Some(serial);
        Ok(Drawable {
            texture: inner.texture.id()?,
            width: inner.texture.width(),
            height: inner.texture.height(),
            serial,
        })
    }

    fn present(&mut self, drawable: Drawable) -> RetrocompResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.in_flight != Some(drawable.serial) {
            return Err(RetrocompError::present(format!(
                "drawable {} is not the one in flight",
                drawable.serial
            )));
        }
        inner.in_flight = None;
        inner.presented += 1;
        Ok(())
    }

    fn discard(&mut self, drawable: Drawable) {
        let mut inner = self.inner.borrow_mut();
        if inner.in_flight == Some(drawable.serial) {
            inner.in_flight = None;
            inner.discarded += 1;
        }
    }

    fn window_size(&self) -> (u32, u32) {
        let inner = self.inner.borrow();
        (inner.texture.width(), inner.texture.height())
    }

    fn hidpi_factor(&self) -> f32 {
        self.inner.borrow().hidpi
    }
}

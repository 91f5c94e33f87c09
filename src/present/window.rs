use std::rc::Rc;

use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::device::{SharedDevice, TextureId};
use crate::gpu::wgpu_device::{WgpuDevice, backend_name};
use crate::present::{Drawable, SurfaceProvider};

/// Presents into a host window through a configured `wgpu::Surface`.
pub struct WgpuWindowSurface {
    device: Rc<WgpuDevice>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pending: Option<(u64, TextureId, wgpu::SurfaceTexture)>,
    serial: u64,
    hidpi: f32,
}

impl WgpuWindowSurface {
    /// Picks an adapter able to present to `surface` and configures it at the given physical
    /// size.
    pub fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        hidpi: f32,
    ) -> RetrocompResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                RetrocompError::resource("no gpu adapter available")
            }
            other => RetrocompError::resource(format!("wgpu request_adapter failed: {other:?}")),
        })?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("retrocomp_window_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| RetrocompError::resource(format!("wgpu request_device failed: {e:?}")))?;

        let caps = surface.get_capabilities(&adapter);
        // Palette colours are already display-encoded, so prefer a non-sRGB swap chain.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RetrocompError::resource("surface reports no formats"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        let backend = adapter.get_info().backend;
        let device = Rc::new(WgpuDevice::from_parts(
            device,
            queue,
            backend_name(backend),
        ));
        surface.configure(device.device(), &config);
        tracing::info!(?format, width, height, ?backend, "window surface configured");
        Ok(Self {
            device,
            surface,
            config,
            pending: None,
            serial: 0,
            hidpi,
        })
    }

    /// Reconfigures after the host window changed size or scale.
    pub fn resize(&mut self, width: u32, height: u32, hidpi: f32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.hidpi = hidpi;
        self.surface.configure(self.device.device(), &self.config);
    }

    pub fn wgpu_device(&self) -> &Rc<WgpuDevice> {
        &self.device
    }
}

impl SurfaceProvider for WgpuWindowSurface {
    fn device(&self) -> SharedDevice {
        self.device.clone()
    }

    fn next_drawable(&mut self) -> RetrocompResult<Drawable> {
        if let Some((serial, texture, frame)) = self.pending.take() {
            tracing::warn!(serial, "dropping a drawable that was never presented");
            self.device.unregister_external(texture);
            drop(frame);
        }
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.device.device(), &self.config);
                return Err(RetrocompError::present("swap chain reconfigured, frame skipped"));
            }
            Err(e) => {
                return Err(RetrocompError::present(format!(
                    "no drawable available: {e}"
                )));
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (width, height) = (frame.texture.width(), frame.texture.height());
        let texture =
            self.device
                .register_external_target(view, width, height, self.config.format);
        self.serial += 1;
        self.pending = Some((self.serial, texture, frame));
        Ok(Drawable {
            texture,
            width,
            height,
            serial: self.serial,
        })
    }

    fn present(&mut self, drawable: Drawable) -> RetrocompResult<()> {
        self.device.unregister_external(drawable.texture);
        match self.pending.take() {
            Some((serial, _, frame)) if serial == drawable.serial => {
                frame.present();
                Ok(())
            }
            _ => Err(RetrocompError::present(format!(
                "drawable {} is not the one in flight",
                drawable.serial
            ))),
        }
    }

    fn discard(&mut self, drawable: Drawable) {
        self.device.unregister_external(drawable.texture);
        if self
            .pending
            .as_ref()
            .is_some_and(|(serial, _, _)| *serial == drawable.serial)
        {
            // Dropping an unpresented SurfaceTexture returns it to the swap chain.
            self.pending = None;
        }
    }

    fn window_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn hidpi_factor(&self) -> f32 {
        self.hidpi
    }
}

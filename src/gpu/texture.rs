use crate::foundation::core::Rect;
use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::device::{
    FilterMode, SharedDevice, TextureDesc, TextureFormat, TextureId, TextureUsage,
};

/// A 2D texture owned on a device. Released on [`GpuTexture::destroy`] or drop.
pub struct GpuTexture {
    device: SharedDevice,
    id: Option<TextureId>,
    desc: TextureDesc,
    filter: FilterMode,
}

impl GpuTexture {
    pub fn create(
        device: &SharedDevice,
        label: &'static str,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> RetrocompResult<Self> {
        let max = device.caps().max_texture_dimension;
        if width == 0 || height == 0 {
            return Err(RetrocompError::usage(format!(
                "{label}: texture size {width}x{height} is empty"
            )));
        }
        if width > max || height > max {
            return Err(RetrocompError::resource(format!(
                "{label}: texture size {width}x{height} exceeds device limit {max}"
            )));
        }
        let desc = TextureDesc {
            label,
            width,
            height,
            format,
            usage,
        };
        let id = device.create_texture(&desc)?;
        tracing::trace!(label, width, height, ?format, "texture created");
        Ok(Self {
            device: device.clone(),
            id: Some(id),
            desc,
            filter: FilterMode::Nearest,
        })
    }

    pub fn id(&self) -> RetrocompResult<TextureId> {
        self.id.ok_or_else(|| {
            RetrocompError::usage(format!("{}: texture has been destroyed", self.desc.label))
        })
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn is_live(&self) -> bool {
        self.id.is_some()
    }

    /// Copies `rect` from `data` (rows `src_pitch` bytes apart) into the texture.
    pub fn replace_region(&self, rect: Rect, data: &[u8], src_pitch: usize) -> RetrocompResult<()> {
        let id = self.id()?;
        if !Rect::with_size(self.desc.width, self.desc.height).contains_rect(rect) {
            return Err(RetrocompError::usage(format!(
                "{}: region {rect:?} outside {}x{}",
                self.desc.label, self.desc.width, self.desc.height
            )));
        }
        if rect.is_empty() {
            return Ok(());
        }
        self.device.write_texture(id, rect, data, src_pitch)
    }

    pub fn set_filtering(&mut self, filter: FilterMode) -> RetrocompResult<()> {
        let id = self.id()?;
        self.device.set_texture_filter(id, filter)?;
        self.filter = filter;
        Ok(())
    }

    /// Releases the device object. Idempotent.
    pub fn destroy(&mut self) {
        if let Some(id) = self.id.take() {
            self.device.destroy_texture(id);
            tracing::trace!(label = self.desc.label, "texture destroyed");
        }
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("filter", &self.filter)
            .finish()
    }
}

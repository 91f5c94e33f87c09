//! GPU abstraction: a device trait with a CPU reference implementation and an optional wgpu
//! one, plus the texture, shader, framebuffer and pipeline objects the compositor draws with.

pub mod blend;
pub mod context;
pub mod device;
pub mod encoder;
pub mod framebuffer;
pub mod pipeline;
pub mod shader;
pub mod soft;
pub mod texture;
#[cfg(feature = "gpu")]
pub mod wgpu_device;

pub use blend::BlendMode;
pub use context::{GpuContext, SharedContext};
pub use device::{
    DeviceCaps, FilterMode, GpuDevice, SharedDevice, TextureFormat, TextureId, TextureUsage,
};
pub use encoder::FrameEncoder;
pub use framebuffer::{CopyMask, Framebuffer, FramebufferState};
pub use pipeline::{Pipeline, PipelineId};
pub use shader::{ShaderId, ShaderLibrary};
pub use soft::SoftwareDevice;
pub use texture::GpuTexture;
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;

use std::rc::Rc;

use crate::foundation::error::{RetrocompError, RetrocompResult};
use crate::gpu::device::SharedDevice;
use crate::gpu::soft::SoftwareDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

impl BackendKind {
    pub fn parse(name: &str) -> RetrocompResult<Self> {
        match name {
            "cpu" => Ok(BackendKind::Cpu),
            #[cfg(feature = "gpu")]
            "gpu" => Ok(BackendKind::Gpu),
            other => Err(RetrocompError::validation(format!(
                "unknown or unavailable backend `{other}`"
            ))),
        }
    }
}

/// Opens a device of the requested kind.
pub fn create_device(kind: BackendKind) -> RetrocompResult<SharedDevice> {
    match kind {
        BackendKind::Cpu => Ok(Rc::new(SoftwareDevice::new())),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Rc::new(crate::gpu::wgpu_device::WgpuDevice::new_headless()?)),
    }
}

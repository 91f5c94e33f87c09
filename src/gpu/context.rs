use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::foundation::error::RetrocompResult;
use crate::gpu::device::{DeviceCaps, ShaderFunction, SharedDevice};
use crate::gpu::pipeline::PipelineId;
use crate::gpu::shader::{ShaderId, ShaderLibrary};

pub type SharedContext = Rc<GpuContext>;

/// Which pipeline currently owns the command encoder, shared with every framebuffer so
/// `is_active` can be answered without a back-reference to the pipeline.
#[derive(Clone, Debug, Default)]
pub struct ActivePipelineSlot(Rc<Cell<Option<PipelineId>>>);

impl ActivePipelineSlot {
    pub fn get(&self) -> Option<PipelineId> {
        self.0.get()
    }

    pub fn set(&self, id: Option<PipelineId>) {
        self.0.set(id);
    }
}

/// Everything bound to one GPU device: the device itself, its loaded shaders, and the
/// active-pipeline slot. Dropped wholesale on context loss.
pub struct GpuContext {
    device: SharedDevice,
    shaders: RefCell<ShaderLibrary>,
    active: ActivePipelineSlot,
    next_pipeline: Cell<u64>,
}

impl GpuContext {
    pub fn create(device: SharedDevice) -> RetrocompResult<SharedContext> {
        let shaders = ShaderLibrary::create(&device)?;
        let caps = device.caps();
        tracing::info!(
            backend = caps.backend,
            max_texture_dimension = caps.max_texture_dimension,
            "gpu context created"
        );
        Ok(Rc::new(Self {
            device,
            shaders: RefCell::new(shaders),
            active: ActivePipelineSlot::default(),
            next_pipeline: Cell::new(0),
        }))
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn caps(&self) -> DeviceCaps {
        self.device.caps()
    }

    pub fn shader(&self, id: ShaderId) -> RetrocompResult<ShaderFunction> {
        self.shaders.borrow().query(id)
    }

    pub fn reset_shaders(&self) -> RetrocompResult<()> {
        self.shaders.borrow_mut().reset()
    }

    pub fn active_pipeline(&self) -> Option<PipelineId> {
        self.active.get()
    }

    pub(crate) fn active_slot(&self) -> &ActivePipelineSlot {
        &self.active
    }

    pub(crate) fn next_pipeline_id(&self) -> PipelineId {
        let id = self.next_pipeline.get() + 1;
        self.next_pipeline.set(id);
        PipelineId(id)
    }
}

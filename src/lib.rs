#![forbid(unsafe_code)]

pub mod backend;
pub mod compositor;
mod foundation;
pub mod gpu;
pub mod present;
pub mod script;
pub mod settings;
pub mod surface;

pub use backend::{BackendKind, create_device};
pub use compositor::{
    CURSOR_MASK_INVERT, CURSOR_MASK_OPAQUE, CURSOR_MASK_TRANSPARENT, Compositor, ContextPhase,
    CursorImage, CursorMetrics, DisplayAreas, FrameOutcome, FrameStats, ScreenLock, VideoState,
};
pub use foundation::core::{Point, Rect};
pub use foundation::error::{RetrocompError, RetrocompResult, TransactionFailures};
pub use foundation::format::{FormatName, PixelFormat};
pub use foundation::math::{Frac, Matrix4};
pub use gpu::{BlendMode, GpuDevice, SharedDevice, SoftwareDevice};
pub use present::{Drawable, FrameRGBA, OffscreenSurface, SurfaceProvider};
pub use script::{Script, ScriptReport, Step};
pub use settings::{CompositorSettings, Feature};
pub use surface::Surface;

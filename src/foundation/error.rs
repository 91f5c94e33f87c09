pub type RetrocompResult<T> = Result<T, RetrocompError>;

bitflags::bitflags! {
    /// Parts of a graphics transaction that could not be applied and were rolled back.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TransactionFailures: u8 {
        /// The requested game size could not be set up.
        const SIZE_CHANGE = 1 << 0;
        /// The requested game pixel format is not supported.
        const FORMAT_NOT_SUPPORTED = 1 << 1;
        /// Aspect ratio correction could not be toggled.
        const ASPECT_RATIO = 1 << 2;
        /// The graphics mode switch failed.
        const MODE_SWITCH = 1 << 3;
        /// Texture filtering could not be toggled.
        const FILTERING = 1 << 4;
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RetrocompError {
    #[error("configuration error ({failures:?}): {message}")]
    Configuration {
        failures: TransactionFailures,
        message: String,
    },

    #[error("resource error: {0}")]
    Resource(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("present error: {0}")]
    Present(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetrocompError {
    pub fn configuration(failures: TransactionFailures, msg: impl Into<String>) -> Self {
        Self::Configuration {
            failures,
            message: msg.into(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn present(msg: impl Into<String>) -> Self {
        Self::Present(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Transaction failure flags carried by a configuration error, empty otherwise.
    pub fn failures(&self) -> TransactionFailures {
        match self {
            Self::Configuration { failures, .. } => *failures,
            _ => TransactionFailures::empty(),
        }
    }

    /// Whether the error invalidates the GPU context (allocation failure, device loss).
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }
}

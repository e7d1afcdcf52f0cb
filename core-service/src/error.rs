use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),
}

impl CoreError {
    /// Lift a runtime error, keeping missing capabilities distinguishable.
    pub(crate) fn from_runtime(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::CapabilityMissing { capability, message } => {
                CoreError::CapabilityMissing { capability, message }
            }
            other => CoreError::Runtime(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

use thiserror::Error;

/// Errors reported by training backends and data preparers.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The requested compute device cannot be used.
    #[error("device {0} is not available")]
    DeviceUnavailable(String),
    /// The genotype could not be turned into a model.
    #[error("cannot build network: {0}")]
    Build(String),
    /// Training or prediction was attempted on an uncompiled model.
    #[error("model must be compiled before use")]
    NotCompiled,
    /// Tensor dimensions do not line up.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// Training produced non-finite values.
    #[error("training diverged: {0}")]
    Diverged(String),
    /// Raw data could not be prepared.
    #[error("data preparation failed: {0}")]
    Data(String),
    /// Any other backend failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

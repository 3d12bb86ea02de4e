use thiserror::Error;

/// Errors raised while building individuals and genotypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenotypeError {
    /// The data type tag is not one of the known flavors.
    #[error("incorrect \"data_type\" argument {0:?}. Available values: \"text\", \"image\"")]
    InvalidDataType(String),
    /// The task type tag is unknown.
    #[error("incorrect \"task_type\" argument {0:?}. Available values: \"classification\", \"regression\"")]
    InvalidTaskType(String),
    /// The architecture breaks the input/body/output layout.
    #[error("malformed architecture: {0}")]
    MalformedArchitecture(String),
}

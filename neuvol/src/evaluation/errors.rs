use crate::architecture::TaskType;
use crate::backend::BackendError;

use thiserror::Error;

/// Errors raised by fold splitting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    /// The fold count is not usable for this split.
    #[error("invalid number of folds {0}")]
    InvalidFoldCount(usize),
    /// There are fewer samples than folds.
    #[error("cannot have number of splits {folds} greater than the number of samples {samples}")]
    TooFewSamples { folds: usize, samples: usize },
    /// No class has as many members as there are folds.
    #[error("number of splits {0} cannot be greater than the number of members in each class")]
    TooFewClassMembers(usize),
}

/// Errors raised while configuring or running a fitness evaluation.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("incorrect \"device\" argument {0:?}. Available values: \"gpu\", \"cpu\"")]
    InvalidDevice(String),
    #[error("unrecognized fitness measure {0:?}. Available values: \"AUC\", \"f1\"")]
    InvalidFitnessMeasure(String),
    #[error("dataset has {samples} samples but {labels} labels")]
    DatasetMismatch { samples: usize, labels: usize },
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
    #[error(transparent)]
    Folds(#[from] FoldError),
    #[error("data could not be prepared")]
    DataPreparation(#[source] BackendError),
    /// A fold failed to build, compile, train or predict.
    /// The whole evaluation is abandoned.
    #[error("tensor could not be compiled")]
    TrainingFailure(#[source] BackendError),
    #[error("predictions could not be assembled: {0}")]
    PredictionShape(String),
    #[error("no fitness reduction is defined for {0} tasks")]
    UnsupportedTask(TaskType),
}

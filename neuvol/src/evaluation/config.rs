use super::EvaluationError;
use crate::backend::EarlyStopping;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Compute device networks are trained on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    /// Returns the device's resource handle.
    ///
    /// # Examples
    /// ```
    /// use neuvol::evaluation::Device;
    ///
    /// assert_eq!("gpu".parse::<Device>().unwrap().resource(), "/device:GPU:0");
    /// assert!("tpu".parse::<Device>().is_err());
    /// ```
    pub fn resource(self) -> &'static str {
        match self {
            Self::Cpu => "/device:CPU:0",
            Self::Gpu => "/device:GPU:0",
        }
    }
}

impl FromStr for Device {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Device, EvaluationError> {
        match s {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            other => Err(EvaluationError::InvalidDevice(other.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// The criterion a trained network is scored by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessMeasure {
    /// Sum over classes of the one-vs-rest ROC AUC.
    #[serde(rename = "AUC")]
    Auc,
    /// Sum over classes of the per-class F1 score.
    #[serde(rename = "f1")]
    F1,
}

impl FromStr for FitnessMeasure {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<FitnessMeasure, EvaluationError> {
        match s {
            "AUC" => Ok(FitnessMeasure::Auc),
            "f1" => Ok(FitnessMeasure::F1),
            other => Err(EvaluationError::InvalidFitnessMeasure(other.to_string())),
        }
    }
}

/// Configuration data for fitness evaluation.
///
/// Missing fields take their default values when
/// deserializing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Number of cross-validation folds. With a single fold,
    /// the whole dataset is used for both training and testing.
    pub kfold_number: usize,
    pub device: Device,
    /// Feed training with batch generators instead of
    /// in-memory tensors.
    pub generator: bool,
    pub early_stopping: EarlyStopping,
    pub fitness_measure: FitnessMeasure,
    /// Verbosity forwarded to the training backend.
    pub verbose: u8,
    /// Prepare token ids rather than numeric sequences.
    pub create_tokens: bool,
    /// Number of concurrent batch producers for generators.
    pub workers: usize,
    /// Whether batch producers run concurrently at all.
    pub use_multiprocessing: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> EvaluatorConfig {
        EvaluatorConfig {
            kfold_number: 5,
            device: Device::Cpu,
            generator: false,
            early_stopping: EarlyStopping::default(),
            fitness_measure: FitnessMeasure::Auc,
            verbose: 0,
            create_tokens: true,
            workers: 2,
            use_multiprocessing: true,
        }
    }
}

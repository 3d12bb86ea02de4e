//! # neuvol-nn
//! A small CPU training backend for the `neuvol` crate's
//! fitness evaluator.
//!
//! Provides:
//! - [`CpuBackend`]: hands out one [`DenseSession`] per cross-validation fold.
//! - [`DenseNetwork`]: a dense ReLU classifier built from a genotype's `Dense`
//!   genes, trained by mini-batch gradient descent with early stopping.
//! - [`SequencePreparer`]: turns numeric sequences into fixed-width tensors,
//!   in memory or as a [`SequenceGenerator`] of batches.
//!
//! [`DenseNetwork`]: crate::networks::DenseNetwork
//!
//! # Example usage: scoring a random individual
//! ```
//! use neuvol::architecture::{cradle, IndividualOptions};
//! use neuvol::evaluation::{Evaluator, EvaluatorConfig, FitnessMeasure};
//! use neuvol_nn::{CpuBackend, SequencePreparer};
//!
//! let x: Vec<Vec<f32>> = (0..30).map(|i| vec![(i % 3) as f32, 1.0]).collect();
//! let y: Vec<usize> = (0..30).map(|i| i % 3).collect();
//!
//! let config = EvaluatorConfig {
//!     kfold_number: 3,
//!     fitness_measure: FitnessMeasure::F1,
//!     generator: true,
//!     ..EvaluatorConfig::default()
//! };
//! let evaluator =
//!     Evaluator::from_config(x, y, config, SequencePreparer, CpuBackend::seeded(0)).unwrap();
//!
//! let individ = cradle(0, "image", "classification", None, false, IndividualOptions { classes: 3 })
//!     .unwrap();
//! let fitness = evaluator.evaluate(&individ).unwrap();
//! assert!((0.0..=3.0).contains(&fitness));
//! ```

mod cpu;
mod data;
pub mod networks;

pub use cpu::{CpuBackend, DenseSession, DEFAULT_UNITS, MOMENTUM};
pub use data::{SequenceGenerator, SequencePreparer};

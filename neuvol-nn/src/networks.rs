//! Trainable networks built from genotypes.

mod dense;

pub use dense::DenseNetwork;

use ndarray::Array2;

/// Activation functions of dense layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    /// Row-wise softmax, for class-probability outputs.
    Softmax,
}

impl Activation {
    /// Applies the activation to every row of `z` in place.
    pub fn apply(self, z: &mut Array2<f32>) {
        match self {
            Self::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Self::Softmax => {
                for mut row in z.rows_mut() {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row /= sum;
                }
            }
        }
    }
}

/// Weight update rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Optimizer {
    /// Plain stochastic gradient descent.
    Sgd { learning_rate: f32 },
    /// Gradient descent with classical momentum.
    Momentum { learning_rate: f32, momentum: f32 },
}

impl Optimizer {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Sgd { learning_rate } | Self::Momentum { learning_rate, .. } => learning_rate,
        }
    }
}

/// Training objectives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loss {
    /// Mean categorical cross-entropy against one-hot targets.
    CategoricalCrossEntropy,
}

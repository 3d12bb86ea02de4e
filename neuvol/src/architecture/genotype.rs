use super::{GenotypeError, LayerGene, Parameters};

use serde::{Deserialize, Serialize};

use std::fmt;

/// Weight update rules understood by training backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerType {
    Sgd,
    Momentum,
}

/// Training hyperparameters of a genotype.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TrainingParameters {
    /// Maximum number of training epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batchs: usize,
    pub optimizer: OptimizerType,
    pub learning_rate: f32,
    /// Backend-specific knobs.
    #[serde(default)]
    pub extra: Parameters,
}

/// Data-preprocessing parameters of a genotype.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DataProcessing {
    /// Input length every sample is brought to before
    /// training. Sequence length for text, flattened
    /// pixel count for images. The architecture's input
    /// gene must agree with it.
    pub sentences_length: usize,
    /// Preprocessing knobs, such as vocabulary size.
    #[serde(default)]
    pub extra: Parameters,
}

/// The three gene groups describing one candidate network.
///
/// A genotype is a value: crossover builds new ones from
/// copies of its parents' gene groups and never alters an
/// existing one in place.
///
/// Deserialization checks that the architecture has at least
/// two genes and starts with an input gene. The last gene is
/// not checked, since crossover may replace it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(try_from = "StoredGenotype")]
pub struct Genotype {
    architecture: Vec<LayerGene>,
    training_parameters: TrainingParameters,
    data_processing: DataProcessing,
}

#[derive(Deserialize)]
struct StoredGenotype {
    architecture: Vec<LayerGene>,
    training_parameters: TrainingParameters,
    data_processing: DataProcessing,
}

impl TryFrom<StoredGenotype> for Genotype {
    type Error = GenotypeError;

    fn try_from(stored: StoredGenotype) -> Result<Genotype, GenotypeError> {
        Genotype::check_input(&stored.architecture)?;
        Ok(Genotype::new_unchecked(
            stored.architecture,
            stored.training_parameters,
            stored.data_processing,
        ))
    }
}

impl Genotype {
    /// Assembles a genotype from its gene groups.
    ///
    /// # Errors
    /// Returns an error if the architecture has fewer than two
    /// genes, does not start with an input-class gene, or does
    /// not end with an output-class gene.
    ///
    /// # Examples
    /// ```
    /// use neuvol::architecture::{
    ///     DataProcessing, Genotype, LayerGene, LayerType, OptimizerType, TrainingParameters,
    /// };
    ///
    /// let training = TrainingParameters {
    ///     epochs: 10,
    ///     batchs: 32,
    ///     optimizer: OptimizerType::Sgd,
    ///     learning_rate: 0.05,
    ///     extra: Default::default(),
    /// };
    /// let data = DataProcessing { sentences_length: 20, extra: Default::default() };
    ///
    /// let genotype = Genotype::new(
    ///     vec![
    ///         LayerGene::new(LayerType::Embedding),
    ///         LayerGene::new(LayerType::Dense),
    ///         LayerGene::new(LayerType::LastDense),
    ///     ],
    ///     training.clone(),
    ///     data.clone(),
    /// );
    /// assert!(genotype.is_ok());
    ///
    /// // An architecture needs both an input and an output gene.
    /// assert!(Genotype::new(vec![LayerGene::new(LayerType::Dense)], training, data).is_err());
    /// ```
    pub fn new(
        architecture: Vec<LayerGene>,
        training_parameters: TrainingParameters,
        data_processing: DataProcessing,
    ) -> Result<Genotype, GenotypeError> {
        Self::check_architecture(&architecture)?;
        Ok(Self::new_unchecked(
            architecture,
            training_parameters,
            data_processing,
        ))
    }

    /// Assembles a genotype without validating the architecture.
    ///
    /// Used by crossover, whose strategies only recombine
    /// genes of already valid parents.
    pub(crate) fn new_unchecked(
        architecture: Vec<LayerGene>,
        training_parameters: TrainingParameters,
        data_processing: DataProcessing,
    ) -> Genotype {
        Genotype {
            architecture,
            training_parameters,
            data_processing,
        }
    }

    fn check_architecture(architecture: &[LayerGene]) -> Result<(), GenotypeError> {
        Self::check_input(architecture)?;
        let last = architecture[architecture.len() - 1].layer_type();
        if !last.is_output() {
            return Err(GenotypeError::MalformedArchitecture(format!(
                "last gene must be an output layer, found {}",
                last
            )));
        }
        Ok(())
    }

    fn check_input(architecture: &[LayerGene]) -> Result<(), GenotypeError> {
        if architecture.len() < 2 {
            return Err(GenotypeError::MalformedArchitecture(format!(
                "expected at least 2 genes, found {}",
                architecture.len()
            )));
        }
        let first = architecture[0].layer_type();
        if !first.is_input() {
            return Err(GenotypeError::MalformedArchitecture(format!(
                "first gene must be an input layer, found {}",
                first
            )));
        }
        Ok(())
    }

    /// Returns the ordered layer genes.
    pub fn architecture(&self) -> &[LayerGene] {
        &self.architecture
    }

    /// Returns the genes strictly between the input
    /// and output genes.
    pub fn body(&self) -> &[LayerGene] {
        &self.architecture[1..self.architecture.len() - 1]
    }

    pub fn training_parameters(&self) -> &TrainingParameters {
        &self.training_parameters
    }

    pub fn data_processing(&self) -> &DataProcessing {
        &self.data_processing
    }

    /// Decomposes the genotype into its gene groups.
    pub fn into_parts(self) -> (Vec<LayerGene>, TrainingParameters, DataProcessing) {
        (
            self.architecture,
            self.training_parameters,
            self.data_processing,
        )
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] epochs={} batchs={} lr={:.4} sentences_length={}",
            self.architecture
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(" -> "),
            self.training_parameters.epochs,
            self.training_parameters.batchs,
            self.training_parameters.learning_rate,
            self.data_processing.sentences_length,
        )
    }
}

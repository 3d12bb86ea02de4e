//! Individuals are the unit of evolution. Each wraps a
//! [`Genotype`] (layer sequence, training hyperparameters and
//! preprocessing parameters) together with lineage and type
//! metadata. New individuals are obtained through [`cradle`].

mod errors;
mod flavors;
mod genes;
mod genotype;

pub use errors::GenotypeError;
pub use flavors::{flavor_of, Flavor, ImageFlavor, TextFlavor};
pub use genes::{LayerGene, LayerType, Parameter, Parameters};
pub use genotype::{DataProcessing, Genotype, OptimizerType, TrainingParameters};

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

const NAME_LENGTH: usize = 16;

/// The kind of data an individual's network consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Image,
}

impl FromStr for DataType {
    type Err = GenotypeError;

    fn from_str(s: &str) -> Result<DataType, GenotypeError> {
        match s {
            "text" => Ok(DataType::Text),
            "image" => Ok(DataType::Image),
            other => Err(GenotypeError::InvalidDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Image => "image",
        })
    }
}

/// The learning task an individual's network solves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

impl FromStr for TaskType {
    type Err = GenotypeError;

    fn from_str(s: &str) -> Result<TaskType, GenotypeError> {
        match s {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            other => Err(GenotypeError::InvalidTaskType(other.to_string())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
        })
    }
}

/// Extra construction options of an individual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndividualOptions {
    /// Number of target classes.
    pub classes: usize,
}

impl Default for IndividualOptions {
    fn default() -> IndividualOptions {
        IndividualOptions { classes: 2 }
    }
}

/// A genotype plus the metadata evolution needs to track it.
///
/// Supports Serde for convenient saving and loading.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Individual {
    name: String,
    epochs: usize,
    data_type: DataType,
    task_type: TaskType,
    parents: Option<(String, String)>,
    freeze: bool,
    options: IndividualOptions,
    genotype: Genotype,
    fitness: Option<f32>,
}

impl Individual {
    /// Creates a new individual of the given flavor with a random,
    /// flavor-valid genotype.
    ///
    /// `epochs` is the evolution stage the individual is born in.
    pub fn new(
        epochs: usize,
        data_type: DataType,
        task_type: TaskType,
        parents: Option<(&Individual, &Individual)>,
        freeze: bool,
        options: IndividualOptions,
        rng: &mut dyn RngCore,
    ) -> Individual {
        let genotype = flavor_of(data_type).random_genotype(options.classes, task_type, rng);
        Individual {
            name: random_name(rng),
            epochs,
            data_type,
            task_type,
            parents: parents.map(|(father, mother)| (father.name.clone(), mother.name.clone())),
            freeze,
            options,
            genotype,
            fitness: None,
        }
    }

    /// Returns the individual's identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the evolution stage the individual was born in.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the names of the individual's father and mother, if any.
    pub fn parents(&self) -> Option<(&str, &str)> {
        self.parents
            .as_ref()
            .map(|(father, mother)| (father.as_str(), mother.as_str()))
    }

    /// Returns the gene-protection flag. It is not interpreted by
    /// crossover or evaluation.
    pub fn freeze(&self) -> bool {
        self.freeze
    }

    pub fn options(&self) -> &IndividualOptions {
        &self.options
    }

    pub fn genotype(&self) -> &Genotype {
        &self.genotype
    }

    /// Replaces the whole genotype at once.
    pub fn set_genotype(&mut self, genotype: Genotype) {
        self.genotype = genotype;
        self.fitness = None;
    }

    pub fn architecture(&self) -> &[LayerGene] {
        self.genotype.architecture()
    }

    pub fn training_parameters(&self) -> &TrainingParameters {
        self.genotype.training_parameters()
    }

    pub fn data_processing(&self) -> &DataProcessing {
        self.genotype.data_processing()
    }

    /// Sets the individual's fitness value.
    pub fn set_fitness(&mut self, fitness: f32) {
        self.fitness = Some(fitness);
    }

    /// Returns the individual's fitness value, if it has been evaluated.
    pub fn fitness(&self) -> Option<f32> {
        self.fitness
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}, stage {}): {}",
            self.name, self.data_type, self.task_type, self.epochs, self.genotype
        )?;
        if let Some(fitness) = self.fitness {
            write!(f, " fitness={:.4}", fitness)?;
        }
        Ok(())
    }
}

/// Creates an individual for the given data and task type.
///
/// `parents` and `freeze` are recorded as-is. The individual is
/// born with a random genotype valid for its data type; children
/// created for crossover have theirs replaced by pairing.
///
/// # Errors
/// Returns an error if `data_type` is neither `"text"` nor `"image"`,
/// or if `task_type` is unknown.
///
/// # Examples
/// ```
/// use neuvol::architecture::{cradle, DataType, IndividualOptions};
///
/// let individ = cradle(0, "text", "classification", None, false, IndividualOptions { classes: 3 })
///     .unwrap();
/// assert_eq!(individ.data_type(), DataType::Text);
///
/// let err = cradle(0, "audio", "classification", None, false, IndividualOptions::default())
///     .unwrap_err();
/// assert!(err.to_string().contains("\"text\", \"image\""));
/// ```
pub fn cradle(
    epochs: usize,
    data_type: &str,
    task_type: &str,
    parents: Option<(&Individual, &Individual)>,
    freeze: bool,
    options: IndividualOptions,
) -> Result<Individual, GenotypeError> {
    let data_type = data_type.parse()?;
    let task_type = task_type.parse()?;
    Ok(Individual::new(
        epochs,
        data_type,
        task_type,
        parents,
        freeze,
        options,
        &mut rand::thread_rng(),
    ))
}

fn random_name(rng: &mut dyn RngCore) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(NAME_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cradle_text_and_image() {
        let text = cradle(1, "text", "classification", None, false, IndividualOptions::default())
            .unwrap();
        assert_eq!(text.data_type(), DataType::Text);
        assert_eq!(text.architecture()[0].layer_type(), LayerType::Embedding);

        let image = cradle(1, "image", "classification", None, false, IndividualOptions::default())
            .unwrap();
        assert_eq!(image.data_type(), DataType::Image);
        assert_eq!(image.architecture()[0].layer_type(), LayerType::Input);
    }

    #[test]
    fn cradle_invalid_data_type() {
        let err = cradle(0, "video", "classification", None, false, IndividualOptions::default())
            .unwrap_err();
        assert_eq!(err, GenotypeError::InvalidDataType("video".into()));
        let message = err.to_string();
        assert!(message.contains("\"text\""));
        assert!(message.contains("\"image\""));
    }

    #[test]
    fn cradle_invalid_task_type() {
        let err = cradle(0, "text", "ranking", None, false, IndividualOptions::default());
        assert!(matches!(err, Err(GenotypeError::InvalidTaskType(_))));
    }

    #[test]
    fn cradle_records_lineage_and_freeze() {
        let father = cradle(0, "text", "classification", None, false, IndividualOptions::default())
            .unwrap();
        let mother = cradle(0, "text", "classification", None, false, IndividualOptions::default())
            .unwrap();
        let child = cradle(
            1,
            "text",
            "classification",
            Some((&father, &mother)),
            true,
            IndividualOptions::default(),
        )
        .unwrap();

        assert_eq!(child.parents(), Some((father.name(), mother.name())));
        assert!(child.freeze());
        assert_eq!(child.epochs(), 1);
        assert_eq!(child.name().len(), NAME_LENGTH);
    }

    #[test]
    fn output_gene_carries_class_count() {
        let individ = cradle(0, "image", "classification", None, false, IndividualOptions { classes: 7 })
            .unwrap();
        let last = individ.architecture().last().unwrap();
        assert_eq!(last.get("units").and_then(|p| p.as_int()), Some(7));
    }

    #[test]
    fn saved_individual_loads_back() {
        let mut individ = cradle(0, "image", "classification", None, false, IndividualOptions::default())
            .unwrap();
        individ.set_fitness(0.75);
        let json = serde_json::to_string(&individ).unwrap();
        assert_eq!(serde_json::from_str::<Individual>(&json).unwrap(), individ);
    }

    #[test]
    fn loading_individual_checks_architecture() {
        let individ = cradle(0, "text", "classification", None, false, IndividualOptions::default())
            .unwrap();
        let mut value = serde_json::to_value(&individ).unwrap();
        value["genotype"]["architecture"]
            .as_array_mut()
            .unwrap()
            .truncate(1);
        let err = serde_json::from_value::<Individual>(value).unwrap_err();
        assert!(err.to_string().contains("at least 2 genes"));
    }

    #[test]
    fn set_genotype_clears_fitness() {
        let mut individ = cradle(0, "text", "classification", None, false, IndividualOptions::default())
            .unwrap();
        individ.set_fitness(1.5);
        let genotype = individ.genotype().clone();
        individ.set_genotype(genotype);
        assert_eq!(individ.fitness(), None);
    }
}

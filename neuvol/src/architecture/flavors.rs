use super::{
    DataProcessing, DataType, Genotype, LayerGene, LayerType, OptimizerType, Parameters, TaskType,
    TrainingParameters,
};

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

const UNITS: [i64; 5] = [16, 32, 64, 128, 256];
const ACTIVATIONS: [&str; 3] = ["relu", "tanh", "sigmoid"];
const TRAINING_EPOCHS: [usize; 4] = [5, 10, 15, 20];
const BATCH_SIZES: [usize; 4] = [8, 16, 32, 64];
const LEARNING_RATES: [f32; 4] = [0.005, 0.01, 0.05, 0.1];
const MAX_BODY_LAYERS: usize = 3;

/// A flavor holds the layer validity rules of one data type,
/// and knows how to draw random genes that respect them.
pub trait Flavor {
    /// Layer types allowed between the input and output genes.
    fn body_layers(&self) -> &'static [LayerType];

    /// Draws random preprocessing parameters.
    fn random_data_processing(&self, rng: &mut dyn RngCore) -> DataProcessing;

    /// Builds the input gene matching the preprocessing parameters.
    fn input_gene(&self, data_processing: &DataProcessing, rng: &mut dyn RngCore) -> LayerGene;

    /// Returns whether `layer_type` may appear in an architecture's body.
    fn accepts(&self, layer_type: LayerType) -> bool {
        self.body_layers().contains(&layer_type)
    }

    /// Draws a random body gene of the given type.
    fn body_gene(&self, layer_type: LayerType, rng: &mut dyn RngCore) -> LayerGene {
        let gene = LayerGene::new(layer_type);
        match layer_type {
            LayerType::Lstm | LayerType::Bidirectional => gene
                .with("units", pick(&UNITS, rng))
                .with("recurrent_dropout", rng.gen_range(0.0..0.5f32)),
            LayerType::Convolution1D | LayerType::Convolution2D => gene
                .with("filters", pick(&UNITS, rng))
                .with("kernel_size", rng.gen_range(2..=5i64))
                .with("activation", pick(&ACTIVATIONS, rng)),
            LayerType::MaxPooling => gene.with("pool_size", 2),
            LayerType::Dense => gene
                .with("units", pick(&UNITS, rng))
                .with("activation", pick(&ACTIVATIONS, rng)),
            LayerType::Dropout => gene.with("rate", rng.gen_range(0.1..0.5f32)),
            _ => gene,
        }
    }

    /// Builds the output gene for the task.
    fn output_gene(&self, classes: usize, task_type: TaskType) -> LayerGene {
        match task_type {
            TaskType::Classification => LayerGene::new(LayerType::LastDense)
                .with("units", classes)
                .with("activation", "softmax"),
            TaskType::Regression => LayerGene::new(LayerType::LastDense)
                .with("units", 1)
                .with("activation", "linear"),
        }
    }

    /// Draws random training hyperparameters.
    fn random_training_parameters(&self, rng: &mut dyn RngCore) -> TrainingParameters {
        TrainingParameters {
            epochs: pick(&TRAINING_EPOCHS, rng),
            batchs: pick(&BATCH_SIZES, rng),
            optimizer: if rng.gen::<bool>() {
                OptimizerType::Sgd
            } else {
                OptimizerType::Momentum
            },
            learning_rate: pick(&LEARNING_RATES, rng),
            extra: Parameters::default(),
        }
    }

    /// Draws a complete random genotype valid under this flavor.
    fn random_genotype(
        &self,
        classes: usize,
        task_type: TaskType,
        rng: &mut dyn RngCore,
    ) -> Genotype {
        let data_processing = self.random_data_processing(rng);
        let body_len = rng.gen_range(1..=MAX_BODY_LAYERS);

        let mut architecture = Vec::with_capacity(body_len + 2);
        architecture.push(self.input_gene(&data_processing, rng));
        for _ in 0..body_len {
            if let Some(&layer_type) = self.body_layers().choose(rng) {
                architecture.push(self.body_gene(layer_type, rng));
            }
        }
        architecture.push(self.output_gene(classes, task_type));

        Genotype::new_unchecked(
            architecture,
            self.random_training_parameters(rng),
            data_processing,
        )
    }
}

/// Validity rules for text networks: an embedding
/// input followed by recurrent, convolutional
/// and dense layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextFlavor;

impl Flavor for TextFlavor {
    fn body_layers(&self) -> &'static [LayerType] {
        &[
            LayerType::Lstm,
            LayerType::Bidirectional,
            LayerType::Convolution1D,
            LayerType::MaxPooling,
            LayerType::Dense,
            LayerType::Dropout,
        ]
    }

    fn random_data_processing(&self, rng: &mut dyn RngCore) -> DataProcessing {
        let mut extra = Parameters::default();
        extra.insert("vocabulary".into(), rng.gen_range(1_000..=30_000i64).into());
        DataProcessing {
            sentences_length: rng.gen_range(10..=100),
            extra,
        }
    }

    fn input_gene(&self, data_processing: &DataProcessing, rng: &mut dyn RngCore) -> LayerGene {
        let vocabulary = data_processing
            .extra
            .get("vocabulary")
            .and_then(|v| v.as_int())
            .unwrap_or(1_000);
        LayerGene::new(LayerType::Embedding)
            .with("vocabulary", vocabulary)
            .with("output_dim", pick(&UNITS, rng))
            .with("sentences_length", data_processing.sentences_length)
    }
}

/// Validity rules for image networks: a raw tensor
/// input followed by 2D convolutions, pooling
/// and dense layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFlavor;

impl Flavor for ImageFlavor {
    fn body_layers(&self) -> &'static [LayerType] {
        &[
            LayerType::Convolution2D,
            LayerType::MaxPooling,
            LayerType::Flatten,
            LayerType::Dense,
            LayerType::Dropout,
        ]
    }

    fn random_data_processing(&self, rng: &mut dyn RngCore) -> DataProcessing {
        let side = pick(&[8i64, 16, 28, 32], rng);
        let channels = pick(&[1i64, 3], rng);
        let mut extra = Parameters::default();
        extra.insert("side".into(), side.into());
        extra.insert("channels".into(), channels.into());
        DataProcessing {
            sentences_length: (side * side * channels) as usize,
            extra,
        }
    }

    fn input_gene(&self, data_processing: &DataProcessing, _rng: &mut dyn RngCore) -> LayerGene {
        let mut gene = LayerGene::new(LayerType::Input)
            .with("sentences_length", data_processing.sentences_length);
        for key in ["side", "channels"] {
            if let Some(value) = data_processing.extra.get(key) {
                gene.set(key, value.clone());
            }
        }
        gene
    }
}

/// Returns the flavor governing individuals of `data_type`.
pub fn flavor_of(data_type: DataType) -> &'static dyn Flavor {
    match data_type {
        DataType::Text => &TextFlavor,
        DataType::Image => &ImageFlavor,
    }
}

fn pick<T: Copy, const N: usize>(options: &[T; N], rng: &mut dyn RngCore) -> T {
    options[rng.gen_range(0..N)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_genotypes_respect_flavor() {
        let mut rng = StdRng::seed_from_u64(11);
        for data_type in [DataType::Text, DataType::Image] {
            let flavor = flavor_of(data_type);
            for _ in 0..50 {
                let genotype = flavor.random_genotype(3, TaskType::Classification, &mut rng);
                let architecture = genotype.architecture();
                assert!(architecture.len() >= 3);
                assert!(architecture[0].layer_type().is_input());
                assert!(architecture[architecture.len() - 1].layer_type().is_output());
                assert!(genotype.body().iter().all(|g| flavor.accepts(g.layer_type())));
                assert_eq!(
                    architecture[0]
                        .get("sentences_length")
                        .and_then(|p| p.as_int()),
                    Some(genotype.data_processing().sentences_length as i64)
                );
            }
        }
    }

    #[test]
    fn pick_draws_from_whole_table() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let batch = pick(&BATCH_SIZES, &mut rng);
            let index = BATCH_SIZES.iter().position(|&b| b == batch).unwrap();
            seen[index] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn output_gene_matches_classes() {
        let gene = TextFlavor.output_gene(4, TaskType::Classification);
        assert_eq!(gene.get("units").and_then(|p| p.as_int()), Some(4));
        let gene = TextFlavor.output_gene(4, TaskType::Regression);
        assert_eq!(gene.get("units").and_then(|p| p.as_int()), Some(1));
    }

    #[test]
    fn flavors_disagree_on_recurrent_layers() {
        assert!(TextFlavor.accepts(LayerType::Lstm));
        assert!(!ImageFlavor.accepts(LayerType::Lstm));
        assert!(ImageFlavor.accepts(LayerType::Convolution2D));
        assert!(!TextFlavor.accepts(LayerType::Embedding));
    }
}

//! Crossover of individuals. A child genotype is assembled from
//! copies of its parents' gene groups according to one of five
//! pairing strategies, each of which keeps the architecture's input
//! gene consistent with the preprocessing parameters it inherits.

use crate::architecture::{Genotype, Individual, LayerType};

use ahash::RandomState;
use rand::prelude::{Rng, SliceRandom};
use tracing::debug;

use std::collections::HashSet;
use std::fmt;

/// The gene groups a child takes from its father.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingType {
    /// Father's architecture, mother's training and preprocessing
    /// (with father's input length).
    FatherArchitecture,
    /// Father's genotype with one random layer replaced by
    /// a random mother layer.
    FatherArchitectureLayers,
    /// Father's genotype with one body layer replaced by
    /// mother's layer of the same type.
    FatherArchitectureParameter,
    /// Father's training, mother's architecture and preprocessing.
    FatherTraining,
    /// Father's preprocessing and input layer, mother's remaining
    /// architecture and training.
    FatherDataProcessing,
    /// A tag naming no strategy. Pairing with it yields no child.
    Unrecognized(String),
}

impl From<&str> for PairingType {
    fn from(tag: &str) -> PairingType {
        match tag {
            "father_architecture" => Self::FatherArchitecture,
            "father_architecture_layers" => Self::FatherArchitectureLayers,
            "father_architecture_parameter" => Self::FatherArchitectureParameter,
            "father_training" => Self::FatherTraining,
            "father_data_processing" => Self::FatherDataProcessing,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for PairingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FatherArchitecture => f.write_str("father_architecture"),
            Self::FatherArchitectureLayers => f.write_str("father_architecture_layers"),
            Self::FatherArchitectureParameter => f.write_str("father_architecture_parameter"),
            Self::FatherTraining => f.write_str("father_training"),
            Self::FatherDataProcessing => f.write_str("father_data_processing"),
            Self::Unrecognized(tag) => write!(f, "unrecognized({})", tag),
        }
    }
}

impl PairingType {
    /// All strategies that produce a child.
    pub const STRATEGIES: [PairingType; 5] = [
        PairingType::FatherArchitecture,
        PairingType::FatherArchitectureLayers,
        PairingType::FatherArchitectureParameter,
        PairingType::FatherTraining,
        PairingType::FatherDataProcessing,
    ];
}

/// Fills `individ` with a genotype recombined from `father` and
/// `mother` according to `pairing_type`, and returns it.
///
/// The parents are only read. Returns `None` for
/// [`PairingType::Unrecognized`], leaving the caller to
/// handle the missing child.
///
/// # Examples
/// ```
/// use neuvol::architecture::{cradle, IndividualOptions};
/// use neuvol::crossing::{perform_pairing, PairingType};
///
/// let options = IndividualOptions { classes: 2 };
/// let father = cradle(0, "text", "classification", None, false, options.clone()).unwrap();
/// let mother = cradle(0, "text", "classification", None, false, options.clone()).unwrap();
/// let shell = cradle(1, "text", "classification", Some((&father, &mother)), false, options)
///     .unwrap();
///
/// let child = perform_pairing(
///     shell,
///     &father,
///     &mother,
///     &PairingType::FatherTraining,
///     &mut rand::thread_rng(),
/// )
/// .unwrap();
///
/// assert_eq!(child.architecture(), mother.architecture());
/// assert_eq!(child.training_parameters(), father.training_parameters());
/// ```
pub fn perform_pairing<R: Rng + ?Sized>(
    mut individ: Individual,
    father: &Individual,
    mother: &Individual,
    pairing_type: &PairingType,
    rng: &mut R,
) -> Option<Individual> {
    let (father_genotype, mother_genotype) = (father.genotype(), mother.genotype());
    let genotype = match pairing_type {
        PairingType::FatherArchitecture => {
            father_architecture_pairing(father_genotype, mother_genotype)
        }
        PairingType::FatherArchitectureLayers => {
            father_architecture_layers_pairing(father_genotype, mother_genotype, rng)
        }
        PairingType::FatherArchitectureParameter => {
            father_architecture_parameter_pairing(father_genotype, mother_genotype, rng)
        }
        PairingType::FatherTraining => father_training_pairing(father_genotype, mother_genotype),
        PairingType::FatherDataProcessing => {
            father_data_processing_pairing(father_genotype, mother_genotype)
        }
        PairingType::Unrecognized(tag) => {
            debug!("no pairing strategy named {:?}", tag);
            return None;
        }
    };
    debug!(
        "{} paired {} x {} into {}",
        pairing_type,
        father.name(),
        mother.name(),
        individ.name()
    );
    individ.set_genotype(genotype);
    Some(individ)
}

/// Father's architecture, mother's training and preprocessing.
///
/// The input length follows the architecture, whose input
/// gene was built for father's preprocessing.
fn father_architecture_pairing(father: &Genotype, mother: &Genotype) -> Genotype {
    let mut data_processing = mother.data_processing().clone();
    data_processing.sentences_length = father.data_processing().sentences_length;

    Genotype::new_unchecked(
        father.architecture().to_vec(),
        mother.training_parameters().clone(),
        data_processing,
    )
}

/// Father's genotype with the layer at a random position in
/// `1..father_len` replaced by mother's layer at a random
/// position in `1..mother_len`.
///
/// The father range includes father's last index, so the output
/// gene can be the one replaced.
fn father_architecture_layers_pairing<R: Rng + ?Sized>(
    father: &Genotype,
    mother: &Genotype,
    rng: &mut R,
) -> Genotype {
    let changes_layer = rng.gen_range(1..father.architecture().len());
    let alter_layer = rng.gen_range(1..mother.architecture().len());

    let mut architecture = father.architecture().to_vec();
    architecture[changes_layer] = mother.architecture()[alter_layer].clone();

    Genotype::new_unchecked(
        architecture,
        father.training_parameters().clone(),
        father.data_processing().clone(),
    )
}

/// Father's genotype with the first body layer of a randomly
/// chosen shared type replaced by mother's first body layer of
/// that type. Input and output genes are never exchanged.
///
/// Without a shared body type, father's genotype is returned
/// unchanged.
fn father_architecture_parameter_pairing<R: Rng + ?Sized>(
    father: &Genotype,
    mother: &Genotype,
    rng: &mut R,
) -> Genotype {
    let father_types: Vec<LayerType> = father.body().iter().map(|l| l.layer_type()).collect();
    let mother_types: Vec<LayerType> = mother.body().iter().map(|l| l.layer_type()).collect();

    let shared = common_layer_types(&father_types, &mother_types);
    let intersected_layer = match shared.choose(rng) {
        Some(layer_type) => *layer_type,
        None => return father.clone(),
    };

    let mut architecture = father.architecture().to_vec();
    // Positions are offset by one to skip the input gene.
    if let (Some(changes_layer), Some(alter_layer)) = (
        father_types.iter().position(|t| *t == intersected_layer),
        mother_types.iter().position(|t| *t == intersected_layer),
    ) {
        architecture[changes_layer + 1] = mother.architecture()[alter_layer + 1].clone();
    }

    Genotype::new_unchecked(
        architecture,
        father.training_parameters().clone(),
        father.data_processing().clone(),
    )
}

/// Layer types present in both sequences, in order of first
/// appearance in `father`.
fn common_layer_types(father: &[LayerType], mother: &[LayerType]) -> Vec<LayerType> {
    let in_mother: HashSet<LayerType, RandomState> = mother.iter().copied().collect();
    let mut seen: HashSet<LayerType, RandomState> = HashSet::default();
    father
        .iter()
        .copied()
        .filter(|t| in_mother.contains(t) && seen.insert(*t))
        .collect()
}

/// Father's preprocessing, mother's architecture and training.
///
/// Mother's input gene is replaced by father's, which matches
/// the preprocessing that will feed it.
fn father_data_processing_pairing(father: &Genotype, mother: &Genotype) -> Genotype {
    let mut architecture = mother.architecture().to_vec();
    architecture[0] = father.architecture()[0].clone();

    Genotype::new_unchecked(
        architecture,
        mother.training_parameters().clone(),
        father.data_processing().clone(),
    )
}

/// Father's training, mother's architecture and preprocessing.
fn father_training_pairing(father: &Genotype, mother: &Genotype) -> Genotype {
    Genotype::new_unchecked(
        mother.architecture().to_vec(),
        father.training_parameters().clone(),
        mother.data_processing().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::{
        DataProcessing, DataType, IndividualOptions, LayerGene, OptimizerType, Parameters,
        TaskType, TrainingParameters,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gene(layer_type: LayerType, tag: i64) -> LayerGene {
        LayerGene::new(layer_type).with("tag", tag)
    }

    fn genotype(layers: &[(LayerType, i64)], sentences_length: usize, epochs: usize) -> Genotype {
        let mut architecture = vec![gene(LayerType::Embedding, sentences_length as i64)
            .with("sentences_length", sentences_length)];
        architecture.extend(layers.iter().map(|(t, tag)| gene(*t, *tag)));
        architecture.push(gene(LayerType::LastDense, -(sentences_length as i64)));
        Genotype::new(
            architecture,
            TrainingParameters {
                epochs,
                batchs: 16,
                optimizer: OptimizerType::Sgd,
                learning_rate: 0.01,
                extra: Parameters::default(),
            },
            DataProcessing {
                sentences_length,
                extra: Parameters::default(),
            },
        )
        .unwrap()
    }

    fn individual(genotype: Genotype) -> Individual {
        let mut individ = shell();
        individ.set_genotype(genotype);
        individ
    }

    fn shell() -> Individual {
        Individual::new(
            0,
            DataType::Text,
            TaskType::Classification,
            None,
            false,
            IndividualOptions::default(),
            &mut StdRng::seed_from_u64(0),
        )
    }

    fn parents() -> (Individual, Individual) {
        let father = individual(genotype(
            &[
                (LayerType::Lstm, 10),
                (LayerType::Dense, 11),
                (LayerType::Dropout, 12),
            ],
            40,
            5,
        ));
        let mother = individual(genotype(
            &[
                (LayerType::Convolution1D, 20),
                (LayerType::Dense, 21),
                (LayerType::Dense, 22),
            ],
            70,
            15,
        ));
        (father, mother)
    }

    fn tag(gene: &LayerGene) -> Option<i64> {
        gene.get("tag").and_then(|p| p.as_int())
    }

    #[test]
    fn pairing_type_tags() {
        for strategy in PairingType::STRATEGIES.iter() {
            assert_eq!(&PairingType::from(strategy.to_string().as_str()), strategy);
        }
        assert_eq!(
            PairingType::from("mother_architecture"),
            PairingType::Unrecognized("mother_architecture".into())
        );
    }

    #[test]
    fn unrecognized_pairing_yields_none() {
        let (father, mother) = parents();
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::from("bogus"),
            &mut StdRng::seed_from_u64(1),
        );
        assert!(child.is_none());
    }

    #[test]
    fn every_strategy_produces_consistent_child() {
        let (father, mother) = parents();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for strategy in PairingType::STRATEGIES.iter() {
                let child = perform_pairing(shell(), &father, &mother, strategy, &mut rng)
                    .expect("known strategies always produce a child");
                assert!(child.architecture().len() >= 2);
                assert!(child.training_parameters().batchs > 0);

                // The input gene's length must match the preprocessing.
                let input_length = child.architecture()[0]
                    .get("sentences_length")
                    .and_then(|p| p.as_int());
                assert_eq!(
                    input_length,
                    Some(child.data_processing().sentences_length as i64),
                    "strategy {} broke the input seam",
                    strategy
                );
            }
        }
    }

    #[test]
    fn parents_are_untouched() {
        let (father, mother) = parents();
        let (father_before, mother_before) = (father.clone(), mother.clone());
        let mut rng = StdRng::seed_from_u64(3);
        for strategy in PairingType::STRATEGIES.iter() {
            perform_pairing(shell(), &father, &mother, strategy, &mut rng);
        }
        assert_eq!(father, father_before);
        assert_eq!(mother, mother_before);
    }

    #[test]
    fn father_architecture() {
        let (father, mother) = parents();
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherArchitecture,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(child.architecture(), father.architecture());
        assert_eq!(child.training_parameters(), mother.training_parameters());
        assert_eq!(child.data_processing().sentences_length, 40);
        assert_eq!(
            child.data_processing().extra,
            mother.data_processing().extra
        );
        // Mother keeps her own length.
        assert_eq!(mother.data_processing().sentences_length, 70);
    }

    #[test]
    fn father_architecture_layers_swaps_drawn_indices() {
        let (father, mother) = parents();
        for seed in 0..30 {
            let mut replay = StdRng::seed_from_u64(seed);
            let changes_layer = replay.gen_range(1..father.architecture().len());
            let alter_layer = replay.gen_range(1..mother.architecture().len());

            let child = perform_pairing(
                shell(),
                &father,
                &mother,
                &PairingType::FatherArchitectureLayers,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();

            assert_eq!(child.architecture().len(), father.architecture().len());
            assert_eq!(
                child.architecture()[changes_layer],
                mother.architecture()[alter_layer]
            );
            for (i, (c, f)) in child
                .architecture()
                .iter()
                .zip(father.architecture())
                .enumerate()
            {
                if i != changes_layer {
                    assert_eq!(c, f, "unexpected change at index {}", i);
                }
            }
            assert_eq!(child.training_parameters(), father.training_parameters());
            assert_eq!(child.data_processing(), father.data_processing());
        }
    }

    #[test]
    fn father_architecture_layers_can_replace_output_gene() {
        // Both draws start at 1 and run to the end of the architecture,
        // so father's output gene is a possible target and mother's
        // output gene a possible source. The input gene never changes.
        let (father, mother) = parents();
        let father_last = father.architecture().len() - 1;
        let (mut output_replaced, mut output_inherited) = (false, false);
        for seed in 0..200 {
            let child = perform_pairing(
                shell(),
                &father,
                &mother,
                &PairingType::FatherArchitectureLayers,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            assert_eq!(child.architecture()[0], father.architecture()[0]);

            let last = &child.architecture()[father_last];
            if last.layer_type() != LayerType::LastDense {
                output_replaced = true;
            }
            if last == mother.architecture().last().unwrap() {
                output_inherited = true;
            }
        }
        assert!(output_replaced);
        assert!(output_inherited);
    }

    #[test]
    fn father_architecture_parameter_single_shared_type() {
        let (father, mother) = parents();
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherArchitectureParameter,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();

        // Dense is the only shared body type: father's first dense
        // (index 2) takes mother's first dense (index 2).
        let tags: Vec<_> = child.architecture().iter().map(tag).collect();
        assert_eq!(
            tags,
            vec![Some(40), Some(10), Some(21), Some(12), Some(-40)]
        );
        assert_eq!(child.training_parameters(), father.training_parameters());
        assert_eq!(child.data_processing(), father.data_processing());
    }

    #[test]
    fn father_architecture_parameter_without_shared_types() {
        let father = individual(genotype(&[(LayerType::Lstm, 1)], 30, 5));
        let mother = individual(genotype(&[(LayerType::Dropout, 2)], 50, 10));
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherArchitectureParameter,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert_eq!(child.genotype(), father.genotype());
    }

    #[test]
    fn father_architecture_parameter_ignores_edge_genes() {
        // Both parents share only their edge layer types.
        let father = individual(genotype(&[], 30, 5));
        let mother = individual(genotype(&[], 50, 10));
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherArchitectureParameter,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert_eq!(child.genotype(), father.genotype());
    }

    #[test]
    fn father_architecture_parameter_picks_among_shared_types() {
        let father = individual(genotype(
            &[(LayerType::Lstm, 1), (LayerType::Dense, 2), (LayerType::Lstm, 3)],
            30,
            5,
        ));
        let mother = individual(genotype(
            &[(LayerType::Dense, 4), (LayerType::Lstm, 5)],
            50,
            10,
        ));
        for seed in 0..20 {
            let child = perform_pairing(
                shell(),
                &father,
                &mother,
                &PairingType::FatherArchitectureParameter,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            let tags: Vec<_> = child.architecture().iter().map(tag).collect();
            assert!(
                tags == vec![Some(30), Some(5), Some(2), Some(3), Some(-30)]
                    || tags == vec![Some(30), Some(1), Some(4), Some(3), Some(-30)],
                "unexpected exchange {:?}",
                tags
            );
        }
    }

    #[test]
    fn father_data_processing() {
        let (father, mother) = parents();
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherDataProcessing,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(child.architecture()[0], father.architecture()[0]);
        assert_eq!(child.architecture()[1..], mother.architecture()[1..]);
        assert_eq!(child.training_parameters(), mother.training_parameters());
        assert_eq!(child.data_processing(), father.data_processing());
    }

    #[test]
    fn father_training() {
        let (father, mother) = parents();
        let child = perform_pairing(
            shell(),
            &father,
            &mother,
            &PairingType::FatherTraining,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(child.architecture(), mother.architecture());
        assert_eq!(child.training_parameters(), father.training_parameters());
        assert_eq!(child.data_processing(), mother.data_processing());
    }

    #[test]
    fn common_types_follow_father_order() {
        use LayerType::*;
        assert_eq!(
            common_layer_types(&[Dense, Lstm, Dense, Dropout], &[Dropout, Dense]),
            vec![Dense, Dropout]
        );
        assert!(common_layer_types(&[Lstm], &[Dense]).is_empty());
    }
}

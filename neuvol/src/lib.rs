//! The core of a genetic neural-architecture search.
//!
//! Candidate networks are described by a [`Genotype`] (ordered layer
//! genes, training hyperparameters and data-preprocessing parameters)
//! carried by an [`Individual`]. New individuals are created through
//! [`cradle`], recombined from two parents with one of five pairing
//! strategies via [`perform_pairing`], and scored by an [`Evaluator`]
//! through k-fold cross-validation with an AUC or F1 fitness.
//!
//! Training itself is delegated to the collaborator traits of the
//! [`backend`] module. A small dense-network implementation of them
//! is supplied by the `neuvol-nn` crate.
//!
//! Selection, mutation and termination policies are left to the
//! caller.
//!
//! [`Genotype`]: crate::architecture::Genotype
//! [`Individual`]: crate::architecture::Individual
//! [`cradle`]: crate::architecture::cradle
//! [`perform_pairing`]: crate::crossing::perform_pairing
//! [`Evaluator`]: crate::evaluation::Evaluator
//!
//! # Example usage: one generation on a toy dataset, using `neuvol-nn`
//! ```
//! use neuvol::architecture::{cradle, IndividualOptions};
//! use neuvol::crossing::{perform_pairing, PairingType};
//! use neuvol::evaluation::Evaluator;
//! use neuvol_nn::{CpuBackend, SequencePreparer};
//!
//! // Two well separated classes of short sequences.
//! let x: Vec<Vec<f32>> = (0..20).map(|i| vec![(i % 2) as f32; 8]).collect();
//! let y: Vec<usize> = (0..20).map(|i| i % 2).collect();
//!
//! let evaluator = Evaluator::new(x, y, 2, "cpu", false, SequencePreparer, CpuBackend::seeded(7))
//!     .unwrap();
//!
//! let options = IndividualOptions { classes: 2 };
//! let mut population: Vec<_> = (0..4)
//!     .map(|_| cradle(0, "text", "classification", None, false, options.clone()).unwrap())
//!     .collect();
//! for individ in population.iter_mut() {
//!     let fitness = evaluator.evaluate(&*individ).unwrap();
//!     individ.set_fitness(fitness);
//! }
//! population.sort_by(|a, b| b.fitness().partial_cmp(&a.fitness()).unwrap());
//!
//! let (father, mother) = (&population[0], &population[1]);
//! let shell = cradle(1, "text", "classification", Some((father, mother)), false, options)
//!     .unwrap();
//! let child = perform_pairing(
//!     shell,
//!     father,
//!     mother,
//!     &PairingType::FatherArchitecture,
//!     &mut rand::thread_rng(),
//! )
//! .unwrap();
//!
//! assert_eq!(child.architecture(), father.architecture());
//! assert_eq!(child.parents(), Some((father.name(), mother.name())));
//! ```

pub mod architecture;
pub mod backend;
pub mod crossing;
pub mod evaluation;

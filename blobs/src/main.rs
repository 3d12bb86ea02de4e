use neuvol::architecture::{cradle, Individual, IndividualOptions};
use neuvol::crossing::{perform_pairing, PairingType};
use neuvol::evaluation::{Evaluator, EvaluatorConfig};
use neuvol_nn::{CpuBackend, SequencePreparer};

use std::cmp::Ordering;
use std::error::Error;
use std::{env, fs};

use rand::Rng;
use rayon::prelude::*;
use ron::ser::PrettyConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CLASSES: usize = 3;
const SAMPLES_PER_CLASS: usize = 30;
const SEQUENCE_LENGTH: usize = 12;
const NOISE: f32 = 0.4;
const POPULATION: usize = 8;
const GENERATIONS: usize = 3;

type Blobs = Evaluator<Vec<f32>, SequencePreparer, CpuBackend>;

/// Noisy sequences, one blob per class: class `c` is
/// high on every position `j` with `j % CLASSES == c`.
fn blobs(rng: &mut impl Rng) -> (Vec<Vec<f32>>, Vec<usize>) {
    let mut x = Vec::with_capacity(CLASSES * SAMPLES_PER_CLASS);
    let mut y = Vec::with_capacity(CLASSES * SAMPLES_PER_CLASS);
    for i in 0..CLASSES * SAMPLES_PER_CLASS {
        let class = i % CLASSES;
        x.push(
            (0..SEQUENCE_LENGTH)
                .map(|j| {
                    let center = if j % CLASSES == class { 1.0 } else { 0.0 };
                    center + rng.gen_range(-NOISE..NOISE)
                })
                .collect(),
        );
        y.push(class);
    }
    (x, y)
}

fn load_config(path: &str) -> Result<EvaluatorConfig, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(ron::from_str(&text)?)
}

fn newborn(epochs: usize) -> Result<Individual, Box<dyn Error>> {
    let options = IndividualOptions { classes: CLASSES };
    Ok(cradle(epochs, "text", "classification", None, false, options)?)
}

/// Scores every individual, dropping those whose training failed.
fn evaluate(evaluator: &Blobs, population: Vec<Individual>) -> Vec<Individual> {
    let mut scored: Vec<Individual> = population
        .into_par_iter()
        .filter_map(|mut individ| match evaluator.evaluate(&individ) {
            Ok(fitness) => {
                individ.set_fitness(fitness);
                Some(individ)
            }
            Err(e) => {
                warn!("{} discarded: {}", individ.name(), e);
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.fitness()
            .partial_cmp(&a.fitness())
            .unwrap_or(Ordering::Equal)
    });
    scored
}

/// Keeps the two best individuals, adds one child of theirs per
/// pairing strategy, and fills the rest with newborns.
fn next_generation(
    scored: Vec<Individual>,
    generation: usize,
) -> Result<Vec<Individual>, Box<dyn Error>> {
    let mut next: Vec<Individual> = scored.into_iter().take(2).collect();
    if let [father, mother] = &next[..] {
        let mut children = Vec::with_capacity(PairingType::STRATEGIES.len());
        for pairing_type in PairingType::STRATEGIES.iter() {
            let shell = cradle(
                generation,
                "text",
                "classification",
                Some((father, mother)),
                false,
                IndividualOptions { classes: CLASSES },
            )?;
            let mut rng = rand::thread_rng();
            children.extend(perform_pairing(shell, father, mother, pairing_type, &mut rng));
        }
        next.extend(children);
    }
    while next.len() < POPULATION {
        next.push(newborn(generation)?);
    }
    Ok(next)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => EvaluatorConfig {
            kfold_number: 3,
            ..EvaluatorConfig::default()
        },
    };
    info!("evaluating with {:?}", config);

    let (x, y) = blobs(&mut rand::thread_rng());
    let evaluator = Evaluator::from_config(x, y, config, SequencePreparer, CpuBackend::new())?;

    let mut population = (0..POPULATION)
        .map(|_| newborn(0))
        .collect::<Result<Vec<_>, _>>()?;
    let mut champion: Option<Individual> = None;
    for generation in 0..GENERATIONS {
        let scored = evaluate(&evaluator, population);
        if let Some(best) = scored.first() {
            info!(
                "generation {}: {} scored, best {} at {:.4}",
                generation,
                scored.len(),
                best.name(),
                best.fitness().unwrap_or_default()
            );
            if champion.as_ref().map_or(true, |c| best.fitness() > c.fitness()) {
                champion = Some(best.clone());
            }
        }
        population = next_generation(scored, generation + 1)?;
    }

    match champion {
        Some(champion) => println!(
            "{}",
            ron::ser::to_string_pretty(&champion, PrettyConfig::default())?
        ),
        None => warn!("no individual could be evaluated"),
    }
    Ok(())
}
